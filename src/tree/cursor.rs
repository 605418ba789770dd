//! # Tree Iteration
//!
//! In-order traversal keeps an explicit stack of borrowed nodes: the stack
//! holds the ancestors whose key has not yet been yielded, so the next entry is
//! always the top of the stack. Seeking pushes exactly the ancestors with
//! key >= probe, which makes the first yielded entry the lower bound.

use super::Node;
use std::borrow::Borrow;
use std::cmp::Ordering;

pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    remaining: Option<usize>,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(super) fn new(root: Option<&'a Node<K, V>>) -> Self {
        let mut iter = Self {
            stack: Vec::new(),
            remaining: root.map(|n| n.size).or(Some(0)),
        };
        iter.push_left(root);
        iter
    }

    pub(super) fn seek<Q>(root: Option<&'a Node<K, V>>, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut stack = Vec::new();
        let mut cur = root;
        while let Some(n) = cur {
            match key.cmp(n.key.borrow()) {
                Ordering::Greater => cur = n.right.as_deref(),
                Ordering::Equal => {
                    stack.push(n);
                    break;
                }
                Ordering::Less => {
                    stack.push(n);
                    cur = n.left.as_deref();
                }
            }
        }
        Self {
            stack,
            remaining: None,
        }
    }

    fn push_left(&mut self, mut cur: Option<&'a Node<K, V>>) {
        while let Some(n) = cur {
            self.stack.push(n);
            cur = n.left.as_deref();
        }
    }

    fn peek(&self) -> Option<&'a Node<K, V>> {
        self.stack.last().copied()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.stack.pop()?;
        self.push_left(n.right.as_deref());
        if let Some(r) = self.remaining.as_mut() {
            *r = r.saturating_sub(1);
        }
        Some((&n.key, &n.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining {
            Some(r) => (r, Some(r)),
            None => (self.stack.len(), None),
        }
    }
}

/// Positioned cursor over a tree.
pub struct Cursor<'a, K, V> {
    iter: Iter<'a, K, V>,
}

impl<'a, K, V> Cursor<'a, K, V> {
    pub(super) fn new(iter: Iter<'a, K, V>) -> Self {
        Self { iter }
    }

    pub fn valid(&self) -> bool {
        self.iter.peek().is_some()
    }

    pub fn key(&self) -> Option<&'a K> {
        self.iter.peek().map(|n| &n.key)
    }

    pub fn value(&self) -> Option<&'a V> {
        self.iter.peek().map(|n| &n.value)
    }

    /// Moves to the next entry; returns whether the cursor is still valid.
    pub fn advance(&mut self) -> bool {
        self.iter.next();
        self.valid()
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::PTree;

    #[test]
    fn cursor_walks_all_entries() {
        let t: PTree<u32, u32> = (1..=5).map(|k| (k, k * 100)).collect();
        let mut cursor = t.cursor_first();
        let mut seen = Vec::new();
        while cursor.valid() {
            seen.push((*cursor.key().unwrap(), *cursor.value().unwrap()));
            cursor.advance();
        }
        assert_eq!(seen, vec![(1, 100), (2, 200), (3, 300), (4, 400), (5, 500)]);
    }

    #[test]
    fn cursor_seek_on_empty_tree_is_invalid() {
        let t: PTree<u32, ()> = PTree::new();
        assert!(!t.cursor_seek(&3).valid());
        assert!(!t.cursor_first().valid());
    }

    #[test]
    fn exact_size_for_full_iteration() {
        let t: PTree<u32, ()> = (0..7).map(|k| (k, ())).collect();
        let iter = t.iter();
        assert_eq!(iter.size_hint(), (7, Some(7)));
    }
}
