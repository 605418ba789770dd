//! # Persistent Weight-Balanced Tree
//!
//! `PTree<K, V>` is the one ordered container of the integrity core. The
//! snapshot object map, each table's row store, each row version's column
//! mapping and each index's key tree are all `PTree`s.
//!
//! ## Persistence Model
//!
//! Nodes are immutable and reference-counted. An update copies only the nodes
//! on the root-to-leaf path it touches and shares every other subtree with the
//! input tree:
//!
//! ```text
//!   before            insert(6)            after (new nodes marked *)
//!
//!     4                                        4*
//!    / \                                      / \
//!   2   8        ───────────────────>        2   8*
//!      / \                                      / \
//!     7   9                                    7*  9
//!                                             /
//!                                            6*
//! ```
//!
//! The old root still describes the old tree, so any snapshot holding it keeps
//! seeing exactly what it saw. Cloning a `PTree` is a single reference-count
//! increment.
//!
//! ## Balance
//!
//! Every node caches the size of its subtree. After an insert or remove a
//! node is rebalanced when one side outweighs the other by more than
//! `TREE_DELTA`; `TREE_GAMMA` chooses between single and double rotation.
//! Heights stay O(log n) under any sequence of inserts and removes.
//!
//! Cached sizes also give O(log n) positional access: [`PTree::nth`] and
//! [`PTree::rank`].
//!
//! ## Iteration
//!
//! - [`PTree::iter`]: ascending order
//! - [`PTree::range_from`]: ascending from the first key >= a probe
//! - [`PTree::cursor_first`] / [`PTree::cursor_seek`]: explicit cursor with
//!   `valid`/`key`/`value`/`advance`, mirroring the row-store B-tree cursor

mod cursor;

pub use cursor::{Cursor, Iter};

use crate::config::{TREE_DELTA, TREE_GAMMA};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Link<K, V> = Option<Arc<Node<K, V>>>;

pub(crate) struct Node<K, V> {
    key: K,
    value: V,
    size: usize,
    left: Link<K, V>,
    right: Link<K, V>,
}

fn size<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |n| n.size)
}

fn node<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    Arc::new(Node {
        size: size(&left) + size(&right) + 1,
        key,
        value,
        left,
        right,
    })
}

fn balance<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let ls = size(&left);
    let rs = size(&right);
    if ls + rs <= 1 {
        return node(key, value, left, right);
    }
    match (&left, &right) {
        (_, Some(r)) if rs > TREE_DELTA * ls => {
            if size(&r.left) < TREE_GAMMA * size(&r.right) {
                rotate_single_left(key, value, left, r)
            } else {
                rotate_double_left(key, value, left, r)
            }
        }
        (Some(l), _) if ls > TREE_DELTA * rs => {
            if size(&l.right) < TREE_GAMMA * size(&l.left) {
                rotate_single_right(key, value, l, right)
            } else {
                rotate_double_right(key, value, l, right)
            }
        }
        _ => node(key, value, left, right),
    }
}

fn rotate_single_left<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    r: &Arc<Node<K, V>>,
) -> Arc<Node<K, V>> {
    let new_left = node(key, value, left, r.left.clone());
    node(r.key.clone(), r.value.clone(), Some(new_left), r.right.clone())
}

fn rotate_double_left<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    r: &Arc<Node<K, V>>,
) -> Arc<Node<K, V>> {
    match &r.left {
        Some(rl) => {
            let new_left = node(key, value, left, rl.left.clone());
            let new_right = node(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone());
            node(rl.key.clone(), rl.value.clone(), Some(new_left), Some(new_right))
        }
        None => rotate_single_left(key, value, left, r),
    }
}

fn rotate_single_right<K: Clone, V: Clone>(
    key: K,
    value: V,
    l: &Arc<Node<K, V>>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let new_right = node(key, value, l.right.clone(), right);
    node(l.key.clone(), l.value.clone(), l.left.clone(), Some(new_right))
}

fn rotate_double_right<K: Clone, V: Clone>(
    key: K,
    value: V,
    l: &Arc<Node<K, V>>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    match &l.right {
        Some(lr) => {
            let new_left = node(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone());
            let new_right = node(key, value, lr.right.clone(), right);
            node(lr.key.clone(), lr.value.clone(), Some(new_left), Some(new_right))
        }
        None => rotate_single_right(key, value, l, right),
    }
}

fn insert_node<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: K, value: V) -> Arc<Node<K, V>> {
    match link {
        None => node(key, value, None, None),
        Some(n) => match key.cmp(&n.key) {
            Ordering::Less => balance(
                n.key.clone(),
                n.value.clone(),
                Some(insert_node(&n.left, key, value)),
                n.right.clone(),
            ),
            Ordering::Greater => balance(
                n.key.clone(),
                n.value.clone(),
                n.left.clone(),
                Some(insert_node(&n.right, key, value)),
            ),
            Ordering::Equal => Arc::new(Node {
                key,
                value,
                size: n.size,
                left: n.left.clone(),
                right: n.right.clone(),
            }),
        },
    }
}

/// Returns `None` when the key is absent so the caller can keep the old root.
fn remove_node<K, V, Q>(link: &Link<K, V>, key: &Q) -> Option<Link<K, V>>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
{
    let n = link.as_ref()?;
    match key.cmp(n.key.borrow()) {
        Ordering::Less => remove_node(&n.left, key)
            .map(|nl| Some(balance(n.key.clone(), n.value.clone(), nl, n.right.clone()))),
        Ordering::Greater => remove_node(&n.right, key)
            .map(|nr| Some(balance(n.key.clone(), n.value.clone(), n.left.clone(), nr))),
        Ordering::Equal => Some(glue(&n.left, &n.right)),
    }
}

fn glue<K: Clone, V: Clone>(left: &Link<K, V>, right: &Link<K, V>) -> Link<K, V> {
    match (left, right) {
        (None, _) => right.clone(),
        (_, None) => left.clone(),
        (Some(l), Some(r)) => {
            if l.size > r.size {
                let (k, v, rest) = take_max(l);
                Some(balance(k, v, rest, right.clone()))
            } else {
                let (k, v, rest) = take_min(r);
                Some(balance(k, v, left.clone(), rest))
            }
        }
    }
}

fn take_min<K: Clone, V: Clone>(n: &Arc<Node<K, V>>) -> (K, V, Link<K, V>) {
    match &n.left {
        None => (n.key.clone(), n.value.clone(), n.right.clone()),
        Some(l) => {
            let (k, v, rest) = take_min(l);
            (
                k,
                v,
                Some(balance(n.key.clone(), n.value.clone(), rest, n.right.clone())),
            )
        }
    }
}

fn take_max<K: Clone, V: Clone>(n: &Arc<Node<K, V>>) -> (K, V, Link<K, V>) {
    match &n.right {
        None => (n.key.clone(), n.value.clone(), n.left.clone()),
        Some(r) => {
            let (k, v, rest) = take_max(r);
            (
                k,
                v,
                Some(balance(n.key.clone(), n.value.clone(), n.left.clone(), rest)),
            )
        }
    }
}

pub struct PTree<K, V> {
    root: Link<K, V>,
}

impl<K, V> Clone for PTree<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<K, V> Default for PTree<K, V> {
    fn default() -> Self {
        Self { root: None }
    }
}

impl<K, V> PTree<K, V> {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// True when both trees are the same shared structure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.root.as_deref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        let mut n = self.root.as_deref()?;
        while let Some(l) = n.left.as_deref() {
            n = l;
        }
        Some((&n.key, &n.value))
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        let mut n = self.root.as_deref()?;
        while let Some(r) = n.right.as_deref() {
            n = r;
        }
        Some((&n.key, &n.value))
    }

    /// Entry at ascending position `index`.
    pub fn nth(&self, mut index: usize) -> Option<(&K, &V)> {
        let mut cur = self.root.as_deref();
        while let Some(n) = cur {
            let ls = size(&n.left);
            match index.cmp(&ls) {
                Ordering::Less => cur = n.left.as_deref(),
                Ordering::Equal => return Some((&n.key, &n.value)),
                Ordering::Greater => {
                    index -= ls + 1;
                    cur = n.right.as_deref();
                }
            }
        }
        None
    }

    pub fn cursor_first(&self) -> Cursor<'_, K, V> {
        Cursor::new(self.iter())
    }
}

impl<K: Ord + Clone, V: Clone> PTree<K, V> {
    /// Returns a new tree with `key` bound to `value`, replacing any binding.
    pub fn insert(&self, key: K, value: V) -> Self {
        Self {
            root: Some(insert_node(&self.root, key, value)),
        }
    }

    /// Returns a new tree without `key`. Absent keys return a tree sharing
    /// the original root.
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match remove_node(&self.root, key) {
            Some(root) => Self { root },
            None => self.clone(),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root.as_deref();
        while let Some(n) = cur {
            match key.cmp(n.key.borrow()) {
                Ordering::Less => cur = n.left.as_deref(),
                Ordering::Greater => cur = n.right.as_deref(),
                Ordering::Equal => return Some(&n.value),
            }
        }
        None
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Number of keys strictly less than `key`.
    pub fn rank<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root.as_deref();
        let mut below = 0;
        while let Some(n) = cur {
            match key.cmp(n.key.borrow()) {
                Ordering::Less => cur = n.left.as_deref(),
                Ordering::Equal => return below + size(&n.left),
                Ordering::Greater => {
                    below += size(&n.left) + 1;
                    cur = n.right.as_deref();
                }
            }
        }
        below
    }

    /// Ascending iteration starting at the first key >= `key`.
    pub fn range_from<Q>(&self, key: &Q) -> Iter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Iter::seek(self.root.as_deref(), key)
    }

    pub fn cursor_seek<Q>(&self, key: &Q) -> Cursor<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Cursor::new(self.range_from(key))
    }

    /// Returns a new tree with the binding for `key` replaced by `f(old)`.
    /// `f` returning `None` removes the key.
    pub fn update_with<F>(&self, key: K, f: F) -> Self
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        match f(self.get(&key)) {
            Some(v) => self.insert(key, v),
            None => self.remove(&key),
        }
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for PTree<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PTree::new(), |tree, (k, v)| tree.insert(k, v))
    }
}

impl<'a, K, V> IntoIterator for &'a PTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for PTree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<K: Eq, V: Eq> Eq for PTree<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Serialize, V: Serialize> Serialize for PTree<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct PTreeVisitor<K, V>(PhantomData<(K, V)>);

impl<'de, K, V> Visitor<'de> for PTreeVisitor<K, V>
where
    K: Deserialize<'de> + Ord + Clone,
    V: Deserialize<'de> + Clone,
{
    type Value = PTree<K, V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an ordered map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut tree = PTree::new();
        while let Some((k, v)) = access.next_entry()? {
            tree = tree.insert(k, v);
        }
        Ok(tree)
    }
}

impl<'de, K, V> Deserialize<'de> for PTree<K, V>
where
    K: Deserialize<'de> + Ord + Clone,
    V: Deserialize<'de> + Clone,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PTreeVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_balanced<K, V>(link: &Link<K, V>) -> bool {
        match link {
            None => true,
            Some(n) => {
                let ls = size(&n.left);
                let rs = size(&n.right);
                let ok = ls + rs <= 1 || (ls <= TREE_DELTA * rs && rs <= TREE_DELTA * ls);
                ok && n.size == ls + rs + 1 && is_balanced(&n.left) && is_balanced(&n.right)
            }
        }
    }

    #[test]
    fn insert_keeps_old_version_intact() {
        let t1: PTree<i32, &str> = PTree::new().insert(1, "a").insert(2, "b");
        let t2 = t1.insert(3, "c");
        assert_eq!(t1.len(), 2);
        assert_eq!(t2.len(), 3);
        assert!(t1.get(&3).is_none());
        assert_eq!(t2.get(&3), Some(&"c"));
    }

    #[test]
    fn insert_replaces_existing_binding() {
        let t = PTree::new().insert(1, "a").insert(1, "z");
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&1), Some(&"z"));
    }

    #[test]
    fn remove_absent_key_shares_root() {
        let t: PTree<i32, i32> = (0..10).map(|i| (i, i)).collect();
        let same = t.remove(&42);
        assert!(same.ptr_eq(&t));
    }

    #[test]
    fn remove_keeps_old_version_intact() {
        let t: PTree<i32, i32> = (0..100).map(|i| (i, i * 10)).collect();
        let smaller = t.remove(&50);
        assert_eq!(t.get(&50), Some(&500));
        assert!(smaller.get(&50).is_none());
        assert_eq!(smaller.len(), 99);
    }

    #[test]
    fn tree_stays_balanced_under_sequential_inserts_and_removes() {
        let mut t = PTree::new();
        for i in 0..1000 {
            t = t.insert(i, ());
            assert!(is_balanced(&t.root));
        }
        for i in (0..1000).step_by(3) {
            t = t.remove(&i);
            assert!(is_balanced(&t.root));
        }
        assert_eq!(t.len(), 1000 - 334);
    }

    #[test]
    fn iteration_is_ascending() {
        let t: PTree<i32, ()> = [5, 3, 9, 1, 7].into_iter().map(|k| (k, ())).collect();
        let keys: Vec<_> = t.keys().copied().collect();
        assert_eq!(keys, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn range_from_starts_at_first_key_not_less_than_probe() {
        let t: PTree<i32, ()> = [10, 20, 30, 40].into_iter().map(|k| (k, ())).collect();
        let keys: Vec<_> = t.range_from(&25).map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![30, 40]);
        let keys: Vec<_> = t.range_from(&20).map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![20, 30, 40]);
        assert_eq!(t.range_from(&41).count(), 0);
    }

    #[test]
    fn nth_and_rank_agree() {
        let t: PTree<i32, ()> = (0..50).map(|k| (k * 2, ())).collect();
        for i in 0..50 {
            let (k, _) = t.nth(i).unwrap();
            assert_eq!(*k, (i as i32) * 2);
            assert_eq!(t.rank(k), i);
        }
        assert!(t.nth(50).is_none());
        assert_eq!(t.rank(&7), 4);
    }

    #[test]
    fn first_and_last() {
        let t: PTree<i32, ()> = [4, 2, 8].into_iter().map(|k| (k, ())).collect();
        assert_eq!(t.first().map(|(k, _)| *k), Some(2));
        assert_eq!(t.last().map(|(k, _)| *k), Some(8));
        assert!(PTree::<i32, ()>::new().first().is_none());
    }

    #[test]
    fn equality_is_by_contents() {
        let a: PTree<i32, i32> = (0..20).map(|i| (i, i)).collect();
        let b: PTree<i32, i32> = (0..20).rev().map(|i| (i, i)).collect();
        assert_eq!(a, b);
        assert_ne!(a, b.insert(3, 99));
    }

    #[test]
    fn update_with_can_remove() {
        let t = PTree::new().insert("a", 1).insert("b", 2);
        let t2 = t.update_with("a", |v| v.map(|x| x + 10));
        assert_eq!(t2.get("a"), Some(&11));
        let t3 = t2.update_with("b", |_| None);
        assert!(!t3.contains_key("b"));
    }
}
