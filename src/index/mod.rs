//! # Composite-Key Ordered Index
//!
//! An `Index` maps key tuples, projected from a table's rows, to the row ids
//! that carry them. It is a value: `insert`, `remove` and `build` return a new
//! `Index` sharing every untouched subtree with the old one.
//!
//! ## Tree States
//!
//! ```text
//! ┌─────────┐  build()   ┌───────┐  insert()   ┌──────────────┐
//! │ Unbuilt │ ─────────> │ Empty │ ──────────> │ Rows(PTree)  │
//! └─────────┘            └───────┘ <────────── └──────────────┘
//!                                  last remove()
//! ```
//!
//! `Unbuilt` means the index has never been populated from its table. `Empty`
//! means it has been built and currently has no entries. Maintenance on an
//! `Unbuilt` index is an `InternalInconsistency`: the row pipeline never sees
//! an index before `build` has run.
//!
//! ## Entry Layout
//!
//! ```text
//! PTree<KeyTuple, Postings>
//!   (5)  -> { seq 1 -> row 100 }
//!   (7)  -> { seq 2 -> row 300, seq 4 -> row 310 }   // duplicates allowed
//! ```
//!
//! Postings are keyed by a per-index insertion sequence, so rows sharing a key
//! are returned in the order they were inserted.
//!
//! ## Duplicates
//!
//! Primary-key and unique indexes reject a second row for an existing key,
//! unless the key has a null component or duplicates were explicitly allowed
//! with [`Index::allow_duplicates`]. Foreign-key and plain indexes always
//! allow duplicates.
//!
//! ## Foreign Keys
//!
//! A foreign-key index names the index it references and that index's table.
//! [`Index::check_ref`] validates a key tuple against the referenced index as
//! it exists in the snapshot at the time of the check.

pub mod key;

pub use key::{
    has_null_component, ConstraintKind, Domain, KeyTuple, MutationKind, ReferentialAction,
    ReferentialActions,
};

use crate::config::{PRIMARY_UNIQUE_CONSTRAINT, REFERENCES_CONSTRAINT};
use crate::error::IntegrityError;
use crate::mvcc::{RowVersion, TransactionContext};
use crate::schema::{Names, Naming};
use crate::snapshot::Snapshot;
use crate::tree::PTree;
use crate::types::{ColumnId, IndexId, RowId, TableId, Value};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

pub type Postings = PTree<u64, RowId>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum IndexRows {
    #[default]
    Unbuilt,
    Empty,
    Rows(PTree<KeyTuple, Postings>),
}

impl IndexRows {
    fn tree(&self) -> Option<&PTree<KeyTuple, Postings>> {
        match self {
            IndexRows::Rows(t) => Some(t),
            _ => None,
        }
    }

    fn from_tree(tree: PTree<KeyTuple, Postings>) -> Self {
        if tree.is_empty() {
            IndexRows::Empty
        } else {
            IndexRows::Rows(tree)
        }
    }
}

/// Target of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReference {
    pub index: IndexId,
    pub table: TableId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    id: IndexId,
    name: String,
    table: TableId,
    keys: Domain,
    kind: ConstraintKind,
    actions: ReferentialActions,
    references: Option<IndexReference>,
    allow_duplicates: bool,
    allow_unresolved: bool,
    rows: IndexRows,
    entries: usize,
    next_seq: u64,
}

impl Index {
    pub fn new(id: IndexId, table: TableId, keys: Domain, kind: ConstraintKind) -> Self {
        Self {
            id,
            name: String::new(),
            table,
            keys,
            kind,
            actions: ReferentialActions::default(),
            references: None,
            allow_duplicates: false,
            allow_unresolved: false,
            rows: IndexRows::Unbuilt,
            entries: 0,
            next_seq: 1,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn references(mut self, index: IndexId, table: TableId) -> Self {
        self.references = Some(IndexReference { index, table });
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.actions.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.actions.on_update = action;
        self
    }

    pub fn allow_duplicates(mut self) -> Self {
        self.allow_duplicates = true;
        self
    }

    pub fn allow_unresolved(mut self) -> Self {
        self.allow_unresolved = true;
        self
    }

    pub fn id(&self) -> IndexId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn keys(&self) -> &Domain {
        &self.keys
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn actions(&self) -> ReferentialActions {
        self.actions
    }

    pub fn reference(&self) -> Option<IndexReference> {
        self.references
    }

    pub fn permits_unresolved(&self) -> bool {
        self.allow_unresolved
    }

    pub fn duplicates_allowed(&self) -> bool {
        self.allow_duplicates || !self.kind.is_unique()
    }

    pub fn is_built(&self) -> bool {
        !matches!(self.rows, IndexRows::Unbuilt)
    }

    pub fn state(&self) -> &IndexRows {
        &self.rows
    }

    /// Number of distinct key tuples.
    pub fn key_count(&self) -> usize {
        self.rows.tree().map_or(0, PTree::len)
    }

    /// Number of (key, row) entries.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    pub fn contains(&self, key: &[Value]) -> bool {
        self.rows.tree().is_some_and(|t| t.contains_key(key))
    }

    /// Rows carrying `key`, in insertion order.
    pub fn rows_for(&self, key: &[Value]) -> Vec<RowId> {
        self.rows
            .tree()
            .and_then(|t| t.get(key))
            .map(|p| p.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn first_row(&self, key: &[Value]) -> Option<RowId> {
        self.rows
            .tree()
            .and_then(|t| t.get(key))
            .and_then(|p| p.first().map(|(_, r)| *r))
    }

    /// Ascending iteration over `(key, row)` entries.
    pub fn entries(&self) -> impl Iterator<Item = (&KeyTuple, RowId)> {
        self.rows
            .tree()
            .into_iter()
            .flat_map(|t| t.iter())
            .flat_map(|(k, p)| p.values().map(move |r| (k, *r)))
    }

    /// Entries starting at the first key >= `key`.
    pub fn position_at<'a>(&'a self, key: &[Value]) -> impl Iterator<Item = (&'a KeyTuple, RowId)> {
        self.rows
            .tree()
            .map(|t| t.range_from(key))
            .into_iter()
            .flatten()
            .flat_map(|(k, p)| p.values().map(move |r| (k, *r)))
    }

    /// Entries whose key starts with `prefix`.
    pub fn scan_prefix<'a>(
        &'a self,
        prefix: &'a [Value],
    ) -> impl Iterator<Item = (&'a KeyTuple, RowId)> + 'a {
        self.position_at(prefix)
            .take_while(move |(k, _)| k.starts_with(prefix))
    }

    /// Projects a row onto the key columns; `None` if any key column is unset.
    pub fn make_key(&self, row: &RowVersion) -> Option<KeyTuple> {
        self.make_key_from(row.values())
    }

    pub fn make_key_from(&self, values: &PTree<ColumnId, Value>) -> Option<KeyTuple> {
        self.keys
            .columns()
            .iter()
            .map(|c| values.get(c).filter(|v| !v.is_null()).cloned())
            .collect()
    }

    /// Like [`Index::make_key`], with each key column first renamed through
    /// `map` (key column -> column of `values`).
    pub fn make_key_mapped(
        &self,
        values: &PTree<ColumnId, Value>,
        map: &PTree<ColumnId, ColumnId>,
    ) -> Option<KeyTuple> {
        self.keys
            .columns()
            .iter()
            .map(|c| {
                let source = map.get(c)?;
                values.get(source).filter(|v| !v.is_null()).cloned()
            })
            .collect()
    }

    pub fn insert(&self, key: KeyTuple, row: RowId, names: &dyn Naming) -> Result<Index> {
        let tree = match &self.rows {
            IndexRows::Unbuilt => {
                return Err(IntegrityError::internal(format!(
                    "insert into unbuilt index {}",
                    self.display_name(names)
                ))
                .into())
            }
            IndexRows::Empty => PTree::new(),
            IndexRows::Rows(t) => t.clone(),
        };
        let existing = tree.get(key.as_slice());
        if existing.is_some_and(|p| !p.is_empty())
            && !self.duplicates_allowed()
            && !has_null_component(&key)
        {
            return Err(IntegrityError::UniqueViolation {
                constraint_name: PRIMARY_UNIQUE_CONSTRAINT.to_string(),
                table_name: names.name_of(self.table),
            }
            .into());
        }
        trace!(index = self.id, row, "index insert");
        let seq = self.next_seq;
        let postings = existing.cloned().unwrap_or_default().insert(seq, row);
        Ok(Index {
            rows: IndexRows::Rows(tree.insert(key, postings)),
            entries: self.entries + 1,
            next_seq: seq + 1,
            ..self.clone()
        })
    }

    /// Removes every entry for `key`.
    pub fn remove(&self, key: &[Value]) -> Result<Index> {
        let tree = self.tree_for_maintenance()?;
        let Some(postings) = tree.get(key) else {
            return Ok(self.clone());
        };
        trace!(index = self.id, "index remove key");
        Ok(Index {
            entries: self.entries - postings.len(),
            rows: IndexRows::from_tree(tree.remove(key)),
            ..self.clone()
        })
    }

    /// Removes the single entry `(key, row)`.
    pub fn remove_row(&self, key: &[Value], row: RowId) -> Result<Index> {
        let tree = self.tree_for_maintenance()?;
        let Some(postings) = tree.get(key) else {
            return Ok(self.clone());
        };
        let Some(seq) = postings.iter().find(|(_, r)| **r == row).map(|(s, _)| *s) else {
            return Ok(self.clone());
        };
        trace!(index = self.id, row, "index remove row");
        let postings = postings.remove(&seq);
        let tree = if postings.is_empty() {
            tree.remove(key)
        } else {
            tree.insert(key.iter().cloned().collect(), postings)
        };
        Ok(Index {
            entries: self.entries - 1,
            rows: IndexRows::from_tree(tree),
            ..self.clone()
        })
    }

    fn tree_for_maintenance(&self) -> Result<PTree<KeyTuple, Postings>> {
        match &self.rows {
            IndexRows::Unbuilt => Err(IntegrityError::internal(format!(
                "index {} has no tree",
                self.id
            ))
            .into()),
            IndexRows::Empty => Ok(PTree::new()),
            IndexRows::Rows(t) => Ok(t.clone()),
        }
    }

    /// Populates the index from every current row of its table.
    ///
    /// When the table already has a built primary index, rows are visited in
    /// primary-key order.
    pub fn build(&self, snapshot: &Snapshot, cx: &TransactionContext) -> Result<Index> {
        let table = snapshot.table(self.table)?;
        let names = Names::new(snapshot, cx);
        let mut ix = Index {
            rows: IndexRows::Empty,
            entries: 0,
            next_seq: 1,
            ..self.clone()
        };

        let primary = table
            .primary_index()
            .filter(|p| *p != self.id)
            .and_then(|p| snapshot.index(p).ok())
            .filter(|p| p.is_built());

        let row_ids: Vec<RowId> = match primary {
            Some(pk) => pk.entries().map(|(_, r)| r).collect(),
            None => table.rows().keys().copied().collect(),
        };
        for rid in row_ids {
            let row = table.row(rid).ok_or_else(|| {
                IntegrityError::internal(format!(
                    "primary index of {} names missing row {}",
                    table.name(),
                    rid
                ))
            })?;
            if let Some(key) = ix.make_key(row) {
                ix.check_ref(snapshot, cx, &key)?;
                ix = ix.insert(key, rid, &names)?;
            }
        }
        debug!(
            index = self.id,
            table = table.name(),
            entries = ix.entries,
            "built index"
        );
        Ok(ix)
    }

    /// Validates a foreign-key tuple against the referenced index.
    pub fn check_ref(
        &self,
        snapshot: &Snapshot,
        cx: &TransactionContext,
        key: &[Value],
    ) -> Result<()> {
        if self.kind != ConstraintKind::ForeignKey
            || !cx.checks_references()
            || self.allow_unresolved
            || has_null_component(key)
        {
            return Ok(());
        }
        let reference = self.references.ok_or_else(|| {
            IntegrityError::internal(format!("foreign key {} has no referenced index", self.id))
        })?;
        let target = snapshot.index(reference.index)?;
        if target.allow_unresolved || target.contains(key) {
            return Ok(());
        }
        Err(IntegrityError::ReferentialViolation {
            constraint_name: REFERENCES_CONSTRAINT.to_string(),
            table_name: Names::new(snapshot, cx).name_of(reference.table),
        }
        .into())
    }

    fn display_name(&self, names: &dyn Naming) -> String {
        if self.name.is_empty() {
            names.name_of(self.id)
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ON {}{}", self.kind, self.name, self.table, self.keys)?;
        if let Some(r) = self.references {
            write!(
                f,
                " REFERENCES {}[{}] ON DELETE {} ON UPDATE {}",
                r.table, r.index, self.actions.on_delete, self.actions.on_update
            )?;
        }
        match &self.rows {
            IndexRows::Unbuilt => write!(f, " (unbuilt)"),
            _ => write!(f, " ({} entries)", self.entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViolationKind;
    use smallvec::smallvec;

    struct NoNames;

    impl Naming for NoNames {
        fn lookup_name(&self, _id: u64) -> Option<String> {
            None
        }
    }

    fn key(v: i64) -> KeyTuple {
        smallvec![Value::Int(v)]
    }

    fn built(kind: ConstraintKind) -> Index {
        Index {
            rows: IndexRows::Empty,
            ..Index::new(10, 1, Domain::new([2]), kind).with_name("PK_Orders")
        }
    }

    #[test]
    fn duplicate_key_in_unique_index_fails() {
        let ix = built(ConstraintKind::PrimaryKey)
            .insert(key(5), 100, &NoNames)
            .unwrap();
        let err = ix.insert(key(5), 200, &NoNames).unwrap_err();
        let err = err.downcast_ref::<IntegrityError>().unwrap();
        assert_eq!(err.kind(), ViolationKind::Unique);
        assert_eq!(err.table_name(), Some("??"));
        assert_eq!(ix.rows_for(&key(5)), vec![100]);
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        let ix = built(ConstraintKind::ForeignKey)
            .insert(key(5), 30, &NoNames)
            .and_then(|ix| ix.insert(key(5), 10, &NoNames))
            .and_then(|ix| ix.insert(key(5), 20, &NoNames))
            .unwrap();
        assert_eq!(ix.rows_for(&key(5)), vec![30, 10, 20]);
        assert_eq!(ix.entry_count(), 3);
        assert_eq!(ix.key_count(), 1);
    }

    #[test]
    fn null_component_bypasses_uniqueness() {
        let k: KeyTuple = smallvec![Value::Null];
        let ix = built(ConstraintKind::Unique)
            .insert(k.clone(), 1, &NoNames)
            .and_then(|ix| ix.insert(k.clone(), 2, &NoNames))
            .unwrap();
        assert_eq!(ix.rows_for(&k).len(), 2);
    }

    #[test]
    fn removing_last_entry_collapses_to_empty() {
        let ix = built(ConstraintKind::Unique)
            .insert(key(1), 1, &NoNames)
            .unwrap();
        let ix = ix.remove(&key(1)).unwrap();
        assert_eq!(ix.state(), &IndexRows::Empty);
        assert!(ix.is_built());
        assert_eq!(ix.entry_count(), 0);
    }

    #[test]
    fn remove_row_keeps_other_postings() {
        let ix = built(ConstraintKind::ForeignKey)
            .insert(key(5), 1, &NoNames)
            .and_then(|ix| ix.insert(key(5), 2, &NoNames))
            .unwrap();
        let ix = ix.remove_row(&key(5), 1).unwrap();
        assert_eq!(ix.rows_for(&key(5)), vec![2]);
        let ix = ix.remove_row(&key(5), 2).unwrap();
        assert!(!ix.contains(&key(5)));
        assert_eq!(ix.state(), &IndexRows::Empty);
    }

    #[test]
    fn maintenance_on_unbuilt_index_is_internal() {
        let ix = Index::new(10, 1, Domain::new([2]), ConstraintKind::Unique);
        let err = ix.insert(key(1), 1, &NoNames).unwrap_err();
        assert!(err
            .downcast_ref::<IntegrityError>()
            .unwrap()
            .is_engine_defect());
        assert!(ix.remove(&key(1)).is_err());
    }

    #[test]
    fn make_key_requires_every_column() {
        let ix = Index::new(10, 1, Domain::new([2, 3]), ConstraintKind::Unique);
        let full: PTree<ColumnId, Value> = [(2, Value::Int(1)), (3, Value::text("a"))]
            .into_iter()
            .collect();
        let partial: PTree<ColumnId, Value> = [(2, Value::Int(1))].into_iter().collect();
        assert_eq!(
            ix.make_key_from(&full),
            Some(smallvec![Value::Int(1), Value::text("a")])
        );
        assert_eq!(ix.make_key_from(&partial), None);
    }

    #[test]
    fn make_key_mapped_renames_columns() {
        let ix = Index::new(10, 1, Domain::new([2]), ConstraintKind::Unique);
        let values: PTree<ColumnId, Value> = [(42, Value::Int(9))].into_iter().collect();
        let map: PTree<ColumnId, ColumnId> = [(2, 42)].into_iter().collect();
        assert_eq!(ix.make_key_mapped(&values, &map), Some(key(9)));
        assert_eq!(ix.make_key_mapped(&values, &PTree::new()), None);
    }

    #[test]
    fn prefix_scan_stops_at_prefix_boundary() {
        let mut ix = Index {
            rows: IndexRows::Empty,
            ..Index::new(10, 1, Domain::new([2, 3]), ConstraintKind::None)
        };
        for (a, b, r) in [(1, 1, 10), (1, 2, 11), (2, 1, 12), (0, 9, 13)] {
            ix = ix
                .insert(smallvec![Value::Int(a), Value::Int(b)], r, &NoNames)
                .unwrap();
        }
        let prefix = [Value::Int(1)];
        let rows: Vec<RowId> = ix.scan_prefix(&prefix).map(|(_, r)| r).collect();
        assert_eq!(rows, vec![10, 11]);
        let from: Vec<RowId> = ix.position_at(&prefix).map(|(_, r)| r).collect();
        assert_eq!(from, vec![10, 11, 12]);
    }

    #[test]
    fn display_describes_foreign_key() {
        let ix = Index::new(11, 3, Domain::new([4]), ConstraintKind::ForeignKey)
            .with_name("FK_Items_Order")
            .references(10, 1)
            .on_delete(ReferentialAction::Cascade);
        assert_eq!(
            ix.to_string(),
            "FOREIGN KEY FK_Items_Order ON 3(4) REFERENCES 1[10] ON DELETE CASCADE ON UPDATE RESTRICT (unbuilt)"
        );
    }
}
