//! # Snapshots
//!
//! A `Snapshot` is the whole database state as one immutable value: a
//! persistent map from object id to catalog object, the history of every row
//! version ever written, and the id allocators. Cloning a snapshot is O(1);
//! deriving a new one copies only the paths that change.
//!
//! ## Layout
//!
//! ```text
//! Snapshot
//! ├── objects:  PTree<ObjectId, DbObject>
//! │     1 -> Table("Orders")       (rows live inside the table)
//! │     2 -> Column(table 1)
//! │     4 -> Index("PK_Orders")
//! │     9 -> Check("positive")
//! ├── versions: PTree<LogPosition, Arc<RowVersion>>
//! └── next_object / next_row / next_position
//! ```
//!
//! ## Mutation Discipline
//!
//! The crate's public operations take `&Snapshot` and return a new
//! `Snapshot`. Internally they clone the input into a working value and use
//! the `pub(crate)` `put_*` / `allocate_*` methods on that clone; whatever the
//! caller still holds is never affected, and a failed operation simply drops
//! its working value.

use crate::config::{FIRST_LOG_POSITION, FIRST_OBJECT_ID, FIRST_ROW_ID};
use crate::constraints::Check;
use crate::index::Index;
use crate::mvcc::RowVersion;
use crate::schema::Table;
use crate::tree::PTree;
use crate::types::{CheckId, IndexId, LogPosition, ObjectId, RowId, TableId};
use eyre::{eyre, Result};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum DbObject {
    Table(Arc<Table>),
    /// A column; the column itself lives inside its table.
    Column(TableId),
    Index(Arc<Index>),
    Check(Arc<Check>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    objects: PTree<ObjectId, DbObject>,
    versions: PTree<LogPosition, Arc<RowVersion>>,
    next_object: ObjectId,
    next_row: RowId,
    next_position: LogPosition,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self {
            objects: PTree::new(),
            versions: PTree::new(),
            next_object: FIRST_OBJECT_ID,
            next_row: FIRST_ROW_ID,
            next_position: FIRST_LOG_POSITION,
        }
    }

    pub fn object(&self, id: ObjectId) -> Option<&DbObject> {
        self.objects.get(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn table(&self, id: TableId) -> Result<&Arc<Table>> {
        match self.objects.get(&id) {
            Some(DbObject::Table(t)) => Ok(t),
            _ => Err(eyre!("table {} not found in snapshot", id)),
        }
    }

    pub fn index(&self, id: IndexId) -> Result<&Arc<Index>> {
        match self.objects.get(&id) {
            Some(DbObject::Index(ix)) => Ok(ix),
            _ => Err(eyre!("index {} not found in snapshot", id)),
        }
    }

    pub fn check(&self, id: CheckId) -> Result<&Arc<Check>> {
        match self.objects.get(&id) {
            Some(DbObject::Check(c)) => Ok(c),
            _ => Err(eyre!("check {} not found in snapshot", id)),
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.objects.values().filter_map(|o| match o {
            DbObject::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn table_by_name(&self, name: &str) -> Result<&Arc<Table>> {
        self.tables()
            .find(|t| t.name() == name)
            .ok_or_else(|| eyre!("table '{}' not found", name))
    }

    pub fn index_by_name(&self, name: &str) -> Result<&Arc<Index>> {
        self.objects
            .values()
            .find_map(|o| match o {
                DbObject::Index(ix) if ix.name() == name => Some(ix),
                _ => None,
            })
            .ok_or_else(|| eyre!("index '{}' not found", name))
    }

    pub fn row(&self, table: TableId, row: RowId) -> Result<&Arc<RowVersion>> {
        let t = self.table(table)?;
        t.row(row)
            .ok_or_else(|| eyre!("row {} not found in table '{}'", row, t.name()))
    }

    /// Catalog name of any object; `None` for unknown ids and unnamed indexes.
    pub fn object_name(&self, id: ObjectId) -> Option<&str> {
        match self.objects.get(&id)? {
            DbObject::Table(t) => Some(t.name()),
            DbObject::Column(table) => self.table(*table).ok()?.column(id).map(|c| c.name()),
            DbObject::Index(ix) => Some(ix.name()).filter(|n| !n.is_empty()),
            DbObject::Check(c) => Some(c.name()),
        }
    }

    pub fn version(&self, position: LogPosition) -> Option<&Arc<RowVersion>> {
        self.versions.get(&position)
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn previous_version(&self, version: &RowVersion) -> Option<&Arc<RowVersion>> {
        version.prev().and_then(|p| self.versions.get(&p))
    }

    /// Version chain starting at `position`, newest first.
    pub fn history_from(&self, position: LogPosition) -> impl Iterator<Item = &Arc<RowVersion>> {
        std::iter::successors(self.versions.get(&position), move |v| {
            self.previous_version(v)
        })
    }

    /// Every version of a live row, newest first.
    pub fn history(&self, table: TableId, row: RowId) -> Result<Vec<Arc<RowVersion>>> {
        let current = self.row(table, row)?;
        Ok(self.history_from(current.position()).cloned().collect())
    }

    pub(crate) fn allocate_object_id(&mut self) -> ObjectId {
        let id = self.next_object;
        self.next_object += 1;
        id
    }

    pub(crate) fn allocate_row_id(&mut self) -> RowId {
        let id = self.next_row;
        self.next_row += 1;
        id
    }

    pub(crate) fn allocate_position(&mut self) -> LogPosition {
        let p = self.next_position;
        self.next_position += 1;
        p
    }

    pub(crate) fn put_table(&mut self, table: Table) {
        self.objects = self
            .objects
            .insert(table.id(), DbObject::Table(Arc::new(table)));
    }

    pub(crate) fn put_column(&mut self, column: ObjectId, table: TableId) {
        self.objects = self.objects.insert(column, DbObject::Column(table));
    }

    pub(crate) fn put_index(&mut self, index: Index) {
        self.objects = self
            .objects
            .insert(index.id(), DbObject::Index(Arc::new(index)));
    }

    pub(crate) fn put_check(&mut self, check: Check) {
        self.objects = self
            .objects
            .insert(check.id(), DbObject::Check(Arc::new(check)));
    }

    pub(crate) fn remove_object(&mut self, id: ObjectId) {
        self.objects = self.objects.remove(&id);
    }

    pub(crate) fn record_version(&mut self, version: Arc<RowVersion>) {
        self.versions = self.versions.insert(version.position(), version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDef;
    use crate::types::{Level, Value};

    fn with_orders() -> Snapshot {
        let mut snap = Snapshot::new();
        let table_id = snap.allocate_object_id();
        let col = snap.allocate_object_id();
        let table = Table::new(
            table_id,
            "Orders",
            vec![ColumnDef::new("OrderId").into_column(col, table_id)],
        );
        snap.put_table(table);
        snap.put_column(col, table_id);
        snap
    }

    #[test]
    fn clone_is_independent() {
        let base = with_orders();
        let mut next = base.clone();
        next.remove_object(1);
        assert!(base.table(1).is_ok());
        assert!(next.table(1).is_err());
        assert_ne!(base, next);
    }

    #[test]
    fn names_resolve_for_tables_and_columns() {
        let snap = with_orders();
        assert_eq!(snap.object_name(1), Some("Orders"));
        assert_eq!(snap.object_name(2), Some("OrderId"));
        assert_eq!(snap.object_name(99), None);
    }

    #[test]
    fn history_follows_back_links() {
        let mut snap = with_orders();
        let p1 = snap.allocate_position();
        let v1 = RowVersion::apply_insert(
            1,
            snap.allocate_row_id(),
            p1,
            Level::D,
            "t",
            [(2, Value::Int(1))].into_iter().collect(),
        );
        let p2 = snap.allocate_position();
        let v2 = v1.apply_update(p2, None, "t", &[(2, Value::Int(2))].into_iter().collect());
        snap.record_version(Arc::new(v1.clone()));
        snap.record_version(Arc::new(v2.clone()));
        let table = snap.table(1).unwrap().with_row(Arc::new(v2.clone()));
        snap.put_table(table);

        let chain = snap.history(1, v2.row_id()).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].position(), p2);
        assert_eq!(chain[1].values(), v1.values());
        assert_eq!(snap.previous_version(&v2).unwrap().position(), p1);
    }
}
