//! # Table Definition Module
//!
//! This module provides the table and column objects held by a snapshot.
//! Unlike a catalog-only definition, a `Table` value also carries its row
//! store: the mapping from row identifier to the row's current version.
//!
//! ## Overview
//!
//! - **Columns**: ordered, identified by `ColumnId`, with not-null flag,
//!   optional default and column-level checks
//! - **Rows**: `PTree<RowId, Arc<RowVersion>>`, current version per row
//! - **Indexes I own**: primary/unique/foreign-key/plain indexes built over
//!   this table's rows
//! - **Indexes that reference me**: other tables' foreign keys pointing at one
//!   of my primary/unique indexes
//! - **Checks**: table-level check constraints
//!
//! ## Column Definition Example
//!
//! ```rust,ignore
//! let columns = vec![
//!     ColumnDef::new("OrderId").not_null(),
//!     ColumnDef::new("Status").with_default(Value::text("open")),
//!     ColumnDef::new("Amount").not_null(),
//! ];
//! let (snap, orders) = writer.create_table(&snap, "Orders", columns)?;
//! ```
//!
//! ## Immutability
//!
//! Every `with_*`/`without_*` method returns a new `Table`; the row store and
//! index sets are persistent trees, so the copy shares everything it did not
//! change. Tables are published into a snapshot as `Arc<Table>`.

use crate::mvcc::RowVersion;
use crate::tree::PTree;
use crate::types::{CheckId, ColumnId, ExprId, IndexId, RowId, TableId, Value};
use eyre::Result;
use std::sync::Arc;

/// Default applied to a column when an insert leaves it unset.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Literal(Value),
    /// Evaluated by the expression evaluator against an empty binding.
    Expr(ExprId),
}

/// Column definition used when creating tables or adding columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    name: String,
    not_null: bool,
    default: Option<ColumnDefault>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            not_null: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(ColumnDefault::Literal(value));
        self
    }

    pub fn with_default_expr(mut self, expr: ExprId) -> Self {
        self.default = Some(ColumnDefault::Expr(expr));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_column(self, id: ColumnId, table: TableId) -> Column {
        Column {
            id,
            table,
            name: self.name,
            not_null: self.not_null,
            default: self.default,
            checks: PTree::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    id: ColumnId,
    table: TableId,
    name: String,
    not_null: bool,
    default: Option<ColumnDefault>,
    checks: PTree<CheckId, ()>,
}

impl Column {
    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn is_nullable(&self) -> bool {
        !self.not_null
    }

    pub fn default_value(&self) -> Option<&ColumnDefault> {
        self.default.as_ref()
    }

    pub fn checks(&self) -> impl Iterator<Item = CheckId> + '_ {
        self.checks.keys().copied()
    }

    pub(crate) fn with_not_null(&self, not_null: bool) -> Self {
        Self {
            not_null,
            ..self.clone()
        }
    }

    pub(crate) fn with_check(&self, check: CheckId) -> Self {
        Self {
            checks: self.checks.insert(check, ()),
            ..self.clone()
        }
    }

    pub(crate) fn without_check(&self, check: CheckId) -> Self {
        Self {
            checks: self.checks.remove(&check),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    id: TableId,
    name: String,
    columns: Arc<[Column]>,
    rows: PTree<RowId, Arc<RowVersion>>,
    indexes: PTree<IndexId, ()>,
    referenced_by: PTree<IndexId, ()>,
    checks: PTree<CheckId, ()>,
    primary_index: Option<IndexId>,
}

impl Table {
    pub fn new(id: TableId, name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            id,
            name: name.into(),
            columns: columns.into(),
            rows: PTree::new(),
            indexes: PTree::new(),
            referenced_by: PTree::new(),
            checks: PTree::new(),
            primary_index: None,
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_id(&self, name: &str) -> Result<ColumnId> {
        self.column_by_name(name)
            .map(Column::id)
            .ok_or_else(|| eyre::eyre!("column '{}' not found in table '{}'", name, self.name))
    }

    /// Resolves `(column name, value)` pairs into a column mapping.
    pub fn bind<'v, I>(&self, pairs: I) -> Result<PTree<ColumnId, Value>>
    where
        I: IntoIterator<Item = (&'v str, Value)>,
    {
        let mut values = PTree::new();
        for (name, value) in pairs {
            values = values.insert(self.column_id(name)?, value);
        }
        Ok(values)
    }

    pub fn rows(&self) -> &PTree<RowId, Arc<RowVersion>> {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Arc<RowVersion>> {
        self.rows.get(&id)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn indexes(&self) -> impl Iterator<Item = IndexId> + '_ {
        self.indexes.keys().copied()
    }

    pub fn referenced_by(&self) -> impl Iterator<Item = IndexId> + '_ {
        self.referenced_by.keys().copied()
    }

    pub fn checks(&self) -> impl Iterator<Item = CheckId> + '_ {
        self.checks.keys().copied()
    }

    pub fn primary_index(&self) -> Option<IndexId> {
        self.primary_index
    }

    pub(crate) fn with_row(&self, row: Arc<RowVersion>) -> Self {
        Self {
            rows: self.rows.insert(row.row_id(), row),
            ..self.clone()
        }
    }

    pub(crate) fn without_row(&self, id: RowId) -> Self {
        Self {
            rows: self.rows.remove(&id),
            ..self.clone()
        }
    }

    pub(crate) fn with_column(&self, column: Column) -> Self {
        let mut columns: Vec<Column> = self
            .columns
            .iter()
            .filter(|c| c.id != column.id)
            .cloned()
            .collect();
        match self.columns.iter().position(|c| c.id == column.id) {
            Some(pos) => columns.insert(pos, column),
            None => columns.push(column),
        }
        Self {
            columns: columns.into(),
            ..self.clone()
        }
    }

    pub(crate) fn without_column(&self, column: ColumnId) -> Self {
        let columns: Vec<Column> = self
            .columns
            .iter()
            .filter(|c| c.id != column)
            .cloned()
            .collect();
        Self {
            columns: columns.into(),
            ..self.clone()
        }
    }

    pub(crate) fn with_index(&self, index: IndexId, primary: bool) -> Self {
        Self {
            indexes: self.indexes.insert(index, ()),
            primary_index: if primary {
                Some(index)
            } else {
                self.primary_index
            },
            ..self.clone()
        }
    }

    pub(crate) fn without_index(&self, index: IndexId) -> Self {
        Self {
            indexes: self.indexes.remove(&index),
            primary_index: self.primary_index.filter(|p| *p != index),
            ..self.clone()
        }
    }

    pub(crate) fn with_referencing_index(&self, index: IndexId) -> Self {
        Self {
            referenced_by: self.referenced_by.insert(index, ()),
            ..self.clone()
        }
    }

    pub(crate) fn without_referencing_index(&self, index: IndexId) -> Self {
        Self {
            referenced_by: self.referenced_by.remove(&index),
            ..self.clone()
        }
    }

    pub(crate) fn with_check(&self, check: CheckId) -> Self {
        Self {
            checks: self.checks.insert(check, ()),
            ..self.clone()
        }
    }

    pub(crate) fn without_check(&self, check: CheckId) -> Self {
        Self {
            checks: self.checks.remove(&check),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Level;

    fn orders() -> Table {
        Table::new(
            1,
            "Orders",
            vec![
                ColumnDef::new("OrderId").not_null().into_column(2, 1),
                ColumnDef::new("Note")
                    .with_default(Value::text("none"))
                    .into_column(3, 1),
            ],
        )
    }

    #[test]
    fn column_lookup_by_name_and_id() {
        let t = orders();
        assert_eq!(t.column_id("OrderId").unwrap(), 2);
        assert!(t.column(3).unwrap().is_nullable());
        assert!(t.column(2).unwrap().is_not_null());
        assert!(t.column_id("Missing").is_err());
    }

    #[test]
    fn bind_resolves_names() {
        let t = orders();
        let values = t
            .bind([("OrderId", Value::Int(5)), ("Note", Value::text("x"))])
            .unwrap();
        assert_eq!(values.get(&2), Some(&Value::Int(5)));
        assert_eq!(values.get(&3), Some(&Value::text("x")));
    }

    #[test]
    fn with_row_leaves_original_untouched() {
        let t = orders();
        let row = RowVersion::apply_insert(1, 100, 1, Level::D, "test", PTree::new());
        let t2 = t.with_row(Arc::new(row));
        assert_eq!(t.row_count(), 0);
        assert_eq!(t2.row_count(), 1);
        assert_eq!(t2.without_row(100).row_count(), 0);
    }

    #[test]
    fn with_column_replaces_in_place() {
        let t = orders();
        let relaxed = t.column(2).unwrap().with_not_null(false);
        let t2 = t.with_column(relaxed);
        assert_eq!(t2.columns()[0].id(), 2);
        assert!(t2.column(2).unwrap().is_nullable());
        assert!(t.column(2).unwrap().is_not_null());
    }

    #[test]
    fn primary_index_cleared_when_dropped() {
        let t = orders().with_index(10, true).with_index(11, false);
        assert_eq!(t.primary_index(), Some(10));
        let t2 = t.without_index(10);
        assert_eq!(t2.primary_index(), None);
        assert_eq!(t2.indexes().collect::<Vec<_>>(), vec![11]);
    }
}
