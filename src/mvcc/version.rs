//! # Row Versions
//!
//! A `RowVersion` is one immutable version of a table row. Inserting a row
//! creates its first version; every update creates a successor that links back
//! to its predecessor by log position. The table's row store always maps the
//! row id to the newest version, while the snapshot's history tree keeps every
//! version reachable by log position.
//!
//! ## Version Chain
//!
//! ```text
//!   Table.rows[row 7] ──> RowVersion { position: 42, prev: Some(17) }
//!                                                          │
//!   Snapshot.versions[17] ──> RowVersion { position: 17, prev: Some(3) }
//!                                                          │
//!   Snapshot.versions[3]  ──> RowVersion { position: 3, prev: None }
//! ```
//!
//! ## Sparse Values
//!
//! Row values are a `PTree<ColumnId, Value>` that never stores `Value::Null`:
//! a column that is absent from the mapping *is* null. An update that assigns
//! `Value::Null` to a column removes the column from the successor, so index
//! key construction and not-null checks only ever need `get`.
//!
//! ## Classification
//!
//! Each version carries a security `Level`. An update supplied without a level
//! keeps the level of the version it replaces.

use crate::tree::PTree;
use crate::types::{ColumnId, Level, LogPosition, RowId, TableId, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowVersion {
    row_id: RowId,
    table_id: TableId,
    classification: Level,
    position: LogPosition,
    provenance: Arc<str>,
    values: PTree<ColumnId, Value>,
    prev: Option<LogPosition>,
}

impl RowVersion {
    /// Creates the first version of a row. Null entries in `values` are dropped.
    pub fn apply_insert(
        table_id: TableId,
        row_id: RowId,
        position: LogPosition,
        classification: Level,
        provenance: impl Into<Arc<str>>,
        values: PTree<ColumnId, Value>,
    ) -> Self {
        Self {
            row_id,
            table_id,
            classification,
            position,
            provenance: provenance.into(),
            values: strip_nulls(values),
            prev: None,
        }
    }

    /// Creates the successor of `self` with `changes` merged over its values.
    ///
    /// Columns not mentioned in `changes` carry over unchanged; a change to
    /// `Value::Null` removes the column.
    pub fn apply_update(
        &self,
        position: LogPosition,
        classification: Option<Level>,
        provenance: impl Into<Arc<str>>,
        changes: &PTree<ColumnId, Value>,
    ) -> Self {
        Self {
            row_id: self.row_id,
            table_id: self.table_id,
            classification: classification.unwrap_or(self.classification),
            position,
            provenance: provenance.into(),
            values: self.merged_values(changes),
            prev: Some(self.position),
        }
    }

    /// The values this row would hold after `changes`, without creating a version.
    pub fn merged_values(&self, changes: &PTree<ColumnId, Value>) -> PTree<ColumnId, Value> {
        changes.iter().fold(self.values.clone(), |acc, (col, v)| {
            if v.is_null() {
                acc.remove(col)
            } else {
                acc.insert(*col, v.clone())
            }
        })
    }

    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn classification(&self) -> Level {
        self.classification
    }

    pub fn position(&self) -> LogPosition {
        self.position
    }

    pub fn provenance(&self) -> &str {
        &self.provenance
    }

    pub fn values(&self) -> &PTree<ColumnId, Value> {
        &self.values
    }

    pub fn prev(&self) -> Option<LogPosition> {
        self.prev
    }

    pub fn value(&self, column: ColumnId) -> Option<&Value> {
        self.values.get(&column)
    }

    pub fn has_value(&self, column: ColumnId) -> bool {
        self.values.contains_key(&column)
    }

    /// Copy of this version with one column set; the position is unchanged.
    pub fn with_value(&self, column: ColumnId, value: Value) -> Self {
        let values = if value.is_null() {
            self.values.remove(&column)
        } else {
            self.values.insert(column, value)
        };
        Self {
            values,
            ..self.clone()
        }
    }

    pub fn without_value(&self, column: ColumnId) -> Self {
        Self {
            values: self.values.remove(&column),
            ..self.clone()
        }
    }
}

fn strip_nulls(values: PTree<ColumnId, Value>) -> PTree<ColumnId, Value> {
    if values.values().any(Value::is_null) {
        values
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(ColumnId, Value)]) -> PTree<ColumnId, Value> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn insert_drops_nulls() {
        let row = RowVersion::apply_insert(
            1,
            10,
            5,
            Level::D,
            "alice",
            values(&[(2, Value::Int(1)), (3, Value::Null)]),
        );
        assert_eq!(row.value(2), Some(&Value::Int(1)));
        assert!(!row.has_value(3));
        assert_eq!(row.prev(), None);
        assert_eq!(row.provenance(), "alice");
    }

    #[test]
    fn update_merges_and_links_back() {
        let row = RowVersion::apply_insert(
            1,
            10,
            5,
            Level::C,
            "alice",
            values(&[(2, Value::Int(1)), (3, Value::text("a"))]),
        );
        let next = row.apply_update(9, None, "bob", &values(&[(3, Value::Null), (4, Value::Int(7))]));
        assert_eq!(next.row_id(), 10);
        assert_eq!(next.position(), 9);
        assert_eq!(next.prev(), Some(5));
        assert_eq!(next.classification(), Level::C);
        assert_eq!(next.value(2), Some(&Value::Int(1)));
        assert!(!next.has_value(3));
        assert_eq!(next.value(4), Some(&Value::Int(7)));
        assert!(row.has_value(3));
    }

    #[test]
    fn update_with_explicit_level_overrides() {
        let row = RowVersion::apply_insert(1, 10, 5, Level::C, "a", PTree::new());
        let next = row.apply_update(6, Some(Level::A), "a", &PTree::new());
        assert_eq!(next.classification(), Level::A);
    }

    #[test]
    fn with_value_null_removes_column() {
        let row = RowVersion::apply_insert(1, 10, 5, Level::D, "a", values(&[(2, Value::Int(1))]));
        assert!(!row.with_value(2, Value::Null).has_value(2));
        assert!(!row.without_value(2).has_value(2));
        assert_eq!(row.with_value(3, Value::Int(4)).value(3), Some(&Value::Int(4)));
    }
}
