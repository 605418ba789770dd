//! # Row Mutation Pipeline
//!
//! Insert, update and delete for a single row. Each call is atomic: either the
//! returned snapshot contains the row change together with every index and
//! cascade effect it implies, or an error is returned and nothing changed.

use super::rows::{link_row, relink_row, unlink_row};
use super::Writer;
use crate::mvcc::RowVersion;
use crate::schema::Table;
use crate::snapshot::Snapshot;
use crate::tree::PTree;
use crate::types::{ColumnId, Level, RowId, TableId, Value};
use eyre::{bail, Result};
use std::sync::Arc;
use tracing::debug;

fn ensure_columns(table: &Table, values: &PTree<ColumnId, Value>) -> Result<()> {
    for column in values.keys() {
        if table.column(*column).is_none() {
            bail!("column {} does not belong to table '{}'", column, table.name());
        }
    }
    Ok(())
}

impl Writer<'_> {
    /// Inserts a new row; unset columns take their defaults.
    pub fn insert_row(
        &self,
        snapshot: &Snapshot,
        table: TableId,
        values: PTree<ColumnId, Value>,
        classification: Option<Level>,
    ) -> Result<(Snapshot, RowId)> {
        let mut snap = snapshot.clone();
        let t = snap.table(table)?.clone();
        ensure_columns(&t, &values)?;

        let full = {
            let validator = self.validator(&snap, &t);
            let full = validator.apply_defaults(&values)?;
            validator.validate_row(&full)?;
            full
        };

        let row_id = snap.allocate_row_id();
        let position = snap.allocate_position();
        let row = RowVersion::apply_insert(
            table,
            row_id,
            position,
            classification.unwrap_or_default(),
            self.cx.provenance().clone(),
            full,
        );
        link_row(&mut snap, self.cx, Arc::new(row))?;
        debug!(table = t.name(), row = row_id, "inserted row");
        Ok((snap, row_id))
    }

    /// Applies `changes` to a row. `Value::Null` clears a column; a
    /// classification of `None` keeps the row's current level.
    pub fn update_row(
        &self,
        snapshot: &Snapshot,
        table: TableId,
        row: RowId,
        changes: &PTree<ColumnId, Value>,
        classification: Option<Level>,
    ) -> Result<Snapshot> {
        let t = snapshot.table(table)?;
        ensure_columns(t, changes)?;
        let old = snapshot.row(table, row)?;
        self.validator(snapshot, t)
            .validate_row(&old.merged_values(changes))?;

        let mut snap = self.cascade().on_update(snapshot, table, row, changes)?;
        let current = snap.row(table, row)?.clone();
        let position = snap.allocate_position();
        let next = current.apply_update(position, classification, self.cx.provenance().clone(), changes);
        relink_row(&mut snap, self.cx, &current, Arc::new(next), true)?;
        debug!(table = t.name(), row, "updated row");
        Ok(snap)
    }

    /// Deletes a row after resolving every foreign key that references it.
    pub fn delete_row(&self, snapshot: &Snapshot, table: TableId, row: RowId) -> Result<Snapshot> {
        snapshot.row(table, row)?;
        let mut snap = self.cascade().on_delete(snapshot, table, row)?;
        unlink_row(&mut snap, table, row)?;
        debug!(table, row, "deleted row");
        Ok(snap)
    }
}
