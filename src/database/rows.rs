//! Row/index maintenance shared by the write pipeline and the cascade engine.
//!
//! Each function applies one row-level change to a working snapshot: the
//! table's row store, every index the table owns, and the version history.
//! Indexes are maintained in two passes, non-foreign-key indexes first, so a
//! self-referencing row finds its own primary key when its foreign key is
//! validated.

use crate::error::IntegrityError;
use crate::index::{ConstraintKind, Index};
use crate::mvcc::{RowVersion, TransactionContext};
use crate::schema::Names;
use crate::snapshot::Snapshot;
use crate::types::{RowId, TableId};
use eyre::Result;
use std::sync::Arc;
use tracing::trace;

fn maintenance_order(snap: &Snapshot, table: TableId) -> Result<Vec<Arc<Index>>> {
    let t = snap.table(table)?;
    let mut indexes = t
        .indexes()
        .map(|id| snap.index(id).cloned())
        .collect::<Result<Vec<_>>>()?;
    indexes.sort_by_key(|ix| ix.kind() == ConstraintKind::ForeignKey);
    Ok(indexes)
}

/// Adds a new row to its table and to every index of the table.
pub(crate) fn link_row(
    snap: &mut Snapshot,
    cx: &TransactionContext,
    row: Arc<RowVersion>,
) -> Result<()> {
    for ix in maintenance_order(snap, row.table_id())? {
        if let Some(key) = ix.make_key(&row) {
            ix.check_ref(snap, cx, &key)?;
            let next = ix.insert(key, row.row_id(), &Names::new(snap, cx))?;
            snap.put_index(next);
        }
    }
    let table = snap.table(row.table_id())?.with_row(row.clone());
    snap.put_table(table);
    snap.record_version(row);
    Ok(())
}

/// Replaces the current version of a row, re-keying every index whose key
/// changed. Foreign-key keys are validated only when `check_refs` is set.
pub(crate) fn relink_row(
    snap: &mut Snapshot,
    cx: &TransactionContext,
    old: &RowVersion,
    new: Arc<RowVersion>,
    check_refs: bool,
) -> Result<()> {
    let row_id = new.row_id();
    for ix in maintenance_order(snap, new.table_id())? {
        let old_key = ix.make_key(old);
        let new_key = ix.make_key(&new);
        if old_key == new_key {
            continue;
        }
        let mut next = Index::clone(&ix);
        if let Some(key) = old_key {
            next = next.remove_row(&key, row_id)?;
        }
        if let Some(key) = new_key {
            if check_refs {
                next.check_ref(snap, cx, &key)?;
            }
            next = next.insert(key, row_id, &Names::new(snap, cx))?;
        }
        trace!(index = ix.id(), row = row_id, "re-keyed");
        snap.put_index(next);
    }
    let table = snap.table(new.table_id())?.with_row(new.clone());
    snap.put_table(table);
    snap.record_version(new);
    Ok(())
}

/// Removes a row from every index of its table and from the row store.
/// The row's versions stay in the snapshot history.
pub(crate) fn unlink_row(snap: &mut Snapshot, table: TableId, row_id: RowId) -> Result<()> {
    let t = snap.table(table)?.clone();
    let row = t.row(row_id).cloned().ok_or_else(|| {
        IntegrityError::internal(format!("row {} missing from table '{}'", row_id, t.name()))
    })?;
    for id in t.indexes() {
        let ix = snap.index(id)?;
        if let Some(key) = ix.make_key(&row) {
            let next = ix.remove_row(&key, row_id)?;
            snap.put_index(next);
        }
    }
    snap.put_table(t.without_row(row_id));
    Ok(())
}
