//! # Referential-Integrity Cascade Engine
//!
//! Before a row that a primary or unique index covers is deleted, or has one
//! of those key columns updated, every foreign key pointing at that index must
//! be resolved. The engine walks the "referenced by" graph depth-first and
//! applies each foreign key's action to its dependent rows.
//!
//! ## Algorithm
//!
//! ```text
//! resolve(table T, row r, changes?)
//!   for rx in T.referenced_by:                 // foreign keys into T
//!     x   = rx.referenced_index                // primary/unique index of T
//!     pk  = x.make_key(r)                      // old key; none => no dependents
//!     skip if update leaves pk unchanged
//!     deps = rx.rows_for(pk)                   // none => skip
//!     match rx.action(delete | update):
//!       Restrict   -> fail if live and not authorized
//!       Cascade    -> delete deps  | copy new key into deps' FK columns
//!       SetNull    -> FK columns := null
//!       SetDefault -> FK columns := column defaults
//!     every dependent is resolved before it is itself unlinked or rewritten
//! ```
//!
//! The traversal keeps an explicit stack of frames rather than recursing,
//! so a hierarchy thousands of rows deep costs heap, not call stack. A frame
//! finishes (unlinks or rewrites its row) only after every step it queued has
//! finished, which reproduces the post-order of the recursive formulation.
//!
//! ## Termination
//!
//! A pass records what it has touched. A row already deleted in this pass is
//! skipped with a warning. A row reached twice for an update through the same
//! foreign key means the foreign-key graph is cyclic for this mutation and the
//! pass fails with `InternalInconsistency`. Row depth is unbounded; what is
//! bounded is the number of distinct foreign keys along one path, by
//! `IntegrityConfig::max_cascade_depth`.
//!
//! ## Atomicity
//!
//! The engine works on a clone of the input snapshot. Any failure drops the
//! clone, so the caller's snapshot is the only state that survives.

use crate::config::REFERENCES_CONSTRAINT;
use crate::constraints::{ConstraintValidator, Evaluator, RowBinding};
use crate::database::rows::{relink_row, unlink_row};
use crate::error::IntegrityError;
use crate::index::{Index, KeyTuple, MutationKind, ReferentialAction};
use crate::mvcc::{RowVersion, TransactionContext};
use crate::schema::{ColumnDefault, Names, Naming, Table};
use crate::snapshot::Snapshot;
use crate::tree::PTree;
use crate::types::{ColumnId, IndexId, RowId, TableId, Value};
use eyre::Result;
use hashbrown::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const FOREIGN_KEY_IN_USE: &str = "foreign key in use";

#[derive(Default)]
struct Pass {
    deleted: HashSet<(TableId, RowId)>,
    updated: HashSet<(IndexId, RowId)>,
}

/// New values for a dependent row's foreign-key columns.
enum Assignment {
    Key(Option<KeyTuple>),
    Null,
    Default,
}

/// Work queued against one dependent row through foreign key `rx`.
enum Step {
    Delete {
        rx: Arc<Index>,
        row: RowId,
    },
    /// `forbidden` is the key being removed from the referenced index; a
    /// default that reproduces it would leave the row dangling.
    Assign {
        rx: Arc<Index>,
        row: RowId,
        assignment: Assignment,
        forbidden: Option<KeyTuple>,
    },
}

/// What to do with a frame's row once all its dependents are resolved.
enum Finish {
    Root,
    Unlink,
    Relink { check_refs: bool },
}

/// A row whose dependents are being resolved.
struct Frame {
    table: TableId,
    row: Arc<RowVersion>,
    changes: Option<PTree<ColumnId, Value>>,
    foreign_keys: Vec<IndexId>,
    next_fk: usize,
    /// Queued steps, last to run first.
    pending: Vec<Step>,
    /// Distinct foreign keys crossed from the root to this row.
    path: Vec<IndexId>,
    finish: Finish,
}

impl Frame {
    fn new(
        snap: &Snapshot,
        table_id: TableId,
        row_id: RowId,
        changes: Option<PTree<ColumnId, Value>>,
        path: Vec<IndexId>,
        finish: Finish,
    ) -> Result<Self> {
        let table = snap.table(table_id)?;
        let row = table.row(row_id).cloned().ok_or_else(|| {
            IntegrityError::internal(format!(
                "cascade source row {} missing from table '{}'",
                row_id,
                table.name()
            ))
        })?;
        Ok(Self {
            table: table_id,
            row,
            changes,
            foreign_keys: table.referenced_by().collect(),
            next_fk: 0,
            pending: Vec::new(),
            path,
            finish,
        })
    }

    fn kind(&self) -> MutationKind {
        match self.changes {
            Some(_) => MutationKind::Update,
            None => MutationKind::Delete,
        }
    }
}

pub struct CascadeEngine<'a> {
    cx: &'a TransactionContext,
    evaluator: &'a dyn Evaluator,
}

impl<'a> CascadeEngine<'a> {
    pub fn new(cx: &'a TransactionContext, evaluator: &'a dyn Evaluator) -> Self {
        Self { cx, evaluator }
    }

    /// Resolves every dependent of `row` ahead of its deletion. The row itself
    /// is left in place for the caller to remove.
    pub fn on_delete(&self, snapshot: &Snapshot, table: TableId, row: RowId) -> Result<Snapshot> {
        let mut snap = snapshot.clone();
        let mut pass = Pass::default();
        pass.deleted.insert((table, row));
        debug!(table, row, "cascade delete pass");
        let root = Frame::new(&snap, table, row, None, Vec::new(), Finish::Root)?;
        self.run(&mut pass, &mut snap, root)?;
        debug!(
            deleted = pass.deleted.len() - 1,
            updated = pass.updated.len(),
            "cascade delete pass complete"
        );
        Ok(snap)
    }

    /// Resolves every dependent of `row` ahead of applying `changes` to it.
    /// The row itself is left unchanged for the caller to update.
    pub fn on_update(
        &self,
        snapshot: &Snapshot,
        table: TableId,
        row: RowId,
        changes: &PTree<ColumnId, Value>,
    ) -> Result<Snapshot> {
        let mut snap = snapshot.clone();
        let mut pass = Pass::default();
        debug!(table, row, "cascade update pass");
        let root = Frame::new(&snap, table, row, Some(changes.clone()), Vec::new(), Finish::Root)?;
        self.run(&mut pass, &mut snap, root)?;
        debug!(
            deleted = pass.deleted.len(),
            updated = pass.updated.len(),
            "cascade update pass complete"
        );
        Ok(snap)
    }

    fn run(&self, pass: &mut Pass, snap: &mut Snapshot, root: Frame) -> Result<()> {
        let mut stack = vec![root];
        while let Some(frame) = stack.last_mut() {
            if let Some(step) = frame.pending.pop() {
                if let Some(child) = self.enter(pass, snap, step, &frame.path)? {
                    stack.push(child);
                }
                continue;
            }
            if let Some(&fk) = frame.foreign_keys.get(frame.next_fk) {
                frame.next_fk += 1;
                self.resolve(pass, snap, frame, fk)?;
                continue;
            }
            if let Some(done) = stack.pop() {
                self.finish(snap, done)?;
            }
        }
        Ok(())
    }

    /// Queues the steps foreign key `fk` requires for the frame's row.
    fn resolve(&self, pass: &Pass, snap: &Snapshot, frame: &mut Frame, fk: IndexId) -> Result<()> {
        let rx = snap.index(fk)?.clone();
        let target = rx.reference().ok_or_else(|| {
            IntegrityError::internal(format!("foreign key {} has no referenced index", fk))
        })?;
        let x = snap.index(target.index)?;
        let Some(pk) = x.make_key(&frame.row) else {
            return Ok(());
        };
        let new_key = match &frame.changes {
            Some(ch) => {
                if !x.keys().columns().iter().any(|c| ch.contains_key(c)) {
                    return Ok(());
                }
                let nk = x.make_key_from(&frame.row.merged_values(ch));
                if nk.as_ref() == Some(&pk) {
                    return Ok(());
                }
                nk
            }
            None => None,
        };
        let mut dependents = rx.rows_for(&pk);
        dependents.retain(|d| !pass.deleted.contains(&(rx.table(), *d)));
        if dependents.is_empty() {
            return Ok(());
        }
        let kind = frame.kind();
        let action = rx.actions().for_mutation(kind);
        trace!(
            foreign_key = fk,
            dependents = dependents.len(),
            action = %action,
            "resolving dependents"
        );

        if action == ReferentialAction::Restrict {
            if !self.cx.is_live() {
                return Ok(());
            }
            if !self.cx.cascade_authorized() {
                let names = Names::new(snap, self.cx);
                return Err(IntegrityError::RestrictViolation {
                    constraint_name: display_name(&rx, &names),
                    table_name: names.name_of(rx.table()),
                    detail: FOREIGN_KEY_IN_USE.to_string(),
                }
                .into());
            }
        }

        let steps = dependents.into_iter().rev().map(|row| match (action, kind) {
            (ReferentialAction::Restrict | ReferentialAction::Cascade, MutationKind::Delete) => {
                Step::Delete { rx: rx.clone(), row }
            }
            (ReferentialAction::Restrict | ReferentialAction::Cascade, MutationKind::Update) => Step::Assign {
                rx: rx.clone(),
                row,
                assignment: Assignment::Key(new_key.clone()),
                forbidden: None,
            },
            (ReferentialAction::SetNull, _) => Step::Assign {
                rx: rx.clone(),
                row,
                assignment: Assignment::Null,
                forbidden: None,
            },
            (ReferentialAction::SetDefault, _) => Step::Assign {
                rx: rx.clone(),
                row,
                assignment: Assignment::Default,
                forbidden: Some(pk.clone()),
            },
        });
        frame.pending.extend(steps);
        Ok(())
    }

    /// Starts one queued step. Returns the frame for the dependent row when
    /// it has dependents of its own to resolve first.
    fn enter(
        &self,
        pass: &mut Pass,
        snap: &Snapshot,
        step: Step,
        path: &[IndexId],
    ) -> Result<Option<Frame>> {
        match step {
            Step::Delete { rx, row } => {
                let table = rx.table();
                if !pass.deleted.insert((table, row)) {
                    warn!(table, row, "cascade revisited a deleted row; skipping");
                    return Ok(None);
                }
                if snap.table(table)?.row(row).is_none() {
                    return Ok(None);
                }
                let path = self.extend_path(path, &rx, table, row)?;
                trace!(table, row, "cascade delete");
                Frame::new(snap, table, row, None, path, Finish::Unlink).map(Some)
            }
            Step::Assign {
                rx,
                row: row_id,
                assignment,
                forbidden,
            } => {
                let table_id = rx.table();
                if pass.deleted.contains(&(table_id, row_id)) {
                    return Ok(None);
                }
                if !pass.updated.insert((rx.id(), row_id)) {
                    return Err(IntegrityError::internal(format!(
                        "cyclic cascade: row {} of table {} reached twice through foreign key {}",
                        row_id,
                        table_id,
                        rx.id()
                    ))
                    .into());
                }
                let table = snap.table(table_id)?;
                let mut changes = PTree::new();
                for (i, column) in rx.keys().columns().iter().enumerate() {
                    let value = match &assignment {
                        Assignment::Key(Some(key)) => key.get(i).cloned().unwrap_or(Value::Null),
                        Assignment::Key(None) | Assignment::Null => Value::Null,
                        Assignment::Default => self.default_for(table, *column),
                    };
                    changes = changes.insert(*column, value);
                }

                let check_refs = matches!(assignment, Assignment::Default);
                if check_refs {
                    let candidate = rx.make_key_from(&changes);
                    if candidate.is_some() && candidate == forbidden {
                        let names = Names::new(snap, self.cx);
                        let target = rx.reference().map_or(table_id, |r| r.table);
                        return Err(IntegrityError::ReferentialViolation {
                            constraint_name: REFERENCES_CONSTRAINT.to_string(),
                            table_name: names.name_of(target),
                        }
                        .into());
                    }
                }

                let path = self.extend_path(path, &rx, table_id, row_id)?;
                trace!(table = table.name(), row = row_id, "cascade update");
                Frame::new(
                    snap,
                    table_id,
                    row_id,
                    Some(changes),
                    path,
                    Finish::Relink { check_refs },
                )
                .map(Some)
            }
        }
    }

    fn extend_path(&self, path: &[IndexId], rx: &Index, table: TableId, row: RowId) -> Result<Vec<IndexId>> {
        let mut next = path.to_vec();
        if next.contains(&rx.id()) {
            return Ok(next);
        }
        next.push(rx.id());
        let limit = self.cx.config().cascade_depth_limit();
        if next.len() > limit {
            return Err(IntegrityError::internal(format!(
                "cascade crossed more than {} foreign keys at row {} of table {}",
                limit, row, table
            ))
            .into());
        }
        Ok(next)
    }

    /// Applies a frame's own mutation once its dependents are resolved.
    fn finish(&self, snap: &mut Snapshot, frame: Frame) -> Result<()> {
        let row_id = frame.row.row_id();
        match (frame.finish, frame.changes) {
            (Finish::Root, _) => Ok(()),
            (Finish::Unlink, _) => unlink_row(snap, frame.table, row_id),
            (Finish::Relink { check_refs }, Some(changes)) => {
                let current = snap.row(frame.table, row_id)?.clone();
                let merged = current.merged_values(&changes);
                {
                    let table = snap.table(frame.table)?;
                    ConstraintValidator::new(snap, table, self.evaluator, self.cx).validate_row(&merged)?;
                }
                let position = snap.allocate_position();
                let next = current.apply_update(position, None, self.cx.provenance().clone(), &changes);
                relink_row(snap, self.cx, &current, Arc::new(next), check_refs)
            }
            (Finish::Relink { .. }, None) => Err(IntegrityError::internal(format!(
                "cascade update of row {} in table {} carries no changes",
                row_id, frame.table
            ))
            .into()),
        }
    }

    fn default_for(&self, table: &Table, column: ColumnId) -> Value {
        match table.column(column).and_then(|c| c.default_value()) {
            Some(ColumnDefault::Literal(v)) => v.clone(),
            Some(ColumnDefault::Expr(expr)) => match self.evaluator.eval(*expr, &RowBinding::empty()) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        table = table.name(),
                        column,
                        error = %e,
                        "default expression failed; assigning null"
                    );
                    Value::Null
                }
            },
            None => Value::Null,
        }
    }
}

fn display_name(ix: &Index, names: &dyn Naming) -> String {
    if ix.name().is_empty() {
        names.name_of(ix.id())
    } else {
        ix.name().to_string()
    }
}
