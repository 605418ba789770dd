//! # Database Module
//!
//! This module provides the write path on top of the integrity core, and the
//! `Database` holder that publishes committed snapshots.
//!
//! ## Architecture
//!
//! ```text
//! Database ──begin()──> Transaction { base generation, working Snapshot, cx }
//!                              │
//!                              │ apply(|snap, cx| Writer::new(cx, eval).op(snap, ..))
//!                              ▼
//!                         Writer (pure: &Snapshot -> Result<Snapshot>)
//!                    ┌─────────┼──────────────┬────────────────┐
//!                    ▼         ▼              ▼                ▼
//!            ConstraintValidator  CascadeEngine   Index maintenance  RowVersion
//! ```
//!
//! ## Row Pipeline
//!
//! | Operation    | Steps                                                             |
//! |--------------|-------------------------------------------------------------------|
//! | `insert_row` | defaults, NOT NULL, checks, `apply_insert`, index inserts (+FK)   |
//! | `update_row` | NOT NULL + checks on merged row, cascade `on_update`, re-key      |
//! | `delete_row` | cascade `on_delete`, remove from every index and the row store    |
//!
//! Validation that depends only on the row runs before any index is touched,
//! so a NOT NULL or CHECK failure never reaches index maintenance.
//!
//! ## Schema Operations
//!
//! `create_table`, `add_column`, `drop_column`, `create_index`, `drop_index`,
//! `add_check`, `drop_check` and `set_not_null` are implemented in `ddl.rs`.
//! Adding a constraint to a populated table validates the existing rows first.
//!
//! ## Failure Semantics
//!
//! Every operation clones its input snapshot and returns the clone on success.
//! On failure the clone is dropped; the input is untouched and remains the
//! only valid state.

mod ddl;
mod dml;
pub(crate) mod rows;
pub mod transaction;

pub use ddl::IndexSpec;
pub use transaction::{Database, Transaction};

use crate::cascade::CascadeEngine;
use crate::constraints::{ConstraintValidator, Evaluator};
use crate::mvcc::TransactionContext;
use crate::schema::Table;
use crate::snapshot::Snapshot;

pub struct Writer<'a> {
    cx: &'a TransactionContext,
    evaluator: &'a dyn Evaluator,
}

impl<'a> Writer<'a> {
    pub fn new(cx: &'a TransactionContext, evaluator: &'a dyn Evaluator) -> Self {
        Self { cx, evaluator }
    }

    pub fn context(&self) -> &TransactionContext {
        self.cx
    }

    fn cascade(&self) -> CascadeEngine<'a> {
        CascadeEngine::new(self.cx, self.evaluator)
    }

    fn validator<'s>(&'s self, snapshot: &'s Snapshot, table: &'s Table) -> ConstraintValidator<'s> {
        ConstraintValidator::new(snapshot, table, self.evaluator, self.cx)
    }
}
