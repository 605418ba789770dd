//! # Ferrule - Relational Integrity Core
//!
//! Ferrule is the integrity layer of an in-memory relational engine. It keeps
//! tables, indexes, check constraints and row histories inside one immutable
//! [`Snapshot`] value, and enforces on every mutation:
//!
//! - **Uniqueness**: primary and unique indexes reject duplicate keys
//! - **Referential integrity**: foreign keys must resolve, and deleting or
//!   re-keying a referenced row applies Restrict/Cascade/SetNull/SetDefault
//! - **NOT NULL and CHECK constraints**: evaluated with three-valued logic
//! - **Row history**: every change produces a new `RowVersion` linked to the
//!   one it replaces
//!
//! ## Quick Start
//!
//! ```ignore
//! use ferrule::{ColumnDef, Database, IndexSpec, NoExpressions, TransactionContext, Value, Writer};
//!
//! let db = Database::new();
//! let mut txn = db.begin(TransactionContext::live("session-1"));
//! let orders = txn.apply_with(|snap, cx| {
//!     Writer::new(cx, &NoExpressions).create_table(snap, "Orders", vec![ColumnDef::new("OrderId").not_null()])
//! })?;
//! txn.commit()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Database / Transaction (commit)    │
//! ├─────────────────────────────────────┤
//! │   Writer: DDL + row pipeline         │
//! ├──────────────┬──────────────────────┤
//! │ Constraints  │   Cascade engine      │
//! ├──────────────┴──────────────────────┤
//! │   Index maintenance │ RowVersion     │
//! ├─────────────────────────────────────┤
//! │   Snapshot (object map + history)    │
//! ├─────────────────────────────────────┤
//! │   PTree persistent ordered map       │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`tree`]: persistent weight-balanced ordered map
//! - [`types`]: values, identifiers and classification levels
//! - [`schema`]: tables, columns and catalog naming
//! - [`index`]: key tuples and index maintenance
//! - [`constraints`]: NOT NULL and CHECK validation
//! - [`cascade`]: referential actions
//! - [`mvcc`]: row versions and the transaction context
//! - [`snapshot`]: the database state value
//! - [`database`]: the write pipeline and committed-snapshot holder

pub mod cascade;
pub mod config;
pub mod constraints;
pub mod database;
pub mod error;
pub mod index;
pub mod mvcc;
pub mod schema;
pub mod snapshot;
pub mod tree;
pub mod types;

pub use config::IntegrityConfig;
pub use constraints::{Check, CheckTarget, Evaluator, FnEvaluator, NoExpressions, RowBinding, Truth};
pub use database::{Database, IndexSpec, Transaction, Writer};
pub use error::{violation_kind, IntegrityError, ViolationKind};
pub use index::{ConstraintKind, Index, KeyTuple, ReferentialAction};
pub use mvcc::{RowVersion, TransactionContext};
pub use schema::{ColumnDef, Names, Naming, Table};
pub use snapshot::Snapshot;
pub use tree::PTree;
pub use types::{Level, Value};
