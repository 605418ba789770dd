//! # Schema Objects
//!
//! Tables and columns as they live inside a snapshot, plus name resolution for
//! diagnostics.
//!
//! ## Object Graph
//!
//! ```text
//! Table ──owns──> rows (RowId -> RowVersion)
//!   │ ├──owns──> indexes        (IndexId set)
//!   │ ├──owns──> checks         (CheckId set)
//!   │ └──────── referenced_by   (foreign-key IndexIds in other tables)
//!   └──owns──> columns ──> checks (CheckId set)
//! ```
//!
//! Every edge is an id resolved through the snapshot; there are no owning
//! pointers between catalog objects.

pub mod catalog;
pub mod table;

pub use catalog::{Names, Naming};
pub use table::{Column, ColumnDef, ColumnDefault, Table};
