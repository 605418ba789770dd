//! # Versioned Rows and Transaction Context
//!
//! - [`version`]: immutable `RowVersion`s linked into a per-row history
//! - [`transaction`]: the `TransactionContext` threaded through every
//!   integrity operation, and the system index namer
//!
//! Concurrency between transactions is handled one level up, in
//! `database::Database`, by publishing whole snapshots. Nothing in this module
//! is mutated after construction except the namer's atomic counter.

pub mod transaction;
pub mod version;

pub use transaction::{IndexNamer, TransactionContext};
pub use version::RowVersion;
