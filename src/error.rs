//! # Integrity Error Taxonomy
//!
//! Every violation detected by the core is raised as an [`IntegrityError`]
//! wrapped in an `eyre::Report`. The rest of the crate keeps the plain
//! `eyre::Result` style (`bail!`, `ensure!`, `wrap_err`), and callers that need
//! the structured kind recover it with `downcast_ref`:
//!
//! ```ignore
//! match writer.insert_row(&snap, orders, values, None) {
//!     Err(report) => match report.downcast_ref::<IntegrityError>() {
//!         Some(IntegrityError::UniqueViolation { constraint_name, .. }) => { /* ... */ }
//!         _ => return Err(report),
//!     },
//!     Ok((snap, row)) => { /* ... */ }
//! }
//! ```
//!
//! ## Kinds
//!
//! | Kind                  | Raised by                                           |
//! |-----------------------|-----------------------------------------------------|
//! | UniqueViolation       | duplicate key in a primary/unique index             |
//! | ReferentialViolation  | foreign key with no matching referenced key         |
//! | RestrictViolation     | delete/update blocked by a Restrict foreign key     |
//! | NotNullViolation      | null in a not-null column                           |
//! | NullFoundViolation    | reverse not-null scan found a conflicting value     |
//! | CheckViolation        | check expression evaluated false (or failed)        |
//! | InternalInconsistency | engine invariant broken; always an engine defect    |
//!
//! None of these are retried by the core. The snapshot passed into the
//! failing operation remains the only valid state.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    Unique,
    Referential,
    Restrict,
    NotNull,
    NullFound,
    Check,
    InternalInconsistency,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// Duplicate key tuple in a primary or unique index.
    #[error("{constraint_name} constraint violated in table '{table_name}': duplicate key")]
    UniqueViolation {
        constraint_name: String,
        table_name: String,
    },

    /// Foreign-key key tuple with no match in the referenced index.
    #[error("{constraint_name} constraint violated in table '{table_name}': referenced key not found")]
    ReferentialViolation {
        constraint_name: String,
        table_name: String,
    },

    /// Delete or update of a referenced key blocked by a Restrict foreign key.
    #[error("RESTRICT - {detail}: {constraint_name} on table '{table_name}'")]
    RestrictViolation {
        constraint_name: String,
        table_name: String,
        detail: String,
    },

    #[error("NOT NULL constraint violated on column '{column_name}' in table '{table_name}'")]
    NotNullViolation {
        table_name: String,
        column_name: String,
    },

    /// Reverse-mode scan found a value where none was expected.
    #[error("column '{column_name}' in table '{table_name}' contains values that conflict with the requested constraint change")]
    NullFoundViolation {
        table_name: String,
        column_name: String,
    },

    #[error("CHECK constraint '{constraint_name}' violated on column '{column_name}' in table '{table_name}'")]
    CheckViolation {
        constraint_name: String,
        column_name: String,
        table_name: String,
    },

    #[error("internal inconsistency: {detail}")]
    InternalInconsistency { detail: String },
}

impl IntegrityError {
    pub fn kind(&self) -> ViolationKind {
        match self {
            IntegrityError::UniqueViolation { .. } => ViolationKind::Unique,
            IntegrityError::ReferentialViolation { .. } => ViolationKind::Referential,
            IntegrityError::RestrictViolation { .. } => ViolationKind::Restrict,
            IntegrityError::NotNullViolation { .. } => ViolationKind::NotNull,
            IntegrityError::NullFoundViolation { .. } => ViolationKind::NullFound,
            IntegrityError::CheckViolation { .. } => ViolationKind::Check,
            IntegrityError::InternalInconsistency { .. } => ViolationKind::InternalInconsistency,
        }
    }

    /// True for failures that indicate a bug in the engine rather than bad input.
    pub fn is_engine_defect(&self) -> bool {
        matches!(self, IntegrityError::InternalInconsistency { .. })
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        IntegrityError::InternalInconsistency {
            detail: detail.into(),
        }
    }

    pub fn constraint_name(&self) -> Option<&str> {
        match self {
            IntegrityError::UniqueViolation { constraint_name, .. }
            | IntegrityError::ReferentialViolation { constraint_name, .. }
            | IntegrityError::RestrictViolation { constraint_name, .. }
            | IntegrityError::CheckViolation { constraint_name, .. } => Some(constraint_name),
            _ => None,
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        match self {
            IntegrityError::UniqueViolation { table_name, .. }
            | IntegrityError::ReferentialViolation { table_name, .. }
            | IntegrityError::RestrictViolation { table_name, .. }
            | IntegrityError::NotNullViolation { table_name, .. }
            | IntegrityError::NullFoundViolation { table_name, .. }
            | IntegrityError::CheckViolation { table_name, .. } => Some(table_name),
            IntegrityError::InternalInconsistency { .. } => None,
        }
    }

    pub fn column_name(&self) -> Option<&str> {
        match self {
            IntegrityError::NotNullViolation { column_name, .. }
            | IntegrityError::NullFoundViolation { column_name, .. }
            | IntegrityError::CheckViolation { column_name, .. } => Some(column_name),
            _ => None,
        }
    }
}

/// Extracts the violation kind from a report, if it carries one.
pub fn violation_kind(report: &eyre::Report) -> Option<ViolationKind> {
    report.downcast_ref::<IntegrityError>().map(IntegrityError::kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_internal_inconsistency_is_a_defect() {
        assert!(IntegrityError::internal("tree missing").is_engine_defect());
        let unique = IntegrityError::UniqueViolation {
            constraint_name: "PRIMARY/UNIQUE".into(),
            table_name: "orders".into(),
        };
        assert!(!unique.is_engine_defect());
        assert_eq!(unique.kind(), ViolationKind::Unique);
    }

    #[test]
    fn kind_survives_eyre_wrapping() {
        let report = eyre::Report::new(IntegrityError::NotNullViolation {
            table_name: "items".into(),
            column_name: "amount".into(),
        });
        assert_eq!(violation_kind(&report), Some(ViolationKind::NotNull));
        assert_eq!(
            report.to_string(),
            "NOT NULL constraint violated on column 'amount' in table 'items'"
        );
    }

    #[test]
    fn accessors_expose_names() {
        let err = IntegrityError::CheckViolation {
            constraint_name: "positive_amount".into(),
            column_name: "amount".into(),
            table_name: "items".into(),
        };
        assert_eq!(err.constraint_name(), Some("positive_amount"));
        assert_eq!(err.table_name(), Some("items"));
        assert_eq!(err.column_name(), Some("amount"));
    }
}
