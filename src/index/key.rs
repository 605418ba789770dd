//! # Index Keys and Constraint Flags
//!
//! A key tuple is the projection of a row onto an index's key columns, in key
//! column order. Tuples compare lexicographically using the total `Ord` of
//! [`Value`], so a shorter tuple that is a prefix of a longer one sorts first;
//! that property is what makes prefix scans a plain `range_from(prefix)`.
//!
//! Most keys have one to four columns, so tuples are `SmallVec`s that stay
//! inline up to `INLINE_KEY_COLUMNS`.
//!
//! ## Referential Actions
//!
//! ```text
//!                  Delete                    Update
//! Restrict   fail if live & unauthorized  fail if live & unauthorized
//! Cascade    delete dependents            copy new key into dependents
//! SetNull    null the FK columns          null the FK columns
//! SetDefault FK columns := defaults       FK columns := defaults
//! ```

use crate::config::INLINE_KEY_COLUMNS;
use crate::types::{ColumnId, Value};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

pub type KeyTuple = SmallVec<[Value; INLINE_KEY_COLUMNS]>;

/// True when any component of the key is null.
pub fn has_null_component(key: &[Value]) -> bool {
    key.iter().any(Value::is_null)
}

/// Ordered sequence of key columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    columns: SmallVec<[ColumnId; INLINE_KEY_COLUMNS]>,
}

impl Domain {
    pub fn new(columns: impl IntoIterator<Item = ColumnId>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, column: ColumnId) -> bool {
        self.columns.contains(&column)
    }

    pub fn position(&self, column: ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConstraintKind {
    #[default]
    None,
    Unique,
    PrimaryKey,
    ForeignKey,
}

impl ConstraintKind {
    pub fn is_unique(self) -> bool {
        matches!(self, ConstraintKind::Unique | ConstraintKind::PrimaryKey)
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::None => "INDEX",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[default]
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Delete,
    Update,
}

/// Per-operation actions of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferentialActions {
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ReferentialActions {
    pub fn for_mutation(&self, kind: MutationKind) -> ReferentialAction {
        match kind {
            MutationKind::Delete => self.on_delete,
            MutationKind::Update => self.on_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn prefix_sorts_before_extension() {
        let short: KeyTuple = smallvec![Value::Int(5)];
        let long: KeyTuple = smallvec![Value::Int(5), Value::Int(1)];
        let next: KeyTuple = smallvec![Value::Int(6)];
        assert!(short < long);
        assert!(long < next);
    }

    #[test]
    fn null_component_detected() {
        let key: KeyTuple = smallvec![Value::Int(1), Value::Null];
        assert!(has_null_component(&key));
        assert!(!has_null_component(&[Value::Int(1)]));
    }

    #[test]
    fn actions_masked_by_mutation() {
        let actions = ReferentialActions {
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::SetNull,
        };
        assert_eq!(actions.for_mutation(MutationKind::Delete), ReferentialAction::Cascade);
        assert_eq!(actions.for_mutation(MutationKind::Update), ReferentialAction::SetNull);
        assert_eq!(ReferentialActions::default().on_delete, ReferentialAction::Restrict);
    }

    #[test]
    fn domain_positions() {
        let d = Domain::new([4, 9]);
        assert_eq!(d.position(9), Some(1));
        assert!(!d.contains(5));
        assert_eq!(d.to_string(), "(4,9)");
    }
}
