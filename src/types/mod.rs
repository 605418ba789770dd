//! # Core Type Vocabulary
//!
//! Identifiers, the classification `Level` carried by every row version, and
//! the runtime `Value`.
//!
//! ## Identifiers
//!
//! Every database object (table, column, index, check) is named by a 64-bit
//! `ObjectId` allocated from the snapshot that first contains it. All
//! cross-references between objects are identifiers resolved through the
//! enclosing snapshot, never owning pointers, so structural sharing between
//! snapshot versions stays valid.
//!
//! | Alias         | Names                                          |
//! |---------------|------------------------------------------------|
//! | `ObjectId`    | any catalog object                             |
//! | `TableId`     | a table                                        |
//! | `ColumnId`    | a table column                                 |
//! | `IndexId`     | an index                                       |
//! | `CheckId`     | a check constraint                             |
//! | `RowId`       | a row, stable across its versions              |
//! | `LogPosition` | one row version; also its timestamp            |
//! | `ExprId`      | a parsed expression owned by the evaluator     |

mod value;

pub use value::Value;

use serde::{Deserialize, Serialize};

pub type ObjectId = u64;
pub type TableId = ObjectId;
pub type ColumnId = ObjectId;
pub type IndexId = ObjectId;
pub type CheckId = ObjectId;
pub type RowId = u64;
pub type LogPosition = u64;
pub type ExprId = u64;

/// Security classification of a row version, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Level {
    #[default]
    D,
    C,
    B,
    A,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_default_is_lowest() {
        assert_eq!(Level::default(), Level::D);
        assert!(Level::D < Level::C);
        assert!(Level::B < Level::A);
    }
}
