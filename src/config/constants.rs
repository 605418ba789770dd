//! # Ferrule Configuration Constants
//!
//! This module centralizes the numeric configuration of the integrity core,
//! grouping interdependent values together and documenting their
//! relationships. Constants that depend on each other are co-located to
//! prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! TREE_DELTA (3)
//!       │
//!       └─> TREE_GAMMA (2, must be < TREE_DELTA)
//!             A subtree is rotated when its weight exceeds DELTA times its
//!             sibling's weight; a double rotation is chosen when the inner
//!             grandchild outweighs GAMMA times the outer one. The pair
//!             (3, 2) is the only integer pair proven to keep the tree
//!             balanced under both insert and delete.
//!
//! INLINE_KEY_COLUMNS (4)
//!       │
//!       └─> KeyTuple SmallVec capacity; keys wider than this spill to heap.
//!
//! DEFAULT_MAX_CASCADE_DEPTH (64)
//!       │
//!       └─> Bound on nested cascade steps within one pass. Exceeding it is
//!           reported as an engine defect, never silently truncated.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `TREE_GAMMA < TREE_DELTA` (rotation choice is well defined)
//! 2. `DEFAULT_MAX_CASCADE_DEPTH > 0` (a single-level cascade always fits)
//! 3. `FIRST_OBJECT_ID > 0` (zero is never a valid object identifier)

// ============================================================================
// PERSISTENT TREE BALANCE
// ============================================================================

/// Weight ratio beyond which a subtree is considered out of balance.
pub const TREE_DELTA: usize = 3;

/// Inner/outer grandchild ratio selecting a double rotation over a single one.
pub const TREE_GAMMA: usize = 2;

const _: () = assert!(
    TREE_GAMMA < TREE_DELTA,
    "TREE_GAMMA must be smaller than TREE_DELTA for the weight-balanced tree"
);

// ============================================================================
// INDEX KEYS
// ============================================================================

/// Number of key components stored inline before a key tuple allocates.
pub const INLINE_KEY_COLUMNS: usize = 4;

// ============================================================================
// CASCADE
// ============================================================================

/// Default bound on distinct foreign keys crossed along one cascade path.
/// Row depth is unbounded; a self-referencing chain counts once.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 64;

const _: () = assert!(
    DEFAULT_MAX_CASCADE_DEPTH > 0,
    "DEFAULT_MAX_CASCADE_DEPTH must allow at least one cascade level"
);

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// First identifier handed out by a fresh snapshot for tables, columns,
/// indexes and checks.
pub const FIRST_OBJECT_ID: u64 = 1;

/// First row identifier handed out by a fresh snapshot.
pub const FIRST_ROW_ID: u64 = 1;

/// First log position; positions are the timestamps stamped on row versions.
pub const FIRST_LOG_POSITION: u64 = 1;

const _: () = assert!(FIRST_OBJECT_ID > 0, "object id 0 is reserved");

/// Placeholder used when a catalog name lookup finds nothing.
pub const UNKNOWN_NAME: &str = "??";

/// Constraint name reported for foreign-key validation failures.
pub const REFERENCES_CONSTRAINT: &str = "REFERENCES";

/// Constraint name reported for primary/unique duplicate keys.
pub const PRIMARY_UNIQUE_CONSTRAINT: &str = "PRIMARY/UNIQUE";
