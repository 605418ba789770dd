//! # Ferrule Configuration Module
//!
//! Compile-time constants live in [`constants`]; per-transaction runtime
//! settings live in [`IntegrityConfig`], which travels inside the
//! `TransactionContext` so that every pure function in the core sees the same
//! settings for the whole mutation.
//!
//! ## Runtime Settings
//!
//! | Setting              | Default | Description                                   |
//! |----------------------|---------|-----------------------------------------------|
//! | enforce_foreign_keys | true    | Validate foreign-key keys on insert/build     |
//! | max_cascade_depth    | 64      | Distinct foreign keys on one cascade path     |
//! | unknown_name         | "??"    | Placeholder for failed catalog name lookups   |
//!
//! ## Usage
//!
//! ```ignore
//! let config = IntegrityConfig::default()
//!     .enforce_foreign_keys(false)
//!     .max_cascade_depth(16);
//! ```

pub mod constants;
pub use constants::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityConfig {
    enforce_foreign_keys: bool,
    max_cascade_depth: usize,
    unknown_name: String,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            enforce_foreign_keys: true,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            unknown_name: UNKNOWN_NAME.to_string(),
        }
    }
}

impl IntegrityConfig {
    pub fn enforce_foreign_keys(mut self, enabled: bool) -> Self {
        self.enforce_foreign_keys = enabled;
        self
    }

    pub fn max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth.max(1);
        self
    }

    pub fn unknown_name(mut self, placeholder: impl Into<String>) -> Self {
        self.unknown_name = placeholder.into();
        self
    }

    pub fn foreign_keys_enforced(&self) -> bool {
        self.enforce_foreign_keys
    }

    pub fn cascade_depth_limit(&self) -> usize {
        self.max_cascade_depth
    }

    pub fn placeholder_name(&self) -> &str {
        &self.unknown_name
    }
}
