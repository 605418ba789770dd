//! # Name Resolution
//!
//! Objects reference each other by id; names exist only for error messages
//! and diagnostics. A failed lookup never fails the operation that needed the
//! name: it degrades to the placeholder `"??"` (configurable through
//! `IntegrityConfig::unknown_name`).
//!
//! Lookup order for a mutation:
//!
//! 1. the external [`Naming`] supplied in the `TransactionContext`, if any
//! 2. the snapshot's own catalog (table, column, index and check names)
//! 3. the placeholder

use crate::config::UNKNOWN_NAME;
use crate::mvcc::TransactionContext;
use crate::snapshot::Snapshot;
use crate::types::ObjectId;

pub trait Naming {
    fn lookup_name(&self, id: ObjectId) -> Option<String>;

    fn name_of(&self, id: ObjectId) -> String {
        self.lookup_name(id)
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }
}

impl Naming for Snapshot {
    fn lookup_name(&self, id: ObjectId) -> Option<String> {
        self.object_name(id).map(str::to_string)
    }
}

/// Resolver combining a context's external naming with a snapshot's catalog.
pub struct Names<'a> {
    external: Option<&'a (dyn Naming + Send + Sync)>,
    snapshot: &'a Snapshot,
    placeholder: &'a str,
}

impl<'a> Names<'a> {
    pub fn new(snapshot: &'a Snapshot, cx: &'a TransactionContext) -> Self {
        Self {
            external: cx.naming(),
            snapshot,
            placeholder: cx.config().placeholder_name(),
        }
    }
}

impl Naming for Names<'_> {
    fn lookup_name(&self, id: ObjectId) -> Option<String> {
        self.external
            .and_then(|n| n.lookup_name(id))
            .or_else(|| self.snapshot.lookup_name(id))
    }

    fn name_of(&self, id: ObjectId) -> String {
        self.lookup_name(id)
            .unwrap_or_else(|| self.placeholder.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegrityConfig;
    use std::sync::Arc;

    struct Fixed;

    impl Naming for Fixed {
        fn lookup_name(&self, id: ObjectId) -> Option<String> {
            (id == 7).then(|| "seven".to_string())
        }
    }

    #[test]
    fn unknown_ids_fall_back_to_placeholder() {
        let snap = Snapshot::new();
        assert_eq!(snap.name_of(999), "??");
    }

    #[test]
    fn external_naming_takes_precedence() {
        let snap = Snapshot::new();
        let cx = TransactionContext::live("t").with_naming(Arc::new(Fixed));
        let names = Names::new(&snap, &cx);
        assert_eq!(names.name_of(7), "seven");
        assert_eq!(names.name_of(8), "??");
    }

    #[test]
    fn placeholder_follows_config() {
        let snap = Snapshot::new();
        let cx = TransactionContext::live("t")
            .with_config(IntegrityConfig::default().unknown_name("<unnamed>"));
        assert_eq!(Names::new(&snap, &cx).name_of(3), "<unnamed>");
    }
}
