//! # Transaction Context
//!
//! Every mutation in the integrity core is a pure function
//! `(&Snapshot, inputs, &TransactionContext) -> Result<Snapshot>`. The context
//! carries what those functions need to know about the enclosing transaction
//! without giving them any mutable state to share:
//!
//! | Field              | Meaning                                                 |
//! |--------------------|---------------------------------------------------------|
//! | live               | user transaction (true) or log reload (false)           |
//! | cascade_authorized | restrict actions may be overridden by cascading         |
//! | provenance         | recorded on every row version the mutation creates      |
//! | config             | `IntegrityConfig` for the whole mutation                |
//! | naming             | optional external name lookup for error messages        |
//! | namer              | generator for system index names                        |
//!
//! ## Live vs Reload
//!
//! During reload the log already contains the outcome of every cascade and
//! every checked insert, so referential checks and restrict failures are
//! suppressed. A live context enforces them.
//!
//! ## Index Names
//!
//! Unnamed indexes receive a system name `U(n)` from an [`IndexNamer`]. The
//! counter is a lock-free `AtomicU64`; one process-wide instance is available
//! through [`IndexNamer::global`], and tests can inject their own instance for
//! deterministic names.

use crate::config::IntegrityConfig;
use crate::schema::Naming;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug)]
pub struct IndexNamer {
    next: AtomicU64,
}

impl IndexNamer {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn global() -> Arc<IndexNamer> {
        static GLOBAL: OnceLock<Arc<IndexNamer>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(IndexNamer::new())).clone()
    }

    pub fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("U({})", n)
    }
}

impl Default for IndexNamer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct TransactionContext {
    live: bool,
    cascade_authorized: bool,
    provenance: Arc<str>,
    config: IntegrityConfig,
    naming: Option<Arc<dyn Naming + Send + Sync>>,
    namer: Arc<IndexNamer>,
}

impl TransactionContext {
    pub fn live(provenance: impl Into<Arc<str>>) -> Self {
        Self {
            live: true,
            cascade_authorized: false,
            provenance: provenance.into(),
            config: IntegrityConfig::default(),
            naming: None,
            namer: IndexNamer::global(),
        }
    }

    pub fn reload(provenance: impl Into<Arc<str>>) -> Self {
        Self {
            live: false,
            ..Self::live(provenance)
        }
    }

    /// Authorizes cascading past restrict actions for this context.
    pub fn with_cascade(mut self) -> Self {
        self.cascade_authorized = true;
        self
    }

    pub fn with_config(mut self, config: IntegrityConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_naming(mut self, naming: Arc<dyn Naming + Send + Sync>) -> Self {
        self.naming = Some(naming);
        self
    }

    pub fn with_namer(mut self, namer: Arc<IndexNamer>) -> Self {
        self.namer = namer;
        self
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn cascade_authorized(&self) -> bool {
        self.cascade_authorized
    }

    pub fn provenance(&self) -> &Arc<str> {
        &self.provenance
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    pub fn naming(&self) -> Option<&(dyn Naming + Send + Sync)> {
        self.naming.as_deref()
    }

    pub fn namer(&self) -> &IndexNamer {
        &self.namer
    }

    /// Referential checks run only for live transactions with enforcement on.
    pub fn checks_references(&self) -> bool {
        self.live && self.config.foreign_keys_enforced()
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("live", &self.live)
            .field("cascade_authorized", &self.cascade_authorized)
            .field("provenance", &self.provenance)
            .field("config", &self.config)
            .field("naming", &self.naming.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namer_produces_sequential_names() {
        let namer = IndexNamer::new();
        assert_eq!(namer.next_name(), "U(1)");
        assert_eq!(namer.next_name(), "U(2)");
    }

    #[test]
    fn global_namer_is_shared() {
        let a = IndexNamer::global();
        let b = IndexNamer::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn reload_context_skips_reference_checks() {
        let live = TransactionContext::live("alice");
        let reload = TransactionContext::reload("log");
        assert!(live.checks_references());
        assert!(!reload.checks_references());
        assert!(!live.cascade_authorized());
        assert!(live.with_cascade().cascade_authorized());
    }

    #[test]
    fn disabled_enforcement_skips_reference_checks() {
        let cx = TransactionContext::live("alice")
            .with_config(IntegrityConfig::default().enforce_foreign_keys(false));
        assert!(!cx.checks_references());
    }
}
