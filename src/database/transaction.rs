//! # Transaction Management Module
//!
//! This module publishes committed snapshots and gives each writer a private
//! working snapshot to mutate.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         Transaction Flow                             │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │   User            Database                  Transaction              │
//! │   ────            ────────                  ───────────              │
//! │                                                                      │
//! │   BEGIN ────────► begin(cx) ──────────────► working = committed      │
//! │                                             base = generation        │
//! │   INSERT/UPDATE ─────────────────────────► apply(op)                 │
//! │                                             working = op(working)    │
//! │   SAVEPOINT ─────────────────────────────► savepoint(name)           │
//! │   ROLLBACK TO ───────────────────────────► rollback_to(name)         │
//! │                                                                      │
//! │   COMMIT ───────► publish if generation == base                      │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Commit Rule
//!
//! The first committer wins. A transaction that began at generation `g`
//! commits only if the database is still at `g`; otherwise it fails and the
//! caller retries on a fresh snapshot. Readers never block: `snapshot()`
//! clones an `Arc`-backed value under a short read lock.
//!
//! ## Savepoint Semantics
//!
//! A savepoint is the working snapshot at the moment it was taken. Rolling
//! back to it restores that snapshot and discards savepoints taken later.

use crate::mvcc::TransactionContext;
use crate::snapshot::Snapshot;
use eyre::{bail, Result};
use parking_lot::RwLock;
use tracing::{debug, warn};

struct Committed {
    snapshot: Snapshot,
    generation: u64,
}

pub struct Database {
    committed: RwLock<Committed>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::new())
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            committed: RwLock::new(Committed {
                snapshot,
                generation: 0,
            }),
        }
    }

    /// Latest committed snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.committed.read().snapshot.clone()
    }

    pub fn generation(&self) -> u64 {
        self.committed.read().generation
    }

    pub fn begin(&self, cx: TransactionContext) -> Transaction<'_> {
        let committed = self.committed.read();
        debug!(generation = committed.generation, provenance = %cx.provenance(), "begin");
        Transaction {
            db: self,
            base_generation: committed.generation,
            working: committed.snapshot.clone(),
            cx,
            dirty: false,
            savepoints: Vec::new(),
        }
    }
}

pub struct Transaction<'a> {
    db: &'a Database,
    base_generation: u64,
    working: Snapshot,
    cx: TransactionContext,
    dirty: bool,
    savepoints: Vec<(String, Snapshot)>,
}

impl Transaction<'_> {
    pub fn snapshot(&self) -> &Snapshot {
        &self.working
    }

    pub fn context(&self) -> &TransactionContext {
        &self.cx
    }

    /// Runs one operation against the working snapshot. A failed operation
    /// leaves the working snapshot as it was.
    pub fn apply<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(&Snapshot, &TransactionContext) -> Result<Snapshot>,
    {
        self.apply_with(|snap, cx| op(snap, cx).map(|s| (s, ())))
    }

    pub fn apply_with<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&Snapshot, &TransactionContext) -> Result<(Snapshot, T)>,
    {
        let (next, out) = op(&self.working, &self.cx)?;
        self.working = next;
        self.dirty = true;
        Ok(out)
    }

    pub fn savepoint(&mut self, name: impl Into<String>) {
        self.savepoints.push((name.into(), self.working.clone()));
    }

    pub fn rollback_to(&mut self, name: &str) -> Result<()> {
        let Some(pos) = self.savepoints.iter().rposition(|(n, _)| n == name) else {
            bail!("no such savepoint: {}", name);
        };
        self.savepoints.truncate(pos + 1);
        self.working = self.savepoints[pos].1.clone();
        Ok(())
    }

    pub fn release(&mut self, name: &str) -> Result<()> {
        let Some(pos) = self.savepoints.iter().rposition(|(n, _)| n == name) else {
            bail!("no such savepoint: {}", name);
        };
        self.savepoints.truncate(pos);
        Ok(())
    }

    /// Publishes the working snapshot and returns the new generation.
    pub fn commit(self) -> Result<u64> {
        let mut committed = self.db.committed.write();
        if !self.dirty {
            return Ok(committed.generation);
        }
        if committed.generation != self.base_generation {
            warn!(
                base = self.base_generation,
                current = committed.generation,
                "commit conflict"
            );
            bail!(
                "transaction conflict: began at generation {} but database is at {}",
                self.base_generation,
                committed.generation
            );
        }
        committed.snapshot = self.working;
        committed.generation += 1;
        debug!(generation = committed.generation, "commit");
        Ok(committed.generation)
    }

    pub fn rollback(self) {
        debug!(base = self.base_generation, "rollback");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::NoExpressions;
    use crate::database::Writer;
    use crate::schema::ColumnDef;

    fn create(txn: &mut Transaction<'_>, name: &str) {
        let name = name.to_string();
        txn.apply(|snap, cx| {
            Writer::new(cx, &NoExpressions)
                .create_table(snap, &name, vec![ColumnDef::new("Id")])
                .map(|(s, _)| s)
        })
        .unwrap();
    }

    #[test]
    fn commit_publishes_working_snapshot() {
        let db = Database::new();
        let mut txn = db.begin(TransactionContext::live("test"));
        create(&mut txn, "Orders");
        assert!(db.snapshot().table_by_name("Orders").is_err());
        assert_eq!(txn.commit().unwrap(), 1);
        assert!(db.snapshot().table_by_name("Orders").is_ok());
    }

    #[test]
    fn second_committer_conflicts() {
        let db = Database::new();
        let mut a = db.begin(TransactionContext::live("a"));
        let mut b = db.begin(TransactionContext::live("b"));
        create(&mut a, "A");
        create(&mut b, "B");
        a.commit().unwrap();
        assert!(b.commit().is_err());
        assert!(db.snapshot().table_by_name("B").is_err());
    }

    #[test]
    fn rollback_discards_changes() {
        let db = Database::new();
        let mut txn = db.begin(TransactionContext::live("test"));
        create(&mut txn, "Orders");
        txn.rollback();
        assert_eq!(db.generation(), 0);
        assert_eq!(db.snapshot(), Snapshot::new());
    }

    #[test]
    fn failed_operation_keeps_working_snapshot() {
        let db = Database::new();
        let mut txn = db.begin(TransactionContext::live("test"));
        create(&mut txn, "Orders");
        let before = txn.snapshot().clone();
        let result = txn.apply(|snap, cx| {
            Writer::new(cx, &NoExpressions)
                .create_table(snap, "Orders", vec![])
                .map(|(s, _)| s)
        });
        assert!(result.is_err());
        assert_eq!(txn.snapshot(), &before);
    }

    #[test]
    fn rollback_to_savepoint() {
        let db = Database::new();
        let mut txn = db.begin(TransactionContext::live("test"));
        create(&mut txn, "A");
        txn.savepoint("sp1");
        create(&mut txn, "B");
        txn.rollback_to("sp1").unwrap();
        assert!(txn.snapshot().table_by_name("A").is_ok());
        assert!(txn.snapshot().table_by_name("B").is_err());
        assert!(txn.rollback_to("missing").is_err());
        txn.release("sp1").unwrap();
        assert!(txn.rollback_to("sp1").is_err());
    }
}
