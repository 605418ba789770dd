//! # Row History and Transaction Tests
//!
//! Version chains produced by the write pipeline, and the commit/rollback
//! behavior of `Database` transactions.
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test row_history
//! ```

use ferrule::types::{ColumnId, Level, TableId};
use ferrule::{
    ColumnDef, Database, IndexSpec, NoExpressions, PTree, RowVersion, Snapshot, TransactionContext, Value,
    Writer,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn accounts(snap: &Snapshot, cx: &TransactionContext) -> (Snapshot, TableId, ColumnId, ColumnId) {
    let w = Writer::new(cx, &NoExpressions);
    let (snap, table) = w
        .create_table(
            snap,
            "Accounts",
            vec![ColumnDef::new("Id").not_null(), ColumnDef::new("Balance")],
        )
        .unwrap();
    let t = snap.table(table).unwrap().clone();
    let id = t.column_id("Id").unwrap();
    let balance = t.column_id("Balance").unwrap();
    let (snap, _) = w
        .create_index(&snap, IndexSpec::primary_key(table, vec![id]))
        .unwrap();
    (snap, table, id, balance)
}

fn change(column: ColumnId, value: Value) -> PTree<ColumnId, Value> {
    [(column, value)].into_iter().collect()
}

// ============================================================================
// VERSION CHAIN TESTS
// ============================================================================

mod history_tests {
    use super::*;

    #[test]
    fn back_link_reconstructs_prior_values() {
        let cx = TransactionContext::live("teller");
        let w = Writer::new(&cx, &NoExpressions);
        let (snap, table, id, balance) = accounts(&Snapshot::new(), &cx);

        let initial: PTree<_, _> = [(id, Value::Int(1)), (balance, Value::Int(100))].into_iter().collect();
        let (snap, row) = w.insert_row(&snap, table, initial, Some(Level::C)).unwrap();
        let v1 = snap.row(table, row).unwrap().clone();

        let snap = w
            .update_row(&snap, table, row, &change(balance, Value::Int(75)), None)
            .unwrap();
        let snap = w
            .update_row(&snap, table, row, &change(balance, Value::Null), Some(Level::A))
            .unwrap();

        let history = snap.history(table, row).unwrap();
        assert_eq!(history.len(), 3);
        assert!(!history[0].has_value(balance));
        assert_eq!(history[0].classification(), Level::A);
        assert_eq!(history[1].value(balance), Some(&Value::Int(75)));
        assert_eq!(history[1].classification(), Level::C);
        assert_eq!(history[2].values(), v1.values());
        assert_eq!(history[2].prev(), None);

        let previous = snap.previous_version(&history[0]).unwrap();
        assert_eq!(previous.position(), history[1].position());
        assert!(history.iter().all(|v| v.row_id() == row && v.provenance() == "teller"));
    }

    #[test]
    fn deleted_row_keeps_its_versions() {
        let cx = TransactionContext::live("teller");
        let w = Writer::new(&cx, &NoExpressions);
        let (snap, table, id, balance) = accounts(&Snapshot::new(), &cx);

        let initial: PTree<_, _> = [(id, Value::Int(1)), (balance, Value::Int(5))].into_iter().collect();
        let (snap, row) = w.insert_row(&snap, table, initial, None).unwrap();
        let position = snap.row(table, row).unwrap().position();
        let snap = w.delete_row(&snap, table, row).unwrap();

        assert!(snap.row(table, row).is_err());
        let kept = snap.version(position).unwrap();
        assert_eq!(kept.value(balance), Some(&Value::Int(5)));
        assert_eq!(snap.history_from(position).count(), 1);
    }

    #[test]
    fn older_snapshot_still_sees_old_version() {
        let cx = TransactionContext::live("teller");
        let w = Writer::new(&cx, &NoExpressions);
        let (snap, table, id, balance) = accounts(&Snapshot::new(), &cx);

        let initial: PTree<_, _> = [(id, Value::Int(1)), (balance, Value::Int(5))].into_iter().collect();
        let (before, row) = w.insert_row(&snap, table, initial, None).unwrap();
        let after = w
            .update_row(&before, table, row, &change(balance, Value::Int(6)), None)
            .unwrap();

        assert_eq!(before.row(table, row).unwrap().value(balance), Some(&Value::Int(5)));
        assert_eq!(after.row(table, row).unwrap().value(balance), Some(&Value::Int(6)));
        assert_eq!(before.version_count() + 1, after.version_count());
    }

    #[test]
    fn row_version_serializes_as_json() {
        let values: PTree<ColumnId, Value> = [(2, Value::Int(7)), (3, Value::text("x"))].into_iter().collect();
        let version = RowVersion::apply_insert(1, 10, 4, Level::B, "loader", values);
        let json = serde_json::to_string(&version).unwrap();
        let back: RowVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);
        assert_eq!(back.provenance(), "loader");
    }
}

// ============================================================================
// TRANSACTION TESTS
// ============================================================================

mod transaction_tests {
    use super::*;

    fn setup(db: &Database) -> (TableId, ColumnId, ColumnId) {
        let mut txn = db.begin(TransactionContext::live("ddl"));
        let ids = txn
            .apply_with(|snap, cx| {
                let (snap, table, id, balance) = accounts(snap, cx);
                Ok((snap, (table, id, balance)))
            })
            .unwrap();
        txn.commit().unwrap();
        ids
    }

    #[test]
    fn failed_statement_does_not_poison_transaction() {
        let db = Database::new();
        let (table, id, _) = setup(&db);

        let mut txn = db.begin(TransactionContext::live("app"));
        txn.apply(|snap, cx| {
            let w = Writer::new(cx, &NoExpressions);
            w.insert_row(snap, table, change(id, Value::Int(1)), None).map(|(s, _)| s)
        })
        .unwrap();
        let duplicate = txn.apply(|snap, cx| {
            let w = Writer::new(cx, &NoExpressions);
            w.insert_row(snap, table, change(id, Value::Int(1)), None).map(|(s, _)| s)
        });
        assert!(duplicate.is_err());
        txn.commit().unwrap();

        assert_eq!(db.snapshot().table(table).unwrap().row_count(), 1);
        assert_eq!(db.generation(), 2);
    }

    #[test]
    fn rollback_publishes_nothing() {
        let db = Database::new();
        let (table, id, _) = setup(&db);
        let committed = db.snapshot();

        let mut txn = db.begin(TransactionContext::live("app"));
        txn.apply(|snap, cx| {
            Writer::new(cx, &NoExpressions)
                .insert_row(snap, table, change(id, Value::Int(1)), None)
                .map(|(s, _)| s)
        })
        .unwrap();
        txn.rollback();

        assert_eq!(db.snapshot(), committed);
    }

    #[test]
    fn concurrent_writers_first_committer_wins() {
        let db = Database::new();
        let (table, id, _) = setup(&db);

        let insert = |key: i64| {
            move |snap: &Snapshot, cx: &TransactionContext| {
                Writer::new(cx, &NoExpressions)
                    .insert_row(snap, table, change(id, Value::Int(key)), None)
                    .map(|(s, _)| s)
            }
        };
        let mut a = db.begin(TransactionContext::live("a"));
        let mut b = db.begin(TransactionContext::live("b"));
        a.apply(insert(1)).unwrap();
        b.apply(insert(2)).unwrap();
        a.commit().unwrap();
        assert!(b.commit().is_err());

        let mut retry = db.begin(TransactionContext::live("b"));
        retry.apply(insert(2)).unwrap();
        retry.commit().unwrap();
        assert_eq!(db.snapshot().table(table).unwrap().row_count(), 2);
    }

    #[test]
    fn readers_share_committed_snapshot_across_threads() {
        let db = std::sync::Arc::new(Database::new());
        let (table, _, _) = setup(&db);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.snapshot().table(table).unwrap().row_count())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 0);
        }
    }
}
