//! Fuzz test for unique-index maintenance
//!
//! Interprets the input as a sequence of insert/delete/re-key operations on a
//! table with a primary key and checks after every step that:
//! - no key tuple maps to two rows
//! - every index entry points at a live row carrying that key
//! - a failed operation never changes the snapshot
//!
//! Run with: cargo +nightly fuzz run fuzz_index_ops -- -max_total_time=60

#![no_main]

use ferrule::{ColumnDef, IndexSpec, NoExpressions, PTree, Snapshot, TransactionContext, Value, Writer};
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeSet;

fuzz_target!(|data: &[u8]| {
    let cx = TransactionContext::live("fuzz");
    let w = Writer::new(&cx, &NoExpressions);
    let Ok((snap, table)) = w.create_table(&Snapshot::new(), "T", vec![ColumnDef::new("K")]) else {
        return;
    };
    let key = snap.table(table).unwrap().column_id("K").unwrap();
    let (mut snap, pk) = w
        .create_index(&snap, IndexSpec::primary_key(table, vec![key]))
        .unwrap();

    for chunk in data.chunks(2) {
        let (op, arg) = (chunk[0], chunk.get(1).copied().unwrap_or(0));
        let rows: Vec<_> = snap.table(table).unwrap().rows().keys().copied().collect();
        let k: PTree<_, _> = [(key, Value::Int(i64::from(arg % 32)))].into_iter().collect();
        let before = snap.clone();
        let result = match op % 3 {
            0 => w.insert_row(&snap, table, k, None).map(|(s, _)| s),
            1 if !rows.is_empty() => w.delete_row(&snap, table, rows[arg as usize % rows.len()]),
            2 if !rows.is_empty() => {
                w.update_row(&snap, table, rows[op as usize % rows.len()], &k, None)
            }
            _ => continue,
        };
        match result {
            Ok(next) => snap = next,
            Err(_) => assert_eq!(snap, before),
        }

        let t = snap.table(table).unwrap();
        let mut seen = BTreeSet::new();
        for (tuple, row) in snap.index(pk).unwrap().entries() {
            assert!(seen.insert(tuple.clone()), "duplicate key {:?}", tuple);
            assert_eq!(t.row(row).unwrap().value(key), tuple.first());
        }
        assert_eq!(seen.len(), t.row_count());
    }
});
