//! Index and cascade benchmarks for ferrule
//!
//! - Persistent tree insert and lookup
//! - Row insert through a primary key and a foreign key
//! - Cascading delete of a parent with many dependents

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ferrule::index::ReferentialAction;
use ferrule::types::{ColumnId, TableId};
use ferrule::{ColumnDef, IndexSpec, NoExpressions, PTree, Snapshot, TransactionContext, Value, Writer};

fn one(column: ColumnId, v: i64) -> PTree<ColumnId, Value> {
    [(column, Value::Int(v))].into_iter().collect()
}

fn bench_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("ptree");

    for count in [1_000u64, 10_000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::new("insert", count), count, |b, &count| {
            b.iter(|| {
                let mut tree = PTree::new();
                for i in 0..count {
                    tree = tree.insert(i.wrapping_mul(2_654_435_761) % count, i);
                }
                black_box(tree.len())
            });
        });

        let tree: PTree<u64, u64> = (0..*count).map(|i| (i, i)).collect();
        group.bench_with_input(BenchmarkId::new("get", count), count, |b, &count| {
            b.iter(|| {
                let mut hits = 0;
                for i in 0..count {
                    hits += tree.get(&i).is_some() as u64;
                }
                black_box(hits)
            });
        });
    }

    group.finish();
}

struct Schema {
    snap: Snapshot,
    orders: TableId,
    order_id: ColumnId,
    items: TableId,
    item_order: ColumnId,
}

fn schema(w: &Writer<'_>) -> Schema {
    let (snap, orders) = w
        .create_table(&Snapshot::new(), "Orders", vec![ColumnDef::new("OrderId").not_null()])
        .unwrap();
    let order_id = snap.table(orders).unwrap().column_id("OrderId").unwrap();
    let (snap, pk) = w
        .create_index(&snap, IndexSpec::primary_key(orders, vec![order_id]))
        .unwrap();
    let (snap, items) = w
        .create_table(&snap, "Items", vec![ColumnDef::new("OrderId")])
        .unwrap();
    let item_order = snap.table(items).unwrap().column_id("OrderId").unwrap();
    let (snap, _) = w
        .create_index(
            &snap,
            IndexSpec::foreign_key(items, vec![item_order], pk).on_delete(ReferentialAction::Cascade),
        )
        .unwrap();
    Schema {
        snap,
        orders,
        order_id,
        items,
        item_order,
    }
}

fn bench_rows(c: &mut Criterion) {
    let cx = TransactionContext::live("bench");
    let w = Writer::new(&cx, &NoExpressions);
    let base = schema(&w);
    let mut group = c.benchmark_group("rows");

    group.throughput(Throughput::Elements(1_000));
    group.bench_function("insert_with_fk", |b| {
        b.iter(|| {
            let mut snap = w
                .insert_row(&base.snap, base.orders, one(base.order_id, 1), None)
                .unwrap()
                .0;
            for _ in 0..1_000 {
                snap = w
                    .insert_row(&snap, base.items, one(base.item_order, 1), None)
                    .unwrap()
                    .0;
            }
            black_box(snap)
        });
    });

    for dependents in [10usize, 1_000].iter() {
        let (mut snap, parent) = w
            .insert_row(&base.snap, base.orders, one(base.order_id, 1), None)
            .unwrap();
        for _ in 0..*dependents {
            snap = w
                .insert_row(&snap, base.items, one(base.item_order, 1), None)
                .unwrap()
                .0;
        }
        group.throughput(Throughput::Elements(*dependents as u64));
        group.bench_with_input(
            BenchmarkId::new("cascade_delete", dependents),
            &snap,
            |b, snap| {
                b.iter(|| black_box(w.delete_row(snap, base.orders, parent).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_tree, bench_rows);
criterion_main!(benches);
