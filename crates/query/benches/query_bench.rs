//! Benchmarks for query setup and execution.
//!
//! Setup (rewrite + optimize) and iteration are measured separately: plans are
//! built in the batch setup closure so that only the measured phase is timed.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use relq_core::{Dir, Value};
use relq_query::expr::Expr;
use relq_query::query::{Join, Project, Select, Summarize, Summary, Table, Union};
use relq_query::{setup, Query};
use relq_storage::{MemoryStore, TableBuilder, Transaction};
use std::rc::Rc;

// ============================================================================
// Data Generation Utilities
// ============================================================================

/// Simple LCG for reproducible pseudo-random shuffling
fn shuffle_indices(count: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..count).collect();
    let mut s = seed;
    for i in (1..count).rev() {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        let j = (s as usize) % (i + 1);
        indices.swap(i, j);
    }
    indices
}

/// Creates `orders(id, customer, amount)` and `customers(customer, name)`,
/// inserted in shuffled order.
fn create_store(count: usize) -> Rc<dyn Transaction> {
    let store = MemoryStore::new();
    let orders = TableBuilder::new("orders")
        .unwrap()
        .add_columns(&["id", "customer", "amount"])
        .unwrap()
        .add_key(&["id"])
        .unwrap()
        .add_index(&["customer"])
        .unwrap()
        .build()
        .unwrap();
    store.create_table(orders).unwrap();
    let customers = TableBuilder::new("customers")
        .unwrap()
        .add_columns(&["customer", "name"])
        .unwrap()
        .add_key(&["customer"])
        .unwrap()
        .build()
        .unwrap();
    store.create_table(customers).unwrap();

    let ncustomers = (count / 10).max(1);
    let rows = shuffle_indices(count, 12345)
        .into_iter()
        .map(|i| {
            vec![
                Value::Int64(i as i64),
                Value::Int64((i % ncustomers) as i64),
                Value::Int64((i % 100) as i64),
            ]
        })
        .collect();
    store.insert_all("orders", rows).unwrap();
    let rows = shuffle_indices(ncustomers, 67890)
        .into_iter()
        .map(|i| vec![Value::Int64(i as i64), Value::String(format!("name_{}", i))])
        .collect();
    store.insert_all("customers", rows).unwrap();
    Rc::new(store)
}

fn table(tran: &Rc<dyn Transaction>, name: &str) -> Query {
    Table::new(Rc::clone(tran), name).unwrap()
}

fn drain(mut q: Query) -> usize {
    let mut n = 0;
    while let Some(row) = q.get(Dir::Next).unwrap() {
        black_box(row);
        n += 1;
    }
    n
}

// ============================================================================
// Plans
// ============================================================================

fn select_range(tran: &Rc<dyn Transaction>, count: usize) -> Query {
    let expr = Expr::and(vec![
        Expr::ge(Expr::column("id"), Expr::constant(count as i64 / 4)),
        Expr::lt(Expr::column("id"), Expr::constant(count as i64 / 2)),
    ]);
    Select::new(table(tran, "orders"), expr).unwrap()
}

fn project_lookup(tran: &Rc<dyn Transaction>) -> Query {
    Project::new(table(tran, "orders"), &["amount"]).unwrap()
}

fn summarize_by_customer(tran: &Rc<dyn Transaction>) -> Query {
    Summarize::new(
        table(tran, "orders"),
        &["customer"],
        vec![Summary::count(), Summary::total("amount")],
    )
    .unwrap()
}

fn join_customers(tran: &Rc<dyn Transaction>) -> Query {
    Join::new(table(tran, "orders"), table(tran, "customers")).unwrap()
}

fn union_select(tran: &Rc<dyn Transaction>) -> Query {
    let lo = Select::new(
        table(tran, "orders"),
        Expr::lt(Expr::column("amount"), Expr::constant(10)),
    )
    .unwrap();
    let hi = Select::new(
        table(tran, "orders"),
        Expr::gt(Expr::column("amount"), Expr::constant(90)),
    )
    .unwrap();
    Union::new(lo, hi)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("setup");
    let tran = create_store(1000);

    group.bench_function("select", |b| {
        b.iter_batched(
            || select_range(&tran, 1000),
            |q| black_box(setup(q, &tran, false).unwrap()),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("join", |b| {
        b.iter_batched(
            || join_customers(&tran),
            |q| black_box(setup(q, &tran, false).unwrap()),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("union", |b| {
        b.iter_batched(
            || union_select(&tran),
            |q| black_box(setup(q, &tran, false).unwrap()),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let plans: [(&str, fn(&Rc<dyn Transaction>, usize) -> Query); 5] = [
        ("select_range", select_range),
        ("project_lookup", |t, _| project_lookup(t)),
        ("summarize", |t, _| summarize_by_customer(t)),
        ("join", |t, _| join_customers(t)),
        ("union", |t, _| union_select(t)),
    ];
    for (name, plan) in plans {
        let mut group = c.benchmark_group(name);
        for size in [1000usize, 10000].iter() {
            let tran = create_store(*size);
            group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
                b.iter_batched(
                    || setup(plan(&tran, size), &tran, false).unwrap(),
                    |q| black_box(drain(q)),
                    BatchSize::SmallInput,
                )
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_setup, bench_execute);
criterion_main!(benches);
