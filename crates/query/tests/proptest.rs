//! Property-based tests comparing committed plans with a naive evaluator.
//!
//! Every plan is also read backwards, which must give the same rows in
//! reverse order.

use proptest::prelude::*;
use relq_core::{Dir, Value};
use relq_query::expr::Expr;
use relq_query::query::{
    Difference, Intersect, Project, Select, Summarize, Summary, Table, Union,
};
use relq_query::{setup, Query};
use relq_storage::{MemoryStore, TableBuilder, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

type Tuple = (i64, i64, i64);

/// Strategy for rows of (a, b) with small domains so that duplicates and
/// overlaps between tables are common. The id column is the row position.
fn rows_strategy(max_rows: usize) -> impl Strategy<Value = Vec<Tuple>> {
    prop::collection::vec((0i64..4, 0i64..3), 0..max_rows).prop_map(|values| {
        values
            .into_iter()
            .enumerate()
            .map(|(i, (a, b))| (i as i64, a, b))
            .collect()
    })
}

fn database(t1: &[Tuple], t2: &[Tuple]) -> Rc<dyn Transaction> {
    let store = MemoryStore::new();
    for (name, rows) in [("t1", t1), ("t2", t2)] {
        let schema = TableBuilder::new(name)
            .unwrap()
            .add_columns(&["id", "a", "b"])
            .unwrap()
            .add_key(&["id"])
            .unwrap()
            .add_index(&["a"])
            .unwrap()
            .build()
            .unwrap();
        store.create_table(schema).unwrap();
        store
            .insert_all(
                name,
                rows.iter()
                    .map(|&(id, a, b)| vec![Value::Int64(id), Value::Int64(a), Value::Int64(b)])
                    .collect(),
            )
            .unwrap();
    }
    Rc::new(store)
}

fn table(tran: &Rc<dyn Transaction>, name: &str) -> Query {
    Table::new(Rc::clone(tran), name).unwrap()
}

/// Runs a plan both ways and returns the forward rows.
fn execute(q: Query, tran: &Rc<dyn Transaction>, cols: &[&str]) -> Vec<Vec<Value>> {
    let mut q = setup(q, tran, false).unwrap();
    let hdr = q.header();
    let cols: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
    let mut fwd = Vec::new();
    while let Some(row) = q.get(Dir::Next).unwrap() {
        fwd.push(row.values(&hdr, &cols));
    }
    let mut bwd = Vec::new();
    while let Some(row) = q.get(Dir::Prev).unwrap() {
        bwd.push(row.values(&hdr, &cols));
    }
    bwd.reverse();
    assert_eq!(fwd, bwd, "direction mismatch for {}", q);
    fwd
}

fn as_set(rows: Vec<Vec<Value>>) -> BTreeSet<Vec<Value>> {
    rows.into_iter().collect()
}

fn ints(vals: &[i64]) -> Vec<Value> {
    vals.iter().map(|&v| Value::Int64(v)).collect()
}

fn tuples(rows: &[Tuple]) -> BTreeSet<Vec<Value>> {
    rows.iter().map(|&(id, a, b)| ints(&[id, a, b])).collect()
}

proptest! {
    /// Property: a select on an indexed column returns exactly the matching rows.
    #[test]
    fn select_matches_filter(t1 in rows_strategy(30), lo in 0i64..4, hi in 0i64..4) {
        let tran = database(&t1, &[]);
        let expr = Expr::and(vec![
            Expr::ge(Expr::column("a"), Expr::constant(lo)),
            Expr::le(Expr::column("a"), Expr::constant(hi)),
        ]);
        let q = Select::new(table(&tran, "t1"), expr).unwrap();
        let got = execute(q, &tran, &["id", "a", "b"]);
        let expected: Vec<Tuple> = t1.iter().copied().filter(|&(_, a, _)| a >= lo && a <= hi).collect();
        prop_assert_eq!(got.len(), expected.len());
        prop_assert_eq!(as_set(got), tuples(&expected));
    }

    /// Property: projection yields each distinct value once.
    #[test]
    fn project_is_distinct(t1 in rows_strategy(30)) {
        let tran = database(&t1, &[]);
        let q = Project::new(table(&tran, "t1"), &["b"]).unwrap();
        let got = execute(q, &tran, &["b"]);
        let expected: BTreeSet<Vec<Value>> = t1.iter().map(|&(_, _, b)| ints(&[b])).collect();
        prop_assert_eq!(got.len(), expected.len());
        prop_assert_eq!(as_set(got), expected);
    }

    /// Property: grouped totals and counts equal a map-based evaluation.
    #[test]
    fn summarize_matches_reference(t1 in rows_strategy(30)) {
        let tran = database(&t1, &[]);
        let q = Summarize::new(
            table(&tran, "t1"),
            &["a"],
            vec![Summary::count(), Summary::total("b")],
        )
        .unwrap();
        let got = execute(q, &tran, &["a", "count", "total_b"]);
        let mut groups: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
        for &(_, a, b) in &t1 {
            let g = groups.entry(a).or_default();
            g.0 += 1;
            g.1 += b;
        }
        let expected: BTreeSet<Vec<Value>> = groups
            .into_iter()
            .map(|(a, (n, total))| ints(&[a, n, total]))
            .collect();
        prop_assert_eq!(got.len(), expected.len());
        prop_assert_eq!(as_set(got), expected);
    }

    /// Property: set operations agree with set arithmetic on the rows.
    #[test]
    fn set_operations_match_reference(t1 in rows_strategy(20), t2 in rows_strategy(20)) {
        let tran = database(&t1, &t2);
        let s1 = tuples(&t1);
        let s2 = tuples(&t2);
        let cols = ["id", "a", "b"];

        let q = Union::new(table(&tran, "t1"), table(&tran, "t2"));
        let got = execute(q, &tran, &cols);
        let expected: BTreeSet<Vec<Value>> = s1.union(&s2).cloned().collect();
        prop_assert_eq!(got.len(), expected.len());
        prop_assert_eq!(as_set(got), expected);

        let q = Intersect::new(table(&tran, "t1"), table(&tran, "t2"));
        let got = execute(q, &tran, &cols);
        let expected: BTreeSet<Vec<Value>> = s1.intersection(&s2).cloned().collect();
        prop_assert_eq!(as_set(got), expected);

        let q = Difference::new(table(&tran, "t1"), table(&tran, "t2"));
        let got = execute(q, &tran, &cols);
        let expected: BTreeSet<Vec<Value>> = s1.difference(&s2).cloned().collect();
        prop_assert_eq!(as_set(got), expected);
    }

    /// Property: a select above a union gives the same rows as the union of
    /// the selected sides.
    #[test]
    fn select_distributes_over_union(t1 in rows_strategy(20), t2 in rows_strategy(20), v in 0i64..3) {
        let tran = database(&t1, &t2);
        let pred = || Expr::eq(Expr::column("b"), Expr::constant(v));
        let q = Select::new(Union::new(table(&tran, "t1"), table(&tran, "t2")), pred()).unwrap();
        let above = as_set(execute(q, &tran, &["id", "a", "b"]));
        let q = Union::new(
            Select::new(table(&tran, "t1"), pred()).unwrap(),
            Select::new(table(&tran, "t2"), pred()).unwrap(),
        );
        let below = as_set(execute(q, &tran, &["id", "a", "b"]));
        prop_assert_eq!(above, below);
    }
}
