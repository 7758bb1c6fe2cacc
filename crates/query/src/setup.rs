//! Turning a built operator tree into an executable plan.

use crate::cache::ColSet;
use crate::config::QueryConfig;
use crate::query::{Phase, Query, IMPOSSIBLE};
use relq_core::{Error, Result};
use relq_storage::Transaction;
use std::rc::Rc;

/// Prepares a query for iteration with the default configuration.
///
/// See [`setup_with_config`].
pub fn setup(query: Query, tran: &Rc<dyn Transaction>, is_cursor: bool) -> Result<Query> {
    setup_with_config(query, tran, is_cursor, &QueryConfig::default())
}

/// Prepares a query for iteration.
///
/// Rewrites the tree, binds it to `tran`, commits the cheapest plan and adds
/// the temporary indexes that plan needs. A cursor may not use temporary
/// indexes or other materializing strategies.
///
/// # Errors
///
/// Returns `Error::InvalidQuery` when no feasible plan exists.
pub fn setup_with_config(
    query: Query,
    tran: &Rc<dyn Transaction>,
    is_cursor: bool,
    config: &QueryConfig,
) -> Result<Query> {
    let mut q = query.transform();
    q.set_transaction(tran);
    q.configure(config);
    let needs: ColSet = q.columns().into_iter().collect();
    let cost = q.optimize(&[], &needs, &ColSet::new(), is_cursor, Phase::Commit);
    if cost >= IMPOSSIBLE {
        tracing::debug!(query = %q, "no feasible plan");
        return Err(Error::InvalidQuery);
    }
    let q = q.add_index();
    tracing::debug!(plan = %q, cost, "query setup");
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::query::{Project, Select, Sort, Table};
    use relq_core::{Dir, Value};
    use relq_storage::{MemoryStore, TableBuilder};

    fn tran() -> Rc<dyn Transaction> {
        let store = MemoryStore::new();
        let schema = TableBuilder::new("t")
            .unwrap()
            .add_columns(&["a", "b"])
            .unwrap()
            .add_key(&["a"])
            .unwrap()
            .build()
            .unwrap();
        store.create_table(schema).unwrap();
        store
            .insert_all(
                "t",
                (0..5)
                    .map(|i| vec![Value::Int64(i), Value::Int64(i % 2)])
                    .collect(),
            )
            .unwrap();
        Rc::new(store)
    }

    #[test]
    fn test_setup_runs_plan() {
        let tran = tran();
        let t = Table::new(Rc::clone(&tran), "t").unwrap();
        let q = Select::new(t, Expr::ge(Expr::column("a"), Expr::constant(3))).unwrap();
        let mut q = setup(q, &tran, false).unwrap();
        let mut n = 0;
        while q.get(Dir::Next).unwrap().is_some() {
            n += 1;
        }
        assert_eq!(n, 2);
    }

    #[test]
    fn test_cursor_rejects_temp_index() {
        let tran = tran();
        let t = Table::new(Rc::clone(&tran), "t").unwrap();
        let q = Sort::new(t, false, &["b"]).unwrap();
        assert_eq!(setup(q, &tran, true).unwrap_err(), Error::InvalidQuery);

        let t = Table::new(Rc::clone(&tran), "t").unwrap();
        let q = Sort::new(t, false, &["b"]).unwrap();
        let q = setup(q, &tran, false).unwrap();
        assert!(q.to_string().contains("tempindex(b)"));
    }

    #[test]
    fn test_cursor_rejects_lookup_project() {
        let tran = tran();
        let t = Table::new(Rc::clone(&tran), "t").unwrap();
        let q = Project::new(t, &["b"]).unwrap();
        assert_eq!(setup(q, &tran, true).unwrap_err(), Error::InvalidQuery);
    }
}
