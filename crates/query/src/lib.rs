//! relq Query - relational operator algebra, optimizer and executor.
//!
//! This crate provides the query engine:
//!
//! - `query`: The operator tree, its rewrite rules, cost model and iteration
//! - `expr`: Expressions used by select and extend
//! - `header`: Logical row layout
//! - `row`: Rows as sequences of stored records
//! - `cache`: Per-operator memo of optimization costs
//! - `setup`: Turning a built tree into an executable plan
//! - `action`: Delete and insert over queries
//! - `config`: Runtime settings
//!
//! # Example
//!
//! ```rust
//! use relq_core::{Dir, Value};
//! use relq_query::expr::Expr;
//! use relq_query::query::{Select, Table};
//! use relq_query::setup;
//! use relq_storage::{MemoryStore, TableBuilder, Transaction};
//! use std::rc::Rc;
//!
//! let store = MemoryStore::new();
//! let schema = TableBuilder::new("users").unwrap()
//!     .add_columns(&["id", "age"]).unwrap()
//!     .add_key(&["id"]).unwrap()
//!     .build().unwrap();
//! store.create_table(schema).unwrap();
//! store.insert_all("users", vec![
//!     vec![Value::Int64(1), Value::Int64(30)],
//!     vec![Value::Int64(2), Value::Int64(17)],
//! ]).unwrap();
//! let tran: Rc<dyn Transaction> = Rc::new(store);
//!
//! let users = Table::new(Rc::clone(&tran), "users").unwrap();
//! let adults = Select::new(users, Expr::ge(Expr::column("age"), Expr::constant(18))).unwrap();
//! let mut q = setup(adults, &tran, false).unwrap();
//! let hdr = q.header();
//! let row = q.get(Dir::Next).unwrap().unwrap();
//! assert_eq!(row.get(&hdr, "id"), Value::Int64(1));
//! assert!(q.get(Dir::Next).unwrap().is_none());
//! ```

pub mod action;
pub mod cache;
pub mod config;
pub mod expr;
pub mod header;
pub mod query;
pub mod row;
mod setup;

pub use action::{Delete, InsertQuery, InsertRecord};
pub use config::QueryConfig;
pub use query::{Phase, Query};
pub use setup::{setup, setup_with_config};
