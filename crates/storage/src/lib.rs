//! relq Storage - the storage collaborator of the relq query engine.
//!
//! This crate provides:
//!
//! - `Transaction`: The narrow storage contract the query engine consumes
//! - `TableSchema` / `TableBuilder`: Columns, keys and indexes of a table
//! - `KeyRange`: Prefix key ranges for index seeks and selectivity estimates
//! - `MemoryStore`: An in-memory `Transaction` used by tests and benchmarks
//!
//! # Example
//!
//! ```rust
//! use relq_storage::{KeyRange, MemoryStore, TableBuilder, Transaction};
//! use relq_core::{Dir, Value};
//!
//! let store = MemoryStore::new();
//! let schema = TableBuilder::new("users")
//!     .unwrap()
//!     .add_columns(&["id", "name"])
//!     .unwrap()
//!     .add_key(&["id"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! store.create_table(schema).unwrap();
//! store.output("users", vec![Value::Int64(1), Value::String("Alice".into())]).unwrap();
//!
//! let index = vec!["id".to_string()];
//! let first = store
//!     .seek("users", &index, &KeyRange::all(), None, Dir::Next)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(first.key, vec![Value::Int64(1)]);
//! ```

pub mod key_range;
pub mod memory;
pub mod schema;
pub mod transaction;

pub use key_range::{Key, KeyBound, KeyRange};
pub use memory::MemoryStore;
pub use schema::{TableBuilder, TableSchema};
pub use transaction::{IndexEntry, IndexPos, Transaction, MIN_FRAC};
