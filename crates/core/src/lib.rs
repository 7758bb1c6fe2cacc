//! relq Core - shared types for the relq query engine.
//!
//! This crate provides the foundational types used by the storage contract and
//! the query engine:
//!
//! - `Value`: Runtime values stored in record fields
//! - `Record`: A physical record with its storage address
//! - `Dir`: Iteration direction for `get`
//! - `Error`: Error types for query and storage operations
//!
//! # Example
//!
//! ```rust
//! use relq_core::{Record, Value};
//!
//! let rec = Record::new(1, vec![
//!     Value::Int64(1),
//!     Value::String("Alice".into()),
//! ]);
//!
//! assert_eq!(rec.adr(), 1);
//! assert_eq!(rec.get(1), Some(&Value::String("Alice".into())));
//! ```

mod dir;
mod error;
mod record;
mod value;

pub use dir::Dir;
pub use error::{Error, Result};
pub use record::{Adr, Record, DUMMY_ADR};
pub use value::Value;
