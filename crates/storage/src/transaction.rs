//! The storage contract consumed by the query engine.

use crate::key_range::{Key, KeyRange};
use crate::schema::TableSchema;
use relq_core::{Adr, Dir, Record, Result, Value};

/// Smallest fraction `rangefrac` reports, so that selectivity products stay positive.
pub const MIN_FRAC: f64 = 0.0001;

/// Position of an entry within an index: its key plus the record address,
/// which makes entries of non-unique indexes distinct.
pub type IndexPos = (Key, Adr);

/// One entry returned by an index seek.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
    /// Index key values.
    pub key: Key,
    /// The record the entry points to.
    pub record: Record,
}

impl IndexEntry {
    /// Returns the position to resume from after this entry.
    pub fn pos(&self) -> IndexPos {
        (self.key.clone(), self.record.adr())
    }
}

/// A transaction as seen by the query engine.
///
/// Implementations are used through a shared `Rc<dyn Transaction>`, so write
/// methods take `&self` and rely on interior mutability.
pub trait Transaction {
    /// Returns the schema of a table.
    fn schema(&self, table: &str) -> Result<TableSchema>;

    /// Returns the number of records in a table.
    fn nrecords(&self, table: &str) -> usize;

    /// Returns the average record size of a table.
    fn recordsize(&self, table: &str) -> usize;

    /// Returns the average column size of a table.
    fn columnsize(&self, table: &str) -> usize {
        let ncols = self.schema(table).map(|s| s.columns().len()).unwrap_or(1);
        (self.recordsize(table) / ncols.max(1)).max(1)
    }

    /// Estimates the fraction of records whose `index` key falls in `range`.
    /// The result is within `[MIN_FRAC, 1]`.
    fn rangefrac(&self, table: &str, index: &[String], range: &KeyRange) -> f64;

    /// Returns the next entry of `index` within `range` in direction `dir`,
    /// strictly after (Next) or before (Prev) `from` when given.
    fn seek(
        &self,
        table: &str,
        index: &[String],
        range: &KeyRange,
        from: Option<&IndexPos>,
        dir: Dir,
    ) -> Result<Option<IndexEntry>>;

    /// Adds a record, returning its address.
    fn output(&self, table: &str, values: Vec<Value>) -> Result<Adr>;

    /// Removes the record at an address.
    fn remove(&self, table: &str, adr: Adr) -> Result<()>;

    /// Reads the record at an address.
    fn input(&self, table: &str, adr: Adr) -> Result<Record>;
}
