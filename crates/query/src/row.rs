//! Rows flowing between operators.

use crate::header::Header;
use relq_core::{Adr, Record, Value};

/// A tuple, as the sequence of physical records it was assembled from.
///
/// Records line up with the groups of the producing operator's `Header`.
/// Slots may hold empty records, e.g. for the side of a union that did not
/// produce the row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    recs: Vec<Record>,
}

impl Row {
    /// Creates a row from records.
    pub fn new(recs: Vec<Record>) -> Self {
        Self { recs }
    }

    /// Row for a stored record: an empty key slot followed by the data.
    pub fn from_record(rec: Record) -> Self {
        Self::new(vec![Record::empty(), rec])
    }

    /// A row of `n` empty records.
    pub fn empty(n: usize) -> Self {
        Self::new(vec![Record::empty(); n])
    }

    /// Returns the records.
    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.recs
    }

    /// Returns the number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.recs.len()
    }

    /// Returns true if the row has no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.recs.is_empty()
    }

    /// Gets a column value. Rule columns and columns whose record slot is
    /// empty yield the empty value.
    pub fn get(&self, hdr: &Header, col: &str) -> Value {
        for (g, p) in hdr.find(col) {
            if let Some(rec) = self.recs.get(g) {
                if !rec.is_empty() {
                    return rec.get(p).cloned().unwrap_or_default();
                }
            }
        }
        Value::Null
    }

    /// Gets the values of several columns.
    pub fn values(&self, hdr: &Header, cols: &[String]) -> Vec<Value> {
        cols.iter().map(|c| self.get(hdr, c)).collect()
    }

    /// Addresses of the data records, used as the row's identity.
    pub fn refs(&self) -> Vec<Adr> {
        self.recs.iter().skip(1).step_by(2).map(Record::adr).collect()
    }

    /// The first data record, i.e. the stored record an updateable row maps to.
    pub fn data_record(&self) -> Option<&Record> {
        self.recs.get(1)
    }

    /// Concatenates two rows.
    pub fn concat(mut self, other: Row) -> Row {
        self.recs.extend(other.recs);
        self
    }

    /// Appends records.
    pub fn push(&mut self, rec: Record) {
        self.recs.push(rec);
    }
}
