//! Record structure for relq.
//!
//! A `Record` is one physical record: the field values plus the storage address
//! it was read from. Rows handed between operators are sequences of records.

use crate::value::Value;
use std::rc::Rc;

/// Storage address of a record.
pub type Adr = u64;

/// Address used for records that don't correspond to a stored entry
/// (e.g. index keys, computed columns, aggregate results).
pub const DUMMY_ADR: Adr = u64::MAX;

/// A physical record.
///
/// Values are shared so that rows can be cloned cheaply while they flow
/// through the operator tree.
#[derive(Clone, Debug)]
pub struct Record {
    /// Address of the stored record, or `DUMMY_ADR`.
    adr: Adr,
    /// Field values, indexed by position in the owning header group.
    values: Rc<[Value]>,
}

impl Record {
    /// Creates a record read from the given address.
    pub fn new(adr: Adr, values: Vec<Value>) -> Self {
        Self {
            adr,
            values: values.into(),
        }
    }

    /// Creates a record with no storage address.
    pub fn dummy(values: Vec<Value>) -> Self {
        Self::new(DUMMY_ADR, values)
    }

    /// Creates an empty record, used for unset row slots.
    pub fn empty() -> Self {
        Self::dummy(Vec::new())
    }

    /// Returns the storage address.
    #[inline]
    pub fn adr(&self) -> Adr {
        self.adr
    }

    /// Returns true if this record has no storage address.
    #[inline]
    pub fn is_dummy(&self) -> bool {
        self.adr == DUMMY_ADR
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Gets a value at the given field position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the number of values in this record.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this record has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.adr == other.adr && self.values == other.values
    }
}

impl Eq for Record {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_new() {
        let rec = Record::new(7, vec![Value::Int64(42), Value::String("Alice".into())]);
        assert_eq!(rec.adr(), 7);
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.get(1), Some(&Value::String("Alice".into())));
        assert_eq!(rec.get(2), None);
    }

    #[test]
    fn test_record_dummy() {
        let rec = Record::dummy(vec![Value::Int64(1)]);
        assert!(rec.is_dummy());
        assert!(Record::empty().is_empty());
    }

    #[test]
    fn test_record_equality() {
        let a = Record::new(1, vec![Value::Int64(42)]);
        let b = Record::new(1, vec![Value::Int64(42)]);
        let c = Record::new(2, vec![Value::Int64(42)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
