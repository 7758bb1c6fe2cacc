//! State shared by the operators over two union-compatible sources.

use super::{set_of, union_cols, Fixed, Query};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Result, Value};
use relq_storage::KeyRange;

pub(crate) struct Compatible {
    pub(crate) source: Box<Query>,
    pub(crate) source2: Box<Query>,
    /// Columns of either side; rows are compared on all of them, a missing
    /// column reading as the empty value.
    pub(crate) allcols: Vec<String>,
    /// Key of the looked-up side.
    pub(crate) key: Vec<String>,
    pub(crate) hdr1: Option<Header>,
    pub(crate) hdr2: Option<Header>,
}

impl Compatible {
    pub(crate) fn new(source: Query, source2: Query) -> Self {
        let allcols = union_cols(&source.columns(), &source2.columns());
        Self {
            source: Box::new(source),
            source2: Box::new(source2),
            allcols,
            key: Vec::new(),
            hdr1: None,
            hdr2: None,
        }
    }

    /// Recomputes derived state after the sources changed.
    pub(crate) fn rebuild(self) -> Self {
        Compatible::new(*self.source, *self.source2)
    }

    pub(crate) fn transform(self) -> (Self, bool) {
        let (source, changed1) = (*self.source).transform1();
        let (source2, changed2) = (*self.source2).transform1();
        (Compatible::new(source, source2), changed1 || changed2)
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self.source2 = Box::new((*self.source2).add_index());
        self
    }

    pub(crate) fn swap(&mut self) {
        std::mem::swap(&mut self.source, &mut self.source2);
        self.hdr1 = None;
        self.hdr2 = None;
    }

    pub(crate) fn headers(&mut self) {
        if self.hdr1.is_none() {
            self.hdr1 = Some(self.source.header());
            self.hdr2 = Some(self.source2.header());
        }
    }

    /// Returns a column whose possible values can't overlap between the two
    /// sides, making their rows disjoint.
    pub(crate) fn disjoint(&self) -> Option<String> {
        let cols1 = self.source.columns();
        let cols2 = self.source2.columns();
        let fixed1 = self.source.fixed();
        let fixed2 = self.source2.fixed();
        let values = |fixed: &[Fixed], cols: &[String], field: &str| -> Option<Vec<Value>> {
            match fixed.iter().find(|f| f.field == field) {
                Some(f) => Some(f.values.clone()),
                None if !cols.iter().any(|c| c == field) => Some(vec![Value::Null]),
                None => None,
            }
        };
        let fields = fixed1.iter().chain(&fixed2).map(|f| f.field.clone());
        for field in fields {
            let (Some(v1), Some(v2)) = (
                values(&fixed1, &cols1, &field),
                values(&fixed2, &cols2, &field),
            ) else {
                continue;
            };
            if !v1.iter().any(|v| v2.contains(v)) {
                return Some(field);
            }
        }
        None
    }

    pub(crate) fn cols1(&self) -> ColSet {
        set_of(&self.source.columns())
    }

    pub(crate) fn cols2(&self) -> ColSet {
        set_of(&self.source2.columns())
    }

    /// Compares a row of each side on every column.
    pub(crate) fn equal(&self, row1: &Row, row2: &Row) -> bool {
        let (Some(h1), Some(h2)) = (&self.hdr1, &self.hdr2) else {
            return false;
        };
        self.allcols
            .iter()
            .all(|c| row1.get(h1, c) == row2.get(h2, c))
    }

    /// Looks for a row of source2 equal to a row of source1.
    pub(crate) fn in_source2(&mut self, row1: &Row) -> Result<bool> {
        let (Some(h1), Some(h2)) = (&self.hdr1, &self.hdr2) else {
            return Ok(false);
        };
        let vals = row1.values(h1, &self.key);
        self.source2.select(&self.key, &KeyRange::point(vals))?;
        while let Some(row2) = self.source2.get(Dir::Next)? {
            if self.allcols.iter().all(|c| row1.get(h1, c) == row2.get(h2, c)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Looks for a row of source1 equal to a row of source2.
    pub(crate) fn in_source1(&mut self, row2: &Row) -> Result<bool> {
        let (Some(h1), Some(h2)) = (&self.hdr1, &self.hdr2) else {
            return Ok(false);
        };
        let vals = row2.values(h2, &self.key);
        self.source.select(&self.key, &KeyRange::point(vals))?;
        while let Some(row1) = self.source.get(Dir::Next)? {
            if self.allcols.iter().all(|c| row1.get(h1, c) == row2.get(h2, c)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
