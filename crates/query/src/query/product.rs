use super::{subset, Fixed, Node, Phase, Query, Sel};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Error, Result};
use relq_storage::KeyRange;
use std::fmt;

/// Cartesian product of two sources with no columns in common.
pub struct Product {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    pub(crate) source2: Box<Query>,
    row1: Option<Row>,
    sel: Option<Sel>,
    hdr: Option<Header>,
}

impl Product {
    pub fn new(source: Query, source2: Query) -> Result<Query> {
        let cols2 = source2.columns();
        if let Some(c) = source.columns().into_iter().find(|c| cols2.contains(c)) {
            return Err(Error::duplicate_column("product", c));
        }
        Ok(Query::Product(Product::build(source, source2)))
    }

    fn build(source: Query, source2: Query) -> Product {
        Product {
            node: Node::default(),
            source: Box::new(source),
            source2: Box::new(source2),
            row1: None,
            sel: None,
            hdr: None,
        }
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        let mut cols = self.source.columns();
        cols.extend(self.source2.columns());
        cols
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        let mut keys = Vec::new();
        for k1 in self.source.keys() {
            for k2 in self.source2.keys() {
                let mut k = k1.clone();
                k.extend(k2);
                keys.push(k);
            }
        }
        keys
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        self.source.indexes()
    }

    pub(crate) fn header(&self) -> Header {
        self.source
            .header()
            .concat(&self.source2.header(), self.columns())
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        let mut fixed = self.source.fixed();
        fixed.extend(self.source2.fixed());
        fixed
    }

    pub(crate) fn nrecords(&self) -> f64 {
        self.source.nrecords() * self.source2.nrecords()
    }

    pub(crate) fn recordsize(&self) -> f64 {
        self.source.recordsize() + self.source2.recordsize()
    }

    pub(crate) fn updateable(&self) -> Option<String> {
        None
    }

    pub(crate) fn optimize2(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        if !subset(index, &self.source.columns()) {
            return super::IMPOSSIBLE;
        }
        let cols1: ColSet = self.source.columns().into_iter().collect();
        let needs1: ColSet = needs.intersection(&cols1).cloned().collect();
        let needs2: ColSet = needs.difference(&cols1).cloned().collect();
        let first1: ColSet = firstneeds.intersection(&cols1).cloned().collect();
        let cost1 = self
            .source
            .optimize(index, &needs1, &first1, is_cursor, phase);
        let cost2 = self
            .source2
            .optimize(&[], &needs2, &ColSet::new(), is_cursor, phase);
        cost1 + self.source.nrecords() * cost2
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        let (source, changed1) = (*self.source).transform1();
        let (source2, changed2) = (*self.source2).transform1();
        (
            Query::Product(Product::build(source, source2)),
            changed1 || changed2,
        )
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self.source2 = Box::new((*self.source2).add_index());
        self
    }

    /// Nested loop: source2 is reread for every row of source1.
    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.hdr.is_none() {
            self.hdr = Some(self.header());
        }
        loop {
            if self.row1.is_none() {
                self.row1 = self.source.get(dir)?;
                if self.row1.is_none() {
                    return Ok(None);
                }
                self.source2.rewind();
            }
            let Some(row2) = self.source2.get(dir)? else {
                self.row1 = None;
                continue;
            };
            let Some(row1) = &self.row1 else {
                continue;
            };
            let row = row1.clone().concat(row2);
            if let (Some(sel), Some(hdr)) = (&self.sel, &self.hdr) {
                if !sel.contains(hdr, &row) {
                    continue;
                }
            }
            return Ok(Some(row));
        }
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        self.row1 = None;
        if subset(index, &self.source.columns()) {
            self.sel = None;
            self.source.select(index, range)
        } else {
            self.sel = Sel::new(index, range);
            self.source.select(&[], &KeyRange::all())
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.row1 = None;
        self.source.rewind();
        self.source2.rewind();
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) times ({})", self.source, self.source2)
    }
}
