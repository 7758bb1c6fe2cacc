use super::{fmt_cols, intersect_cols, subset, Fixed, Node, Phase, Query, Sel, IMPOSSIBLE};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Error, Result};
use relq_storage::KeyRange;
use std::fmt;

/// Joins rows of two sources on their common columns.
///
/// For each row of source1, source2 is selected on the join columns. A left
/// join also emits source1 rows with no match, padded with empty values.
pub struct Join {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    pub(crate) source2: Box<Query>,
    pub(crate) by: Vec<String>,
    pub(crate) left: bool,
    row1: Option<Row>,
    matched: bool,
    padded: bool,
    sel: Option<Sel>,
    hdr: Option<Header>,
    hdr1: Option<Header>,
    size2: usize,
}

impl Join {
    /// An inner join.
    pub fn new(source: Query, source2: Query) -> Result<Query> {
        Join::create(source, source2, false)
    }

    /// A left outer join.
    pub fn left(source: Query, source2: Query) -> Result<Query> {
        Join::create(source, source2, true)
    }

    fn create(source: Query, source2: Query, left: bool) -> Result<Query> {
        let by = intersect_cols(&source.columns(), &source2.columns());
        if by.is_empty() {
            return Err(Error::invalid_operation(
                "join requires common columns, use product instead",
            ));
        }
        Ok(Query::Join(Join::build(source, source2, by, left)))
    }

    fn build(source: Query, source2: Query, by: Vec<String>, left: bool) -> Join {
        Join {
            node: Node::default(),
            source: Box::new(source),
            source2: Box::new(source2),
            by,
            left,
            row1: None,
            matched: false,
            padded: false,
            sel: None,
            hdr: None,
            hdr1: None,
            size2: 0,
        }
    }

    /// Recomputes the join columns after the sources changed.
    pub(crate) fn rebuild(self) -> Join {
        let by = intersect_cols(&self.source.columns(), &self.source2.columns());
        Join::build(*self.source, *self.source2, by, self.left)
    }

    fn by_key_of(&self, q: &Query) -> bool {
        q.keys().iter().any(|k| subset(k, &self.by))
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        let mut cols = self.source.columns();
        for c in self.source2.columns() {
            if !cols.contains(&c) {
                cols.push(c);
            }
        }
        cols
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        let one1 = self.by_key_of(&self.source);
        let one2 = self.by_key_of(&self.source2);
        match (one1, one2) {
            (true, true) if !self.left => {
                let mut keys = self.source.keys();
                for k in self.source2.keys() {
                    if !keys.contains(&k) {
                        keys.push(k);
                    }
                }
                keys
            }
            (_, true) => self.source.keys(),
            (true, false) if !self.left => self.source2.keys(),
            _ => {
                let mut keys = Vec::new();
                for k1 in self.source.keys() {
                    for k2 in self.source2.keys() {
                        let mut k = k1.clone();
                        k.extend(k2.into_iter().filter(|c| !k1.contains(c)));
                        keys.push(k);
                    }
                }
                keys
            }
        }
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
        if !self.left {
            for f in self.source2.fixed() {
                if !fixed.iter().any(|x| x.field == f.field) {
                    fixed.push(f);
                }
            }
        }
        fixed
    }

    pub(crate) fn nrecords(&self) -> f64 {
        let n1 = self.source.nrecords();
        let n2 = self.source2.nrecords();
        if self.by_key_of(&self.source2) {
            n1
        } else if self.by_key_of(&self.source) && !self.left {
            n2
        } else {
            (n1 * n2 / 2.0).max(n1)
        }
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
        let cols1: ColSet = self.source.columns().into_iter().collect();
        let cols2: ColSet = self.source2.columns().into_iter().collect();
        if !index.iter().all(|c| cols1.contains(c)) {
            return IMPOSSIBLE;
        }
        let mut needs1: ColSet = needs.intersection(&cols1).cloned().collect();
        needs1.extend(self.by.iter().cloned());
        let mut needs2: ColSet = needs.intersection(&cols2).cloned().collect();
        needs2.extend(self.by.iter().cloned());
        let first1: ColSet = firstneeds.intersection(&cols1).cloned().collect();
        let cost1 = self
            .source
            .optimize(index, &needs1, &first1, is_cursor, phase);
        let by = self.by.clone();
        let cost2 = self
            .source2
            .optimize(&by, &needs2, &ColSet::new(), is_cursor, phase);
        let n1 = self.source.nrecords();
        let n2 = self.source2.nrecords().max(1.0);
        cost1 + n1 * cost2 / n2
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        let left = self.left;
        let by = self.by;
        let (source, changed1) = (*self.source).transform1();
        let (source2, changed2) = (*self.source2).transform1();
        (
            Query::Join(Join::build(source, source2, by, left)),
            changed1 || changed2,
        )
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self.source2 = Box::new((*self.source2).add_index());
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.hdr.is_none() {
            self.hdr = Some(self.header());
            self.hdr1 = Some(self.source.header());
            self.size2 = self.source2.header().size();
        }
        loop {
            if self.row1.is_none() {
                let Some(row1) = self.source.get(dir)? else {
                    return Ok(None);
                };
                let vals = match &self.hdr1 {
                    Some(h) => row1.values(h, &self.by),
                    None => Vec::new(),
                };
                self.source2.select(&self.by, &KeyRange::point(vals))?;
                self.row1 = Some(row1);
                self.matched = false;
                self.padded = false;
            }
            let row2 = match self.source2.get(dir)? {
                Some(row2) => {
                    self.matched = true;
                    row2
                }
                None if self.left && !self.matched && !self.padded => {
                    self.padded = true;
                    Row::empty(self.size2)
                }
                None => {
                    self.row1 = None;
                    continue;
                }
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
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.left { "leftjoin" } else { "join" };
        write!(
            f,
            "({}) {} by({}) ({})",
            self.source,
            op,
            fmt_cols(&self.by),
            self.source2
        )
    }
}
