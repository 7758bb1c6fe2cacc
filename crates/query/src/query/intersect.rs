use super::compatible::Compatible;
use super::{intersect_cols, subset, Fixed, Node, Phase, Query, OUT_OF_ORDER};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Result};
use relq_storage::KeyRange;
use std::fmt;

/// Rows present in both sources.
///
/// Scans one side and looks each row up in the other by key. Either side may be scanned;
/// scanning the second costs an out-of-order penalty and swaps the sides.
/// Sources that can't share a row give an empty result without reading.
pub struct Intersect {
    pub(crate) node: Node,
    pub(crate) c: Compatible,
    empty: bool,
}

impl Intersect {
    pub fn new(source: Query, source2: Query) -> Query {
        Query::Intersect(Intersect::build(Compatible::new(source, source2)))
    }

    fn build(c: Compatible) -> Intersect {
        let empty = c.disjoint().is_some();
        Intersect {
            node: Node::default(),
            c,
            empty,
        }
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        intersect_cols(&self.c.source.columns(), &self.c.source2.columns())
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        let cols = self.columns();
        let mut keys: Vec<Vec<String>> = Vec::new();
        for k in self.c.source.keys().into_iter().chain(self.c.source2.keys()) {
            if subset(&k, &cols) && !keys.contains(&k) {
                keys.push(k);
            }
        }
        if keys.is_empty() {
            keys.push(cols);
        }
        keys
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        let cols = self.columns();
        let mut indexes: Vec<Vec<String>> = Vec::new();
        for i in self
            .c
            .source
            .indexes()
            .into_iter()
            .chain(self.c.source2.indexes())
        {
            if subset(&i, &cols) && !indexes.contains(&i) {
                indexes.push(i);
            }
        }
        indexes
    }

    pub(crate) fn header(&self) -> Header {
        self.c.source.header().project(&self.columns())
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        let cols = self.columns();
        let mut fixed: Vec<Fixed> = Vec::new();
        for f in self.c.source.fixed().into_iter().chain(self.c.source2.fixed()) {
            if cols.contains(&f.field) && !fixed.iter().any(|x| x.field == f.field) {
                fixed.push(f);
            }
        }
        fixed
    }

    pub(crate) fn nrecords(&self) -> f64 {
        if self.empty {
            return 0.0;
        }
        self.c.source.nrecords().min(self.c.source2.nrecords()) / 2.0
    }

    pub(crate) fn recordsize(&self) -> f64 {
        self.c.source.recordsize()
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
        if self.empty {
            return 0.0;
        }
        let cols1 = self.c.cols1();
        let cols2 = self.c.cols2();
        let mut needs1 = needs.clone();
        needs1.extend(cols1.iter().cloned());
        let mut needs2 = needs.clone();
        needs2.extend(cols2.iter().cloned());

        let (key2, lookup2) = self.c.source2.key_index(&cols2);
        let cost1 = self
            .c
            .source
            .optimize(index, &needs1, firstneeds, is_cursor, Phase::Explore)
            + lookup2;
        let (key1, lookup1) = self.c.source.key_index(&cols1);
        let cost2 = self
            .c
            .source2
            .optimize(index, &needs2, firstneeds, is_cursor, Phase::Explore)
            + lookup1
            + OUT_OF_ORDER;
        let cost = cost1.min(cost2);
        if phase == Phase::Commit {
            let (key, scan_needs, lookup_cols) = if cost2 < cost1 {
                self.c.swap();
                (key1, needs2, cols1)
            } else {
                (key2, needs1, cols2)
            };
            tracing::trace!(key = ?key, swapped = cost2 < cost1, "intersect strategy");
            self.c
                .source
                .optimize(index, &scan_needs, firstneeds, is_cursor, Phase::Commit);
            self.c
                .source2
                .optimize(&key, &lookup_cols, &ColSet::new(), false, Phase::Commit);
            self.c.key = key;
        }
        cost
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        let (c, changed) = self.c.transform();
        (Query::Intersect(Intersect::build(c)), changed)
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.c = self.c.add_index();
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.empty {
            return Ok(None);
        }
        self.c.headers();
        while let Some(row) = self.c.source.get(dir)? {
            if self.c.in_source2(&row)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        self.c.source.select(index, range)
    }

    pub(crate) fn rewind(&mut self) {
        self.c.source.rewind();
    }
}

impl fmt::Display for Intersect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) intersect ({})", self.c.source, self.c.source2)
    }
}
