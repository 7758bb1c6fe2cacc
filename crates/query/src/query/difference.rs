use super::compatible::Compatible;
use super::{Fixed, Node, Phase, Query};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Result};
use relq_storage::KeyRange;
use std::fmt;

/// Rows of the first source that don't appear in the second.
pub struct Difference {
    pub(crate) node: Node,
    pub(crate) c: Compatible,
}

impl Difference {
    pub fn new(source: Query, source2: Query) -> Query {
        Query::Difference(Difference {
            node: Node::default(),
            c: Compatible::new(source, source2),
        })
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.c.source.columns()
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        self.c.source.keys()
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        self.c.source.indexes()
    }

    pub(crate) fn header(&self) -> Header {
        self.c.source.header()
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        self.c.source.fixed()
    }

    pub(crate) fn nrecords(&self) -> f64 {
        let n1 = self.c.source.nrecords();
        (n1 - self.c.source2.nrecords() / 2.0).max(n1 / 4.0)
    }

    pub(crate) fn recordsize(&self) -> f64 {
        self.c.source.recordsize()
    }

    pub(crate) fn updateable(&self) -> Option<String> {
        self.c.source.updateable()
    }

    pub(crate) fn optimize2(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        let mut needs1 = needs.clone();
        needs1.extend(self.c.cols1());
        let cost1 = self
            .c
            .source
            .optimize(index, &needs1, firstneeds, is_cursor, phase);
        let needs2 = self.c.cols2();
        let (key, cost2) = self.c.source2.key_index(&needs2);
        if phase == Phase::Commit {
            tracing::trace!(key = ?key, "difference lookup key");
            self.c
                .source2
                .optimize(&key, &needs2, &ColSet::new(), false, Phase::Commit);
            self.c.key = key;
        }
        cost1 + cost2
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        if self.c.disjoint().is_some() {
            return (*self.c.source, true);
        }
        let (c, changed) = self.c.transform();
        (
            Query::Difference(Difference {
                node: Node::default(),
                c,
            }),
            changed,
        )
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.c = self.c.add_index();
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        self.c.headers();
        while let Some(row) = self.c.source.get(dir)? {
            if !self.c.in_source2(&row)? {
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

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) minus ({})", self.c.source, self.c.source2)
    }
}
