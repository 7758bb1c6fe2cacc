use super::{fmt_cols, subset, Fixed, Node, Phase, Query, IMPOSSIBLE};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Error, Result};
use relq_storage::KeyRange;
use std::fmt;

/// Requires its source to deliver rows ordered by `cols`.
///
/// The order itself comes from the source, either natively or through a
/// temporary index. `reverse` flips the iteration direction.
pub struct Sort {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    reverse: bool,
    cols: Vec<String>,
}

impl Sort {
    pub fn new(source: Query, reverse: bool, cols: &[&str]) -> Result<Query> {
        let cols: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
        let srccols = source.columns();
        if let Some(c) = cols.iter().find(|c| !srccols.contains(c)) {
            return Err(Error::column_not_found("sort", c));
        }
        Ok(Query::Sort(Sort::build(source, reverse, cols)))
    }

    fn build(source: Query, reverse: bool, cols: Vec<String>) -> Sort {
        Sort {
            node: Node::default(),
            source: Box::new(source),
            reverse,
            cols,
        }
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.source.columns()
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        self.source.keys()
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        vec![self.cols.clone()]
    }

    pub(crate) fn header(&self) -> Header {
        self.source.header()
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        self.source.fixed()
    }

    pub(crate) fn nrecords(&self) -> f64 {
        self.source.nrecords()
    }

    pub(crate) fn recordsize(&self) -> f64 {
        self.source.recordsize()
    }

    pub(crate) fn updateable(&self) -> Option<String> {
        self.source.updateable()
    }

    pub(crate) fn optimize2(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        if !index.is_empty() && (self.reverse || !self.cols.starts_with(index)) {
            return IMPOSSIBLE;
        }
        let cols = self.cols.clone();
        self.source
            .optimize(&cols, needs, firstneeds, is_cursor, phase)
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        let (source, changed) = (*self.source).transform1();
        (
            Query::Sort(Sort::build(source, self.reverse, self.cols)),
            changed,
        )
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        let dir = if self.reverse { dir.reverse() } else { dir };
        self.source.get(dir)
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        if subset(index, &self.source.columns()) {
            self.source.select(index, range)
        } else {
            Err(Error::column_not_found("sort", fmt_cols(index)))
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.source.rewind();
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rev = if self.reverse { "reverse " } else { "" };
        write!(f, "{} sort {}{}", self.source, rev, fmt_cols(&self.cols))
    }
}
