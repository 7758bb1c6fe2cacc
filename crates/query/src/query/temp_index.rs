use super::{fmt_cols, Fixed, Node, Phase, Query, Sel};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Result, Value};
use relq_storage::KeyRange;
use std::fmt;

/// Materializes its source ordered by `order`.
///
/// Added by `add_index` above nodes whose committed plan reads them through a
/// temporary index. The source is read in full on the first `get`.
pub struct TempIndex {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    order: Vec<String>,
    rows: Option<Vec<(Vec<Value>, Row)>>,
    /// Window of `rows` admitted by a select on a prefix of `order`.
    lo: usize,
    hi: usize,
    pos: Option<usize>,
    range: Option<Sel>,
    filter: Option<Sel>,
    hdr: Option<Header>,
}

impl TempIndex {
    pub fn new(source: Query, order: Vec<String>) -> TempIndex {
        TempIndex {
            node: Node::default(),
            source: Box::new(source),
            order,
            rows: None,
            lo: 0,
            hi: 0,
            pos: None,
            range: None,
            filter: None,
            hdr: None,
        }
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.source.columns()
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        self.source.keys()
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        vec![self.order.clone()]
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
        _index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        self.source
            .optimize(&[], needs, firstneeds, is_cursor, phase)
    }

    fn materialize(&mut self) -> Result<()> {
        let hdr = self.source.header();
        self.source.select(&[], &KeyRange::all())?;
        let mut rows = Vec::new();
        while let Some(row) = self.source.get(Dir::Next)? {
            rows.push((row.values(&hdr, &self.order), row));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        tracing::trace!(order = ?self.order, rows = rows.len(), "temp index built");
        self.rows = Some(rows);
        self.hdr = Some(hdr);
        self.set_window();
        Ok(())
    }

    fn set_window(&mut self) {
        let Some(rows) = &self.rows else {
            return;
        };
        match &self.range {
            Some(sel) => {
                let range = &sel.range;
                self.lo = rows.partition_point(|(k, _)| range.below(k));
                self.hi = rows.partition_point(|(k, _)| !range.above(k));
                self.hi = self.hi.max(self.lo);
            }
            None => {
                self.lo = 0;
                self.hi = rows.len();
            }
        }
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.rows.is_none() {
            self.materialize()?;
        }
        loop {
            let next = match (dir, self.pos) {
                (Dir::Next, None) => Some(self.lo),
                (Dir::Next, Some(p)) => Some(p + 1),
                (Dir::Prev, None) => self.hi.checked_sub(1),
                (Dir::Prev, Some(p)) => p.checked_sub(1),
            };
            let Some(i) = next.filter(|&i| i >= self.lo && i < self.hi) else {
                self.pos = None;
                return Ok(None);
            };
            self.pos = Some(i);
            let Some((_, row)) = self.rows.as_ref().and_then(|rows| rows.get(i)) else {
                self.pos = None;
                return Ok(None);
            };
            if let (Some(sel), Some(hdr)) = (&self.filter, &self.hdr) {
                if !sel.contains(hdr, row) {
                    continue;
                }
            }
            return Ok(Some(row.clone()));
        }
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        self.pos = None;
        let sel = Sel::new(index, range);
        if self.order.starts_with(index) {
            self.range = sel;
            self.filter = None;
        } else {
            self.range = None;
            self.filter = sel;
        }
        self.set_window();
        Ok(())
    }

    pub(crate) fn rewind(&mut self) {
        self.pos = None;
    }
}

impl fmt::Display for TempIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tempindex({})", self.source, fmt_cols(&self.order))
    }
}
