use super::{fmt_cols, Fixed, Node, Phase, Sel, IMPOSSIBLE};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Result};
use relq_storage::{IndexPos, KeyRange, TableSchema, Transaction};
use std::fmt;
use std::rc::Rc;

/// Share of the data read still paid when an index covers the first-row needs.
pub(crate) const FIRSTNEEDS_DATA_FACTOR: f64 = 0.75;

/// Reads a stored table through one of its indexes.
pub struct Table {
    pub(crate) node: Node,
    tran: Rc<dyn Transaction>,
    name: String,
    schema: TableSchema,
    index: Vec<String>,
    committed: bool,
    hdr: Header,
    range: KeyRange,
    filter: Option<Sel>,
    pos: Option<IndexPos>,
    rewound: bool,
}

impl Table {
    /// Creates a table operator, reading the schema from the transaction.
    pub fn new(tran: Rc<dyn Transaction>, name: impl Into<String>) -> Result<super::Query> {
        let name = name.into();
        let schema = tran.schema(&name)?;
        let index = schema.indexes().first().cloned().unwrap_or_default();
        let hdr = Header::table(schema.columns());
        Ok(super::Query::Table(Table {
            node: Node::default(),
            tran,
            name,
            schema,
            index,
            committed: false,
            hdr,
            range: KeyRange::all(),
            filter: None,
            pos: None,
            rewound: true,
        }))
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn tran(&self) -> &Rc<dyn Transaction> {
        &self.tran
    }

    pub(crate) fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub(crate) fn set_transaction(&mut self, tran: &Rc<dyn Transaction>) {
        self.tran = Rc::clone(tran);
        self.rewind();
    }

    /// Fixes the index to iterate by.
    pub(crate) fn set_index(&mut self, index: &[String]) {
        tracing::trace!(table = %self.name, index = ?index, "table index");
        self.index = index.to_vec();
        self.committed = true;
    }

    /// Cost of reading `frac` of the entries of `idx`.
    pub(crate) fn index_read_cost(&self, idx: &[String], frac: f64) -> f64 {
        self.nrecords() * frac * idx.len().max(1) as f64 * self.columnsize()
    }

    /// Cost of reading `frac` of the data records.
    pub(crate) fn data_read_cost(&self, frac: f64) -> f64 {
        self.nrecords() * frac * self.recordsize()
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.schema.columns().to_vec()
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        self.schema.keys().to_vec()
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        self.schema.indexes().to_vec()
    }

    pub(crate) fn header(&self) -> Header {
        self.hdr.clone()
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        Vec::new()
    }

    pub(crate) fn nrecords(&self) -> f64 {
        self.tran.nrecords(&self.name) as f64
    }

    pub(crate) fn recordsize(&self) -> f64 {
        self.tran.recordsize(&self.name) as f64
    }

    pub(crate) fn columnsize(&self) -> f64 {
        self.tran.columnsize(&self.name) as f64
    }

    pub(crate) fn updateable(&self) -> Option<String> {
        Some(self.name.clone())
    }

    pub(crate) fn optimize2(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        _is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        let mut best: Option<(f64, Vec<String>)> = None;
        for idx in self.schema.indexes() {
            if !idx.starts_with(index) {
                continue;
            }
            let index_cost = self.index_read_cost(idx, 1.0);
            let data_cost = self.data_read_cost(1.0);
            let cost = if needs.iter().all(|c| idx.contains(c)) {
                index_cost
            } else if !firstneeds.is_empty() && firstneeds.iter().all(|c| idx.contains(c)) {
                index_cost + FIRSTNEEDS_DATA_FACTOR * data_cost
            } else {
                index_cost + data_cost
            };
            if best.as_ref().map_or(true, |(c, _)| cost < *c) {
                best = Some((cost, idx.clone()));
            }
        }
        let Some((cost, idx)) = best else {
            return IMPOSSIBLE;
        };
        if phase == Phase::Commit {
            self.set_index(&idx);
        }
        cost
    }

    pub(crate) fn transform(self) -> (super::Query, bool) {
        (super::Query::Table(self), false)
    }

    pub(crate) fn add_index(self) -> Self {
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        loop {
            let from = if self.rewound { None } else { self.pos.as_ref() };
            let entry = self
                .tran
                .seek(&self.name, &self.index, &self.range, from, dir)?;
            let Some(entry) = entry else {
                self.rewind();
                return Ok(None);
            };
            self.rewound = false;
            self.pos = Some(entry.pos());
            let row = Row::from_record(entry.record);
            if let Some(f) = &self.filter {
                if !f.contains(&self.hdr, &row) {
                    continue;
                }
            }
            return Ok(Some(row));
        }
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        if let Some(c) = index.iter().find(|c| self.schema.column_index(c).is_none()) {
            return Err(relq_core::Error::column_not_found(self.name.clone(), c.clone()));
        }
        if self.index.starts_with(index) {
            self.range = range.clone();
            self.filter = None;
        } else {
            self.range = KeyRange::all();
            self.filter = Sel::new(index, range);
        }
        self.rewind();
        Ok(())
    }

    pub(crate) fn rewind(&mut self) {
        self.rewound = true;
        self.pos = None;
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.committed {
            write!(f, "{}^({})", self.name, fmt_cols(&self.index))
        } else {
            write!(f, "{}", self.name)
        }
    }
}
