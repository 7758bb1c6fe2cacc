use super::{Fixed, Node, Phase, Query, Sel, IMPOSSIBLE};
use crate::cache::ColSet;
use crate::expr::Expr;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Error, Record, Result, Value};
use relq_storage::KeyRange;
use std::fmt;

/// Adds computed columns.
///
/// A column without an expression is a rule column: it is declared but
/// always reads as the empty value.
pub struct Extend {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    cols: Vec<String>,
    exprs: Vec<Option<Expr>>,
    src_hdr: Option<Header>,
    sel: Option<Sel>,
    hdr: Option<Header>,
}

impl Extend {
    /// Extends `source` with `(column, expression)` pairs. Expressions may
    /// refer to source columns and to columns defined earlier in the list.
    pub fn new(source: Query, cols: Vec<(&str, Option<Expr>)>) -> Result<Query> {
        let mut avail = source.columns();
        for (col, expr) in &cols {
            if avail.iter().any(|c| c == col) {
                return Err(Error::duplicate_column("extend", *col));
            }
            if let Some(e) = expr {
                if let Some(f) = e.fields().into_iter().find(|f| !avail.contains(f)) {
                    return Err(Error::column_not_found("extend", f));
                }
            }
            avail.push(col.to_string());
        }
        let (cols, exprs) = cols.into_iter().map(|(c, e)| (c.to_string(), e)).unzip();
        Ok(Query::Extend(Extend::with_rules(source, cols, exprs)))
    }

    /// Extends with expression columns only.
    pub(crate) fn build(source: Query, defs: Vec<(String, Expr)>) -> Extend {
        let (cols, exprs) = defs.into_iter().map(|(c, e)| (c, Some(e))).unzip();
        Extend::with_rules(source, cols, exprs)
    }

    fn with_rules(source: Query, cols: Vec<String>, exprs: Vec<Option<Expr>>) -> Extend {
        Extend {
            node: Node::default(),
            source: Box::new(source),
            cols,
            exprs,
            src_hdr: None,
            sel: None,
            hdr: None,
        }
    }

    /// Every column this extend adds, including rule columns.
    pub(crate) fn new_columns(&self) -> Vec<String> {
        self.cols.clone()
    }

    pub(crate) fn has_rules(&self) -> bool {
        self.exprs.iter().any(Option::is_none)
    }

    /// The expression columns in definition order.
    pub(crate) fn definitions(&self) -> impl Iterator<Item = (&String, &Expr)> {
        self.cols
            .iter()
            .zip(&self.exprs)
            .filter_map(|(c, e)| e.as_ref().map(|e| (c, e)))
    }

    pub(crate) fn into_source(self) -> Query {
        *self.source
    }

    fn real_cols(&self) -> Vec<String> {
        self.definitions().map(|(c, _)| c.clone()).collect()
    }

    fn rule_cols(&self) -> Vec<String> {
        self.cols
            .iter()
            .zip(&self.exprs)
            .filter(|(_, e)| e.is_none())
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        let mut cols = self.source.columns();
        cols.extend(self.cols.iter().cloned());
        cols
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        self.source.keys()
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        self.source.indexes()
    }

    pub(crate) fn header(&self) -> Header {
        self.source
            .header()
            .extend(self.real_cols(), &self.rule_cols())
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        let mut fixed = self.source.fixed();
        for (col, expr) in self.definitions() {
            if expr.is_constant() {
                if let Ok(v) = expr.eval(&|_| Value::Null) {
                    fixed.push(Fixed::new(col.clone(), vec![v]));
                }
            }
        }
        fixed
    }

    pub(crate) fn nrecords(&self) -> f64 {
        self.source.nrecords()
    }

    pub(crate) fn recordsize(&self) -> f64 {
        let ncols = self.source.columns().len().max(1) as f64;
        let colsize = self.source.recordsize() / ncols;
        self.source.recordsize() + colsize * self.cols.len() as f64
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
        if index.iter().any(|c| self.cols.contains(c)) {
            return IMPOSSIBLE;
        }
        let mut src_needs: ColSet = needs
            .iter()
            .filter(|c| !self.cols.contains(c))
            .cloned()
            .collect();
        for (_, e) in self.definitions() {
            src_needs.extend(e.fields().into_iter().filter(|f| !self.cols.contains(f)));
        }
        let src_firstneeds: ColSet = firstneeds
            .iter()
            .filter(|c| !self.cols.contains(c))
            .cloned()
            .collect();
        self.source
            .optimize(index, &src_needs, &src_firstneeds, is_cursor, phase)
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        if self.cols.is_empty() {
            return (*self.source, true);
        }
        let Extend {
            source, cols, exprs, ..
        } = self;
        let (source, changed) = (*source).transform1();
        (Query::Extend(Extend::with_rules(source, cols, exprs)), changed)
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.src_hdr.is_none() {
            self.src_hdr = Some(self.source.header());
            self.hdr = Some(self.header());
        }
        loop {
            let Some(mut row) = self.source.get(dir)? else {
                return Ok(None);
            };
            let vals = self.compute(&row)?;
            row.push(Record::empty());
            row.push(Record::dummy(vals));
            if let (Some(sel), Some(hdr)) = (&self.sel, &self.hdr) {
                if !sel.contains(hdr, &row) {
                    continue;
                }
            }
            return Ok(Some(row));
        }
    }

    fn compute(&self, row: &Row) -> Result<Vec<Value>> {
        let Some(src_hdr) = &self.src_hdr else {
            return Ok(Vec::new());
        };
        let mut computed: Vec<(&String, Value)> = Vec::new();
        for (col, expr) in self.definitions() {
            let v = expr.eval(&|name| {
                match computed.iter().find(|(c, _)| c.as_str() == name) {
                    Some((_, v)) => v.clone(),
                    None => row.get(src_hdr, name),
                }
            })?;
            computed.push((col, v));
        }
        Ok(computed.into_iter().map(|(_, v)| v).collect())
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        if index.iter().any(|c| self.cols.contains(c)) {
            self.sel = Sel::new(index, range);
            self.source.select(&[], &KeyRange::all())
        } else {
            self.sel = None;
            self.source.select(index, range)
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.source.rewind();
    }
}

impl fmt::Display for Extend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let defs: Vec<String> = self
            .cols
            .iter()
            .zip(&self.exprs)
            .map(|(c, e)| match e {
                Some(e) => format!("{c} = {e}"),
                None => c.clone(),
            })
            .collect();
        write!(f, "{} extend {}", self.source, defs.join(", "))
    }
}
