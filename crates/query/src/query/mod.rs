//! The operator tree.
//!
//! A query is an owned tree of `Query` nodes. Its lifecycle is
//! built → transformed → explored* → committed → iterating:
//!
//! - `transform` applies algebraic rewrites until nothing changes.
//! - `optimize` in the `Explore` phase estimates the cost of producing rows in
//!   a given order; results are memoized per node in a `Cache`.
//! - `optimize` in the `Commit` phase fixes the chosen strategy of every node.
//! - `get` then produces rows in either direction.

mod compatible;
mod difference;
mod extend;
mod intersect;
mod join;
mod product;
mod project;
mod rename;
mod select;
mod sort;
mod summarize;
mod table;
mod temp_index;
mod union;

pub use difference::Difference;
pub use extend::Extend;
pub use intersect::Intersect;
pub use join::Join;
pub use product::Product;
pub use project::Project;
pub use rename::Rename;
pub use select::Select;
pub use sort::Sort;
pub use summarize::{Summarize, Summary, SummaryFunc};
pub use table::Table;
pub use temp_index::TempIndex;
pub use union::Union;

use crate::cache::{Cache, ColSet};
use crate::config::QueryConfig;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Result, Value};
use relq_storage::{KeyBound, KeyRange, Transaction};
use std::fmt;
use std::rc::Rc;

/// Cost multiplier for writing temporary index entries.
pub const WRITE_FACTOR: f64 = 4.0;

/// Minimum penalty for strategies that read a source out of the required order.
pub const OUT_OF_ORDER: f64 = 10.0;

/// Cost of an infeasible plan. Finite so that sums of costs stay comparable.
pub const IMPOSSIBLE: f64 = f64::MAX / 10.0;

/// Fixed cost of building a temporary index.
pub const TEMP_INDEX_OVERHEAD: f64 = 4000.0;

/// Optimization phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Cost estimation only; results may be memoized.
    Explore,
    /// Fix the chosen strategy as a side effect.
    Commit,
}

/// A column whose value is known to be one of `values` in every row.
#[derive(Clone, Debug, PartialEq)]
pub struct Fixed {
    pub field: String,
    pub values: Vec<Value>,
}

impl Fixed {
    pub fn new(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            values,
        }
    }

    /// Returns the value if exactly one is possible.
    pub fn single(&self) -> Option<&Value> {
        match self.values.as_slice() {
            [v] => Some(v),
            _ => None,
        }
    }
}

/// State shared by every operator.
#[derive(Debug, Default)]
pub(crate) struct Node {
    pub(crate) cache: Cache,
    /// Order of the temporary index to build above this node, if committed.
    pub(crate) tempindex: Option<Vec<String>>,
}

/// A `select` narrowing: rows whose `index` values fall in `range`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Sel {
    pub(crate) index: Vec<String>,
    pub(crate) range: KeyRange,
}

impl Sel {
    /// Returns None for a select that doesn't narrow anything.
    pub(crate) fn new(index: &[String], range: &KeyRange) -> Option<Sel> {
        if range.is_all() {
            None
        } else {
            Some(Sel {
                index: index.to_vec(),
                range: range.clone(),
            })
        }
    }

    pub(crate) fn contains(&self, hdr: &Header, row: &Row) -> bool {
        self.range.contains(&row.values(hdr, &self.index))
    }
}

/// Checks an optional narrowing.
pub(crate) fn passes(sel: &Option<Sel>, hdr: &Header, row: &Row) -> bool {
    sel.as_ref().map_or(true, |s| s.contains(hdr, row))
}

/// Applies an optional narrowing to a child, or clears the child's narrowing
/// when the child lacks the columns.
pub(crate) fn select_child(q: &mut Query, sel: &Option<Sel>) -> Result<()> {
    match sel {
        Some(s) if subset(&s.index, &q.columns()) => q.select(&s.index, &s.range),
        _ => q.select(&[], &KeyRange::all()),
    }
}

/// A relational operator.
pub enum Query {
    Table(Table),
    Select(Select),
    Project(Project),
    Rename(Rename),
    Extend(Extend),
    Union(Union),
    Intersect(Intersect),
    Difference(Difference),
    Summarize(Summarize),
    Product(Product),
    Join(Join),
    Sort(Sort),
    TempIndex(TempIndex),
}

macro_rules! dispatch {
    ($self:expr, $q:ident => $body:expr) => {
        match $self {
            Query::Table($q) => $body,
            Query::Select($q) => $body,
            Query::Project($q) => $body,
            Query::Rename($q) => $body,
            Query::Extend($q) => $body,
            Query::Union($q) => $body,
            Query::Intersect($q) => $body,
            Query::Difference($q) => $body,
            Query::Summarize($q) => $body,
            Query::Product($q) => $body,
            Query::Join($q) => $body,
            Query::Sort($q) => $body,
            Query::TempIndex($q) => $body,
        }
    };
}

impl Query {
    /// Returns the output column names.
    pub fn columns(&self) -> Vec<String> {
        dispatch!(self, q => q.columns())
    }

    /// Returns the column lists that uniquely identify a row.
    pub fn keys(&self) -> Vec<Vec<String>> {
        dispatch!(self, q => q.keys())
    }

    /// Returns the orders this operator can produce.
    pub fn indexes(&self) -> Vec<Vec<String>> {
        dispatch!(self, q => q.indexes())
    }

    /// Returns the row layout.
    pub fn header(&self) -> Header {
        dispatch!(self, q => q.header())
    }

    /// Returns columns with a known set of values.
    pub fn fixed(&self) -> Vec<Fixed> {
        dispatch!(self, q => q.fixed())
    }

    /// Estimated number of rows.
    pub fn nrecords(&self) -> f64 {
        dispatch!(self, q => q.nrecords())
    }

    /// Estimated row size.
    pub fn recordsize(&self) -> f64 {
        dispatch!(self, q => q.recordsize())
    }

    /// Estimated size of one column value.
    pub fn columnsize(&self) -> f64 {
        let ncols = self.columns().len().max(1) as f64;
        (self.recordsize() / ncols).max(1.0)
    }

    /// Returns the table that rows map to one-to-one, if any.
    pub fn updateable(&self) -> Option<String> {
        dispatch!(self, q => q.updateable())
    }

    pub(crate) fn node(&self) -> &Node {
        dispatch!(self, q => &q.node)
    }

    pub(crate) fn node_mut(&mut self) -> &mut Node {
        dispatch!(self, q => &mut q.node)
    }

    fn for_each_child(&mut self, f: &mut dyn FnMut(&mut Query)) {
        match self {
            Query::Table(_) => {}
            Query::Select(q) => f(&mut q.source),
            Query::Project(q) => f(&mut q.source),
            Query::Rename(q) => f(&mut q.source),
            Query::Extend(q) => f(&mut q.source),
            Query::Summarize(q) => f(&mut q.source),
            Query::Sort(q) => f(&mut q.source),
            Query::TempIndex(q) => f(&mut q.source),
            Query::Union(q) => {
                f(&mut q.c.source);
                f(&mut q.c.source2);
            }
            Query::Intersect(q) => {
                f(&mut q.c.source);
                f(&mut q.c.source2);
            }
            Query::Difference(q) => {
                f(&mut q.c.source);
                f(&mut q.c.source2);
            }
            Query::Product(q) => {
                f(&mut q.source);
                f(&mut q.source2);
            }
            Query::Join(q) => {
                f(&mut q.source);
                f(&mut q.source2);
            }
        }
    }

    /// Rebinds every table in the tree to a transaction.
    pub fn set_transaction(&mut self, tran: &Rc<dyn Transaction>) {
        match self {
            Query::Table(t) => t.set_transaction(tran),
            Query::Select(s) => {
                s.source.set_transaction(tran);
                s.refresh_stats();
            }
            q => q.for_each_child(&mut |c| c.set_transaction(tran)),
        }
    }

    /// Applies runtime settings to every node.
    pub fn configure(&mut self, config: &QueryConfig) {
        if let Query::Select(s) = self {
            s.configure(config);
        }
        self.for_each_child(&mut |c| c.configure(config));
    }

    /// Rewrites the tree until no rule applies.
    pub fn transform(self) -> Query {
        let mut q = self;
        loop {
            let (next, changed) = q.transform1();
            q = next;
            if !changed {
                return q;
            }
        }
    }

    /// One rewrite pass. Returns whether anything changed.
    pub(crate) fn transform1(self) -> (Query, bool) {
        match self {
            Query::Table(q) => (Query::Table(q), false),
            Query::Select(q) => q.transform(),
            Query::Project(q) => q.transform(),
            Query::Rename(q) => q.transform(),
            Query::Extend(q) => q.transform(),
            Query::Union(q) => q.transform(),
            Query::Intersect(q) => q.transform(),
            Query::Difference(q) => q.transform(),
            Query::Summarize(q) => q.transform(),
            Query::Product(q) => q.transform(),
            Query::Join(q) => q.transform(),
            Query::Sort(q) => q.transform(),
            Query::TempIndex(q) => (Query::TempIndex(q), false),
        }
    }

    /// Estimates (and in the `Commit` phase fixes) the cost of producing the
    /// rows ordered by `index`, when the parent reads `needs` from every row
    /// and `firstneeds` from the first row only.
    ///
    /// When an order is required and the caller is not a cursor, building a
    /// temporary index is considered as an alternative.
    pub fn optimize(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        if let Query::Rename(r) = self {
            return r.optimize(index, needs, firstneeds, is_cursor, phase);
        }
        if phase == Phase::Commit {
            self.node_mut().tempindex = None;
        }
        if is_cursor || index.is_empty() {
            return self.optimize1(index, needs, firstneeds, is_cursor, phase);
        }
        if !subset(index, &self.columns()) {
            return IMPOSSIBLE;
        }
        let cost1 = self.optimize1(index, needs, firstneeds, is_cursor, Phase::Explore);
        let no_index = self.optimize1(&[], needs, firstneeds, is_cursor, Phase::Explore);
        let keysize = index.len() as f64 * self.columnsize() * 2.0;
        let nrecs = self.nrecords();
        let cost2 = no_index
            + nrecs * keysize * WRITE_FACTOR
            + nrecs * keysize
            + TEMP_INDEX_OVERHEAD;
        let cost = cost1.min(cost2);
        if cost >= IMPOSSIBLE {
            return IMPOSSIBLE;
        }
        if phase == Phase::Commit {
            if cost2 < cost1 {
                tracing::trace!(index = ?index, cost1, cost2, "temp index");
                self.node_mut().tempindex = Some(index.to_vec());
                self.optimize1(&[], needs, firstneeds, is_cursor, Phase::Commit);
            } else {
                self.optimize1(index, needs, firstneeds, is_cursor, Phase::Commit);
            }
        }
        cost
    }

    /// Memoizing wrapper over the operator's own cost model.
    pub(crate) fn optimize1(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        if phase == Phase::Explore {
            if let Some(cost) = self.node().cache.get(index, needs, firstneeds, is_cursor) {
                return cost;
            }
        }
        let cost = self
            .optimize2(index, needs, firstneeds, is_cursor, phase)
            .clamp(0.0, IMPOSSIBLE);
        if phase == Phase::Explore {
            self.node_mut()
                .cache
                .add(index, needs, firstneeds, is_cursor, cost);
        }
        cost
    }

    fn optimize2(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        dispatch!(self, q => q.optimize2(index, needs, firstneeds, is_cursor, phase))
    }

    /// Returns the cached cost for the given arguments, if explored.
    pub fn cached_cost(
        &self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
    ) -> Option<f64> {
        self.node().cache.get(index, needs, firstneeds, is_cursor)
    }

    /// Picks the key that is cheapest to read in order, with its cost.
    pub fn key_index(&mut self, needs: &ColSet) -> (Vec<String>, f64) {
        let mut best = (Vec::new(), IMPOSSIBLE);
        for key in self.keys() {
            let cost = self.optimize(&key, needs, &ColSet::new(), false, Phase::Explore);
            if cost < best.1 {
                best = (key, cost);
            }
        }
        best
    }

    /// Wraps nodes whose committed plan needs a temporary index.
    pub fn add_index(self) -> Query {
        let tempindex = self.node().tempindex.clone();
        let q = match self {
            Query::Table(q) => Query::Table(q),
            Query::Select(q) => Query::Select(q.add_index()),
            Query::Project(q) => Query::Project(q.add_index()),
            Query::Rename(q) => Query::Rename(q.add_index()),
            Query::Extend(q) => Query::Extend(q.add_index()),
            Query::Union(q) => Query::Union(q.add_index()),
            Query::Intersect(q) => Query::Intersect(q.add_index()),
            Query::Difference(q) => Query::Difference(q.add_index()),
            Query::Summarize(q) => Query::Summarize(q.add_index()),
            Query::Product(q) => Query::Product(q.add_index()),
            Query::Join(q) => Query::Join(q.add_index()),
            Query::Sort(q) => Query::Sort(q.add_index()),
            Query::TempIndex(q) => Query::TempIndex(q),
        };
        match tempindex {
            Some(order) => Query::TempIndex(TempIndex::new(q, order)),
            None => q,
        }
    }

    /// Returns the next row in direction `dir`, or None at the end.
    ///
    /// The direction may change between calls. After returning None the
    /// operator is rewound, so a following `get(Dir::Prev)` returns the last row.
    pub fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        dispatch!(self, q => q.get(dir))
    }

    /// Restricts iteration to rows whose `index` values fall in `range`.
    /// Implies `rewind`.
    pub fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        dispatch!(self, q => q.select(index, range))
    }

    /// Restarts iteration.
    pub fn rewind(&mut self) {
        dispatch!(self, q => q.rewind())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, q => fmt::Display::fmt(q, f))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({})", self)
    }
}

// Column list helpers ---------------------------------------------------------

pub(crate) fn set_of(cols: &[String]) -> ColSet {
    cols.iter().cloned().collect()
}

pub(crate) fn subset(cols: &[String], of: &[String]) -> bool {
    cols.iter().all(|c| of.contains(c))
}

pub(crate) fn union_cols(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = a.to_vec();
    for c in b {
        if !out.contains(c) {
            out.push(c.clone());
        }
    }
    out
}

pub(crate) fn intersect_cols(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|c| b.contains(c)).cloned().collect()
}

pub(crate) fn difference_cols(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|c| !b.contains(c)).cloned().collect()
}

pub(crate) fn same_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && subset(a, b)
}

pub(crate) fn fixed_value<'a>(fixed: &'a [Fixed], col: &str) -> Option<&'a Value> {
    fixed.iter().find(|f| f.field == col).and_then(Fixed::single)
}

/// Removes single-valued fixed columns, which don't affect ordering.
pub(crate) fn strip_fixed(cols: &[String], fixed: &[Fixed]) -> Vec<String> {
    cols.iter()
        .filter(|c| fixed_value(fixed, c).is_none())
        .cloned()
        .collect()
}

/// Returns true if reading in `idx` order also delivers `required` order.
pub(crate) fn index_satisfies(idx: &[String], required: &[String], fixed: &[Fixed]) -> bool {
    strip_fixed(idx, fixed).starts_with(&strip_fixed(required, fixed))
}

/// Returns true if the leading columns of `idx` are exactly `fields`, ignoring
/// fixed columns, so that rows with equal `fields` values are adjacent.
pub(crate) fn prefix_set_equals(idx: &[String], fields: &[String], fixed: &[Fixed]) -> bool {
    let fields = strip_fixed(fields, fixed);
    let idx = strip_fixed(idx, fixed);
    idx.len() >= fields.len() && same_set(&idx[..fields.len()], &fields)
}

/// Translates a range over `index` into an exactly equivalent range over
/// `via`, substituting fixed values for `via` columns that `index` skips.
pub(crate) fn translate_range(
    index: &[String],
    range: &KeyRange,
    via: &[String],
    fixed: &[Fixed],
) -> Option<KeyRange> {
    if range.is_all() {
        return Some(KeyRange::all());
    }
    Some(KeyRange::new(
        translate_bound(&range.lo, index, via, fixed)?,
        translate_bound(&range.hi, index, via, fixed)?,
    ))
}

fn translate_bound(
    bound: &KeyBound,
    index: &[String],
    via: &[String],
    fixed: &[Fixed],
) -> Option<KeyBound> {
    let n = bound.prefix.len();
    let mut prefix = Vec::with_capacity(via.len());
    let (mut i, mut j) = (0, 0);
    while i < n {
        if j < via.len() && index.get(i) == via.get(j) {
            prefix.push(bound.prefix[i].clone());
            i += 1;
            j += 1;
        } else if let Some(v) = index.get(i).and_then(|c| fixed_value(fixed, c)) {
            if *v != bound.prefix[i] {
                return None;
            }
            i += 1;
        } else if let Some(v) = via.get(j).and_then(|c| fixed_value(fixed, c)) {
            prefix.push(v.clone());
            j += 1;
        } else {
            return None;
        }
    }
    Some(KeyBound {
        prefix,
        inclusive: bound.inclusive,
    })
}

pub(crate) fn fmt_cols(cols: &[String]) -> String {
    cols.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_index_satisfies_with_fixed() {
        let fixed = vec![Fixed::new("a", vec![Value::Int64(1)])];
        assert!(index_satisfies(&names(&["b", "c"]), &names(&["a", "b"]), &fixed));
        assert!(index_satisfies(&names(&["a", "b"]), &names(&["b"]), &fixed));
        assert!(!index_satisfies(&names(&["c", "b"]), &names(&["b"]), &fixed));
        assert!(index_satisfies(&names(&["c"]), &[], &[]));
    }

    #[test]
    fn test_prefix_set_equals() {
        assert!(prefix_set_equals(&names(&["b", "a", "c"]), &names(&["a", "b"]), &[]));
        assert!(!prefix_set_equals(&names(&["b", "c", "a"]), &names(&["a", "b"]), &[]));
        let fixed = vec![Fixed::new("c", vec![Value::Int64(0)])];
        assert!(prefix_set_equals(&names(&["c", "a"]), &names(&["a"]), &fixed));
    }

    #[test]
    fn test_translate_range() {
        let fixed = vec![Fixed::new("a", vec![Value::Int64(1)])];
        let range = KeyRange::new(
            KeyBound::incl(vec![Value::Int64(5)]),
            KeyBound::excl(vec![Value::Int64(9)]),
        );
        let r = translate_range(&names(&["b"]), &range, &names(&["a", "b"]), &fixed).unwrap();
        assert_eq!(r.lo.prefix, vec![Value::Int64(1), Value::Int64(5)]);
        assert!(!r.hi.inclusive);

        assert!(translate_range(&names(&["c"]), &range, &names(&["a", "b"]), &fixed).is_none());
        assert_eq!(
            translate_range(&names(&["c"]), &KeyRange::all(), &names(&["b"]), &[]),
            Some(KeyRange::all())
        );
    }

    #[test]
    fn test_column_helpers() {
        let a = names(&["x", "y"]);
        let b = names(&["y", "z"]);
        assert_eq!(union_cols(&a, &b), names(&["x", "y", "z"]));
        assert_eq!(intersect_cols(&a, &b), names(&["y"]));
        assert_eq!(difference_cols(&a, &b), names(&["x"]));
        assert!(same_set(&a, &names(&["y", "x"])));
    }
}
