use super::{
    fmt_cols, index_satisfies, passes, prefix_set_equals, subset, translate_range, Fixed, Node,
    Phase, Query, Sel, IMPOSSIBLE,
};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Error, Record, Result, Value};
use relq_storage::KeyRange;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Cost multiplier for materializing every group.
const MAP_FACTOR: f64 = 1.5;

/// An aggregate function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryFunc {
    Count,
    Total,
    Average,
    Max,
    Min,
    List,
}

impl SummaryFunc {
    fn name(self) -> &'static str {
        match self {
            SummaryFunc::Count => "count",
            SummaryFunc::Total => "total",
            SummaryFunc::Average => "average",
            SummaryFunc::Max => "max",
            SummaryFunc::Min => "min",
            SummaryFunc::List => "list",
        }
    }
}

/// One output column of a summarize.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub func: SummaryFunc,
    pub column: Option<String>,
    pub name: Option<String>,
}

impl Summary {
    pub fn count() -> Self {
        Self {
            func: SummaryFunc::Count,
            column: None,
            name: None,
        }
    }

    pub fn total(column: impl Into<String>) -> Self {
        Self::of(SummaryFunc::Total, column)
    }

    pub fn average(column: impl Into<String>) -> Self {
        Self::of(SummaryFunc::Average, column)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::of(SummaryFunc::Max, column)
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::of(SummaryFunc::Min, column)
    }

    pub fn list(column: impl Into<String>) -> Self {
        Self::of(SummaryFunc::List, column)
    }

    fn of(func: SummaryFunc, column: impl Into<String>) -> Self {
        Self {
            func,
            column: Some(column.into()),
            name: None,
        }
    }

    /// Sets the output column name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Output column name: explicit, or `count`, `total_x`, `max_x`...
    pub fn output_name(&self) -> String {
        match (&self.name, &self.column) {
            (Some(n), _) => n.clone(),
            (None, Some(c)) => format!("{}_{}", self.func.name(), c),
            (None, None) => self.func.name().to_string(),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = &self.name {
            write!(f, "{n} = ")?;
        }
        match &self.column {
            Some(c) => write!(f, "{} {}", self.func.name(), c),
            None => write!(f, "{}", self.func.name()),
        }
    }
}

/// Running state of one aggregate.
#[derive(Clone, Debug)]
struct Acc {
    func: SummaryFunc,
    count: usize,
    int_total: Option<i64>,
    float_total: f64,
    numeric: usize,
    is_float: bool,
    extreme: Option<Value>,
    list: BTreeSet<Value>,
}

impl Acc {
    fn new(func: SummaryFunc) -> Self {
        Self {
            func,
            count: 0,
            int_total: Some(0),
            float_total: 0.0,
            numeric: 0,
            is_float: false,
            extreme: None,
            list: BTreeSet::new(),
        }
    }

    fn add(&mut self, v: Value) {
        self.count += 1;
        match self.func {
            SummaryFunc::Count => {}
            SummaryFunc::Total | SummaryFunc::Average => {
                if let Value::Int64(i) = v {
                    self.int_total = self.int_total.and_then(|t| t.checked_add(i));
                    self.float_total += i as f64;
                    self.numeric += 1;
                } else if let Some(n) = v.to_number() {
                    self.is_float = true;
                    self.float_total += n;
                    self.numeric += 1;
                }
            }
            SummaryFunc::Max => {
                if self.extreme.as_ref().map_or(true, |m| v > *m) {
                    self.extreme = Some(v);
                }
            }
            SummaryFunc::Min => {
                if self.extreme.as_ref().map_or(true, |m| v < *m) {
                    self.extreme = Some(v);
                }
            }
            SummaryFunc::List => {
                self.list.insert(v);
            }
        }
    }

    fn result(&self) -> Value {
        match self.func {
            SummaryFunc::Count => Value::Int64(self.count as i64),
            SummaryFunc::Total => match self.int_total {
                Some(t) if !self.is_float => Value::Int64(t),
                _ => Value::Float64(self.float_total),
            },
            SummaryFunc::Average => {
                if self.numeric == 0 {
                    Value::Int64(0)
                } else {
                    Value::Float64(self.float_total / self.numeric as f64)
                }
            }
            SummaryFunc::Max | SummaryFunc::Min => self.extreme.clone().unwrap_or_default(),
            SummaryFunc::List => Value::List(self.list.iter().cloned().collect()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    /// One output row per source row, or a single row without `by`.
    Copy,
    /// Groups read in an order that keeps them adjacent.
    Sequential,
    /// All groups accumulated in a map, then read back in `by` order.
    Map,
}

/// Groups rows by `by` and computes aggregates per group.
pub struct Summarize {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    pub(crate) by: Vec<String>,
    summaries: Vec<Summary>,
    names: Vec<String>,
    copy: bool,
    strategy: Option<Strategy>,
    via: Vec<String>,
    src_hdr: Option<Header>,
    hdr: Header,
    sel: Option<Sel>,
    rewound: bool,
    // sequential state
    lastdir: Dir,
    cur: Option<Vec<Value>>,
    ahead: Option<Row>,
    // map state
    results: Option<Vec<Vec<Value>>>,
    pos: Option<usize>,
}

impl Summarize {
    /// Summarizes `source` grouped by `by`.
    pub fn new(source: Query, by: &[&str], summaries: Vec<Summary>) -> Result<Query> {
        let cols = source.columns();
        let mut by_cols: Vec<String> = Vec::new();
        for b in by {
            if !cols.iter().any(|c| c == b) {
                return Err(Error::column_not_found("summarize", *b));
            }
            if !by_cols.iter().any(|x| x == b) {
                by_cols.push(b.to_string());
            }
        }
        let mut names: Vec<String> = Vec::new();
        for s in &summaries {
            if let Some(c) = &s.column {
                if !cols.contains(c) {
                    return Err(Error::column_not_found("summarize", c.clone()));
                }
            }
            let name = s.output_name();
            if by_cols.contains(&name) || names.contains(&name) {
                return Err(Error::duplicate_column("summarize", name));
            }
            names.push(name);
        }
        Ok(Query::Summarize(Summarize::build(
            source, by_cols, summaries, names,
        )))
    }

    fn build(source: Query, by: Vec<String>, summaries: Vec<Summary>, names: Vec<String>) -> Self {
        let copy = by.is_empty() || source.keys().iter().any(|k| subset(k, &by));
        let mut out = by.clone();
        out.extend(names.iter().cloned());
        Summarize {
            node: Node::default(),
            source: Box::new(source),
            by,
            summaries,
            names,
            copy,
            strategy: None,
            via: Vec::new(),
            src_hdr: None,
            hdr: Header::new(vec![Vec::new(), out.clone()], out),
            sel: None,
            rewound: true,
            lastdir: Dir::Next,
            cur: None,
            ahead: None,
            results: None,
            pos: None,
        }
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.hdr.columns()
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        if self.by.is_empty() {
            return vec![Vec::new()];
        }
        let keys: Vec<Vec<String>> = self
            .source
            .keys()
            .into_iter()
            .filter(|k| subset(k, &self.by))
            .collect();
        if keys.is_empty() {
            vec![self.by.clone()]
        } else {
            keys
        }
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        if self.by.is_empty() {
            return Vec::new();
        }
        let mut indexes: Vec<Vec<String>> = self
            .source
            .indexes()
            .into_iter()
            .filter(|i| subset(i, &self.by))
            .collect();
        if !indexes.contains(&self.by) {
            indexes.push(self.by.clone());
        }
        indexes
    }

    pub(crate) fn header(&self) -> Header {
        self.hdr.clone()
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        self.source
            .fixed()
            .into_iter()
            .filter(|f| self.by.contains(&f.field))
            .collect()
    }

    pub(crate) fn nrecords(&self) -> f64 {
        if self.by.is_empty() {
            1.0
        } else if self.copy {
            self.source.nrecords()
        } else {
            self.source.nrecords() / 2.0
        }
    }

    pub(crate) fn recordsize(&self) -> f64 {
        let ncols = self.source.columns().len().max(1) as f64;
        self.source.recordsize() / ncols * (self.by.len() + self.names.len()) as f64
    }

    pub(crate) fn updateable(&self) -> Option<String> {
        None
    }

    fn source_needs(&self) -> ColSet {
        let mut needs: ColSet = self.by.iter().cloned().collect();
        needs.extend(self.summaries.iter().filter_map(|s| s.column.clone()));
        needs
    }

    pub(crate) fn optimize2(
        &mut self,
        index: &[String],
        _needs: &ColSet,
        _firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        let needs = self.source_needs();
        let none = ColSet::new();
        if self.copy {
            let index = if self.by.is_empty() {
                &[][..]
            } else if subset(index, &self.by) {
                index
            } else {
                return IMPOSSIBLE;
            };
            if phase == Phase::Commit {
                self.strategy = Some(Strategy::Copy);
            }
            return self.source.optimize(index, &needs, &none, is_cursor, phase);
        }
        let fixed = self.source.fixed();
        let mut best: Option<(f64, Strategy, Vec<String>)> = None;
        for idx in self.source.indexes() {
            if !prefix_set_equals(&idx, &self.by, &fixed) || !index_satisfies(&idx, index, &fixed) {
                continue;
            }
            let cost = self
                .source
                .optimize(&idx, &needs, &none, is_cursor, Phase::Explore);
            if best.as_ref().map_or(true, |(c, _, _)| cost < *c) {
                best = Some((cost, Strategy::Sequential, idx));
            }
        }
        if index_satisfies(&self.by, index, &fixed) {
            let cost = MAP_FACTOR
                * self
                    .source
                    .optimize(&[], &needs, &none, is_cursor, Phase::Explore);
            if best.as_ref().map_or(true, |(c, _, _)| cost < *c) {
                best = Some((cost, Strategy::Map, Vec::new()));
            }
        }
        let Some((cost, strategy, via)) = best else {
            return IMPOSSIBLE;
        };
        if cost >= IMPOSSIBLE {
            return IMPOSSIBLE;
        }
        if phase == Phase::Commit {
            tracing::trace!(strategy = ?strategy, via = ?via, cost, "summarize strategy");
            self.source
                .optimize(&via, &needs, &none, is_cursor, Phase::Commit);
            self.strategy = Some(strategy);
            self.via = via;
        }
        cost
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        let Summarize {
            source,
            by,
            summaries,
            names,
            ..
        } = self;
        let (source, changed) = (*source).transform1();
        (
            Query::Summarize(Summarize::build(source, by, summaries, names)),
            changed,
        )
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self
    }

    fn accs(&self) -> Vec<Acc> {
        self.summaries.iter().map(|s| Acc::new(s.func)).collect()
    }

    fn add_row(&self, accs: &mut [Acc], row: &Row) {
        let Some(hdr) = &self.src_hdr else {
            return;
        };
        for (acc, s) in accs.iter_mut().zip(&self.summaries) {
            let v = match &s.column {
                Some(c) => row.get(hdr, c),
                None => Value::Null,
            };
            acc.add(v);
        }
    }

    fn group_key(&self, row: &Row) -> Vec<Value> {
        match &self.src_hdr {
            Some(hdr) => row.values(hdr, &self.by),
            None => Vec::new(),
        }
    }

    fn output(&self, mut key: Vec<Value>, accs: &[Acc]) -> Option<Row> {
        key.extend(accs.iter().map(Acc::result));
        let row = Row::new(vec![Record::empty(), Record::dummy(key)]);
        passes(&self.sel, &self.hdr, &row).then_some(row)
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.src_hdr.is_none() {
            self.src_hdr = Some(self.source.header());
        }
        match self.strategy {
            Some(Strategy::Sequential) => self.get_seq(dir),
            Some(Strategy::Map) => self.get_map(dir),
            Some(Strategy::Copy) | None if self.copy => self.get_copy(dir),
            _ => self.get_map(dir),
        }
    }

    fn get_copy(&mut self, dir: Dir) -> Result<Option<Row>> {
        if !self.by.is_empty() {
            while let Some(row) = self.source.get(dir)? {
                let mut accs = self.accs();
                self.add_row(&mut accs, &row);
                if let Some(out) = self.output(self.group_key(&row), &accs) {
                    return Ok(Some(out));
                }
            }
            return Ok(None);
        }
        if !self.rewound {
            self.rewind();
            return Ok(None);
        }
        self.source.rewind();
        let mut accs = self.accs();
        let mut any = false;
        while let Some(row) = self.source.get(Dir::Next)? {
            any = true;
            self.add_row(&mut accs, &row);
        }
        if !any {
            return Ok(None);
        }
        self.rewound = false;
        match self.output(Vec::new(), &accs) {
            Some(out) => Ok(Some(out)),
            None => {
                self.rewind();
                Ok(None)
            }
        }
    }

    fn get_seq(&mut self, dir: Dir) -> Result<Option<Row>> {
        loop {
            let first = if self.rewound {
                self.source.get(dir)?
            } else if dir != self.lastdir {
                self.ahead = None;
                self.skip_current(dir)?
            } else {
                self.ahead.take()
            };
            self.lastdir = dir;
            let Some(first) = first else {
                self.rewind();
                return Ok(None);
            };
            self.rewound = false;
            let key = self.group_key(&first);
            let mut accs = self.accs();
            self.add_row(&mut accs, &first);
            loop {
                match self.source.get(dir)? {
                    Some(row) if self.group_key(&row) == key => self.add_row(&mut accs, &row),
                    next => {
                        self.ahead = next;
                        break;
                    }
                }
            }
            self.cur = Some(key.clone());
            if let Some(out) = self.output(key, &accs) {
                return Ok(Some(out));
            }
        }
    }

    /// After a direction change, skips the rest of the group just emitted.
    /// Returns the first row of the neighbouring group.
    fn skip_current(&mut self, dir: Dir) -> Result<Option<Row>> {
        while let Some(row) = self.source.get(dir)? {
            if Some(self.group_key(&row)) != self.cur {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn get_map(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.results.is_none() {
            self.source.rewind();
            let mut groups: BTreeMap<Vec<Value>, Vec<Acc>> = BTreeMap::new();
            while let Some(row) = self.source.get(Dir::Next)? {
                let key = self.group_key(&row);
                let mut accs = groups.remove(&key).unwrap_or_else(|| self.accs());
                self.add_row(&mut accs, &row);
                groups.insert(key, accs);
            }
            let results = groups
                .into_iter()
                .map(|(mut key, accs)| {
                    key.extend(accs.iter().map(Acc::result));
                    key
                })
                .collect();
            self.results = Some(results);
        }
        let n = self.results.as_ref().map_or(0, Vec::len);
        loop {
            let next = match (self.pos, dir) {
                (None, Dir::Next) => Some(0),
                (None, Dir::Prev) => n.checked_sub(1),
                (Some(p), Dir::Next) => Some(p + 1),
                (Some(p), Dir::Prev) => p.checked_sub(1),
            };
            let Some(i) = next.filter(|i| *i < n) else {
                self.pos = None;
                return Ok(None);
            };
            self.pos = Some(i);
            let vals = self
                .results
                .as_ref()
                .and_then(|r| r.get(i))
                .cloned()
                .unwrap_or_default();
            let row = Row::new(vec![Record::empty(), Record::dummy(vals)]);
            if passes(&self.sel, &self.hdr, &row) {
                return Ok(Some(row));
            }
        }
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        self.sel = None;
        match self.strategy {
            Some(Strategy::Copy) if !self.by.is_empty() => self.source.select(index, range)?,
            Some(Strategy::Sequential) => {
                let fixed = self.source.fixed();
                match translate_range(index, range, &self.via, &fixed) {
                    Some(r) if subset(index, &self.by) => self.source.select(&self.via, &r)?,
                    _ if range.is_all() => self.source.select(&[], range)?,
                    _ => {
                        return Err(Error::invalid_operation(format!(
                            "summarize can't select on ({}) reading by ({})",
                            fmt_cols(index),
                            fmt_cols(&self.via)
                        )))
                    }
                }
            }
            _ => self.sel = Sel::new(index, range),
        }
        self.rewind();
        Ok(())
    }

    pub(crate) fn rewind(&mut self) {
        self.source.rewind();
        self.rewound = true;
        self.cur = None;
        self.ahead = None;
        self.pos = None;
    }
}

impl fmt::Display for Summarize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match self.strategy {
            Some(Strategy::Copy) => "-copy".to_string(),
            Some(Strategy::Sequential) => format!("-seq^({})", fmt_cols(&self.via)),
            Some(Strategy::Map) => "-map".to_string(),
            None => String::new(),
        };
        let mut parts: Vec<String> = self.by.clone();
        parts.extend(self.summaries.iter().map(|s| s.to_string()));
        write!(f, "{} summarize{} {}", self.source, strategy, parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(func: SummaryFunc, vals: Vec<Value>) -> Value {
        let mut a = Acc::new(func);
        for v in vals {
            a.add(v);
        }
        a.result()
    }

    #[test]
    fn test_total_stays_integer() {
        let v = acc(SummaryFunc::Total, vec![1.into(), 2.into(), Value::Null, "x".into()]);
        assert_eq!(v, Value::Int64(3));
        let v = acc(SummaryFunc::Total, vec![1.into(), 2.5.into()]);
        assert_eq!(v, Value::Float64(3.5));
        let v = acc(SummaryFunc::Total, vec![i64::MAX.into(), 1.into()]);
        assert!(matches!(v, Value::Float64(_)));
    }

    #[test]
    fn test_average_skips_non_numeric() {
        let v = acc(SummaryFunc::Average, vec![2.into(), Value::Null, 4.into()]);
        assert_eq!(v, Value::Float64(3.0));
        assert_eq!(acc(SummaryFunc::Average, vec![]), Value::Int64(0));
    }

    #[test]
    fn test_min_max_list_count() {
        let vals = || vec![Value::from(3), Value::from(1), Value::from(3)];
        assert_eq!(acc(SummaryFunc::Max, vals()), Value::Int64(3));
        assert_eq!(acc(SummaryFunc::Min, vals()), Value::Int64(1));
        assert_eq!(acc(SummaryFunc::Count, vals()), Value::Int64(3));
        assert_eq!(
            acc(SummaryFunc::List, vals()),
            Value::List(vec![Value::Int64(1), Value::Int64(3)])
        );
    }

    #[test]
    fn test_output_names() {
        assert_eq!(Summary::count().output_name(), "count");
        assert_eq!(Summary::total("amt").output_name(), "total_amt");
        assert_eq!(Summary::max("amt").named("biggest").output_name(), "biggest");
    }
}
