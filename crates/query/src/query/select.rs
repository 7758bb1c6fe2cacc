use super::{
    difference_cols, fmt_cols, index_satisfies, subset, translate_range, Fixed, Node, Phase,
    Query, Sel, IMPOSSIBLE,
};
use super::table::FIRSTNEEDS_DATA_FACTOR;
use crate::cache::ColSet;
use crate::config::QueryConfig;
use crate::expr::{BinaryOp, Expr};
use crate::header::Header;
use crate::row::Row;
use hashbrown::{HashMap, HashSet};
use relq_core::{Adr, Dir, Error, Result, Value};
use relq_storage::{KeyBound, KeyRange, MIN_FRAC};
use std::collections::BTreeMap;
use std::fmt;

/// Selectivity assumed for a compared field with no index to estimate from.
const NO_INDEX_FRAC: f64 = 0.5;

/// Selectivity of each term that can't be estimated from an index.
const FUZZY_FRAC: f64 = 0.5;

/// Upper bound on the number of key ranges enumerated for one index.
const MAX_RANGES: usize = 10_000;

/// The values a single field is restricted to.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Iselect {
    /// An interval; each end is (value, inclusive).
    Range {
        lo: Option<(Value, bool)>,
        hi: Option<(Value, bool)>,
    },
    /// A sorted set of values.
    Values(Vec<Value>),
}

impl Iselect {
    fn contains(&self, v: &Value) -> bool {
        match self {
            Iselect::Values(vals) => vals.binary_search(v).is_ok(),
            Iselect::Range { lo, hi } => {
                let above = match lo {
                    Some((x, incl)) => v > x || (*incl && v == x),
                    None => true,
                };
                let below = match hi {
                    Some((x, incl)) => v < x || (*incl && v == x),
                    None => true,
                };
                above && below
            }
        }
    }

    /// Intersects two restrictions. Returns None if nothing can satisfy both.
    fn intersect(self, other: Iselect) -> Option<Iselect> {
        let result = match (self, other) {
            (Iselect::Values(a), b) | (b, Iselect::Values(a)) => {
                Iselect::Values(a.into_iter().filter(|v| b.contains(v)).collect())
            }
            (Iselect::Range { lo: lo1, hi: hi1 }, Iselect::Range { lo: lo2, hi: hi2 }) => {
                let lo = match (lo1, lo2) {
                    (None, x) | (x, None) => x,
                    (Some((a, ia)), Some((b, ib))) => Some(if a > b {
                        (a, ia)
                    } else if b > a {
                        (b, ib)
                    } else {
                        (a, ia && ib)
                    }),
                };
                let hi = match (hi1, hi2) {
                    (None, x) | (x, None) => x,
                    (Some((a, ia)), Some((b, ib))) => Some(if a < b {
                        (a, ia)
                    } else if b < a {
                        (b, ib)
                    } else {
                        (a, ia && ib)
                    }),
                };
                let conflict = matches!(
                    (&lo, &hi),
                    (Some((l, li)), Some((h, hi_incl))) if l > h || (l == h && !(*li && *hi_incl))
                );
                if conflict {
                    return None;
                }
                let point = match (&lo, &hi) {
                    (Some((l, true)), Some((h, true))) if l == h => Some(l.clone()),
                    _ => None,
                };
                match point {
                    Some(v) => Iselect::Values(vec![v]),
                    None => Iselect::Range { lo, hi },
                }
            }
        };
        match &result {
            Iselect::Values(v) if v.is_empty() => None,
            _ => Some(result),
        }
    }
}

enum Term {
    Field(String, Iselect),
    Fuzzy,
    Other,
}

fn classify(e: &Expr) -> Term {
    match e {
        Expr::Binary { left, op, right } => {
            let (col, op, val) = match (&**left, &**right) {
                (Expr::Column(c), Expr::Constant(v)) => (c, *op, v),
                (Expr::Constant(v), Expr::Column(c)) => (c, op.flip(), v),
                _ => return Term::Other,
            };
            let v = || Some((val.clone(), true));
            let x = || Some((val.clone(), false));
            let isel = match op {
                BinaryOp::Eq => Iselect::Values(vec![val.clone()]),
                BinaryOp::Lt => Iselect::Range { lo: None, hi: x() },
                BinaryOp::Le => Iselect::Range { lo: None, hi: v() },
                BinaryOp::Gt => Iselect::Range { lo: x(), hi: None },
                BinaryOp::Ge => Iselect::Range { lo: v(), hi: None },
                BinaryOp::Ne | BinaryOp::Match | BinaryOp::NoMatch => return Term::Fuzzy,
                _ => return Term::Other,
            };
            Term::Field(col.clone(), isel)
        }
        Expr::In { expr, list } => match &**expr {
            Expr::Column(c) => {
                let mut vals = list.clone();
                vals.sort();
                vals.dedup();
                Term::Field(c.clone(), Iselect::Values(vals))
            }
            _ => Term::Other,
        },
        _ => Term::Other,
    }
}

/// Enumerates the key ranges over `idx` implied by the per-field restrictions:
/// the cartesian product of value sets on leading columns, optionally closed by
/// an interval on the next column.
pub(crate) fn key_ranges(idx: &[String], isels: &BTreeMap<String, Iselect>) -> Vec<KeyRange> {
    let mut prefixes: Vec<Vec<Value>> = vec![Vec::new()];
    for col in idx {
        match isels.get(col) {
            Some(Iselect::Values(vals)) if prefixes.len() * vals.len() <= MAX_RANGES => {
                prefixes = prefixes
                    .iter()
                    .flat_map(|p| {
                        vals.iter().map(move |v| {
                            let mut k = p.clone();
                            k.push(v.clone());
                            k
                        })
                    })
                    .collect();
            }
            Some(Iselect::Range { lo, hi }) => {
                return prefixes
                    .into_iter()
                    .map(|p| {
                        let bound = |end: &Option<(Value, bool)>| match end {
                            Some((v, incl)) => {
                                let mut k = p.clone();
                                k.push(v.clone());
                                KeyBound {
                                    prefix: k,
                                    inclusive: *incl,
                                }
                            }
                            None => KeyBound::incl(p.clone()),
                        };
                        KeyRange::new(bound(lo), bound(hi))
                    })
                    .collect();
            }
            _ => break,
        }
    }
    prefixes.into_iter().map(KeyRange::point).collect()
}

/// Selectivity estimates for a select directly over a table.
#[derive(Debug, Default)]
struct Stats {
    nrecs: f64,
    ifracs: HashMap<Vec<String>, f64>,
    sel: f64,
}

#[derive(Debug)]
struct SlowQuery {
    min_rows: usize,
    ratio: f64,
    fetched: usize,
    yielded: usize,
    logged: bool,
}

impl SlowQuery {
    fn new(config: &QueryConfig) -> Self {
        Self {
            min_rows: config.slow_query_min_rows,
            ratio: config.slow_query_ratio,
            fetched: 0,
            yielded: 0,
            logged: false,
        }
    }

    /// Counts a fetched row. Returns true the first time the select looks slow.
    fn record(&mut self, matched: bool) -> bool {
        self.fetched += 1;
        if matched {
            self.yielded += 1;
        }
        if self.logged || self.fetched < self.min_rows {
            return false;
        }
        let ratio = self.fetched as f64 / self.yielded.max(1) as f64;
        self.logged = ratio >= self.ratio;
        self.logged
    }
}

/// Filters rows by a conjunction of predicates.
///
/// Over a table it picks a primary index whose key ranges cover the
/// predicates, and may intersect the addresses from further indexes.
pub struct Select {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    pub(crate) exprs: Vec<Expr>,
    conflicting: bool,
    isels: BTreeMap<String, Iselect>,
    fuzzy: usize,
    stats: Option<Stats>,
    primary: Option<Vec<String>>,
    filters: Vec<Vec<String>>,
    hdr: Option<Header>,
    ranges: Vec<KeyRange>,
    ranges_stale: bool,
    ri: Option<usize>,
    post: Option<Sel>,
    sel: Option<Sel>,
    adrs: Option<HashSet<Adr>>,
    slow: SlowQuery,
}

impl Select {
    /// Creates a select, checking that every referenced column exists.
    pub fn new(source: Query, expr: Expr) -> Result<Query> {
        let cols = source.columns();
        let exprs = expr.conjuncts();
        for e in &exprs {
            if let Some(c) = e.fields().into_iter().find(|f| !cols.contains(f)) {
                return Err(Error::column_not_found("select", c));
            }
        }
        Ok(Query::Select(Select::build(source, exprs)))
    }

    pub(crate) fn build(source: Query, exprs: Vec<Expr>) -> Select {
        let mut isels: BTreeMap<String, Iselect> = BTreeMap::new();
        let mut conflicting = false;
        let mut fuzzy = 0;
        for e in &exprs {
            match classify(e) {
                Term::Field(col, isel) => {
                    let merged = match isels.remove(&col) {
                        Some(prev) => prev.intersect(isel),
                        None => isel.intersect(Iselect::Range { lo: None, hi: None }),
                    };
                    match merged {
                        Some(m) => {
                            isels.insert(col, m);
                        }
                        None => conflicting = true,
                    }
                }
                Term::Fuzzy => fuzzy += 1,
                Term::Other => {}
            }
        }
        Select {
            node: Node::default(),
            source: Box::new(source),
            exprs,
            conflicting,
            isels,
            fuzzy,
            stats: None,
            primary: None,
            filters: Vec::new(),
            hdr: None,
            ranges: Vec::new(),
            ranges_stale: true,
            ri: None,
            post: None,
            sel: None,
            adrs: None,
            slow: SlowQuery::new(&QueryConfig::default()),
        }
    }

    pub(crate) fn configure(&mut self, config: &QueryConfig) {
        self.slow = SlowQuery::new(config);
    }

    fn select_fields(&self) -> ColSet {
        self.exprs.iter().flat_map(Expr::fields).collect()
    }

    /// Recomputes the selectivity estimates after the transaction changed.
    pub(crate) fn refresh_stats(&mut self) {
        self.adrs = None;
        let Query::Table(t) = &*self.source else {
            self.stats = None;
            return;
        };
        if self.conflicting {
            self.stats = None;
            return;
        }
        let name = t.name().to_string();
        let tran = t.tran();
        let mut sel = FUZZY_FRAC.powi(self.fuzzy as i32);
        for (col, isel) in &self.isels {
            let narrowest = t
                .schema()
                .indexes()
                .iter()
                .filter(|idx| idx.first() == Some(col))
                .min_by_key(|idx| idx.len());
            let frac = match narrowest {
                Some(idx) => {
                    let single = BTreeMap::from([(col.clone(), isel.clone())]);
                    key_ranges(idx, &single)
                        .iter()
                        .map(|r| tran.rangefrac(&name, idx, r))
                        .sum::<f64>()
                        .min(1.0)
                }
                None => NO_INDEX_FRAC,
            };
            sel *= frac;
        }
        let mut ifracs = HashMap::new();
        for idx in t.schema().indexes() {
            let frac = match idx.first() {
                Some(c) if self.isels.contains_key(c) => key_ranges(idx, &self.isels)
                    .iter()
                    .map(|r| tran.rangefrac(&name, idx, r))
                    .sum::<f64>()
                    .clamp(MIN_FRAC, 1.0),
                _ => 1.0,
            };
            ifracs.insert(idx.clone(), frac);
        }
        self.stats = Some(Stats {
            nrecs: t.nrecords(),
            ifracs,
            sel,
        });
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.source.columns()
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        self.source.keys()
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        self.source.indexes()
    }

    pub(crate) fn header(&self) -> Header {
        self.source.header()
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        let mut fixed: Vec<Fixed> = self
            .isels
            .iter()
            .filter_map(|(col, isel)| match isel {
                Iselect::Values(vals) => Some(Fixed::new(col.clone(), vals.clone())),
                Iselect::Range { .. } => None,
            })
            .collect();
        for f in self.source.fixed() {
            if !fixed.iter().any(|x| x.field == f.field) {
                fixed.push(f);
            }
        }
        fixed
    }

    pub(crate) fn nrecords(&self) -> f64 {
        if self.conflicting {
            return 0.0;
        }
        match &self.stats {
            Some(s) => s.nrecs * s.sel,
            None => self.source.nrecords() / 2.0,
        }
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
        if self.conflicting {
            return 0.0;
        }
        let mut needs2 = needs.clone();
        needs2.extend(self.select_fields());
        if self.stats.is_none() {
            return self
                .source
                .optimize(index, &needs2, firstneeds, is_cursor, phase);
        }
        let fixed = self.fixed();
        let Some((cost, primary, filters)) =
            self.choose_primary(index, &needs2, firstneeds, &fixed)
        else {
            return IMPOSSIBLE;
        };
        if phase == Phase::Commit {
            tracing::trace!(primary = ?primary, filters = ?filters, cost, "select strategy");
            if let Query::Table(t) = &mut *self.source {
                t.set_index(&primary);
            }
            self.primary = Some(primary);
            self.filters = filters;
            self.ranges_stale = true;
            self.adrs = None;
        }
        cost
    }

    /// Picks the cheapest table index that delivers the required order.
    fn choose_primary(
        &self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        fixed: &[Fixed],
    ) -> Option<(f64, Vec<String>, Vec<Vec<String>>)> {
        let (Query::Table(t), Some(stats)) = (&*self.source, &self.stats) else {
            return None;
        };
        let mut best: Option<(f64, Vec<String>, Vec<Vec<String>>)> = None;
        for idx in t.schema().indexes() {
            if !index_satisfies(idx, index, fixed) {
                continue;
            }
            let frac = stats.ifracs.get(idx).copied().unwrap_or(1.0);
            let index_cost = t.index_read_cost(idx, frac);
            let (cost, filters) = if needs.iter().all(|c| idx.contains(c)) {
                (index_cost, Vec::new())
            } else {
                let (frac, filters) = self.choose_filter(idx, frac);
                let filter_cost: f64 = filters
                    .iter()
                    .map(|f| t.index_read_cost(f, stats.ifracs.get(f).copied().unwrap_or(1.0)))
                    .sum();
                let mut data_cost = t.data_read_cost(frac);
                if !firstneeds.is_empty() && firstneeds.iter().all(|c| idx.contains(c)) {
                    data_cost *= FIRSTNEEDS_DATA_FACTOR;
                }
                (index_cost + filter_cost + data_cost, filters)
            };
            if best.as_ref().map_or(true, |(c, _, _)| cost < *c) {
                best = Some((cost, idx.clone(), filters));
            }
        }
        best
    }

    /// Greedily adds secondary indexes whose address sets shrink the data read
    /// by more than they cost to scan.
    fn choose_filter(&self, primary: &[String], primary_frac: f64) -> (f64, Vec<Vec<String>>) {
        let (Query::Table(t), Some(stats)) = (&*self.source, &self.stats) else {
            return (primary_frac, Vec::new());
        };
        let mut frac = primary_frac;
        let mut filters: Vec<Vec<String>> = Vec::new();
        loop {
            let mut best: Option<(f64, &Vec<String>)> = None;
            for idx in t.schema().indexes() {
                if idx == primary || filters.contains(idx) {
                    continue;
                }
                let ifrac = stats.ifracs.get(idx).copied().unwrap_or(1.0);
                if ifrac >= 1.0 {
                    continue;
                }
                let saved = t.data_read_cost(frac) - t.data_read_cost(frac * ifrac);
                let gain = saved - t.index_read_cost(idx, ifrac);
                if gain > 0.0 && best.map_or(true, |(g, _)| gain > g) {
                    best = Some((gain, idx));
                }
            }
            match best {
                Some((_, idx)) => {
                    frac *= stats.ifracs.get(idx).copied().unwrap_or(1.0);
                    filters.push(idx.clone());
                }
                None => return (frac, filters),
            }
        }
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        if self.exprs.is_empty() {
            return (*self.source, true);
        }
        let exprs = self.exprs;
        match *self.source {
            Query::Select(inner) => {
                let mut all = inner.exprs;
                all.extend(exprs);
                (Query::Select(Select::build(*inner.source, all)), true)
            }
            Query::Project(mut p) => {
                p.source = Box::new(Query::Select(Select::build(*p.source, exprs)));
                (Query::Project(p), true)
            }
            Query::Rename(mut r) => {
                let renamed = exprs.iter().map(|e| e.rename(&r.to, &r.from)).collect();
                r.source = Box::new(Query::Select(Select::build(*r.source, renamed)));
                (Query::Rename(r), true)
            }
            Query::Extend(e) => {
                let ext = e.new_columns();
                let (below, above): (Vec<Expr>, Vec<Expr>) = exprs
                    .into_iter()
                    .partition(|x| x.fields().iter().all(|f| !ext.contains(f)));
                move_below(Query::Extend(e), below, above, |q, below| match q {
                    Query::Extend(mut e) => {
                        e.source = Box::new(Query::Select(Select::build(*e.source, below)));
                        Query::Extend(e)
                    }
                    q => q,
                })
            }
            Query::Summarize(s) => {
                let by = s.by.clone();
                let (below, above): (Vec<Expr>, Vec<Expr>) = exprs
                    .into_iter()
                    .partition(|x| x.fields().iter().all(|f| by.contains(f)));
                move_below(Query::Summarize(s), below, above, |q, below| match q {
                    Query::Summarize(mut s) => {
                        s.source = Box::new(Query::Select(Select::build(*s.source, below)));
                        Query::Summarize(s)
                    }
                    q => q,
                })
            }
            Query::Union(mut u) => {
                u.c.source = push_compatible(u.c.source, &exprs);
                u.c.source2 = push_compatible(u.c.source2, &exprs);
                (Query::Union(u), true)
            }
            Query::Intersect(mut i) => {
                i.c.source = push_compatible(i.c.source, &exprs);
                i.c.source2 = push_compatible(i.c.source2, &exprs);
                (Query::Intersect(i), true)
            }
            Query::Difference(mut d) => {
                let cols2 = d.c.source2.columns();
                let to2: Vec<Expr> = exprs
                    .iter()
                    .filter(|e| e.fields().iter().all(|f| cols2.contains(f)))
                    .cloned()
                    .collect();
                d.c.source = wrap(d.c.source, exprs);
                if !to2.is_empty() {
                    d.c.source2 = wrap(d.c.source2, to2);
                }
                (Query::Difference(d), true)
            }
            Query::Product(mut p) => {
                let split = split_sides(exprs, p.source, p.source2, true);
                p.source = split.source;
                p.source2 = split.source2;
                finish_split(Query::Product(p), split.moved, split.above)
            }
            Query::Join(mut j) => {
                let right = !j.left;
                let split = split_sides(exprs, j.source, j.source2, right);
                j.source = split.source;
                j.source2 = split.source2;
                finish_split(Query::Join(j), split.moved, split.above)
            }
            source => {
                let (source, changed) = source.transform1();
                (Query::Select(Select::build(source, exprs)), changed)
            }
        }
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.conflicting {
            return Ok(None);
        }
        if self.hdr.is_none() {
            self.hdr = Some(self.source.header());
        }
        if self.primary.is_some() {
            self.get_indexed(dir)
        } else {
            self.get_filtered(dir)
        }
    }

    fn get_filtered(&mut self, dir: Dir) -> Result<Option<Row>> {
        while let Some(row) = self.source.get(dir)? {
            if self.accept(&row)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn get_indexed(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.ranges_stale {
            self.build_ranges();
        }
        if self.adrs.is_none() && !self.filters.is_empty() {
            self.adrs = Some(self.filter_adrs()?);
        }
        if self.ri.is_none() && !self.start_range(dir)? {
            return Ok(None);
        }
        loop {
            match self.source.get(dir)? {
                Some(row) => {
                    if self.accept(&row)? {
                        return Ok(Some(row));
                    }
                }
                None => {
                    let next = match (self.ri, dir) {
                        (Some(i), Dir::Next) => i.checked_add(1).filter(|n| *n < self.ranges.len()),
                        (Some(i), Dir::Prev) => i.checked_sub(1),
                        (None, _) => None,
                    };
                    match next {
                        Some(n) => self.enter_range(n)?,
                        None => {
                            self.rewind();
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    /// Positions on the first range in direction `dir`. Returns false if there
    /// are no ranges.
    fn start_range(&mut self, dir: Dir) -> Result<bool> {
        if self.ranges.is_empty() {
            return Ok(false);
        }
        let first = match dir {
            Dir::Next => 0,
            Dir::Prev => self.ranges.len() - 1,
        };
        self.enter_range(first)?;
        Ok(true)
    }

    fn enter_range(&mut self, i: usize) -> Result<()> {
        self.ri = Some(i);
        let Some(primary) = self.primary.clone() else {
            return Ok(());
        };
        self.source.select(&primary, &self.ranges[i])
    }

    /// Combines the predicate ranges with the parent's narrowing.
    fn build_ranges(&mut self) {
        self.ranges_stale = false;
        self.post = None;
        let Some(primary) = &self.primary else {
            return;
        };
        let base = key_ranges(primary, &self.isels);
        let parent = match &self.sel {
            Some(sel) => match translate_range(&sel.index, &sel.range, primary, &self.fixed()) {
                Some(r) => Some(r),
                None => {
                    self.post = self.sel.clone();
                    None
                }
            },
            None => None,
        };
        self.ranges = base
            .into_iter()
            .map(|r| match &parent {
                Some(p) => r.intersect(p),
                None => r,
            })
            .filter(|r| !r.is_empty())
            .collect();
    }

    /// Collects the addresses admitted by every secondary filter index.
    fn filter_adrs(&self) -> Result<HashSet<Adr>> {
        let Query::Table(t) = &*self.source else {
            return Ok(HashSet::new());
        };
        let mut result: Option<HashSet<Adr>> = None;
        for idx in &self.filters {
            let mut adrs = HashSet::new();
            for range in key_ranges(idx, &self.isels) {
                let mut pos = None;
                while let Some(entry) =
                    t.tran()
                        .seek(t.name(), idx, &range, pos.as_ref(), Dir::Next)?
                {
                    pos = Some(entry.pos());
                    if result.as_ref().map_or(true, |r| r.contains(&entry.record.adr())) {
                        adrs.insert(entry.record.adr());
                    }
                }
            }
            result = Some(adrs);
        }
        Ok(result.unwrap_or_default())
    }

    fn accept(&mut self, row: &Row) -> Result<bool> {
        let matched = self.matches(row)?;
        if self.slow.record(matched) {
            tracing::warn!(
                fetched = self.slow.fetched,
                yielded = self.slow.yielded,
                query = %self,
                "slow query"
            );
        }
        Ok(matched)
    }

    fn matches(&self, row: &Row) -> Result<bool> {
        let Some(hdr) = &self.hdr else {
            return Ok(false);
        };
        if let (Some(adrs), Some(rec)) = (&self.adrs, row.data_record()) {
            if !adrs.contains(&rec.adr()) {
                return Ok(false);
            }
        }
        if let Some(post) = &self.post {
            if !post.contains(hdr, row) {
                return Ok(false);
            }
        }
        for e in &self.exprs {
            if !e.test(&|c| row.get(hdr, c))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        if self.primary.is_some() {
            self.sel = Sel::new(index, range);
            self.ranges_stale = true;
            self.rewind();
            Ok(())
        } else {
            self.source.select(index, range)
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.ri = None;
        self.source.rewind();
    }
}

/// Wraps a child in a select.
fn wrap(side: Box<Query>, exprs: Vec<Expr>) -> Box<Query> {
    Box::new(Query::Select(Select::build(*side, exprs)))
}

/// Pushes predicates into one side of a union-compatible operator, replacing
/// columns the side lacks with the empty value.
fn push_compatible(side: Box<Query>, exprs: &[Expr]) -> Box<Query> {
    let cols = side.columns();
    let pushed = exprs
        .iter()
        .map(|e| {
            let fields: Vec<String> = e.fields().into_iter().collect();
            let missing = difference_cols(&fields, &cols);
            if missing.is_empty() {
                e.clone()
            } else {
                let nulls = vec![Expr::Constant(Value::Null); missing.len()];
                e.replace_fields(&missing, &nulls)
            }
        })
        .collect();
    wrap(side, pushed)
}

struct Split {
    source: Box<Query>,
    source2: Box<Query>,
    moved: bool,
    above: Vec<Expr>,
}

/// Distributes predicates to the sides of a product or join that have all of
/// their columns.
fn split_sides(
    exprs: Vec<Expr>,
    mut source: Box<Query>,
    mut source2: Box<Query>,
    allow_right: bool,
) -> Split {
    let cols1 = source.columns();
    let cols2 = source2.columns();
    let mut to1 = Vec::new();
    let mut to2 = Vec::new();
    let mut above = Vec::new();
    for e in exprs {
        let fields: Vec<String> = e.fields().into_iter().collect();
        let in1 = subset(&fields, &cols1);
        let in2 = allow_right && subset(&fields, &cols2);
        if in2 {
            to2.push(e.clone());
        }
        if in1 {
            to1.push(e);
        } else if !in2 {
            above.push(e);
        }
    }
    let moved = !to1.is_empty() || !to2.is_empty();
    if !to1.is_empty() {
        source = wrap(source, to1);
    }
    if !to2.is_empty() {
        source2 = wrap(source2, to2);
    }
    Split {
        source,
        source2,
        moved,
        above,
    }
}

fn finish_split(q: Query, moved: bool, above: Vec<Expr>) -> (Query, bool) {
    if moved {
        if above.is_empty() {
            (q, true)
        } else {
            (Query::Select(Select::build(q, above)), true)
        }
    } else {
        let (q, changed) = q.transform1();
        (Query::Select(Select::build(q, above)), changed)
    }
}

/// Moves `below` under a single-source operator and leaves `above` on top.
fn move_below(
    q: Query,
    below: Vec<Expr>,
    above: Vec<Expr>,
    push: impl FnOnce(Query, Vec<Expr>) -> Query,
) -> (Query, bool) {
    if below.is_empty() {
        let (q, changed) = q.transform1();
        return (Query::Select(Select::build(q, above)), changed);
    }
    let q = push(q, below);
    if above.is_empty() {
        (q, true)
    } else {
        (Query::Select(Select::build(q, above)), true)
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exprs: Vec<String> = self.exprs.iter().map(|e| e.to_string()).collect();
        write!(f, "{} where {}", self.source, exprs.join(" and "))?;
        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(|x| fmt_cols(x)).collect();
            write!(f, " filter({})", filters.join(";"))?;
        }
        Ok(())
    }
}
