use super::compatible::Compatible;
use super::{
    difference_cols, fmt_cols, passes, prefix_set_equals, same_set, select_child, Fixed, Node,
    Phase, Query, Sel, IMPOSSIBLE, OUT_OF_ORDER,
};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Result, Value};
use relq_storage::{KeyBound, KeyRange};
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
enum Strategy {
    /// Both sides in the same key order, merged.
    Merge,
    /// Sides known to share no rows, read one after the other.
    Disjoint,
    /// All of source1, then source2 rows not found in source1.
    Lookup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    One,
    Two,
    Both,
}

/// Rows present in either source.
pub struct Union {
    pub(crate) node: Node,
    pub(crate) c: Compatible,
    strategy: Option<Strategy>,
    order: Vec<String>,
    hdr: Option<Header>,
    sel: Option<Sel>,
    rewound: bool,
    // merge state
    row1: Option<Row>,
    row2: Option<Row>,
    done1: bool,
    done2: bool,
    curdir: Dir,
    last: Option<(Vec<Value>, Side)>,
    // disjoint and lookup state
    side: Side,
}

enum Plan {
    Merge(Vec<String>),
    Disjoint,
    Lookup(Vec<String>),
    LookupSwapped(Vec<String>),
}

impl Union {
    pub fn new(source: Query, source2: Query) -> Query {
        Query::Union(Union::from_compatible(Compatible::new(source, source2)))
    }

    fn from_compatible(c: Compatible) -> Union {
        Union {
            node: Node::default(),
            c,
            strategy: None,
            order: Vec::new(),
            hdr: None,
            sel: None,
            rewound: true,
            row1: None,
            row2: None,
            done1: false,
            done2: false,
            curdir: Dir::Next,
            last: None,
            side: Side::One,
        }
    }

    /// Recomputes derived state after the sources changed.
    pub(crate) fn rebuild(self) -> Union {
        Union::from_compatible(self.c.rebuild())
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.c.allcols.clone()
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        let Some(d) = self.c.disjoint() else {
            return vec![self.c.allcols.clone()];
        };
        // pairs where one key leads the other; the longer is unique on both sides
        let mut keys: Vec<Vec<String>> = Vec::new();
        let keys2 = self.c.source2.keys();
        for k1 in self.c.source.keys() {
            for k2 in &keys2 {
                let mut k = if prefix_set_equals(k2, &k1, &[]) {
                    k2.clone()
                } else if prefix_set_equals(&k1, k2, &[]) {
                    k1.clone()
                } else {
                    continue;
                };
                if !k.contains(&d) {
                    k.push(d.clone());
                }
                if !keys.iter().any(|x| same_set(x, &k)) {
                    keys.push(k);
                }
            }
        }
        if keys.is_empty() {
            keys.push(self.c.allcols.clone());
        }
        keys
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        let idx2 = self.c.source2.indexes();
        self.c
            .source
            .indexes()
            .into_iter()
            .filter(|i| idx2.contains(i))
            .collect()
    }

    pub(crate) fn header(&self) -> Header {
        self.c
            .source
            .header()
            .concat(&self.c.source2.header(), self.c.allcols.clone())
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        let cols1 = self.c.source.columns();
        let cols2 = self.c.source2.columns();
        let fixed1 = self.c.source.fixed();
        let fixed2 = self.c.source2.fixed();
        let mut fixed = Vec::new();
        for f in &fixed1 {
            let other = match fixed2.iter().find(|g| g.field == f.field) {
                Some(g) => g.values.clone(),
                None if !cols2.contains(&f.field) => vec![Value::Null],
                None => continue,
            };
            let mut values = f.values.clone();
            for v in other {
                if !values.contains(&v) {
                    values.push(v);
                }
            }
            fixed.push(Fixed::new(f.field.clone(), values));
        }
        for g in &fixed2 {
            if !cols1.contains(&g.field) && !fixed1.iter().any(|f| f.field == g.field) {
                let mut values = g.values.clone();
                if !values.contains(&Value::Null) {
                    values.push(Value::Null);
                }
                fixed.push(Fixed::new(g.field.clone(), values));
            }
        }
        fixed
    }

    pub(crate) fn nrecords(&self) -> f64 {
        let n = self.c.source.nrecords() + self.c.source2.nrecords();
        if self.c.disjoint().is_some() {
            n
        } else {
            n * 0.75
        }
    }

    pub(crate) fn recordsize(&self) -> f64 {
        (self.c.source.recordsize() + self.c.source2.recordsize()) / 2.0
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
        let cols1 = self.c.cols1();
        let cols2 = self.c.cols2();
        let needs1: ColSet = needs.iter().chain(&cols1).cloned().collect();
        let needs2: ColSet = needs.iter().chain(&cols2).cloned().collect();
        let mut best = (IMPOSSIBLE, Plan::Disjoint);

        let keys2 = self.c.source2.keys();
        for key in self.c.source.keys() {
            if !keys2.iter().any(|k| same_set(k, &key)) {
                continue;
            }
            let order = if key.starts_with(index) {
                key
            } else {
                let mut order = index.to_vec();
                order.extend(difference_cols(&key, index));
                order
            };
            let cost = self
                .c
                .source
                .optimize(&order, &needs1, firstneeds, is_cursor, Phase::Explore)
                + self
                    .c
                    .source2
                    .optimize(&order, &needs2, firstneeds, is_cursor, Phase::Explore);
            if cost < best.0 {
                best = (cost, Plan::Merge(order));
            }
        }

        if index.is_empty() {
            let scan1 = self
                .c
                .source
                .optimize(&[], &needs1, firstneeds, is_cursor, Phase::Explore);
            let scan2 = self
                .c
                .source2
                .optimize(&[], &needs2, firstneeds, is_cursor, Phase::Explore);
            if self.c.disjoint().is_some() {
                if scan1 + scan2 < best.0 {
                    best = (scan1 + scan2, Plan::Disjoint);
                }
            } else {
                let (k1, lookup1) = self.c.source.key_index(&cols1);
                if 2.0 * lookup1 + scan2 < best.0 {
                    best = (2.0 * lookup1 + scan2, Plan::Lookup(k1));
                }
                let (k2, lookup2) = self.c.source2.key_index(&cols2);
                let swapped = 2.0 * lookup2 + scan1 + OUT_OF_ORDER;
                if swapped < best.0 {
                    best = (swapped, Plan::LookupSwapped(k2));
                }
            }
        }

        let (cost, plan) = best;
        if cost >= IMPOSSIBLE {
            return IMPOSSIBLE;
        }
        if phase == Phase::Commit {
            self.commit(plan, &needs1, &needs2, firstneeds, is_cursor);
        }
        cost
    }

    fn commit(
        &mut self,
        plan: Plan,
        needs1: &ColSet,
        needs2: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
    ) {
        let none = ColSet::new();
        match plan {
            Plan::Merge(order) => {
                self.c
                    .source
                    .optimize(&order, needs1, firstneeds, is_cursor, Phase::Commit);
                self.c
                    .source2
                    .optimize(&order, needs2, firstneeds, is_cursor, Phase::Commit);
                self.strategy = Some(Strategy::Merge);
                self.order = order;
            }
            Plan::Disjoint => {
                self.c
                    .source
                    .optimize(&[], needs1, firstneeds, is_cursor, Phase::Commit);
                self.c
                    .source2
                    .optimize(&[], needs2, firstneeds, is_cursor, Phase::Commit);
                self.strategy = Some(Strategy::Disjoint);
            }
            Plan::Lookup(key) => {
                let cols1 = self.c.cols1();
                self.c
                    .source
                    .optimize(&key, &cols1, &none, false, Phase::Commit);
                self.c
                    .source2
                    .optimize(&[], needs2, firstneeds, is_cursor, Phase::Commit);
                self.strategy = Some(Strategy::Lookup);
                self.c.key = key;
            }
            Plan::LookupSwapped(key) => {
                self.c.swap();
                let cols1 = self.c.cols1();
                self.c
                    .source
                    .optimize(&key, &cols1, &none, false, Phase::Commit);
                self.c
                    .source2
                    .optimize(&[], needs1, firstneeds, is_cursor, Phase::Commit);
                self.strategy = Some(Strategy::Lookup);
                self.c.key = key;
            }
        }
        tracing::trace!(strategy = ?self.strategy, order = ?self.order, "union strategy");
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        let (c, changed) = self.c.transform();
        (Query::Union(Union::from_compatible(c)), changed)
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.c = self.c.add_index();
        self
    }

    fn prepare(&mut self) {
        self.c.headers();
        if self.hdr.is_none() {
            self.hdr = Some(self.header());
        }
    }

    /// Builds an output row from a row of one side.
    fn output(&self, row: Row, side: Side) -> Row {
        let size1 = self.c.hdr1.as_ref().map_or(0, Header::size);
        let size2 = self.c.hdr2.as_ref().map_or(0, Header::size);
        match side {
            Side::One | Side::Both => row.concat(Row::empty(size2)),
            Side::Two => Row::empty(size1).concat(row),
        }
    }

    fn accept(&self, row: &Row) -> bool {
        match &self.hdr {
            Some(hdr) => passes(&self.sel, hdr, row),
            None => true,
        }
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        self.prepare();
        match self.strategy {
            Some(Strategy::Merge) => self.get_merge(dir),
            Some(Strategy::Disjoint) => self.get_sequential(dir, false),
            Some(Strategy::Lookup) | None => self.get_sequential(dir, true),
        }
    }

    fn get_merge(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.rewound {
            self.rewound = false;
            self.curdir = dir;
        } else if dir != self.curdir {
            self.reposition(dir)?;
        }
        loop {
            if self.row1.is_none() && !self.done1 {
                self.row1 = self.c.source.get(dir)?;
                self.done1 = self.row1.is_none();
            }
            if self.row2.is_none() && !self.done2 {
                self.row2 = self.c.source2.get(dir)?;
                self.done2 = self.row2.is_none();
            }
            let side = match (&self.row1, &self.row2) {
                (None, None) => {
                    self.restore()?;
                    return Ok(None);
                }
                (Some(_), None) => Side::One,
                (None, Some(_)) => Side::Two,
                (Some(r1), Some(r2)) => {
                    let (k1, k2) = (self.key1(r1), self.key2(r2));
                    let first = if dir == Dir::Next { Side::One } else { Side::Two };
                    let second = if dir == Dir::Next { Side::Two } else { Side::One };
                    match k1.cmp(&k2) {
                        Ordering::Less => first,
                        Ordering::Greater => second,
                        Ordering::Equal if self.c.equal(r1, r2) => Side::Both,
                        Ordering::Equal => first,
                    }
                }
            };
            let row = match side {
                Side::One => self.row1.take(),
                Side::Two => self.row2.take(),
                Side::Both => {
                    self.row2 = None;
                    self.row1.take()
                }
            };
            let Some(row) = row else {
                continue;
            };
            let key = match side {
                Side::Two => self.key2(&row),
                _ => self.key1(&row),
            };
            self.last = Some((key, side));
            let out = self.output(row, side);
            if self.accept(&out) {
                return Ok(Some(out));
            }
        }
    }

    fn key1(&self, row: &Row) -> Vec<Value> {
        self.c
            .hdr1
            .as_ref()
            .map_or_else(Vec::new, |h| row.values(h, &self.order))
    }

    fn key2(&self, row: &Row) -> Vec<Value> {
        self.c
            .hdr2
            .as_ref()
            .map_or_else(Vec::new, |h| row.values(h, &self.order))
    }

    /// Restarts both sides just past the last row emitted, in the new
    /// direction. Side one sorts before side two on equal keys.
    fn reposition(&mut self, dir: Dir) -> Result<()> {
        self.curdir = dir;
        self.row1 = None;
        self.row2 = None;
        self.done1 = false;
        self.done2 = false;
        let Some((key, side)) = self.last.clone() else {
            self.restore()?;
            self.rewound = false;
            return Ok(());
        };
        let all = KeyBound::incl(Vec::new());
        let (r1, r2) = match dir {
            Dir::Next => {
                let lo2 = if side == Side::One {
                    KeyBound::incl(key.clone())
                } else {
                    KeyBound::excl(key.clone())
                };
                (
                    KeyRange::new(KeyBound::excl(key), all.clone()),
                    KeyRange::new(lo2, all),
                )
            }
            Dir::Prev => {
                let hi1 = if side == Side::Two {
                    KeyBound::incl(key.clone())
                } else {
                    KeyBound::excl(key.clone())
                };
                (
                    KeyRange::new(all.clone(), hi1),
                    KeyRange::new(all, KeyBound::excl(key)),
                )
            }
        };
        let (r1, r2) = match &self.sel {
            Some(sel) if self.order.starts_with(&sel.index) => {
                (r1.intersect(&sel.range), r2.intersect(&sel.range))
            }
            _ => (r1, r2),
        };
        self.c.source.select(&self.order, &r1)?;
        self.c.source2.select(&self.order, &r2)
    }

    /// Reads source1 then source2, or the reverse going backward. With
    /// `check`, rows of source2 also found in source1 are skipped.
    fn get_sequential(&mut self, dir: Dir, check: bool) -> Result<Option<Row>> {
        if self.rewound {
            self.rewound = false;
            self.side = if dir == Dir::Next { Side::One } else { Side::Two };
        }
        loop {
            if self.side == Side::One {
                match self.c.source.get(dir)? {
                    Some(row) => {
                        let out = self.output(row, Side::One);
                        if self.accept(&out) {
                            return Ok(Some(out));
                        }
                    }
                    None if dir == Dir::Next => self.side = Side::Two,
                    None => {
                        self.restore()?;
                        return Ok(None);
                    }
                }
            } else {
                match self.c.source2.get(dir)? {
                    Some(row) => {
                        if check && self.c.in_source1(&row)? {
                            continue;
                        }
                        let out = self.output(row, Side::Two);
                        if self.accept(&out) {
                            return Ok(Some(out));
                        }
                    }
                    None if dir == Dir::Prev => {
                        self.side = Side::One;
                        select_child(&mut self.c.source, &self.sel)?;
                    }
                    None => {
                        self.restore()?;
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Returns both sides to the start of the current narrowing.
    fn restore(&mut self) -> Result<()> {
        self.rewound = true;
        self.row1 = None;
        self.row2 = None;
        self.done1 = false;
        self.done2 = false;
        self.last = None;
        select_child(&mut self.c.source, &self.sel)?;
        select_child(&mut self.c.source2, &self.sel)
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        self.sel = Sel::new(index, range);
        self.restore()
    }

    pub(crate) fn rewind(&mut self) {
        if self.restore().is_err() {
            self.c.source.rewind();
            self.c.source2.rewind();
        }
    }
}

impl fmt::Display for Union {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match &self.strategy {
            Some(Strategy::Merge) => format!("-merge^({})", fmt_cols(&self.order)),
            Some(Strategy::Disjoint) => "-disjoint".to_string(),
            Some(Strategy::Lookup) => format!("-lookup^({})", fmt_cols(&self.c.key)),
            None => String::new(),
        };
        write!(f, "({}) union{} ({})", self.c.source, strategy, self.c.source2)
    }
}
