use super::{
    fmt_cols, index_satisfies, intersect_cols, prefix_set_equals, same_set, set_of, subset,
    Extend, Fixed, Node, Phase, Query, Rename, IMPOSSIBLE,
};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use hashbrown::HashMap;
use relq_core::{Adr, Dir, Error, Result, Value, DUMMY_ADR};
use relq_storage::KeyRange;
use std::fmt;

/// Cost multiplier for de-duplicating through a lookup table.
const LOOKUP_FACTOR: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    Copy,
    Sequential,
    Lookup,
}

/// What makes a source row the representative of its projected key.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Identity {
    Refs(Vec<Adr>),
    Values(Vec<Value>),
}

/// Keeps a subset of columns, removing duplicate rows.
pub struct Project {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    pub(crate) flds: Vec<String>,
    copy: bool,
    strategy: Option<Strategy>,
    via: Vec<String>,
    hdr: Option<Header>,
    cur: Option<Vec<Value>>,
    map: HashMap<Vec<Value>, Identity>,
    complete: bool,
    rewound: bool,
}

impl Project {
    /// Projects `fields`, which must all be source columns.
    pub fn new(source: Query, fields: &[&str]) -> Result<Query> {
        let cols = source.columns();
        let mut flds: Vec<String> = Vec::new();
        for f in fields {
            if !cols.iter().any(|c| c == f) {
                return Err(Error::column_not_found("project", *f));
            }
            if !flds.iter().any(|x| x == f) {
                flds.push(f.to_string());
            }
        }
        Ok(Query::Project(Project::build(source, flds)))
    }

    /// Projects every source column except `fields`.
    pub fn remove(source: Query, fields: &[&str]) -> Result<Query> {
        let cols = source.columns();
        if let Some(f) = fields.iter().find(|f| !cols.iter().any(|c| c == *f)) {
            return Err(Error::column_not_found("remove", *f));
        }
        let flds = cols
            .into_iter()
            .filter(|c| !fields.iter().any(|f| f == c))
            .collect();
        Ok(Query::Project(Project::build(source, flds)))
    }

    pub(crate) fn build(source: Query, mut flds: Vec<String>) -> Project {
        let cols = source.columns();
        for f in flds.clone() {
            let deps = format!("{f}_deps");
            if cols.contains(&deps) && !flds.contains(&deps) {
                flds.push(deps);
            }
        }
        let copy = source.keys().iter().any(|k| subset(k, &flds));
        Project {
            node: Node::default(),
            source: Box::new(source),
            flds,
            copy,
            strategy: None,
            via: Vec::new(),
            hdr: None,
            cur: None,
            map: HashMap::new(),
            complete: false,
            rewound: true,
        }
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.flds.clone()
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        if self.copy {
            self.source
                .keys()
                .into_iter()
                .filter(|k| subset(k, &self.flds))
                .collect()
        } else {
            vec![self.flds.clone()]
        }
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        self.source
            .indexes()
            .into_iter()
            .filter(|i| subset(i, &self.flds))
            .collect()
    }

    pub(crate) fn header(&self) -> Header {
        self.source.header().project(&self.flds)
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        self.source
            .fixed()
            .into_iter()
            .filter(|f| self.flds.contains(&f.field))
            .collect()
    }

    pub(crate) fn nrecords(&self) -> f64 {
        if self.copy {
            self.source.nrecords()
        } else {
            self.source.nrecords() / 2.0
        }
    }

    pub(crate) fn recordsize(&self) -> f64 {
        let ncols = self.source.columns().len().max(1) as f64;
        self.source.recordsize() * self.flds.len() as f64 / ncols
    }

    pub(crate) fn updateable(&self) -> Option<String> {
        if self.copy {
            self.source.updateable()
        } else {
            None
        }
    }

    pub(crate) fn optimize2(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        if self.copy {
            if phase == Phase::Commit {
                self.strategy = Some(Strategy::Copy);
            }
            return self
                .source
                .optimize(index, needs, firstneeds, is_cursor, phase);
        }
        let mut needs2 = needs.clone();
        needs2.extend(self.flds.iter().cloned());
        let fixed = self.source.fixed();
        let mut seq: Option<(f64, Vec<String>)> = None;
        for idx in self.source.indexes() {
            if !prefix_set_equals(&idx, &self.flds, &fixed) || !index_satisfies(&idx, index, &fixed)
            {
                continue;
            }
            let cost = self
                .source
                .optimize(&idx, &needs2, firstneeds, is_cursor, Phase::Explore);
            if seq.as_ref().map_or(true, |(c, _)| cost < *c) {
                seq = Some((cost, idx));
            }
        }
        let lookup = if is_cursor {
            IMPOSSIBLE
        } else {
            LOOKUP_FACTOR
                * self
                    .source
                    .optimize(index, &needs2, firstneeds, is_cursor, Phase::Explore)
        };
        let (cost, strategy, via) = match seq {
            Some((c, idx)) if c <= lookup => (c, Strategy::Sequential, idx),
            _ => (lookup, Strategy::Lookup, index.to_vec()),
        };
        if cost >= IMPOSSIBLE {
            return IMPOSSIBLE;
        }
        if phase == Phase::Commit {
            tracing::trace!(strategy = ?strategy, via = ?via, cost, "project strategy");
            self.source
                .optimize(&via, &needs2, firstneeds, is_cursor, Phase::Commit);
            self.strategy = Some(strategy);
            self.via = via;
        }
        cost
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        let src_cols = self.source.columns();
        if same_set(&self.flds, &src_cols) {
            return (*self.source, true);
        }
        let flds = self.flds;
        match *self.source {
            Query::Project(inner) => (Query::Project(Project::build(*inner.source, flds)), true),
            Query::Rename(r) => {
                let from: Vec<String> = flds.iter().map(|f| r.backward(f)).collect();
                let (rfrom, rto): (Vec<String>, Vec<String>) = r
                    .from
                    .iter()
                    .zip(r.to.iter())
                    .filter(|(_, t)| flds.contains(t))
                    .map(|(f, t)| (f.clone(), t.clone()))
                    .unzip();
                let projected = Query::Project(Project::build(*r.source, from));
                (Query::Rename(Rename::build(projected, rfrom, rto)), true)
            }
            Query::Extend(e) => match project_extend(e, &flds) {
                Ok(q) => (q, true),
                Err(e) => keep(Query::Extend(e), flds),
            },
            Query::Union(mut u) => {
                // the sides keep the disjoint column so the union stays disjoint
                let disjoint = u.c.disjoint().filter(|d| !flds.contains(d));
                let mut wanted = flds.clone();
                wanted.extend(disjoint.iter().cloned());
                let cols1 = u.c.source.columns();
                let cols2 = u.c.source2.columns();
                let f1 = intersect_cols(&wanted, &cols1);
                let f2 = intersect_cols(&wanted, &cols2);
                let narrowed = |f: &[String], cols: &[String]| {
                    cols.iter().all(|c| f.contains(c) || c.ends_with("_deps"))
                };
                if f1.is_empty()
                    || f2.is_empty()
                    || (disjoint.is_some() && narrowed(&f1, &cols1) && narrowed(&f2, &cols2))
                {
                    return keep(Query::Union(u), flds);
                }
                u.c.source = Box::new(Query::Project(Project::build(*u.c.source, f1)));
                u.c.source2 = Box::new(Query::Project(Project::build(*u.c.source2, f2)));
                let union = Query::Union(u.rebuild());
                if disjoint.is_some() {
                    (Query::Project(Project::build(union, flds)), true)
                } else {
                    (union, true)
                }
            }
            Query::Product(mut p) => {
                let f1 = intersect_cols(&flds, &p.source.columns());
                let f2 = intersect_cols(&flds, &p.source2.columns());
                if f1.is_empty() || f2.is_empty() {
                    return keep(Query::Product(p), flds);
                }
                p.source = Box::new(Query::Project(Project::build(*p.source, f1)));
                p.source2 = Box::new(Query::Project(Project::build(*p.source2, f2)));
                (Query::Product(p), true)
            }
            Query::Join(mut j) if subset(&j.by, &flds) => {
                let f1 = intersect_cols(&flds, &j.source.columns());
                let f2 = intersect_cols(&flds, &j.source2.columns());
                j.source = Box::new(Query::Project(Project::build(*j.source, f1)));
                j.source2 = Box::new(Query::Project(Project::build(*j.source2, f2)));
                (Query::Join(j.rebuild()), true)
            }
            source => keep(source, flds),
        }
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        if self.hdr.is_none() {
            self.hdr = Some(self.source.header());
        }
        match self.strategy {
            Some(Strategy::Sequential) => self.get_seq(dir),
            Some(Strategy::Lookup) => self.get_lookup(dir),
            Some(Strategy::Copy) => self.source.get(dir),
            None if self.copy => self.source.get(dir),
            None => self.get_lookup(dir),
        }
    }

    fn key_of(&self, row: &Row) -> Vec<Value> {
        match &self.hdr {
            Some(hdr) => row.values(hdr, &self.flds),
            None => Vec::new(),
        }
    }

    /// Rows with equal projected values are adjacent, so emit the first of
    /// each run in either direction.
    fn get_seq(&mut self, dir: Dir) -> Result<Option<Row>> {
        loop {
            let Some(row) = self.source.get(dir)? else {
                self.cur = None;
                return Ok(None);
            };
            let key = self.key_of(&row);
            if self.cur.as_ref() != Some(&key) {
                self.cur = Some(key);
                return Ok(Some(row));
            }
        }
    }

    fn identity(&self, row: &Row) -> Identity {
        let refs = row.refs();
        if refs.contains(&DUMMY_ADR) {
            let cols = self.source.columns();
            Identity::Values(self.key_of_cols(row, &cols))
        } else {
            Identity::Refs(refs)
        }
    }

    fn key_of_cols(&self, row: &Row, cols: &[String]) -> Vec<Value> {
        match &self.hdr {
            Some(hdr) => row.values(hdr, cols),
            None => Vec::new(),
        }
    }

    /// Emits a row if its key is new, or if it is the row that first
    /// represented the key. Reading backward from the start first reads
    /// everything so that representatives match a forward pass.
    fn get_lookup(&mut self, dir: Dir) -> Result<Option<Row>> {
        if dir == Dir::Prev && self.rewound && !self.complete {
            self.source.rewind();
            while let Some(row) = self.source.get(Dir::Next)? {
                let key = self.key_of(&row);
                if !self.map.contains_key(&key) {
                    let id = self.identity(&row);
                    self.map.insert(key, id);
                }
            }
            self.complete = true;
        }
        loop {
            let Some(row) = self.source.get(dir)? else {
                if dir == Dir::Next {
                    self.complete = true;
                }
                self.rewound = true;
                return Ok(None);
            };
            self.rewound = false;
            let key = self.key_of(&row);
            let id = self.identity(&row);
            match self.map.get(&key) {
                None => {
                    self.map.insert(key, id);
                    return Ok(Some(row));
                }
                Some(rep) if *rep == id => return Ok(Some(row)),
                Some(_) => {}
            }
        }
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        self.source.select(index, range)?;
        self.map.clear();
        self.complete = false;
        self.cur = None;
        self.rewound = true;
        Ok(())
    }

    pub(crate) fn rewind(&mut self) {
        self.source.rewind();
        self.cur = None;
        self.rewound = true;
    }
}

/// Keeps the projection and transforms its source.
fn keep(source: Query, flds: Vec<String>) -> (Query, bool) {
    let (source, changed) = source.transform1();
    (Query::Project(Project::build(source, flds)), changed)
}

/// Moves a projection below an extend whose expressions only use kept
/// columns. Gives the extend back if that isn't possible.
fn project_extend(e: Extend, flds: &[String]) -> std::result::Result<Query, Extend> {
    if e.has_rules() {
        return Err(e);
    }
    let ext = e.new_columns();
    let base: Vec<String> = flds.iter().filter(|f| !ext.contains(f)).cloned().collect();
    if base.is_empty() {
        return Err(e);
    }
    let mut avail = set_of(&base);
    let mut kept = Vec::new();
    let defs: Vec<_> = e.definitions().collect();
    for (col, expr) in defs {
        if !flds.contains(col) {
            continue;
        }
        if !expr.fields().iter().all(|f| avail.contains(f)) {
            return Err(e);
        }
        avail.insert(col.clone());
        kept.push((col.clone(), expr.clone()));
    }
    let source = Query::Project(Project::build(e.into_source(), base));
    if kept.is_empty() {
        Ok(source)
    } else {
        Ok(Query::Extend(Extend::build(source, kept)))
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.strategy {
            Some(Strategy::Copy) => "-copy".to_string(),
            Some(Strategy::Sequential) => format!("-seq^({})", fmt_cols(&self.via)),
            Some(Strategy::Lookup) => "-lookup".to_string(),
            None => String::new(),
        };
        write!(f, "{} project{} {}", self.source, suffix, fmt_cols(&self.flds))
    }
}
