use super::{Fixed, Node, Phase, Query};
use crate::cache::ColSet;
use crate::header::Header;
use crate::row::Row;
use relq_core::{Dir, Error, Result};
use relq_storage::KeyRange;
use std::fmt;

/// Renames columns.
///
/// Pairs are stored as a parallel mapping from source names to output names;
/// a chain like `a to b, b to c` given to `new` is composed first.
pub struct Rename {
    pub(crate) node: Node,
    pub(crate) source: Box<Query>,
    pub(crate) from: Vec<String>,
    pub(crate) to: Vec<String>,
}

impl Rename {
    /// Renames `from[i]` to `to[i]`, applied in order.
    pub fn new(source: Query, from: &[&str], to: &[&str]) -> Result<Query> {
        if from.len() != to.len() {
            return Err(Error::invalid_operation(
                "rename needs as many new names as old names",
            ));
        }
        let mut cols = source.columns();
        // original name -> current name
        let mut mapping: Vec<(String, String)> = Vec::new();
        for (f, t) in from.iter().zip(to) {
            let Some(pos) = cols.iter().position(|c| c == f) else {
                return Err(Error::column_not_found("rename", *f));
            };
            if f != t && cols.iter().any(|c| c == t) {
                return Err(Error::duplicate_column("rename", *t));
            }
            cols[pos] = t.to_string();
            match mapping.iter_mut().find(|(_, cur)| cur.as_str() == *f) {
                Some(pair) => pair.1 = t.to_string(),
                None => mapping.push((f.to_string(), t.to_string())),
            }
            let deps = format!("{f}_deps");
            if let Some(dpos) = cols.iter().position(|c| *c == deps) {
                let new_deps = format!("{t}_deps");
                if !from.iter().any(|x| *x == deps) && !cols.contains(&new_deps) {
                    cols[dpos] = new_deps.clone();
                    match mapping.iter_mut().find(|(_, cur)| *cur == deps) {
                        Some(pair) => pair.1 = new_deps,
                        None => mapping.push((deps, new_deps)),
                    }
                }
            }
        }
        let (from, to) = mapping.into_iter().unzip();
        Ok(Query::Rename(Rename::build(source, from, to)))
    }

    pub(crate) fn build(source: Query, from: Vec<String>, to: Vec<String>) -> Rename {
        Rename {
            node: Node::default(),
            source: Box::new(source),
            from,
            to,
        }
    }

    /// Maps a source name to its output name.
    pub(crate) fn forward(&self, col: &str) -> String {
        match self.from.iter().position(|f| f == col) {
            Some(i) => self.to[i].clone(),
            None => col.to_string(),
        }
    }

    /// Maps an output name back to its source name.
    pub(crate) fn backward(&self, col: &str) -> String {
        match self.to.iter().position(|t| t == col) {
            Some(i) => self.from[i].clone(),
            None => col.to_string(),
        }
    }

    fn forward_all(&self, cols: &[String]) -> Vec<String> {
        cols.iter().map(|c| self.forward(c)).collect()
    }

    fn backward_all(&self, cols: &[String]) -> Vec<String> {
        cols.iter().map(|c| self.backward(c)).collect()
    }

    fn backward_set(&self, cols: &ColSet) -> ColSet {
        cols.iter().map(|c| self.backward(c)).collect()
    }

    pub(crate) fn columns(&self) -> Vec<String> {
        self.forward_all(&self.source.columns())
    }

    pub(crate) fn keys(&self) -> Vec<Vec<String>> {
        self.source
            .keys()
            .iter()
            .map(|k| self.forward_all(k))
            .collect()
    }

    pub(crate) fn indexes(&self) -> Vec<Vec<String>> {
        self.source
            .indexes()
            .iter()
            .map(|k| self.forward_all(k))
            .collect()
    }

    pub(crate) fn header(&self) -> Header {
        self.source.header().rename(&self.from, &self.to)
    }

    pub(crate) fn fixed(&self) -> Vec<Fixed> {
        self.source
            .fixed()
            .into_iter()
            .map(|f| Fixed::new(self.forward(&f.field), f.values))
            .collect()
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

    /// Renaming costs nothing, so optimization goes straight to the source
    /// with the names translated back.
    pub(crate) fn optimize(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        let index = self.backward_all(index);
        let needs = self.backward_set(needs);
        let firstneeds = self.backward_set(firstneeds);
        self.source
            .optimize(&index, &needs, &firstneeds, is_cursor, phase)
    }

    pub(crate) fn optimize2(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        phase: Phase,
    ) -> f64 {
        self.optimize(index, needs, firstneeds, is_cursor, phase)
    }

    pub(crate) fn transform(self) -> (Query, bool) {
        let Rename {
            source, from, to, ..
        } = self;
        let before = from.len();
        let (from, to): (Vec<String>, Vec<String>) =
            from.into_iter().zip(to).filter(|(f, t)| f != t).unzip();
        let dropped = from.len() < before;
        if from.is_empty() {
            return (*source, true);
        }
        match *source {
            Query::Rename(inner) => {
                let mut pairs: Vec<(String, String)> = inner
                    .from
                    .iter()
                    .zip(&inner.to)
                    .map(|(f, t)| {
                        let t = match from.iter().position(|x| x == t) {
                            Some(i) => to[i].clone(),
                            None => t.clone(),
                        };
                        (f.clone(), t)
                    })
                    .collect();
                for (f, t) in from.iter().zip(&to) {
                    if !inner.to.contains(f) {
                        pairs.push((f.clone(), t.clone()));
                    }
                }
                let (from, to) = pairs.into_iter().unzip();
                (Query::Rename(Rename::build(*inner.source, from, to)), true)
            }
            source => {
                let (source, changed) = source.transform1();
                (
                    Query::Rename(Rename::build(source, from, to)),
                    changed || dropped,
                )
            }
        }
    }

    pub(crate) fn add_index(mut self) -> Self {
        self.source = Box::new((*self.source).add_index());
        self
    }

    pub(crate) fn get(&mut self, dir: Dir) -> Result<Option<Row>> {
        self.source.get(dir)
    }

    pub(crate) fn select(&mut self, index: &[String], range: &KeyRange) -> Result<()> {
        let index = self.backward_all(index);
        self.source.select(&index, range)
    }

    pub(crate) fn rewind(&mut self) {
        self.source.rewind();
    }
}

impl fmt::Display for Rename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .from
            .iter()
            .zip(&self.to)
            .map(|(a, b)| format!("{a} to {b}"))
            .collect();
        write!(f, "{} rename {}", self.source, pairs.join(", "))
    }
}
