//! Terminal write operations over a query.
//!
//! Each action sets up its query itself and returns the number of records
//! it affected. Storage errors such as duplicate keys propagate unchanged.

use crate::query::Query;
use crate::setup::setup;
use relq_core::{Adr, Dir, Error, Result, Value};
use relq_storage::Transaction;
use std::rc::Rc;

/// Removes every record a query produces from its underlying table.
pub struct Delete {
    source: Query,
}

impl Delete {
    pub fn new(source: Query) -> Self {
        Self { source }
    }

    pub fn execute(self, tran: &Rc<dyn Transaction>) -> Result<usize> {
        let table = self
            .source
            .updateable()
            .ok_or_else(|| Error::not_updateable("delete"))?;
        let mut q = setup(self.source, tran, false)?;
        let mut adrs: Vec<Adr> = Vec::new();
        while let Some(row) = q.get(Dir::Next)? {
            if let Some(rec) = row.data_record() {
                adrs.push(rec.adr());
            }
        }
        for &adr in &adrs {
            tran.remove(&table, adr)?;
        }
        tracing::debug!(table = %table, n = adrs.len(), "delete");
        Ok(adrs.len())
    }
}

/// Copies every row of a query into a table.
///
/// Target columns the query lacks are written as `Value::Null`.
pub struct InsertQuery {
    source: Query,
    table: String,
}

impl InsertQuery {
    pub fn new(source: Query, table: impl Into<String>) -> Self {
        Self {
            source,
            table: table.into(),
        }
    }

    pub fn execute(self, tran: &Rc<dyn Transaction>) -> Result<usize> {
        let schema = tran.schema(&self.table)?;
        let mut q = setup(self.source, tran, false)?;
        let hdr = q.header();
        let cols: Vec<Option<&String>> = schema
            .columns()
            .iter()
            .map(|c| hdr.has_column(c).then_some(c))
            .collect();
        // read everything first so the insert can't feed its own source
        let mut rows = Vec::new();
        while let Some(row) = q.get(Dir::Next)? {
            let values: Vec<Value> = cols
                .iter()
                .map(|c| match c {
                    Some(c) => row.get(&hdr, c),
                    None => Value::Null,
                })
                .collect();
            rows.push(values);
        }
        let n = rows.len();
        for values in rows {
            tran.output(&self.table, values)?;
        }
        tracing::debug!(table = %self.table, n, "insert query");
        Ok(n)
    }
}

/// Writes one record through an updateable query.
pub struct InsertRecord {
    target: Query,
    fields: Vec<(String, Value)>,
}

impl InsertRecord {
    pub fn new(target: Query, fields: Vec<(&str, Value)>) -> Self {
        Self {
            target,
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn execute(self, tran: &Rc<dyn Transaction>) -> Result<usize> {
        let table = self
            .target
            .updateable()
            .ok_or_else(|| Error::not_updateable("insert"))?;
        let schema = tran.schema(&table)?;
        let mut values = vec![Value::Null; schema.columns().len()];
        for (name, value) in self.fields {
            let i = schema
                .column_index(&name)
                .ok_or_else(|| Error::column_not_found("insert", &name))?;
            values[i] = value;
        }
        tran.output(&table, values)?;
        Ok(1)
    }
}
