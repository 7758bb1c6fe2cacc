//! In-memory storage.
//!
//! `MemoryStore` keeps each table as a map from address to values plus one
//! ordered entry set per index. It implements `Transaction` so the query
//! engine can run against it in tests and benchmarks.

use crate::key_range::{Key, KeyRange};
use crate::schema::TableSchema;
use crate::transaction::{IndexEntry, IndexPos, Transaction, MIN_FRAC};
use hashbrown::HashMap;
use relq_core::{Adr, Dir, Error, Record, Result, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Record size reported for empty tables.
const DEFAULT_RECORD_SIZE: usize = 100;

/// One index of a table.
struct MemIndex {
    columns: Vec<String>,
    positions: Vec<usize>,
    unique: bool,
    entries: BTreeSet<IndexPos>,
}

impl MemIndex {
    fn key(&self, values: &[Value]) -> Key {
        self.positions
            .iter()
            .map(|&i| values.get(i).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn contains_key(&self, key: &Key) -> bool {
        self.entries
            .range((Bound::Included((key.clone(), 0)), Bound::Unbounded))
            .next()
            .map_or(false, |(k, _)| k == key)
    }
}

/// Storage for a single table.
struct MemTable {
    schema: TableSchema,
    records: BTreeMap<Adr, Vec<Value>>,
    indexes: Vec<MemIndex>,
    total_size: usize,
}

impl MemTable {
    fn new(schema: TableSchema) -> Self {
        let indexes = schema
            .indexes()
            .iter()
            .map(|cols| MemIndex {
                columns: cols.clone(),
                positions: cols
                    .iter()
                    .filter_map(|c| schema.column_index(c))
                    .collect(),
                unique: schema.is_key(cols),
                entries: BTreeSet::new(),
            })
            .collect();
        Self {
            schema,
            records: BTreeMap::new(),
            indexes,
            total_size: 0,
        }
    }

    fn index(&self, columns: &[String]) -> Result<&MemIndex> {
        self.indexes
            .iter()
            .find(|idx| idx.columns == columns)
            .ok_or_else(|| {
                Error::invalid_operation(format!(
                    "nonexistent index: {}({})",
                    self.schema.name(),
                    columns.join(",")
                ))
            })
    }

    fn record(&self, adr: Adr) -> Result<Record> {
        self.records
            .get(&adr)
            .map(|values| Record::new(adr, values.clone()))
            .ok_or_else(|| Error::RecordNotFound {
                table: self.schema.name().to_string(),
                adr,
            })
    }
}

#[derive(Default)]
struct Database {
    tables: HashMap<String, MemTable>,
    next_adr: Adr,
}

impl Database {
    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::table_not_found(name))
    }
}

/// An in-memory database usable as a query `Transaction`.
#[derive(Default)]
pub struct MemoryStore {
    db: RefCell<Database>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table.
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut db = self.db.borrow_mut();
        if db.tables.contains_key(schema.name()) {
            return Err(Error::invalid_operation(format!(
                "table already exists: {}",
                schema.name()
            )));
        }
        db.tables
            .insert(schema.name().to_string(), MemTable::new(schema));
        Ok(())
    }

    /// Adds several records to a table.
    pub fn insert_all(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<Vec<Adr>> {
        rows.into_iter().map(|r| self.output(table, r)).collect()
    }

    /// Returns every record of a table in address order.
    pub fn scan(&self, table: &str) -> Result<Vec<Record>> {
        let db = self.db.borrow();
        let t = db.table(table)?;
        Ok(t.records
            .iter()
            .map(|(&adr, values)| Record::new(adr, values.clone()))
            .collect())
    }
}

impl Transaction for MemoryStore {
    fn schema(&self, table: &str) -> Result<TableSchema> {
        Ok(self.db.borrow().table(table)?.schema.clone())
    }

    fn nrecords(&self, table: &str) -> usize {
        self.db
            .borrow()
            .table(table)
            .map(|t| t.records.len())
            .unwrap_or(0)
    }

    fn recordsize(&self, table: &str) -> usize {
        let db = self.db.borrow();
        match db.table(table) {
            Ok(t) if !t.records.is_empty() => (t.total_size / t.records.len()).max(1),
            _ => DEFAULT_RECORD_SIZE,
        }
    }

    fn rangefrac(&self, table: &str, index: &[String], range: &KeyRange) -> f64 {
        let db = self.db.borrow();
        let Ok(t) = db.table(table) else {
            return 1.0;
        };
        let Ok(idx) = t.index(index) else {
            return 1.0;
        };
        let total = idx.entries.len();
        if total == 0 {
            return 1.0;
        }
        let start = Bound::Included((range.lo.prefix.clone(), 0));
        let n = idx
            .entries
            .range((start, Bound::Unbounded))
            .skip_while(|(k, _)| !range.lo.admits_lower(k))
            .take_while(|(k, _)| !range.above(k))
            .count();
        (n as f64 / total as f64).clamp(MIN_FRAC, 1.0)
    }

    fn seek(
        &self,
        table: &str,
        index: &[String],
        range: &KeyRange,
        from: Option<&IndexPos>,
        dir: Dir,
    ) -> Result<Option<IndexEntry>> {
        let db = self.db.borrow();
        let t = db.table(table)?;
        let idx = t.index(index)?;
        let found = match dir {
            Dir::Next => {
                let start = match from {
                    Some(pos) => Bound::Excluded(pos.clone()),
                    None => Bound::Included((range.lo.prefix.clone(), 0)),
                };
                idx.entries
                    .range((start, Bound::Unbounded))
                    .find(|(k, _)| range.lo.admits_lower(k))
                    .filter(|(k, _)| !range.above(k))
            }
            Dir::Prev => {
                let end = match from {
                    Some(pos) => Bound::Excluded(pos.clone()),
                    None => Bound::Unbounded,
                };
                idx.entries
                    .range((Bound::Unbounded, end))
                    .rev()
                    .find(|(k, _)| !range.above(k))
                    .filter(|(k, _)| !range.below(k))
            }
        };
        match found {
            Some((key, adr)) => Ok(Some(IndexEntry {
                key: key.clone(),
                record: t.record(*adr)?,
            })),
            None => Ok(None),
        }
    }

    fn output(&self, table: &str, values: Vec<Value>) -> Result<Adr> {
        let mut db = self.db.borrow_mut();
        let adr = db.next_adr;
        let t = db.table_mut(table)?;
        let ncols = t.schema.columns().len();
        let mut values = values;
        values.resize(ncols, Value::Null);
        for idx in t.indexes.iter().filter(|idx| idx.unique) {
            let key = idx.key(&values);
            if idx.contains_key(&key) {
                let shown = key
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                return Err(Error::duplicate_key(table, format!("({})", shown)));
            }
        }
        for idx in t.indexes.iter_mut() {
            let key = idx.key(&values);
            idx.entries.insert((key, adr));
        }
        t.total_size += values.iter().map(Value::encoded_size).sum::<usize>();
        t.records.insert(adr, values);
        db.next_adr += 1;
        Ok(adr)
    }

    fn remove(&self, table: &str, adr: Adr) -> Result<()> {
        let mut db = self.db.borrow_mut();
        let t = db.table_mut(table)?;
        let values = t.records.remove(&adr).ok_or_else(|| Error::RecordNotFound {
            table: table.to_string(),
            adr,
        })?;
        for idx in t.indexes.iter_mut() {
            let key = idx.key(&values);
            idx.entries.remove(&(key, adr));
        }
        t.total_size -= values.iter().map(Value::encoded_size).sum::<usize>();
        Ok(())
    }

    fn input(&self, table: &str, adr: Adr) -> Result<Record> {
        self.db.borrow().table(table)?.record(adr)
    }
}
