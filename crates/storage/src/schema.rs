//! Table schemas as seen by the query engine.

use relq_core::{Error, Result};

/// Columns, keys and indexes of a stored table.
///
/// Every key is also an index. `indexes` lists keys first, then plain indexes,
/// in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<String>,
    keys: Vec<Vec<String>>,
    indexes: Vec<Vec<String>>,
}

impl TableSchema {
    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column names in record order.
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the unique keys.
    #[inline]
    pub fn keys(&self) -> &[Vec<String>] {
        &self.keys
    }

    /// Returns every index, keys included.
    #[inline]
    pub fn indexes(&self) -> &[Vec<String>] {
        &self.indexes
    }

    /// Gets a column position by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns true if the given index is a key.
    pub fn is_key(&self, index: &[String]) -> bool {
        self.keys.iter().any(|k| k == index)
    }
}

/// Builder for creating table schemas.
pub struct TableBuilder {
    name: String,
    columns: Vec<String>,
    keys: Vec<Vec<String>>,
    indexes: Vec<Vec<String>>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            keys: Vec::new(),
            indexes: Vec::new(),
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => {
                return Err(Error::invalid_operation(format!(
                    "name must start with letter or underscore: {:?}",
                    name
                )))
            }
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '?' || c == '!') {
            return Err(Error::invalid_operation(format!(
                "name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a column to the table.
    pub fn add_column(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if self.columns.contains(&name) {
            return Err(Error::duplicate_column(&self.name, name));
        }
        self.columns.push(name);
        Ok(self)
    }

    /// Adds several columns.
    pub fn add_columns(mut self, names: &[&str]) -> Result<Self> {
        for name in names {
            self = self.add_column(*name)?;
        }
        Ok(self)
    }

    fn check_columns(&self, columns: &[&str]) -> Result<Vec<String>> {
        columns
            .iter()
            .map(|c| {
                if self.columns.iter().any(|x| x == c) {
                    Ok(c.to_string())
                } else {
                    Err(Error::column_not_found(&self.name, *c))
                }
            })
            .collect()
    }

    /// Adds a unique key. An empty key means the table holds at most one record.
    pub fn add_key(mut self, columns: &[&str]) -> Result<Self> {
        let cols = self.check_columns(columns)?;
        if !self.keys.contains(&cols) {
            self.keys.push(cols);
        }
        Ok(self)
    }

    /// Adds a non-unique index.
    pub fn add_index(mut self, columns: &[&str]) -> Result<Self> {
        let cols = self.check_columns(columns)?;
        if !self.indexes.contains(&cols) {
            self.indexes.push(cols);
        }
        Ok(self)
    }

    /// Builds the schema. A table without a declared key is keyed on all columns.
    pub fn build(self) -> Result<TableSchema> {
        let mut keys = self.keys;
        if keys.is_empty() {
            keys.push(self.columns.clone());
        }
        let mut indexes = keys.clone();
        for idx in self.indexes {
            if !indexes.contains(&idx) {
                indexes.push(idx);
            }
        }
        Ok(TableSchema {
            name: self.name,
            columns: self.columns,
            keys,
            indexes,
        })
    }
}
