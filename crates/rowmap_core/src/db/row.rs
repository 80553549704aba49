//! Flat column → scalar mapping mirroring one table row.

use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use std::collections::BTreeMap;

/// One database record keyed by column name.
///
/// Booleans are stored as integers, matching SQLite affinity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Inserts or overwrites one column, returning the previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.columns.insert(column.into(), value.into())
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in name order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|(column, value)| (column.as_str(), value))
    }

    /// Returns the `id` column when it holds text.
    pub fn id(&self) -> Option<&str> {
        match self.columns.get("id") {
            Some(Value::Text(id)) => Some(id.as_str()),
            _ => None,
        }
    }

    /// Reads a non-null text column.
    ///
    /// # Errors
    /// - `RepoError::InvalidData` when the column is missing, null or not text.
    pub fn text(&self, column: &str) -> RepoResult<String> {
        match self.opt_text(column)? {
            Some(value) => Ok(value),
            None => Err(unexpected(column, "text", &Value::Null)),
        }
    }

    /// Reads a nullable text column.
    pub fn opt_text(&self, column: &str) -> RepoResult<Option<String>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.clone())),
            other => Err(unexpected(column, "text", other)),
        }
    }

    pub fn integer(&self, column: &str) -> RepoResult<i64> {
        match self.opt_integer(column)? {
            Some(value) => Ok(value),
            None => Err(unexpected(column, "integer", &Value::Null)),
        }
    }

    pub fn opt_integer(&self, column: &str) -> RepoResult<Option<i64>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(*value)),
            other => Err(unexpected(column, "integer", other)),
        }
    }

    /// Reads a real column, widening integers stored by SQLite affinity.
    pub fn real(&self, column: &str) -> RepoResult<f64> {
        match self.require(column)? {
            Value::Real(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            other => Err(unexpected(column, "real", other)),
        }
    }

    /// Reads a `0`/`1` integer column as bool.
    pub fn bool(&self, column: &str) -> RepoResult<bool> {
        match self.require(column)? {
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            other => Err(unexpected(column, "bool", other)),
        }
    }

    pub(crate) fn from_sqlite(row: &rusqlite::Row<'_>, names: &[String]) -> rusqlite::Result<Self> {
        let mut columns = BTreeMap::new();
        for (index, name) in names.iter().enumerate() {
            columns.insert(name.clone(), row.get::<_, Value>(index)?);
        }
        Ok(Self { columns })
    }

    fn require(&self, column: &str) -> RepoResult<&Value> {
        self.columns
            .get(column)
            .ok_or_else(|| RepoError::InvalidData(format!("missing column `{column}`")))
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

fn unexpected(column: &str, expected: &str, found: &Value) -> RepoError {
    RepoError::InvalidData(format!(
        "column `{column}` expected {expected}, found {}",
        value_kind(found)
    ))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    }
}
