//! Statement builders for repository reads and writes.
//!
//! # Responsibility
//! - Render `SELECT * FROM table` with equality criteria, ordering and paging.
//! - Render `INSERT`/`UPDATE`/`DELETE` statements keyed by `id`.
//!
//! # Invariants
//! - Criteria are ANDed in insertion order; ordering keeps insertion order.
//! - Every identifier passes `validate_identifier` before it is rendered.

use super::{DbError, DbResult, Row};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Rejects names that are not plain SQL identifiers.
pub fn validate_identifier(name: &str) -> DbResult<&str> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Sort direction for one `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordered equality predicates (`field = value`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    predicates: Vec<(String, Value)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `field = value`; repeating a field replaces its value in place.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.predicates.iter_mut().find(|(name, _)| *name == field) {
            Some(existing) => existing.1 = value,
            None => self.predicates.push((field, value)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.predicates
            .iter()
            .map(|(field, value)| (field.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// JSON object view used in log context.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .predicates
            .iter()
            .map(|(field, value)| (field.clone(), value_to_json(value)))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

/// Ordered `ORDER BY` terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
    terms: Vec<(String, Direction)>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(self, field: impl Into<String>) -> Self {
        self.then(field, Direction::Asc)
    }

    pub fn desc(self, field: impl Into<String>) -> Self {
        self.then(field, Direction::Desc)
    }

    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.terms.push((field.into(), direction));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Direction)> {
        self.terms
            .iter()
            .map(|(field, direction)| (field.as_str(), *direction))
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .terms
            .iter()
            .map(|(field, direction)| {
                let rendered =
                    serde_json::to_value(direction).unwrap_or(serde_json::Value::Null);
                (field.clone(), rendered)
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

/// `SELECT *` builder over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    criteria: Criteria,
    order_by: OrderBy,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl SelectQuery {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            criteria: Criteria::new(),
            order_by: OrderBy::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn and_where(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria = self.criteria.eq(field, value);
        self
    }

    /// Appends every predicate of `criteria`.
    pub fn matching(mut self, criteria: &Criteria) -> Self {
        for (field, value) in criteria.iter() {
            self.criteria = self.criteria.eq(field, value.clone());
        }
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = self.order_by.then(field, direction);
        self
    }

    /// Appends every term of `order_by`.
    pub fn ordered(mut self, order_by: &OrderBy) -> Self {
        for (field, direction) in order_by.iter() {
            self.order_by = self.order_by.then(field, direction);
        }
        self
    }

    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: Option<u32>) -> Self {
        self.offset = offset;
        self
    }

    /// Renders SQL text plus positional bind values.
    pub fn to_sql(&self) -> DbResult<(String, Vec<Value>)> {
        let mut sql = format!("SELECT * FROM {}", validate_identifier(&self.table)?);
        let mut bind_values = Vec::new();

        for (index, (field, value)) in self.criteria.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            sql.push_str(validate_identifier(field)?);
            sql.push_str(" = ?");
            bind_values.push(value.clone());
        }

        for (index, (field, direction)) in self.order_by.iter().enumerate() {
            sql.push_str(if index == 0 { " ORDER BY " } else { ", " });
            sql.push_str(validate_identifier(field)?);
            sql.push(' ');
            sql.push_str(direction.as_sql());
        }

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ?");
                bind_values.push(Value::Integer(i64::from(limit)));
                if let Some(offset) = offset {
                    sql.push_str(" OFFSET ?");
                    bind_values.push(Value::Integer(i64::from(offset)));
                }
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                bind_values.push(Value::Integer(i64::from(offset)));
            }
            (None, None) => {}
        }

        Ok((sql, bind_values))
    }

    /// Executes the query and returns every row in result-set order.
    pub fn fetch_all(&self, conn: &Connection) -> DbResult<Vec<Row>> {
        let (sql, bind_values) = self.to_sql()?;
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(Row::from_sqlite(row, &names)?);
        }
        Ok(result)
    }

    /// Executes the query and returns the first row, if any.
    pub fn fetch_one(&self, conn: &Connection) -> DbResult<Option<Row>> {
        let (sql, bind_values) = self.to_sql()?;
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
        match rows.next()? {
            Some(row) => Ok(Some(Row::from_sqlite(row, &names)?)),
            None => Ok(None),
        }
    }
}

/// `INSERT INTO table (...) VALUES (...)` with every column of `row`.
pub fn insert(conn: &Connection, table: &str, row: &Row) -> DbResult<usize> {
    let mut columns = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    let mut bind_values = Vec::with_capacity(row.len());
    for (index, (column, value)) in row.columns().enumerate() {
        columns.push(validate_identifier(column)?);
        placeholders.push(format!("?{}", index + 1));
        bind_values.push(value);
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({});",
        validate_identifier(table)?,
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok(conn.execute(&sql, params_from_iter(bind_values))?)
}

/// `UPDATE table SET ... WHERE id = ?` with every column of `row`.
pub fn update(conn: &Connection, table: &str, row: &Row, id: &str) -> DbResult<usize> {
    let mut assignments = Vec::with_capacity(row.len());
    let mut bind_values = Vec::with_capacity(row.len() + 1);
    for (index, (column, value)) in row.columns().enumerate() {
        assignments.push(format!("{} = ?{}", validate_identifier(column)?, index + 1));
        bind_values.push(value.clone());
    }
    bind_values.push(Value::Text(id.to_string()));

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{};",
        validate_identifier(table)?,
        assignments.join(", "),
        bind_values.len()
    );
    Ok(conn.execute(&sql, params_from_iter(bind_values))?)
}

/// `DELETE FROM table WHERE id = ?`.
pub fn delete(conn: &Connection, table: &str, id: &str) -> DbResult<usize> {
    let sql = format!("DELETE FROM {} WHERE id = ?1;", validate_identifier(table)?);
    Ok(conn.execute(&sql, [id])?)
}

pub(crate) fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(value) => serde_json::Value::from(*value),
        Value::Real(value) => serde_json::Number::from_f64(*value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(value) => serde_json::Value::String(value.clone()),
        Value::Blob(bytes) => serde_json::Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}
