//! SQLite query layer used by repositories.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Build `SELECT` statements from equality criteria, ordering and paging.
//! - Execute `INSERT`/`UPDATE`/`DELETE` keyed by the `id` column.
//! - Scope multi-statement work inside savepoints.
//!
//! # Invariants
//! - Table and column names are validated before they reach SQL text.
//! - Values are always bound as parameters, never interpolated.
//! - Every row handled here carries an `id` column.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
mod query;
mod row;
mod savepoint;

pub use open::{open_db, open_db_in_memory};
pub use query::{
    delete, insert, update, validate_identifier, Criteria, Direction, OrderBy, SelectQuery,
};
pub use row::Row;
pub use savepoint::Savepoint;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    InvalidIdentifier(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidIdentifier(name) => write!(f, "invalid sql identifier `{name}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidIdentifier(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
