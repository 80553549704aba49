//! Repository layer: cached table access plus cascading writes.
//!
//! # Responsibility
//! - Define the type-erased repository contract the resolver dispatches on.
//! - Map rows to models and back through `Entity`.
//! - Surface storage failures and mapping failures as one error type.
//!
//! # Invariants
//! - A repository never reports a cached row for an id that is not stored,
//!   except when the cache was seeded out of band.
//! - Writes issued by one public `persist`/`remove` call commit or roll back
//!   together.

use crate::db::{Criteria, DbError, OrderBy};
use crate::model::{Model, ModelHandle};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod cascade;
mod sqlite;

pub use cascade::Cascade;
pub use sqlite::SqliteRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Target of every record emitted by repositories and cascades.
pub(crate) const LOG_TARGET: &str = "rowmap_core::repo";

/// Error for repository reads, writes and cascades.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// No repository is registered for the model kind.
    MissingRelatedRepository(String),
    /// Two repositories claim the same model kind.
    DuplicateRepository(String),
    /// The resolver owning the repository has been dropped.
    ResolverUnavailable,
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingRelatedRepository(kind) => {
                write!(f, "missing repository for model \"{kind}\"")
            }
            Self::DuplicateRepository(kind) => {
                write!(f, "repository for model \"{kind}\" registered twice")
            }
            Self::ResolverUnavailable => write!(f, "repository resolver is no longer available"),
            Self::InvalidData(message) => write!(f, "invalid model data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::MissingRelatedRepository(_)
            | Self::DuplicateRepository(_)
            | Self::ResolverUnavailable
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Type-erased repository contract used by the resolver.
///
/// `SqliteRepository<M>` is the implementation; typed callers should prefer
/// its inherent methods.
pub trait Repository {
    /// Model kind this repository is responsible for.
    fn kind(&self) -> &'static str;

    fn table(&self) -> &'static str;

    fn is_responsible(&self, kind: &str) -> bool {
        self.kind() == kind
    }

    fn find_model(&self, id: &str) -> RepoResult<Option<ModelHandle>>;

    fn find_one_model_by(
        &self,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
    ) -> RepoResult<Option<ModelHandle>>;

    fn find_models_by(
        &self,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> RepoResult<Vec<ModelHandle>>;

    /// Persists `model` and its related graph in a new cascade.
    fn persist_model(&self, model: &dyn Model) -> RepoResult<()>;

    /// Removes `model` and its related graph in a new cascade.
    fn remove_model(&self, model: &dyn Model) -> RepoResult<()>;

    /// Persists `model` as part of a running cascade.
    fn persist_within(&self, model: &dyn Model, cascade: &mut Cascade) -> RepoResult<()>;

    /// Removes `model` as part of a running cascade.
    fn remove_within(&self, model: &dyn Model, cascade: &mut Cascade) -> RepoResult<()>;

    /// Drops every cached row.
    fn clear_cache(&self);

    /// Drops the cached row for `id`.
    fn forget(&self, id: &str);
}
