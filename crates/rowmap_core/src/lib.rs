//! Row-mapping persistence core.
//! Repositories map models to SQLite rows, cache rows per table and cascade
//! writes across related models through a shared resolver.

pub mod cache;
pub mod db;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod resolver;

pub use cache::{InMemoryRowCache, NullRowCache, RowCache};
pub use db::{
    open_db, open_db_in_memory, Criteria, DbError, DbResult, Direction, OrderBy, Row,
};
pub use graph::reference_column;
pub use logging::{default_log_level, init_logging, logging_status, FacadeLogger};
pub use model::{
    downcast, new_id, Collection, Entity, Field, Fields, Lazy, Model, ModelHandle, Reference,
};
pub use repo::{Cascade, RepoError, RepoResult, Repository, SqliteRepository};
pub use resolver::{Registration, Resolver, ResolverRef};
