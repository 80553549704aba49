//! Bookkeeping for one public `persist`/`remove` call.
//!
//! # Responsibility
//! - Scope every write of the call inside one savepoint.
//! - Stop cycles in the related graph from recursing forever.
//! - Keep row caches consistent with the database when the call fails.
//!
//! # Invariants
//! - A `(kind, id)` pair is persisted at most once and removed at most once
//!   per cascade.
//! - After a rollback, no cache holds a row written by the rolled-back call.
//! - A cascade nested in a caller's transaction leaves no cache entry for the
//!   rows it wrote; the caller may still roll them back.

use super::{RepoError, RepoResult, LOG_TARGET};
use crate::db::Savepoint;
use crate::logging::emit;
use crate::resolver::Resolver;
use log::{Level, Log};
use rusqlite::Connection;
use std::collections::HashSet;

type Key = (&'static str, String);

/// State shared by every repository taking part in one cascade.
#[derive(Debug, Default)]
pub struct Cascade {
    persisted: HashSet<Key>,
    removed: HashSet<Key>,
    touched: Vec<Key>,
}

impl Cascade {
    /// Runs `op` inside a savepoint and commits or rolls back as a unit.
    pub(crate) fn run<F>(
        conn: &Connection,
        resolver: &Resolver,
        logger: &dyn Log,
        op: F,
    ) -> RepoResult<()>
    where
        F: FnOnce(&mut Cascade) -> RepoResult<()>,
    {
        let nested = !conn.is_autocommit();
        let savepoint = Savepoint::begin(conn)?;
        let mut cascade = Cascade::default();

        let outcome = match op(&mut cascade) {
            Ok(()) => savepoint.release().map_err(RepoError::from),
            Err(err) => {
                savepoint.rollback();
                Err(err)
            }
        };

        match &outcome {
            Err(err) => {
                let touched = cascade.touched.len().to_string();
                let error = err.to_string();
                emit(
                    logger,
                    Level::Warn,
                    LOG_TARGET,
                    module_path!(),
                    &[("touched", touched.as_str()), ("error", error.as_str())],
                    format_args!("event=cascade_rollback module=repo status=error touched={touched} error={error}"),
                );
                cascade.invalidate(resolver, logger);
            }
            Ok(()) if nested => cascade.invalidate(resolver, logger),
            Ok(()) => {}
        }
        outcome
    }

    /// Returns `false` when `(kind, id)` was already persisted in this cascade.
    pub(crate) fn enter_persist(&mut self, kind: &'static str, id: &str) -> bool {
        self.persisted.insert((kind, id.to_string()))
    }

    /// Returns `false` when `(kind, id)` was already removed in this cascade.
    pub(crate) fn enter_remove(&mut self, kind: &'static str, id: &str) -> bool {
        self.removed.insert((kind, id.to_string()))
    }

    /// Records a row written by this cascade.
    pub(crate) fn touch(&mut self, kind: &'static str, id: &str) {
        self.touched.push((kind, id.to_string()));
    }

    /// Rows written so far, in write order.
    pub fn touched(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.touched.iter().map(|(kind, id)| (*kind, id.as_str()))
    }

    fn invalidate(&self, resolver: &Resolver, logger: &dyn Log) {
        for (kind, id) in &self.touched {
            match resolver.responsible_for(kind) {
                Ok(repository) => repository.forget(id),
                Err(err) => emit(
                    logger,
                    Level::Warn,
                    LOG_TARGET,
                    module_path!(),
                    &[("kind", *kind), ("id", id.as_str())],
                    format_args!("event=cache_invalidate module=repo status=error kind={kind} error={err}"),
                ),
            }
        }
    }
}
