//! Savepoint guard over a shared connection.
//!
//! # Invariants
//! - Outside a transaction the savepoint behaves like `BEGIN DEFERRED`.
//! - Inside a caller's transaction it nests and only scopes its own work.
//! - A guard dropped without `release` rolls its work back.

use super::DbResult;
use log::warn;
use rusqlite::Connection;

const SAVEPOINT_NAME: &str = "rowmap_cascade";

/// Scoped unit of work; release to keep, drop to discard.
pub struct Savepoint<'conn> {
    conn: &'conn Connection,
    finished: bool,
}

impl<'conn> Savepoint<'conn> {
    pub fn begin(conn: &'conn Connection) -> DbResult<Self> {
        conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT_NAME};"))?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// Keeps the work done since `begin`.
    ///
    /// When the release fails (deferred foreign keys are checked at the
    /// outermost release) the work is rolled back before returning the error.
    pub fn release(mut self) -> DbResult<()> {
        self.finished = true;
        match self
            .conn
            .execute_batch(&format!("RELEASE SAVEPOINT {SAVEPOINT_NAME};"))
        {
            Ok(()) => Ok(()),
            Err(err) => {
                rollback(self.conn);
                Err(err.into())
            }
        }
    }

    /// Discards the work done since `begin`.
    pub fn rollback(mut self) {
        self.finished = true;
        rollback(self.conn);
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.finished {
            rollback(self.conn);
        }
    }
}

fn rollback(conn: &Connection) {
    if let Err(err) = conn.execute_batch(&format!(
        "ROLLBACK TO SAVEPOINT {SAVEPOINT_NAME}; RELEASE SAVEPOINT {SAVEPOINT_NAME};"
    )) {
        warn!("event=savepoint_rollback module=db status=error error={err}");
    }
}
