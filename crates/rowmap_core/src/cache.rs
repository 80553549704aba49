//! Identifier-keyed row caches used by repositories.
//!
//! # Responsibility
//! - Keep the last-known persisted row per identifier for one table.
//! - Offer a null-object cache so repositories never branch on presence.
//!
//! # Invariants
//! - Entries only change through explicit `set`/`remove`/`clear`.
//! - No eviction and no expiry; one cache belongs to one unit of work.

use crate::db::Row;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Row store keyed by model identifier.
pub trait RowCache {
    fn has(&self, id: &str) -> bool;
    /// Returns a copy of the cached row, `None` when absent.
    fn get(&self, id: &str) -> Option<Row>;
    fn set(&self, id: &str, row: Row);
    /// No-op when absent.
    fn remove(&self, id: &str);
    fn clear(&self);
}

/// Unbounded in-process cache.
#[derive(Debug, Default)]
pub struct InMemoryRowCache {
    rows: RefCell<HashMap<String, Row>>,
}

impl InMemoryRowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-populated with rows keyed by their `id` column.
    ///
    /// Rows without a text `id` are skipped.
    pub fn with_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        let cache = Self::new();
        for row in rows {
            if let Some(id) = row.id().map(str::to_string) {
                cache.set(&id, row);
            }
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.borrow().is_empty()
    }

    /// Cached ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rows.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl RowCache for InMemoryRowCache {
    fn has(&self, id: &str) -> bool {
        self.rows.borrow().contains_key(id)
    }

    fn get(&self, id: &str) -> Option<Row> {
        self.rows.borrow().get(id).cloned()
    }

    fn set(&self, id: &str, row: Row) {
        self.rows.borrow_mut().insert(id.to_string(), row);
    }

    fn remove(&self, id: &str) {
        self.rows.borrow_mut().remove(id);
    }

    fn clear(&self) {
        self.rows.borrow_mut().clear();
    }
}

/// Cache that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRowCache;

impl RowCache for NullRowCache {
    fn has(&self, _id: &str) -> bool {
        false
    }

    fn get(&self, _id: &str) -> Option<Row> {
        None
    }

    fn set(&self, _id: &str, _row: Row) {}

    fn remove(&self, _id: &str) {}

    fn clear(&self) {}
}

/// Lets callers keep a handle on a cache owned by a repository.
impl<C: RowCache + ?Sized> RowCache for Rc<C> {
    fn has(&self, id: &str) -> bool {
        (**self).has(id)
    }

    fn get(&self, id: &str) -> Option<Row> {
        (**self).get(id)
    }

    fn set(&self, id: &str, row: Row) {
        (**self).set(id, row)
    }

    fn remove(&self, id: &str) {
        (**self).remove(id)
    }

    fn clear(&self) {
        (**self).clear()
    }
}
