//! SQLite-backed repository for one entity type.
//!
//! # Responsibility
//! - Read rows through the row cache and hydrate them into models.
//! - Write a model's row and cascade to its related models via the resolver.
//! - Emit one structured log record per read and per write.
//!
//! # Invariants
//! - Reads log before touching the cache or the database.
//! - A row found in the database is cached before the model is returned.
//! - The owner row is written before related models are cascaded.

use super::{Cascade, RepoResult, Repository, LOG_TARGET};
use crate::cache::{InMemoryRowCache, RowCache};
use crate::db::{self, validate_identifier, Criteria, OrderBy, Row, SelectQuery};
use crate::graph;
use crate::logging::{emit, FacadeLogger};
use crate::model::{Entity, Model, ModelHandle};
use crate::resolver::ResolverRef;
use log::{Level, Log};
use rusqlite::Connection;
use std::fmt::Arguments;
use std::marker::PhantomData;
use std::rc::Rc;

/// Repository over `M::TABLE`.
pub struct SqliteRepository<M: Entity> {
    conn: Rc<Connection>,
    resolver: ResolverRef,
    cache: Box<dyn RowCache>,
    logger: Rc<dyn Log>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Entity> std::fmt::Debug for SqliteRepository<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl<M: Entity> SqliteRepository<M> {
    /// Creates a repository with an in-memory cache and the facade logger.
    ///
    /// # Errors
    /// - `RepoError::Db` when `M::TABLE` is not a plain SQL identifier.
    pub fn try_new(conn: Rc<Connection>, resolver: &ResolverRef) -> RepoResult<Self> {
        validate_identifier(M::TABLE)?;
        Ok(Self {
            conn,
            resolver: resolver.clone(),
            cache: Box::new(InMemoryRowCache::new()),
            logger: Rc::new(FacadeLogger),
            _model: PhantomData,
        })
    }

    pub fn with_cache(mut self, cache: impl RowCache + 'static) -> Self {
        self.cache = Box::new(cache);
        self
    }

    pub fn with_logger(mut self, logger: Rc<dyn Log>) -> Self {
        self.logger = logger;
        self
    }

    pub fn table(&self) -> &'static str {
        M::TABLE
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Loads the model stored under `id`.
    ///
    /// An empty `id` returns `Ok(None)` without querying or logging.
    pub fn find(&self, id: &str) -> RepoResult<Option<M>> {
        match self.find_row(id)? {
            Some(row) => Ok(Some(self.hydrate(row)?)),
            None => Ok(None),
        }
    }

    /// First model matching `criteria` in `order_by` order.
    pub fn find_one_by(
        &self,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
    ) -> RepoResult<Option<M>> {
        let context = QueryContext::new(M::TABLE, criteria, order_by, Some(1), Some(0));
        let rows = self.find_rows(criteria, order_by, &context)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(self.hydrate(row)?)),
            None => {
                self.log(
                    Level::Warn,
                    &context.pairs(),
                    format_args!(
                        "row within table {} with criteria {} not found",
                        M::TABLE,
                        context.criteria
                    ),
                );
                Ok(None)
            }
        }
    }

    /// Every model matching `criteria`, in result-set order.
    pub fn find_by(
        &self,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> RepoResult<Vec<M>> {
        let context = QueryContext::new(M::TABLE, criteria, order_by, limit, offset);
        self.find_rows(criteria, order_by, &context)?
            .into_iter()
            .map(|row| self.hydrate(row))
            .collect()
    }

    /// Inserts or updates `model`, cascading to its related models.
    pub fn persist(&self, model: &M) -> RepoResult<&Self> {
        self.persist_model(model)?;
        Ok(self)
    }

    /// Deletes `model` and the related models it owns.
    ///
    /// Removing a model whose row is already gone is a no-op.
    pub fn remove(&self, model: &M) -> RepoResult<&Self> {
        self.remove_model(model)?;
        Ok(self)
    }

    /// Empties the row cache without touching the database.
    pub fn clear(&self) -> &Self {
        self.cache.clear();
        self
    }

    fn find_row(&self, id: &str) -> RepoResult<Option<Row>> {
        if id.is_empty() {
            return Ok(None);
        }

        let context = [("table", M::TABLE), ("id", id)];
        self.log(
            Level::Info,
            &context,
            format_args!("find row within table {} with id {id}", M::TABLE),
        );

        if let Some(row) = self.cache.get(id) {
            self.log(
                Level::Info,
                &context,
                format_args!("found row within cache for table {} with id {id}", M::TABLE),
            );
            return Ok(Some(row));
        }

        let row = SelectQuery::from(M::TABLE)
            .and_where("id", id.to_string())
            .fetch_one(&self.conn)?;
        match row {
            Some(row) => {
                self.cache.set(id, row.clone());
                Ok(Some(row))
            }
            None => {
                self.log(
                    Level::Warn,
                    &context,
                    format_args!("row within table {} with id {id} not found", M::TABLE),
                );
                Ok(None)
            }
        }
    }

    fn find_rows(
        &self,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
        context: &QueryContext,
    ) -> RepoResult<Vec<Row>> {
        self.log(
            Level::Info,
            &context.pairs(),
            format_args!(
                "find rows within table {} with criteria {}",
                M::TABLE,
                context.criteria
            ),
        );

        let mut query = SelectQuery::from(M::TABLE)
            .matching(criteria)
            .limit(context.limit)
            .offset(context.offset);
        if let Some(order_by) = order_by {
            query = query.ordered(order_by);
        }

        let rows = query.fetch_all(&self.conn)?;
        for row in &rows {
            if let Some(id) = row.id() {
                self.cache.set(id, row.clone());
            }
        }
        Ok(rows)
    }

    fn hydrate(&self, row: Row) -> RepoResult<M> {
        M::from_persistence(row, &self.resolver)
    }

    fn persist_in(&self, model: &dyn Model, cascade: &mut Cascade) -> RepoResult<()> {
        let id = model.id().to_string();
        if !cascade.enter_persist(M::KIND, &id) {
            return Ok(());
        }

        let plan = graph::flatten(&id, model.to_persistence())?;
        let context = [("table", M::TABLE), ("id", id.as_str())];
        if self.find_row(&id)?.is_some() {
            self.log(
                Level::Info,
                &context,
                format_args!("update row into table {} with id {id}", M::TABLE),
            );
            db::update(&self.conn, M::TABLE, &plan.row, &id)?;
        } else {
            self.log(
                Level::Info,
                &context,
                format_args!("insert row into table {} with id {id}", M::TABLE),
            );
            db::insert(&self.conn, M::TABLE, &plan.row)?;
        }
        cascade.touch(M::KIND, &id);

        if !plan.remove.is_empty() || !plan.persist.is_empty() {
            let resolver = self.resolver.upgrade()?;
            for related in &plan.remove {
                resolver.remove_within(related.as_ref(), cascade)?;
            }
            for related in &plan.persist {
                resolver.persist_within(related.as_ref(), cascade)?;
            }
        }

        self.cache.set(&id, plan.row);
        Ok(())
    }

    fn remove_in(&self, model: &dyn Model, cascade: &mut Cascade) -> RepoResult<()> {
        let id = model.id().to_string();
        if !cascade.enter_remove(M::KIND, &id) {
            return Ok(());
        }
        if self.find_row(&id)?.is_none() {
            return Ok(());
        }

        let related = graph::removal_targets(model.to_persistence())?;
        if !related.is_empty() {
            let resolver = self.resolver.upgrade()?;
            for target in &related {
                resolver.remove_within(target.as_ref(), cascade)?;
            }
        }

        self.log(
            Level::Info,
            &[("table", M::TABLE), ("id", id.as_str())],
            format_args!("remove row from table {} with id {id}", M::TABLE),
        );
        db::delete(&self.conn, M::TABLE, &id)?;
        self.cache.remove(&id);
        cascade.touch(M::KIND, &id);
        Ok(())
    }

    fn log(&self, level: Level, context: &[(&str, &str)], args: Arguments<'_>) {
        emit(
            self.logger.as_ref(),
            level,
            LOG_TARGET,
            module_path!(),
            context,
            args,
        );
    }
}

impl<M: Entity> Repository for SqliteRepository<M> {
    fn kind(&self) -> &'static str {
        M::KIND
    }

    fn table(&self) -> &'static str {
        M::TABLE
    }

    fn find_model(&self, id: &str) -> RepoResult<Option<ModelHandle>> {
        Ok(self.find(id)?.map(M::into_handle))
    }

    fn find_one_model_by(
        &self,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
    ) -> RepoResult<Option<ModelHandle>> {
        Ok(self.find_one_by(criteria, order_by)?.map(M::into_handle))
    }

    fn find_models_by(
        &self,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> RepoResult<Vec<ModelHandle>> {
        Ok(self
            .find_by(criteria, order_by, limit, offset)?
            .into_iter()
            .map(M::into_handle)
            .collect())
    }

    fn persist_model(&self, model: &dyn Model) -> RepoResult<()> {
        let resolver = self.resolver.upgrade()?;
        Cascade::run(&self.conn, &resolver, self.logger.as_ref(), |cascade| {
            self.persist_in(model, cascade)
        })
    }

    fn remove_model(&self, model: &dyn Model) -> RepoResult<()> {
        let resolver = self.resolver.upgrade()?;
        Cascade::run(&self.conn, &resolver, self.logger.as_ref(), |cascade| {
            self.remove_in(model, cascade)
        })
    }

    fn persist_within(&self, model: &dyn Model, cascade: &mut Cascade) -> RepoResult<()> {
        self.persist_in(model, cascade)
    }

    fn remove_within(&self, model: &dyn Model, cascade: &mut Cascade) -> RepoResult<()> {
        self.remove_in(model, cascade)
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }

    fn forget(&self, id: &str) {
        self.cache.remove(id);
    }
}

/// Rendered criteria-based query parameters for log context.
struct QueryContext {
    table: &'static str,
    criteria: String,
    order_by: String,
    limit: Option<u32>,
    offset: Option<u32>,
    limit_text: String,
    offset_text: String,
}

impl QueryContext {
    fn new(
        table: &'static str,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Self {
        Self {
            table,
            criteria: criteria.to_json().to_string(),
            order_by: order_by
                .map_or_else(|| "null".to_string(), |order| order.to_json().to_string()),
            limit,
            offset,
            limit_text: render_optional(limit),
            offset_text: render_optional(offset),
        }
    }

    fn pairs(&self) -> [(&str, &str); 5] {
        [
            ("table", self.table),
            ("criteria", self.criteria.as_str()),
            ("orderBy", self.order_by.as_str()),
            ("limit", self.limit_text.as_str()),
            ("offset", self.offset_text.as_str()),
        ]
    }
}

fn render_optional(value: Option<u32>) -> String {
    value.map_or_else(|| "null".to_string(), |value| value.to_string())
}
