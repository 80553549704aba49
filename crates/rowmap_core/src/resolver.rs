//! Kind-keyed registry of repositories.
//!
//! # Responsibility
//! - Route reads and cascaded writes to the repository owning a model kind.
//! - Hand out deferred reads that models use as relation loaders.
//!
//! # Invariants
//! - The registry is fixed once `Resolver::build` returns.
//! - Repositories reach the resolver through a weak handle only, so dropping
//!   the last `Rc<Resolver>` releases every repository.
//! - An unknown kind fails with `MissingRelatedRepository`, never silently.

use crate::db::{Criteria, OrderBy};
use crate::model::{Collection, Entity, Lazy, Model, ModelHandle, Reference};
use crate::repo::{Cascade, RepoError, RepoResult, Repository, SqliteRepository};
use log::info;
use std::any::Any;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// One repository entry handed to `Resolver::build`.
pub struct Registration {
    kind: &'static str,
    repository: Rc<dyn Repository>,
    typed: Rc<dyn Any>,
}

impl Registration {
    pub fn new<M: Entity>(repository: SqliteRepository<M>) -> Self {
        let repository = Rc::new(repository);
        Self {
            kind: M::KIND,
            repository: Rc::clone(&repository) as Rc<dyn Repository>,
            typed: repository,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

/// Repository registry shared by every repository it holds.
pub struct Resolver {
    repositories: BTreeMap<&'static str, Registration>,
}

impl Resolver {
    /// Builds a resolver from repositories wired against its own handle.
    ///
    /// # Errors
    /// - Whatever `wire` returns.
    /// - `RepoError::DuplicateRepository` when two registrations share a kind.
    pub fn build<F>(wire: F) -> RepoResult<Rc<Self>>
    where
        F: FnOnce(&ResolverRef) -> RepoResult<Vec<Registration>>,
    {
        let mut outcome = Ok(());
        let resolver = Rc::new_cyclic(|weak: &Weak<Resolver>| {
            let handle = ResolverRef {
                inner: weak.clone(),
            };
            let mut repositories = BTreeMap::new();
            match wire(&handle) {
                Ok(registrations) => {
                    for registration in registrations {
                        let kind = registration.kind;
                        if repositories.insert(kind, registration).is_some() {
                            outcome = Err(RepoError::DuplicateRepository(kind.to_string()));
                            break;
                        }
                    }
                }
                Err(err) => outcome = Err(err),
            }
            Resolver { repositories }
        });
        outcome?;

        info!(
            "event=resolver_build module=resolver status=ok repositories={}",
            resolver.repositories.len()
        );
        Ok(resolver)
    }

    /// Weak handle to this resolver.
    pub fn handle(self: &Rc<Self>) -> ResolverRef {
        ResolverRef {
            inner: Rc::downgrade(self),
        }
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.repositories.keys().copied().collect()
    }

    /// Typed repository for `M`.
    pub fn repository<M: Entity>(&self) -> RepoResult<Rc<SqliteRepository<M>>> {
        let registration = self
            .repositories
            .get(M::KIND)
            .ok_or_else(|| RepoError::MissingRelatedRepository(M::KIND.to_string()))?;
        Rc::clone(&registration.typed)
            .downcast::<SqliteRepository<M>>()
            .map_err(|_| {
                RepoError::InvalidData(format!(
                    "repository registered for \"{}\" serves another model type",
                    M::KIND
                ))
            })
    }

    pub fn find_as<M: Entity>(&self, id: &str) -> RepoResult<Option<M>> {
        self.repository::<M>()?.find(id)
    }

    pub fn find(&self, kind: &str, id: &str) -> RepoResult<Option<ModelHandle>> {
        self.responsible_for(kind)?.find_model(id)
    }

    pub fn find_one_by(
        &self,
        kind: &str,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
    ) -> RepoResult<Option<ModelHandle>> {
        self.responsible_for(kind)?
            .find_one_model_by(criteria, order_by)
    }

    pub fn find_by(
        &self,
        kind: &str,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> RepoResult<Vec<ModelHandle>> {
        self.responsible_for(kind)?
            .find_models_by(criteria, order_by, limit, offset)
    }

    /// Persists `model` through the repository owning its kind.
    pub fn persist(&self, model: &dyn Model) -> RepoResult<()> {
        self.responsible_for(model.kind())?.persist_model(model)
    }

    /// Removes `model` through the repository owning its kind.
    pub fn remove(&self, model: &dyn Model) -> RepoResult<()> {
        self.responsible_for(model.kind())?.remove_model(model)
    }

    /// Clears the row cache of every repository.
    pub fn clear(&self) {
        for registration in self.repositories.values() {
            registration.repository.clear_cache();
        }
    }

    pub(crate) fn persist_within(&self, model: &dyn Model, cascade: &mut Cascade) -> RepoResult<()> {
        self.responsible_for(model.kind())?
            .persist_within(model, cascade)
    }

    pub(crate) fn remove_within(&self, model: &dyn Model, cascade: &mut Cascade) -> RepoResult<()> {
        self.responsible_for(model.kind())?
            .remove_within(model, cascade)
    }

    pub(crate) fn responsible_for(&self, kind: &str) -> RepoResult<Rc<dyn Repository>> {
        self.repositories
            .get(kind)
            .map(|registration| Rc::clone(&registration.repository))
            .ok_or_else(|| RepoError::MissingRelatedRepository(kind.to_string()))
    }
}

/// Weak resolver handle held by repositories and relation loaders.
#[derive(Clone)]
pub struct ResolverRef {
    inner: Weak<Resolver>,
}

impl ResolverRef {
    /// # Errors
    /// - `RepoError::ResolverUnavailable` once the resolver was dropped.
    pub fn upgrade(&self) -> RepoResult<Rc<Resolver>> {
        self.inner.upgrade().ok_or(RepoError::ResolverUnavailable)
    }

    pub fn find(&self, kind: &str, id: &str) -> RepoResult<Option<ModelHandle>> {
        self.upgrade()?.find(kind, id)
    }

    pub fn find_one_by(
        &self,
        kind: &str,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
    ) -> RepoResult<Option<ModelHandle>> {
        self.upgrade()?.find_one_by(kind, criteria, order_by)
    }

    pub fn find_by(
        &self,
        kind: &str,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> RepoResult<Vec<ModelHandle>> {
        self.upgrade()?
            .find_by(kind, criteria, order_by, limit, offset)
    }

    pub fn persist(&self, model: &dyn Model) -> RepoResult<()> {
        self.upgrade()?.persist(model)
    }

    pub fn remove(&self, model: &dyn Model) -> RepoResult<()> {
        self.upgrade()?.remove(model)
    }

    /// Deferred `find`; runs the query on every call.
    pub fn lazy_find(&self, kind: &'static str, id: impl Into<String>) -> Lazy<Option<ModelHandle>> {
        let handle = self.clone();
        let id = id.into();
        Rc::new(move || handle.find(kind, &id))
    }

    /// Deferred `find_one_by`; runs the query on every call.
    pub fn lazy_find_one_by(
        &self,
        kind: &'static str,
        criteria: Criteria,
        order_by: Option<OrderBy>,
    ) -> Lazy<Option<ModelHandle>> {
        let handle = self.clone();
        Rc::new(move || handle.find_one_by(kind, &criteria, order_by.as_ref()))
    }

    /// Deferred `find_by`; runs the query on every call.
    pub fn lazy_find_by(
        &self,
        kind: &'static str,
        criteria: Criteria,
        order_by: Option<OrderBy>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Lazy<Vec<ModelHandle>> {
        let handle = self.clone();
        Rc::new(move || handle.find_by(kind, &criteria, order_by.as_ref(), limit, offset))
    }

    /// Lazy reference to the `kind` model stored under `id`.
    pub fn reference(&self, kind: &'static str, id: Option<String>) -> Reference {
        match id {
            Some(id) if !id.is_empty() => {
                let loader = self.lazy_find(kind, id.clone());
                Reference::lazy(Some(id), loader)
            }
            _ => Reference::empty(),
        }
    }

    /// Lazy collection of `kind` models matching `criteria`.
    pub fn collection(
        &self,
        kind: &'static str,
        criteria: Criteria,
        order_by: Option<OrderBy>,
    ) -> Collection {
        Collection::lazy(self.lazy_find_by(kind, criteria, order_by, None, None))
    }
}
