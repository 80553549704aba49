//! Relation placeholders held by models.
//!
//! # Responsibility
//! - Remember the related state as it was when the owner was loaded.
//! - Track replacements made since, without mutating the owner.
//!
//! # Invariants
//! - The initial snapshot is loaded at most once and shared by clones.
//! - `with*`/`without` return new values; the receiver is left untouched.
//! - Collection members are unique by id.

use super::ModelHandle;
use crate::repo::RepoResult;
use once_cell::unsync::OnceCell;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Deferred read supplied by the resolver; every call queries again.
pub type Lazy<T> = Rc<dyn Fn() -> RepoResult<T>>;

#[derive(Clone)]
enum Snapshot<T> {
    Ready(T),
    Deferred {
        cell: Rc<OnceCell<T>>,
        loader: Lazy<T>,
    },
}

impl<T: Clone> Snapshot<T> {
    fn deferred(loader: Lazy<T>) -> Self {
        Self::Deferred {
            cell: Rc::new(OnceCell::new()),
            loader,
        }
    }

    fn peek(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Deferred { cell, .. } => cell.get(),
        }
    }

    fn load(&self) -> RepoResult<T> {
        match self {
            Self::Ready(value) => Ok(value.clone()),
            Self::Deferred { cell, loader } => cell.get_or_try_init(|| loader()).cloned(),
        }
    }
}

/// Single related model, stored as `{field}Id` on the owner's row.
#[derive(Clone)]
pub struct Reference {
    initial_id: Option<String>,
    initial: Snapshot<Option<ModelHandle>>,
    // `None` while unchanged; `Some(None)` once explicitly cleared.
    current: Option<Option<ModelHandle>>,
}

impl Reference {
    /// Nothing referenced, nothing to load.
    pub fn empty() -> Self {
        Self {
            initial_id: None,
            initial: Snapshot::Ready(None),
            current: None,
        }
    }

    /// Fresh reference to `model`, e.g. on a new owner.
    pub fn to(model: ModelHandle) -> Self {
        Self::empty().with(Some(model))
    }

    /// Reference whose initial state is already in memory.
    pub fn loaded(model: Option<ModelHandle>) -> Self {
        Self {
            initial_id: model.as_ref().map(|model| model.id().to_string()),
            initial: Snapshot::Ready(model),
            current: None,
        }
    }

    /// Reference to a stored id, fetched on first access.
    pub fn lazy(id: Option<String>, loader: Lazy<Option<ModelHandle>>) -> Self {
        match id {
            Some(id) => Self {
                initial_id: Some(id),
                initial: Snapshot::deferred(loader),
                current: None,
            },
            None => Self::empty(),
        }
    }

    /// Copy pointing at `model` instead; `None` clears the reference.
    pub fn with(&self, model: Option<ModelHandle>) -> Self {
        Self {
            current: Some(model),
            ..self.clone()
        }
    }

    /// Current related model, loading the initial one if unchanged.
    pub fn get(&self) -> RepoResult<Option<ModelHandle>> {
        match &self.current {
            Some(current) => Ok(current.clone()),
            None => self.initial.load(),
        }
    }

    /// Id of the current related model without loading anything.
    pub fn id(&self) -> Option<String> {
        match &self.current {
            Some(current) => current.as_ref().map(|model| model.id().to_string()),
            None => self.initial_id.clone(),
        }
    }

    pub fn is_changed(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.initial.peek().is_some()
    }

    pub(crate) fn current(&self) -> Option<&Option<ModelHandle>> {
        self.current.as_ref()
    }

    pub(crate) fn initial(&self) -> RepoResult<Option<ModelHandle>> {
        self.initial.load()
    }
}

impl Default for Reference {
    fn default() -> Self {
        Self::empty()
    }
}

impl Debug for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("initial_id", &self.initial_id)
            .field("loaded", &self.is_loaded())
            .field("current", &self.current)
            .finish()
    }
}

/// Set of related models owning a foreign key back to the owner.
#[derive(Clone)]
pub struct Collection {
    initial: Snapshot<Vec<ModelHandle>>,
    current: Option<Vec<ModelHandle>>,
}

impl Collection {
    pub fn empty() -> Self {
        Self {
            initial: Snapshot::Ready(Vec::new()),
            current: None,
        }
    }

    /// Fresh collection holding `models`, e.g. on a new owner.
    pub fn of(models: impl IntoIterator<Item = ModelHandle>) -> Self {
        Self::empty().with_members(models)
    }

    /// Collection whose initial members are already in memory.
    pub fn loaded(models: impl IntoIterator<Item = ModelHandle>) -> Self {
        Self {
            initial: Snapshot::Ready(unique_by_id(models)),
            current: None,
        }
    }

    /// Collection fetched on first access.
    pub fn lazy(loader: Lazy<Vec<ModelHandle>>) -> Self {
        Self {
            initial: Snapshot::deferred(loader),
            current: None,
        }
    }

    /// Current members, loading the initial ones if unchanged.
    pub fn members(&self) -> RepoResult<Vec<ModelHandle>> {
        match &self.current {
            Some(current) => Ok(current.clone()),
            None => self.initial.load(),
        }
    }

    /// Copy holding exactly `models`; a repeated id keeps the last one.
    pub fn with_members(&self, models: impl IntoIterator<Item = ModelHandle>) -> Self {
        Self {
            initial: self.initial.clone(),
            current: Some(unique_by_id(models)),
        }
    }

    /// Copy with `model` added or replacing the member with the same id.
    pub fn with_added(&self, model: ModelHandle) -> RepoResult<Self> {
        let mut members = self.members()?;
        members.push(model);
        Ok(self.with_members(members))
    }

    /// Copy without the member identified by `id`.
    pub fn without(&self, id: &str) -> RepoResult<Self> {
        let members = self.members()?;
        Ok(self.with_members(members.into_iter().filter(|member| member.id() != id)))
    }

    pub fn is_changed(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.initial.peek().is_some()
    }

    pub(crate) fn current(&self) -> Option<&Vec<ModelHandle>> {
        self.current.as_ref()
    }

    pub(crate) fn initial(&self) -> RepoResult<Vec<ModelHandle>> {
        self.initial.load()
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::empty()
    }
}

impl Debug for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("loaded", &self.is_loaded())
            .field("current", &self.current)
            .finish()
    }
}

fn unique_by_id(models: impl IntoIterator<Item = ModelHandle>) -> Vec<ModelHandle> {
    let mut members: Vec<ModelHandle> = Vec::new();
    let mut seen = HashSet::new();
    for model in models {
        if seen.insert(model.id().to_string()) {
            members.push(model);
        } else if let Some(slot) = members.iter_mut().find(|member| member.id() == model.id()) {
            *slot = model;
        }
    }
    members
}
