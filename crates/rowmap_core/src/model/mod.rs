//! Model contracts shared by repositories and application types.
//!
//! # Responsibility
//! - Define how a domain object exposes its identity and flat persistence view.
//! - Carry related models type-erased so cascades stay generic.
//!
//! # Invariants
//! - `Model::id` is stable for the lifetime of the object.
//! - `Model::kind` is a static tag unique per model type; the resolver
//!   dispatches on it.
//! - `to_persistence` always yields an `id` field equal to `Model::id`.

use crate::db::Row;
use crate::repo::RepoResult;
use crate::resolver::ResolverRef;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use uuid::Uuid;

pub mod fields;
pub mod relation;

pub use fields::{Field, Fields};
pub use relation::{Collection, Lazy, Reference};

/// Shared, type-erased handle on a related model.
pub type ModelHandle = Rc<dyn Model>;

/// Runtime view every persisted model provides.
pub trait Model: AsAny {
    /// Static tag naming the model type.
    fn kind(&self) -> &'static str;
    fn id(&self) -> &str;
    /// Scalar fields plus relation markers, keyed by field name.
    fn to_persistence(&self) -> Fields;

    fn into_handle(self) -> ModelHandle
    where
        Self: Sized + 'static,
    {
        Rc::new(self)
    }
}

/// Model type bound to one table.
pub trait Entity: Model + Clone + Sized + 'static {
    const KIND: &'static str;
    const TABLE: &'static str;

    /// Rebuilds a model from a stored row.
    ///
    /// Relations should be rebuilt as lazy placeholders through `resolver`
    /// (`ResolverRef::reference`, `ResolverRef::collection`).
    fn from_persistence(row: Row, resolver: &ResolverRef) -> RepoResult<Self>;
}

/// Downcasting support for type-erased models.
pub trait AsAny: Any {
    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Debug for dyn Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind(), self.id())
    }
}

/// Recovers the concrete type behind a handle.
pub fn downcast<M: Entity>(handle: ModelHandle) -> Option<Rc<M>> {
    handle.into_any_rc().downcast::<M>().ok()
}

/// Generates a fresh identifier for a new model.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
