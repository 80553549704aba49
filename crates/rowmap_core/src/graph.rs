//! Related-model walker.
//!
//! # Responsibility
//! - Flatten a model's field map into the row stored for the model.
//! - Work out which related models a persist or remove must cascade to.
//!
//! # Invariants
//! - Collections never contribute columns; references contribute `{field}Id`.
//! - Every relation is loaded while walking; an unchanged relation persists
//!   its initial members again.
//! - Changed relations compare against their initial snapshot by id.

use crate::db::Row;
use crate::model::{Collection, Field, Fields, ModelHandle, Reference};
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use std::collections::HashSet;

/// Outcome of walking a model before it is written.
pub(crate) struct PersistPlan {
    /// Columns for the model's own row.
    pub row: Row,
    /// Related models dropped from a relation, removed before persisting.
    pub remove: Vec<ModelHandle>,
    /// Related models to persist after the owner row is written.
    pub persist: Vec<ModelHandle>,
}

/// Column holding the id of the model referenced by `field`.
pub fn reference_column(field: &str) -> String {
    format!("{field}Id")
}

pub(crate) fn flatten(model_id: &str, fields: Fields) -> RepoResult<PersistPlan> {
    let mut plan = PersistPlan {
        row: Row::new(),
        remove: Vec::new(),
        persist: Vec::new(),
    };

    for (name, field) in fields {
        match field {
            Field::Scalar(value) => {
                plan.row.insert(name, value);
            }
            Field::Reference(reference) => walk_reference(&name, &reference, &mut plan)?,
            Field::Collection(collection) => walk_collection(&collection, &mut plan)?,
        }
    }

    let stored_id = plan.row.id().map(str::to_string);
    match stored_id.as_deref() {
        Some(id) if id == model_id => Ok(plan),
        Some(id) => Err(RepoError::InvalidData(format!(
            "persistence id `{id}` does not match model id `{model_id}`"
        ))),
        None => Err(RepoError::InvalidData(format!(
            "persistence fields of `{model_id}` carry no text `id`"
        ))),
    }
}

/// Related models a removal of the owner takes down with it.
pub(crate) fn removal_targets(fields: Fields) -> RepoResult<Vec<ModelHandle>> {
    let mut remove = Vec::new();
    for (_, field) in fields {
        match field {
            Field::Scalar(_) => {}
            Field::Reference(reference) => {
                if let Some(initial) = reference.initial()? {
                    remove.push(initial);
                }
            }
            Field::Collection(collection) => remove.extend(collection.initial()?),
        }
    }
    Ok(remove)
}

fn walk_reference(name: &str, reference: &Reference, plan: &mut PersistPlan) -> RepoResult<()> {
    let initial = reference.initial()?;
    let current = match reference.current() {
        Some(current) => {
            if let Some(initial) = &initial {
                let kept = current
                    .as_ref()
                    .is_some_and(|model| model.id() == initial.id());
                if !kept {
                    plan.remove.push(initial.clone());
                }
            }
            current.clone()
        }
        None => initial,
    };

    let column = reference_column(name);
    match current {
        Some(model) => {
            plan.row.insert(column, model.id().to_string());
            plan.persist.push(model);
        }
        None => {
            plan.row.insert(column, Value::Null);
        }
    }
    Ok(())
}

fn walk_collection(collection: &Collection, plan: &mut PersistPlan) -> RepoResult<()> {
    let initial = collection.initial()?;
    match collection.current() {
        Some(current) => {
            let kept: HashSet<&str> = current.iter().map(|model| model.id()).collect();
            plan.remove.extend(
                initial
                    .into_iter()
                    .filter(|model| !kept.contains(model.id())),
            );
            plan.persist.extend(current.iter().cloned());
        }
        None => plan.persist.extend(initial),
    }
    Ok(())
}
