//! Pre-serialization field map produced by `Model::to_persistence`.

use super::relation::{Collection, Reference};
use rusqlite::types::Value;

/// One field of a model's persistence view.
#[derive(Debug, Clone)]
pub enum Field {
    /// Stored as-is in a column of the same name.
    Scalar(Value),
    /// Stored as `{field}Id`; the related model is cascaded.
    Reference(Reference),
    /// Never stored on the owner; members are cascaded.
    Collection(Collection),
}

/// Ordered field map with the `id` scalar always first.
#[derive(Debug, Clone)]
pub struct Fields {
    entries: Vec<(String, Field)>,
}

impl Fields {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            entries: vec![("id".to_string(), Field::Scalar(Value::Text(id.into())))],
        }
    }

    pub fn scalar(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(name, Field::Scalar(value.into()))
    }

    pub fn reference(self, name: impl Into<String>, reference: Reference) -> Self {
        self.field(name, Field::Reference(reference))
    }

    pub fn collection(self, name: impl Into<String>, collection: Collection) -> Self {
        self.field(name, Field::Collection(collection))
    }

    /// Inserts a field; an existing name is replaced in place.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = field,
            None => self.entries.push((name, field)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, field)| field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.entries.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Fields {
    type Item = (String, Field);
    type IntoIter = std::vec::IntoIter<(String, Field)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
