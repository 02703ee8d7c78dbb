//! Stored object type.

use super::value::Value;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of an object within one store.
///
/// Identifiers survive migration: an object carried from one schema version to
/// the next keeps its id, which is how relationships are re-linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Archive, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One entity instance.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredObject {
    /// Object identifier.
    pub id: ObjectId,
    /// Name of the entity this object instantiates.
    pub entity: String,
    /// Attribute values keyed by attribute name. Absent means null.
    pub attributes: BTreeMap<String, Value>,
    /// Relationship targets keyed by relationship name, in relationship order.
    pub relationships: BTreeMap<String, Vec<ObjectId>>,
}

impl StoredObject {
    /// Create an empty object.
    pub fn new(id: ObjectId, entity: impl Into<String>) -> Self {
        Self {
            id,
            entity: entity.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Get an attribute value, treating a missing entry as null.
    pub fn attribute(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.attributes.get(name).unwrap_or(&NULL)
    }

    /// Set an attribute value. Null values are not stored.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if value.is_null() {
            self.attributes.remove(&name);
        } else {
            self.attributes.insert(name, value);
        }
    }

    /// Targets of a relationship (empty when unset).
    pub fn related(&self, relationship: &str) -> &[ObjectId] {
        self.relationships
            .get(relationship)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append a target to a relationship unless already present.
    pub fn push_related(&mut self, relationship: impl Into<String>, target: ObjectId) {
        let targets = self.relationships.entry(relationship.into()).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    /// Remove a target from every relationship of this object.
    pub fn forget(&mut self, target: ObjectId) {
        for targets in self.relationships.values_mut() {
            targets.retain(|t| *t != target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_defaults_to_null() {
        let mut obj = StoredObject::new(ObjectId(1), "Book");
        assert!(obj.attribute("title").is_null());

        obj.set_attribute("title", Value::from("Dune"));
        assert_eq!(obj.attribute("title").as_str(), Some("Dune"));

        obj.set_attribute("title", Value::Null);
        assert!(!obj.attributes.contains_key("title"));
    }

    #[test]
    fn test_push_related_keeps_order_without_duplicates() {
        let mut obj = StoredObject::new(ObjectId(1), "Book");
        obj.push_related("authors", ObjectId(3));
        obj.push_related("authors", ObjectId(2));
        obj.push_related("authors", ObjectId(3));

        assert_eq!(obj.related("authors"), &[ObjectId(3), ObjectId(2)]);
        assert!(obj.related("subjects").is_empty());
    }

    #[test]
    fn test_forget_removes_everywhere() {
        let mut obj = StoredObject::new(ObjectId(1), "Book");
        obj.push_related("authors", ObjectId(2));
        obj.push_related("subjects", ObjectId(2));
        obj.forget(ObjectId(2));

        assert!(obj.related("authors").is_empty());
        assert!(obj.related("subjects").is_empty());
    }
}
