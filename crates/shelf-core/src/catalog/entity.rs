//! Entity definitions.

use super::field::AttributeDef;
use super::relation::RelationshipDef;
use serde::{Deserialize, Serialize};

/// An entity definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within a schema version).
    pub name: String,
    /// Attribute definitions.
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    /// Relationship definitions.
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
    /// Lifecycle rules.
    #[serde(default)]
    pub lifecycle: LifecycleRules,
}

/// Lifecycle rules for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LifecycleRules {
    /// Delete instances that are no longer referenced by any owning relationship.
    #[serde(default)]
    pub delete_when_orphaned: bool,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            lifecycle: LifecycleRules::default(),
        }
    }

    /// Add an attribute to the entity.
    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add multiple attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = AttributeDef>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Add a relationship to the entity.
    pub fn with_relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Delete instances once nothing references them.
    pub fn deleted_when_orphaned(mut self) -> Self {
        self.lifecycle.delete_when_orphaned = true;
        self
    }

    /// Get an attribute by name.
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Get a relationship by name.
    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Relationships owned by this entity.
    pub fn owning_relationships(&self) -> impl Iterator<Item = &RelationshipDef> {
        self.relationships.iter().filter(|r| r.owning)
    }

    /// Attributes that must never be null.
    pub fn required_attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.iter().filter(|a| !a.optional)
    }

    /// Check if orphaned instances of this entity are deleted.
    pub fn deletes_when_orphaned(&self) -> bool {
        self.lifecycle.delete_when_orphaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Cardinality, ScalarType};

    fn author() -> EntityDef {
        EntityDef::new("Author")
            .with_attribute(AttributeDef::optional("firstNames", ScalarType::String))
            .with_attribute(AttributeDef::new("lastName", ScalarType::String))
            .with_relationship(RelationshipDef::inverse_of(
                "books",
                "Book",
                Cardinality::UnorderedToMany,
                "authors",
            ))
            .deleted_when_orphaned()
    }

    #[test]
    fn test_entity_builder() {
        let entity = author();

        assert_eq!(entity.name, "Author");
        assert_eq!(entity.attributes.len(), 2);
        assert_eq!(entity.relationships.len(), 1);
        assert!(entity.deletes_when_orphaned());
    }

    #[test]
    fn test_lookups() {
        let entity = author();

        assert!(entity.get_attribute("lastName").is_some());
        assert!(entity.get_attribute("nonexistent").is_none());
        assert!(entity.get_relationship("books").is_some());
        assert_eq!(entity.owning_relationships().count(), 0);
        assert_eq!(
            entity.required_attributes().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            vec!["lastName"]
        );
    }
}
