//! Relationship definitions between entities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most one target.
    ToOne,
    /// Any number of targets; order is significant.
    OrderedToMany,
    /// Any number of targets; order carries no meaning.
    UnorderedToMany,
}

impl Cardinality {
    /// Check if this cardinality allows more than one target.
    pub fn is_to_many(&self) -> bool {
        !matches!(self, Cardinality::ToOne)
    }

    /// Stable name used in signatures.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::ToOne => "to_one",
            Cardinality::OrderedToMany => "ordered_to_many",
            Cardinality::UnorderedToMany => "unordered_to_many",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_optional() -> bool {
    true
}

/// A relationship from one entity to another.
///
/// Every relationship has an inverse on the target entity. Exactly one side of
/// the pair is the owning side; the inverse side is derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// Relationship name (unique within its entity).
    pub name: String,
    /// Target entity name.
    pub target: String,
    /// Relationship cardinality.
    pub cardinality: Cardinality,
    /// Whether this side owns the relationship.
    #[serde(default)]
    pub owning: bool,
    /// Name of the inverse relationship on the target entity.
    pub inverse: String,
    /// Whether the relationship may be empty.
    #[serde(default = "default_optional")]
    pub optional: bool,
}

impl RelationshipDef {
    /// Create an owning relationship.
    pub fn owning(
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality,
            owning: true,
            inverse: inverse.into(),
            optional: true,
        }
    }

    /// Create an inverse (non-owning) relationship.
    pub fn inverse_of(
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            owning: false,
            ..Self::owning(name, target, cardinality, inverse)
        }
    }

    /// Mark the relationship as mandatory.
    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    /// Check if this relationship is ordered.
    pub fn is_ordered(&self) -> bool {
        self.cardinality == Cardinality::OrderedToMany
    }
}
