//! Schema diffing.
//!
//! Compares two adjacent schema versions and produces a structured list of
//! changes. Mapping inference reads this diff to decide which attributes can be
//! copied, defaulted or must be rejected.

use crate::catalog::{AttributeDef, Cardinality, EntityDef, RelationshipDef, ScalarType, SchemaVersion};
use std::collections::BTreeSet;
use std::fmt;

/// Complete diff between two schema versions.
#[derive(Debug, Clone)]
pub struct SchemaDiff {
    /// Source schema ordinal.
    pub from_version: u32,
    /// Destination schema ordinal.
    pub to_version: u32,
    /// Changes to entities, in entity name order.
    pub entity_changes: Vec<EntityChange>,
}

impl SchemaDiff {
    /// Compute the diff between two schema versions.
    pub fn compute(from: &SchemaVersion, to: &SchemaVersion) -> Self {
        let from_names: BTreeSet<&str> = from.entity_names().into_iter().collect();
        let to_names: BTreeSet<&str> = to.entity_names().into_iter().collect();
        let mut entity_changes = Vec::new();

        for name in from_names.union(&to_names) {
            match (from.get_entity(name), to.get_entity(name)) {
                (None, Some(added)) => entity_changes.push(EntityChange::Added(added.clone())),
                (Some(removed), None) => entity_changes.push(EntityChange::Removed(removed.clone())),
                (Some(old), Some(new)) if old != new => {
                    let attribute_changes = Self::diff_attributes(&old.attributes, &new.attributes);
                    let relationship_changes =
                        Self::diff_relationships(&old.relationships, &new.relationships);
                    let lifecycle_changed = (old.lifecycle != new.lifecycle).then_some((
                        old.lifecycle.delete_when_orphaned,
                        new.lifecycle.delete_when_orphaned,
                    ));

                    if !attribute_changes.is_empty()
                        || !relationship_changes.is_empty()
                        || lifecycle_changed.is_some()
                    {
                        entity_changes.push(EntityChange::Modified {
                            entity_name: (*name).to_string(),
                            attribute_changes,
                            relationship_changes,
                            lifecycle_changed,
                        });
                    }
                }
                _ => {}
            }
        }

        SchemaDiff {
            from_version: from.ordinal(),
            to_version: to.ordinal(),
            entity_changes,
        }
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.entity_changes.is_empty()
    }

    /// Total number of entity, attribute and relationship changes.
    pub fn change_count(&self) -> usize {
        self.entity_changes
            .iter()
            .map(|c| match c {
                EntityChange::Modified {
                    attribute_changes,
                    relationship_changes,
                    lifecycle_changed,
                    ..
                } => {
                    attribute_changes.len()
                        + relationship_changes.len()
                        + usize::from(lifecycle_changed.is_some())
                }
                _ => 1,
            })
            .sum()
    }

    /// Changes recorded for one entity, if it was modified.
    pub fn entity(&self, name: &str) -> Option<&EntityChange> {
        self.entity_changes.iter().find(|c| c.entity_name() == name)
    }

    fn diff_attributes(from: &[AttributeDef], to: &[AttributeDef]) -> Vec<AttributeChange> {
        let mut changes = Vec::new();

        for attr in to {
            match from.iter().find(|a| a.name == attr.name) {
                None => changes.push(AttributeChange::Added(attr.clone())),
                Some(old) => {
                    if old.scalar != attr.scalar {
                        changes.push(AttributeChange::TypeChanged {
                            attribute: attr.name.clone(),
                            from_type: old.scalar,
                            to_type: attr.scalar,
                        });
                    }
                    if old.optional != attr.optional {
                        changes.push(AttributeChange::OptionalityChanged {
                            attribute: attr.name.clone(),
                            from_optional: old.optional,
                            to_optional: attr.optional,
                            has_default: attr.has_default(),
                        });
                    }
                    if old.default != attr.default {
                        changes.push(AttributeChange::DefaultChanged {
                            attribute: attr.name.clone(),
                        });
                    }
                }
            }
        }

        for attr in from {
            if !to.iter().any(|a| a.name == attr.name) {
                changes.push(AttributeChange::Removed(attr.clone()));
            }
        }

        changes
    }

    fn diff_relationships(from: &[RelationshipDef], to: &[RelationshipDef]) -> Vec<RelationshipChange> {
        let mut changes = Vec::new();

        for rel in to {
            match from.iter().find(|r| r.name == rel.name) {
                None => changes.push(RelationshipChange::Added(rel.clone())),
                Some(old) if old != rel => changes.push(RelationshipChange::Modified {
                    relationship: rel.name.clone(),
                    target_changed: (old.target != rel.target)
                        .then(|| (old.target.clone(), rel.target.clone())),
                    cardinality_changed: (old.cardinality != rel.cardinality)
                        .then_some((old.cardinality, rel.cardinality)),
                    ownership_changed: (old.owning != rel.owning).then_some((old.owning, rel.owning)),
                    optionality_changed: (old.optional != rel.optional)
                        .then_some((old.optional, rel.optional)),
                }),
                Some(_) => {}
            }
        }

        for rel in from {
            if !to.iter().any(|r| r.name == rel.name) {
                changes.push(RelationshipChange::Removed(rel.clone()));
            }
        }

        changes
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} -> v{}:", self.from_version, self.to_version)?;
        if self.is_empty() {
            return write!(f, " no changes");
        }
        for change in &self.entity_changes {
            match change {
                EntityChange::Added(e) => write!(f, " +{}", e.name)?,
                EntityChange::Removed(e) => write!(f, " -{}", e.name)?,
                EntityChange::Modified {
                    entity_name,
                    attribute_changes,
                    relationship_changes,
                    ..
                } => {
                    for a in attribute_changes {
                        write!(f, " {}{}.{}", a.symbol(), entity_name, a.attribute_name())?;
                    }
                    for r in relationship_changes {
                        write!(f, " {}{}.{}", r.symbol(), entity_name, r.relationship_name())?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Change to an entity definition.
#[derive(Debug, Clone)]
pub enum EntityChange {
    /// Entity was added.
    Added(EntityDef),
    /// Entity was removed.
    Removed(EntityDef),
    /// Entity was modified.
    Modified {
        /// Name of the entity.
        entity_name: String,
        /// Changes to attributes.
        attribute_changes: Vec<AttributeChange>,
        /// Changes to relationships.
        relationship_changes: Vec<RelationshipChange>,
        /// `delete_when_orphaned` change (old, new).
        lifecycle_changed: Option<(bool, bool)>,
    },
}

impl EntityChange {
    /// Get the entity name for this change.
    pub fn entity_name(&self) -> &str {
        match self {
            EntityChange::Added(e) => &e.name,
            EntityChange::Removed(e) => &e.name,
            EntityChange::Modified { entity_name, .. } => entity_name,
        }
    }

    /// Attribute changes of a modified entity (empty otherwise).
    pub fn attribute_changes(&self) -> &[AttributeChange] {
        match self {
            EntityChange::Modified {
                attribute_changes, ..
            } => attribute_changes,
            _ => &[],
        }
    }

    /// Relationship changes of a modified entity (empty otherwise).
    pub fn relationship_changes(&self) -> &[RelationshipChange] {
        match self {
            EntityChange::Modified {
                relationship_changes,
                ..
            } => relationship_changes,
            _ => &[],
        }
    }
}

/// Change to an attribute within an entity.
#[derive(Debug, Clone)]
pub enum AttributeChange {
    /// Attribute was added.
    Added(AttributeDef),
    /// Attribute was removed.
    Removed(AttributeDef),
    /// Attribute type was changed.
    TypeChanged {
        /// Name of the attribute.
        attribute: String,
        /// Original type.
        from_type: ScalarType,
        /// New type.
        to_type: ScalarType,
    },
    /// Attribute optionality was changed.
    OptionalityChanged {
        /// Name of the attribute.
        attribute: String,
        /// Was optional before.
        from_optional: bool,
        /// Is optional now.
        to_optional: bool,
        /// Whether the new definition declares a default.
        has_default: bool,
    },
    /// Declared default was changed.
    DefaultChanged {
        /// Name of the attribute.
        attribute: String,
    },
}

impl AttributeChange {
    /// Get the attribute name for this change.
    pub fn attribute_name(&self) -> &str {
        match self {
            AttributeChange::Added(a) => &a.name,
            AttributeChange::Removed(a) => &a.name,
            AttributeChange::TypeChanged { attribute, .. } => attribute,
            AttributeChange::OptionalityChanged { attribute, .. } => attribute,
            AttributeChange::DefaultChanged { attribute } => attribute,
        }
    }

    fn symbol(&self) -> char {
        match self {
            AttributeChange::Added(_) => '+',
            AttributeChange::Removed(_) => '-',
            _ => '~',
        }
    }
}

/// Change to a relationship within an entity.
#[derive(Debug, Clone)]
pub enum RelationshipChange {
    /// Relationship was added.
    Added(RelationshipDef),
    /// Relationship was removed.
    Removed(RelationshipDef),
    /// Relationship was modified.
    Modified {
        /// Name of the relationship.
        relationship: String,
        /// Target entity change (old, new).
        target_changed: Option<(String, String)>,
        /// Cardinality change (old, new).
        cardinality_changed: Option<(Cardinality, Cardinality)>,
        /// Owning flag change (old, new).
        ownership_changed: Option<(bool, bool)>,
        /// Optional flag change (old, new).
        optionality_changed: Option<(bool, bool)>,
    },
}

impl RelationshipChange {
    /// Get the relationship name for this change.
    pub fn relationship_name(&self) -> &str {
        match self {
            RelationshipChange::Added(r) => &r.name,
            RelationshipChange::Removed(r) => &r.name,
            RelationshipChange::Modified { relationship, .. } => relationship,
        }
    }

    fn symbol(&self) -> char {
        match self {
            RelationshipChange::Added(_) => '+',
            RelationshipChange::Removed(_) => '-',
            RelationshipChange::Modified { .. } => '~',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DefaultValue;

    fn book(extra: Vec<AttributeDef>) -> EntityDef {
        EntityDef::new("Book")
            .with_attribute(AttributeDef::new("title", ScalarType::String))
            .with_attribute(AttributeDef::optional("coverUrl", ScalarType::String))
            .with_attributes(extra)
    }

    #[test]
    fn test_no_changes() {
        let a = SchemaVersion::new(1, "a", vec![book(vec![])]).unwrap();
        let diff = SchemaDiff::compute(&a, &a);
        assert!(diff.is_empty());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn test_added_and_removed_attributes() {
        let from = SchemaVersion::new(1, "a", vec![book(vec![])]).unwrap();
        let to_book = EntityDef::new("Book")
            .with_attribute(AttributeDef::new("title", ScalarType::String))
            .with_attribute(
                AttributeDef::new("sort", ScalarType::Int64).with_default(DefaultValue::Int(0)),
            );
        let to = SchemaVersion::new(2, "b", vec![to_book]).unwrap();

        let diff = SchemaDiff::compute(&from, &to);
        let changes = diff.entity("Book").unwrap().attribute_changes();
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], AttributeChange::Added(a) if a.name == "sort"));
        assert!(matches!(&changes[1], AttributeChange::Removed(a) if a.name == "coverUrl"));
        assert_eq!(diff.to_string(), "v1 -> v2: +Book.sort -Book.coverUrl");
    }

    #[test]
    fn test_type_and_optionality_changes() {
        let from = SchemaVersion::new(
            1,
            "a",
            vec![book(vec![AttributeDef::optional("pageCount", ScalarType::Int32)])],
        )
        .unwrap();
        let to = SchemaVersion::new(
            2,
            "b",
            vec![book(vec![AttributeDef::new("pageCount", ScalarType::Int64)])],
        )
        .unwrap();

        let diff = SchemaDiff::compute(&from, &to);
        let changes = diff.entity("Book").unwrap().attribute_changes();
        assert!(changes.iter().any(|c| matches!(
            c,
            AttributeChange::TypeChanged {
                from_type: ScalarType::Int32,
                to_type: ScalarType::Int64,
                ..
            }
        )));
        assert!(changes.iter().any(|c| matches!(
            c,
            AttributeChange::OptionalityChanged {
                from_optional: true,
                to_optional: false,
                has_default: false,
                ..
            }
        )));
    }

    #[test]
    fn test_added_entity() {
        let from = SchemaVersion::new(1, "a", vec![book(vec![])]).unwrap();
        let to = SchemaVersion::new(
            2,
            "b",
            vec![
                book(vec![]),
                EntityDef::new("Shelf").with_attribute(AttributeDef::new("name", ScalarType::String)),
            ],
        )
        .unwrap();

        let diff = SchemaDiff::compute(&from, &to);
        assert_eq!(diff.entity_changes.len(), 1);
        assert!(matches!(&diff.entity_changes[0], EntityChange::Added(e) if e.name == "Shelf"));
    }
}
