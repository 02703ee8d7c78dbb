//! Schema version - an immutable snapshot of the whole data model.

use super::error::CatalogError;
use super::EntityDef;
use std::collections::HashSet;

/// One element of the schema catalog.
///
/// Built once at load time and never mutated. The signature identifies the
/// structure of the model and is what a store file records.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaVersion {
    ordinal: u32,
    tag: String,
    entities: Vec<EntityDef>,
    signature: String,
}

impl SchemaVersion {
    /// Validate entity definitions and build a schema version.
    ///
    /// Entities are kept sorted by name so that iteration order is stable.
    pub fn new(
        ordinal: u32,
        tag: impl Into<String>,
        mut entities: Vec<EntityDef>,
    ) -> Result<Self, CatalogError> {
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        validate(ordinal, &entities)?;
        let signature = schema_signature(&entities);

        Ok(Self {
            ordinal,
            tag: tag.into(),
            entities,
            signature,
        })
    }

    /// Version number (1-based, matches catalog position + 1).
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Resource tag this version was loaded from.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Structural signature (hex-encoded blake3 digest).
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Entity definitions sorted by name.
    pub fn entities(&self) -> &[EntityDef] {
        &self.entities
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// List all entity names.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }
}

fn validate(ordinal: u32, entities: &[EntityDef]) -> Result<(), CatalogError> {
    let mut entity_names = HashSet::new();
    for entity in entities {
        if !entity_names.insert(entity.name.as_str()) {
            return Err(CatalogError::Duplicate {
                kind: "entity",
                name: entity.name.clone(),
                ordinal,
            });
        }

        // attributes and relationships share one namespace per entity
        let mut member_names = HashSet::new();
        for attribute in &entity.attributes {
            if !member_names.insert(attribute.name.as_str()) {
                return Err(CatalogError::Duplicate {
                    kind: "attribute",
                    name: format!("{}.{}", entity.name, attribute.name),
                    ordinal,
                });
            }
            if let Some(default) = &attribute.default {
                if !default.fits(attribute.scalar) {
                    return Err(CatalogError::DefaultMismatch {
                        entity: entity.name.clone(),
                        attribute: attribute.name.clone(),
                    });
                }
            }
        }
        for relationship in &entity.relationships {
            if !member_names.insert(relationship.name.as_str()) {
                return Err(CatalogError::Duplicate {
                    kind: "relationship",
                    name: format!("{}.{}", entity.name, relationship.name),
                    ordinal,
                });
            }
        }
    }

    for entity in entities {
        for relationship in &entity.relationships {
            let target = entities
                .iter()
                .find(|e| e.name == relationship.target)
                .ok_or_else(|| CatalogError::UnknownTarget {
                    entity: entity.name.clone(),
                    relationship: relationship.name.clone(),
                    target: relationship.target.clone(),
                })?;

            let inverse = target
                .get_relationship(&relationship.inverse)
                .filter(|inv| inv.target == entity.name && inv.inverse == relationship.name)
                .ok_or_else(|| CatalogError::BrokenInverse {
                    entity: entity.name.clone(),
                    relationship: relationship.name.clone(),
                    inverse: relationship.inverse.clone(),
                })?;

            if inverse.owning == relationship.owning {
                return Err(CatalogError::Ownership {
                    entity: entity.name.clone(),
                    relationship: relationship.name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Digest of one entity's structure.
///
/// Defaults and lifecycle rules are not hashed: they change how a
/// store is populated, not what a store file can contain.
pub fn entity_hash(entity: &EntityDef) -> blake3::Hash {
    let mut attributes: Vec<_> = entity.attributes.iter().collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    let mut relationships: Vec<_> = entity.relationships.iter().collect();
    relationships.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = blake3::Hasher::new();
    hasher.update(format!("entity:{}\n", entity.name).as_bytes());
    for attribute in attributes {
        hasher.update(
            format!(
                "attr:{}:{}:{}\n",
                attribute.name, attribute.scalar, attribute.optional
            )
            .as_bytes(),
        );
    }
    for rel in relationships {
        hasher.update(
            format!(
                "rel:{}:{}:{}:{}:{}:{}\n",
                rel.name, rel.target, rel.cardinality, rel.owning, rel.inverse, rel.optional
            )
            .as_bytes(),
        );
    }
    hasher.finalize()
}

/// Hex signature over the sorted per-entity hashes.
pub fn schema_signature(entities: &[EntityDef]) -> String {
    let mut hashes: Vec<(&str, blake3::Hash)> = entities
        .iter()
        .map(|e| (e.name.as_str(), entity_hash(e)))
        .collect();
    hashes.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = blake3::Hasher::new();
    for (name, hash) in hashes {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, Cardinality, DefaultValue, RelationshipDef, ScalarType};

    fn book() -> EntityDef {
        EntityDef::new("Book")
            .with_attribute(AttributeDef::new("title", ScalarType::String))
            .with_relationship(RelationshipDef::owning(
                "subjects",
                "Subject",
                Cardinality::OrderedToMany,
                "books",
            ))
    }

    fn subject() -> EntityDef {
        EntityDef::new("Subject")
            .with_attribute(AttributeDef::new("name", ScalarType::String))
            .with_relationship(RelationshipDef::inverse_of(
                "books",
                "Book",
                Cardinality::UnorderedToMany,
                "subjects",
            ))
            .deleted_when_orphaned()
    }

    #[test]
    fn test_schema_version_sorted_entities() {
        let schema = SchemaVersion::new(1, "v1", vec![subject(), book()]).unwrap();

        assert_eq!(schema.ordinal(), 1);
        assert_eq!(schema.entity_names(), vec!["Book", "Subject"]);
        assert!(schema.get_entity("Subject").is_some());
        assert!(schema.get_entity("Author").is_none());
        assert_eq!(schema.signature().len(), 64);
    }

    #[test]
    fn test_signature_ignores_declaration_order() {
        let a = SchemaVersion::new(1, "a", vec![book(), subject()]).unwrap();
        let b = SchemaVersion::new(2, "b", vec![subject(), book()]).unwrap();
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_ignores_defaults() {
        let plain = book().with_attribute(AttributeDef::new("sort", ScalarType::Int64));
        let defaulted = book().with_attribute(
            AttributeDef::new("sort", ScalarType::Int64).with_default(DefaultValue::Int(3)),
        );
        assert_eq!(entity_hash(&plain), entity_hash(&defaulted));
    }

    #[test]
    fn test_signature_tracks_structure() {
        let base = SchemaVersion::new(1, "a", vec![book(), subject()]).unwrap();
        let extended = SchemaVersion::new(
            2,
            "b",
            vec![
                book().with_attribute(AttributeDef::optional("notes", ScalarType::String)),
                subject(),
            ],
        )
        .unwrap();
        assert_ne!(base.signature(), extended.signature());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let err = SchemaVersion::new(1, "v1", vec![book()]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTarget { .. }));
    }

    #[test]
    fn test_broken_inverse_rejected() {
        let mut bad_subject = subject();
        bad_subject.relationships[0].inverse = "topics".into();
        let err = SchemaVersion::new(1, "v1", vec![book(), bad_subject]).unwrap_err();
        assert!(matches!(err, CatalogError::BrokenInverse { .. }));
    }

    #[test]
    fn test_double_ownership_rejected() {
        let mut owning_subject = subject();
        owning_subject.relationships[0].owning = true;
        let err = SchemaVersion::new(1, "v1", vec![book(), owning_subject]).unwrap_err();
        assert!(matches!(err, CatalogError::Ownership { .. }));
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let dup = book().with_attribute(AttributeDef::optional("subjects", ScalarType::String));
        let err = SchemaVersion::new(1, "v1", vec![dup, subject()]).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { kind: "relationship", .. }));
    }

    #[test]
    fn test_default_mismatch_rejected() {
        let bad = book().with_attribute(
            AttributeDef::new("sort", ScalarType::Int64)
                .with_default(DefaultValue::String("zero".into())),
        );
        let err = SchemaVersion::new(1, "v1", vec![bad, subject()]).unwrap_err();
        assert!(matches!(err, CatalogError::DefaultMismatch { .. }));
    }
}
