//! In-memory object graph backing a store file.

use super::object::{ObjectId, StoredObject};
use super::value::Value;
use crate::catalog::{Cardinality, EntityDef, RelationshipDef, SchemaVersion};
use crate::error::Error;
use std::collections::BTreeMap;

/// All objects of one store, keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGraph {
    objects: BTreeMap<ObjectId, StoredObject>,
    next_id: u64,
}

impl Default for ObjectGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Rebuild a graph from decoded objects.
    pub fn from_parts(objects: Vec<StoredObject>, next_id: u64) -> Self {
        let objects: BTreeMap<_, _> = objects.into_iter().map(|o| (o.id, o)).collect();
        let floor = objects.keys().next_back().map(|id| id.0 + 1).unwrap_or(1);
        Self {
            objects,
            next_id: next_id.max(floor),
        }
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the graph holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Next identifier that will be handed out.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Reserve a fresh identifier.
    pub fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Raise the id floor so ids handed out later never collide with `floor - 1`.
    pub fn reserve_through(&mut self, floor: u64) {
        self.next_id = self.next_id.max(floor);
    }

    /// Get an object by id.
    pub fn get(&self, id: ObjectId) -> Option<&StoredObject> {
        self.objects.get(&id)
    }

    /// Get a mutable object by id.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut StoredObject> {
        self.objects.get_mut(&id)
    }

    /// Check whether an object exists.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Iterate all objects in id order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredObject> {
        self.objects.values()
    }

    /// Iterate the objects of one entity in id order.
    pub fn objects_of<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a StoredObject> {
        self.objects.values().filter(move |o| o.entity == entity)
    }

    /// Object count per entity name.
    pub fn count_by_entity(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for object in self.objects.values() {
            *counts.entry(object.entity.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Insert a pre-built object, keeping its id.
    pub fn insert_object(&mut self, object: StoredObject) {
        self.reserve_through(object.id.0 + 1);
        self.objects.insert(object.id, object);
    }

    /// Create a new object after validating it against the schema.
    ///
    /// Missing attributes fall back to their declared default.
    pub fn insert<K, I>(
        &mut self,
        schema: &SchemaVersion,
        entity: &str,
        attributes: I,
    ) -> Result<ObjectId, Error>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let def = entity_def(schema, entity)?;
        let mut object = StoredObject::new(ObjectId(0), entity);
        for (name, value) in attributes {
            let name = name.into();
            check_attribute(def, &name, &value)?;
            object.set_attribute(name, value);
        }
        for attribute in &def.attributes {
            if !object.attributes.contains_key(&attribute.name) {
                if let Some(default) = attribute.default_value() {
                    object.set_attribute(attribute.name.clone(), default);
                }
            }
        }

        object.id = self.allocate_id();
        let id = object.id;
        self.objects.insert(id, object);
        Ok(id)
    }

    /// Set one attribute after validating it against the schema.
    pub fn set_attribute(
        &mut self,
        schema: &SchemaVersion,
        id: ObjectId,
        attribute: &str,
        value: Value,
    ) -> Result<(), Error> {
        let object = self.objects.get_mut(&id).ok_or(Error::NotFound(id))?;
        let def = entity_def(schema, &object.entity)?;
        check_attribute(def, attribute, &value)?;
        object.set_attribute(attribute, value);
        Ok(())
    }

    /// Relate `owner` to `target` through an owning relationship.
    ///
    /// Appends to to-many relationships and replaces to-one relationships. The
    /// inverse side on the target is kept in step.
    pub fn link(
        &mut self,
        schema: &SchemaVersion,
        owner: ObjectId,
        relationship: &str,
        target: ObjectId,
    ) -> Result<(), Error> {
        let owner_entity = self.objects.get(&owner).ok_or(Error::NotFound(owner))?.entity.clone();
        let target_entity = self.objects.get(&target).ok_or(Error::NotFound(target))?.entity.clone();
        let rel = owning_relationship(schema, &owner_entity, relationship)?;
        if rel.target != target_entity {
            return Err(Error::TargetMismatch {
                entity: owner_entity,
                relationship: relationship.to_string(),
                expected: rel.target.clone(),
                found: target_entity,
            });
        }

        if rel.cardinality == Cardinality::ToOne {
            let previous: Vec<ObjectId> = self.objects[&owner].related(relationship).to_vec();
            for prev in previous {
                if let Some(old) = self.objects.get_mut(&prev) {
                    if let Some(targets) = old.relationships.get_mut(&rel.inverse) {
                        targets.retain(|t| *t != owner);
                    }
                }
            }
            if let Some(object) = self.objects.get_mut(&owner) {
                object.relationships.insert(relationship.to_string(), Vec::new());
            }
        }

        if let Some(object) = self.objects.get_mut(&owner) {
            object.push_related(relationship, target);
        }
        let inverse = rel.inverse.clone();
        if let Some(object) = self.objects.get_mut(&target) {
            object.push_related(inverse, owner);
        }
        Ok(())
    }

    /// Remove an object and every reference to it.
    pub fn remove(&mut self, id: ObjectId) -> Option<StoredObject> {
        let removed = self.objects.remove(&id)?;
        for object in self.objects.values_mut() {
            object.forget(id);
        }
        Some(removed)
    }

    /// Recompute every inverse relationship from the owning sides.
    ///
    /// Owning relationships are the source of truth; inverse lists are rebuilt
    /// in owner id order.
    pub fn rebuild_inverses(&mut self, schema: &SchemaVersion) {
        for object in self.objects.values_mut() {
            if let Some(def) = schema.get_entity(&object.entity) {
                for rel in def.relationships.iter().filter(|r| !r.owning) {
                    object.relationships.remove(&rel.name);
                }
            }
        }

        let mut back_links: Vec<(ObjectId, String, ObjectId)> = Vec::new();
        for object in self.objects.values() {
            let Some(def) = schema.get_entity(&object.entity) else {
                continue;
            };
            for rel in def.owning_relationships() {
                for target in object.related(&rel.name) {
                    back_links.push((*target, rel.inverse.clone(), object.id));
                }
            }
        }
        for (target, inverse, owner) in back_links {
            if let Some(object) = self.objects.get_mut(&target) {
                object.push_related(inverse, owner);
            }
        }
    }

    /// Check that every required attribute of every object is populated.
    pub fn check_required(&self, schema: &SchemaVersion) -> Result<(), Error> {
        for object in self.objects.values() {
            let def = entity_def(schema, &object.entity)?;
            for attribute in def.required_attributes() {
                if object.attribute(&attribute.name).is_null() {
                    return Err(Error::MissingRequired {
                        entity: object.entity.clone(),
                        id: object.id,
                        attribute: attribute.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Decompose into objects (id order) and the id counter.
    pub fn into_parts(self) -> (Vec<StoredObject>, u64) {
        (self.objects.into_values().collect(), self.next_id)
    }
}

pub(crate) fn entity_def<'a>(schema: &'a SchemaVersion, entity: &str) -> Result<&'a EntityDef, Error> {
    schema
        .get_entity(entity)
        .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
}

pub(crate) fn owning_relationship<'a>(
    schema: &'a SchemaVersion,
    entity: &str,
    relationship: &str,
) -> Result<&'a RelationshipDef, Error> {
    entity_def(schema, entity)?
        .get_relationship(relationship)
        .filter(|r| r.owning)
        .ok_or_else(|| Error::UnknownRelationship {
            entity: entity.to_string(),
            relationship: relationship.to_string(),
        })
}

pub(crate) fn check_attribute(def: &EntityDef, attribute: &str, value: &Value) -> Result<(), Error> {
    let attr = def
        .get_attribute(attribute)
        .ok_or_else(|| Error::UnknownAttribute {
            entity: def.name.clone(),
            attribute: attribute.to_string(),
        })?;
    if !attr.accepts(value) {
        return Err(Error::TypeMismatch {
            entity: def.name.clone(),
            attribute: attribute.to_string(),
            expected: attr.scalar,
        });
    }
    Ok(())
}
