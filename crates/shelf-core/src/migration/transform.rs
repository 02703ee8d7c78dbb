//! Custom entity transformers.
//!
//! A transformer runs once per source object of the entity it is registered on
//! and fills in destination attributes or relationships that no direct copy or
//! default can produce. It sees the full source object and writes through a
//! [`GraphBuilder`], which validates every write against the destination schema.

use crate::catalog::SchemaVersion;
use crate::error::Error;
use crate::store::{ObjectGraph, ObjectId, StoredObject, Value};
use std::fmt;
use thiserror::Error;

/// Errors raised by a transformer.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A write was rejected by the destination schema.
    #[error(transparent)]
    Store(#[from] Error),

    /// A referenced source object does not exist.
    #[error("source object {0} not found")]
    MissingSource(ObjectId),

    /// Transformer-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// A named, versioned transformation of one entity.
pub trait EntityTransformer: Send + Sync {
    /// Stable name, reported in migration statistics.
    fn name(&self) -> &str;

    /// Version of the transformation logic.
    fn version(&self) -> u32;

    /// Destination attributes and relationships this transformer populates.
    fn produces(&self) -> &[&str];

    /// Transform one source object whose destination counterpart is `dest`.
    fn apply(
        &self,
        source: &StoredObject,
        dest: ObjectId,
        builder: &mut GraphBuilder<'_>,
    ) -> Result<(), TransformError>;
}

impl fmt::Debug for dyn EntityTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name(), self.version())
    }
}

/// Write access to the destination graph during a migration step.
pub struct GraphBuilder<'a> {
    source: &'a ObjectGraph,
    dest: &'a mut ObjectGraph,
    dest_schema: &'a SchemaVersion,
    inserted: usize,
    carried: usize,
}

impl<'a> GraphBuilder<'a> {
    pub(crate) fn new(
        source: &'a ObjectGraph,
        dest: &'a mut ObjectGraph,
        dest_schema: &'a SchemaVersion,
    ) -> Self {
        Self {
            source,
            dest,
            dest_schema,
            inserted: 0,
            carried: 0,
        }
    }

    /// The complete source graph.
    pub fn source(&self) -> &ObjectGraph {
        self.source
    }

    /// Source objects related to `object` through `relationship`, in order.
    pub fn source_related(
        &self,
        object: &StoredObject,
        relationship: &str,
    ) -> Result<Vec<&'a StoredObject>, TransformError> {
        let source = self.source;
        object
            .related(relationship)
            .iter()
            .map(|id| source.get(*id).ok_or(TransformError::MissingSource(*id)))
            .collect()
    }

    /// The destination schema.
    pub fn schema(&self) -> &SchemaVersion {
        self.dest_schema
    }

    /// Get a destination object.
    pub fn get(&self, id: ObjectId) -> Option<&StoredObject> {
        self.dest.get(id)
    }

    /// Create a new destination object with a fresh id.
    pub fn insert<K, I>(&mut self, entity: &str, attributes: I) -> Result<ObjectId, TransformError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let id = self.dest.insert(self.dest_schema, entity, attributes)?;
        self.inserted += 1;
        Ok(id)
    }

    /// Carry a source object into the destination, keeping its id.
    ///
    /// Attributes present in the destination entity with a matching type are
    /// copied; other destination attributes take their declared default.
    /// Relationships are not carried. Repeated calls for the same source id
    /// return the same destination object.
    pub fn carry_over(&mut self, source_id: ObjectId) -> Result<ObjectId, TransformError> {
        let object = self
            .source
            .get(source_id)
            .ok_or(TransformError::MissingSource(source_id))?;

        if let Some(existing) = self.dest.get(source_id) {
            if existing.entity != object.entity {
                return Err(TransformError::Failed(format!(
                    "{source_id} is already a {} in the destination",
                    existing.entity
                )));
            }
            return Ok(source_id);
        }

        let def = self
            .dest_schema
            .get_entity(&object.entity)
            .ok_or_else(|| Error::UnknownEntity(object.entity.clone()))?;
        let mut carried = StoredObject::new(source_id, def.name.clone());
        for attribute in &def.attributes {
            let value = object.attribute(&attribute.name);
            if !value.is_null() && attribute.accepts(value) {
                carried.set_attribute(attribute.name.clone(), value.clone());
            } else if let Some(default) = attribute.default_value() {
                carried.set_attribute(attribute.name.clone(), default);
            }
        }

        self.dest.insert_object(carried);
        self.carried += 1;
        Ok(source_id)
    }

    /// Set an attribute on a destination object.
    pub fn set_attribute(
        &mut self,
        id: ObjectId,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<(), TransformError> {
        self.dest
            .set_attribute(self.dest_schema, id, attribute, value.into())?;
        Ok(())
    }

    /// Append `target` to an owning relationship of `owner`.
    pub fn append(
        &mut self,
        owner: ObjectId,
        relationship: &str,
        target: ObjectId,
    ) -> Result<(), TransformError> {
        self.dest.link(self.dest_schema, owner, relationship, target)?;
        Ok(())
    }

    /// Number of objects created and carried over so far.
    pub(crate) fn counts(&self) -> (usize, usize) {
        (self.inserted, self.carried)
    }
}
