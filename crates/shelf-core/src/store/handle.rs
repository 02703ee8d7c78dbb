//! Persistent store handle - the data-access surface over a migrated store.

use super::file;
use super::graph::{entity_def, ObjectGraph};
use super::object::{ObjectId, StoredObject};
use super::value::Value;
use crate::catalog::SchemaVersion;
use crate::error::Error;
use crate::migration::invariant;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors returned by [`PersistentStoreHandle::save`].
#[derive(Debug, Error)]
pub enum SaveError {
    /// The in-memory store violates the schema.
    #[error("store validation failed: {0}")]
    Validation(#[source] Error),

    /// The store file could not be written.
    #[error("could not write store: {0}")]
    Write(#[source] Error),
}

/// Equality-filtered fetch of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Entity to fetch.
    pub entity: String,
    /// Attribute values every result must equal.
    pub matching: Vec<(String, Value)>,
}

impl FetchRequest {
    /// Fetch every object of an entity.
    pub fn entity(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            matching: Vec::new(),
        }
    }

    /// Require an attribute to equal a value.
    pub fn matching(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matching.push((attribute.into(), value.into()));
        self
    }
}

struct HandleState {
    graph: ObjectGraph,
    dirty: bool,
}

struct Inner {
    path: PathBuf,
    schema: Arc<SchemaVersion>,
    sync: bool,
    state: Mutex<HandleState>,
}

/// An opened store at the current schema version.
///
/// Only the migration manager constructs handles, so holding one proves the
/// store was brought up to date. Clones share the same store; every mutation
/// goes through one lock, giving the store a single writer at a time.
#[derive(Clone)]
pub struct PersistentStoreHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PersistentStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStoreHandle")
            .field("path", &self.inner.path)
            .field("version", &self.inner.schema.ordinal())
            .finish()
    }
}

impl PersistentStoreHandle {
    pub(crate) fn open(
        path: PathBuf,
        schema: Arc<SchemaVersion>,
        graph: ObjectGraph,
        sync: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                schema,
                sync,
                state: Mutex::new(HandleState {
                    graph,
                    dirty: false,
                }),
            }),
        }
    }

    /// Path of the live store file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Schema version of the store.
    pub fn schema(&self) -> &Arc<SchemaVersion> {
        &self.inner.schema
    }

    /// Whether there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// Number of objects in the store.
    pub fn len(&self) -> usize {
        self.inner.state.lock().graph.len()
    }

    /// Check if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create an object, filling declared defaults.
    pub fn create<K, I>(&self, entity: &str, attributes: I) -> Result<ObjectId, Error>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut state = self.inner.state.lock();
        let id = state.graph.insert(&self.inner.schema, entity, attributes)?;
        state.dirty = true;
        Ok(id)
    }

    /// Append `target` to an owning relationship of `owner`.
    pub fn link(&self, owner: ObjectId, relationship: &str, target: ObjectId) -> Result<(), Error> {
        let mut state = self.inner.state.lock();
        state.graph.link(&self.inner.schema, owner, relationship, target)?;
        state.dirty = true;
        Ok(())
    }

    /// Get a copy of one object.
    pub fn get(&self, id: ObjectId) -> Option<StoredObject> {
        self.inner.state.lock().graph.get(id).cloned()
    }

    /// Fetch the objects matching a request, in id order.
    pub fn fetch(&self, request: &FetchRequest) -> Result<Vec<StoredObject>, Error> {
        let def = entity_def(&self.inner.schema, &request.entity)?;
        for (attribute, _) in &request.matching {
            if def.get_attribute(attribute).is_none() {
                return Err(Error::UnknownAttribute {
                    entity: def.name.clone(),
                    attribute: attribute.clone(),
                });
            }
        }

        let state = self.inner.state.lock();
        Ok(state
            .graph
            .objects_of(&request.entity)
            .filter(|o| {
                request
                    .matching
                    .iter()
                    .all(|(name, value)| o.attribute(name) == value)
            })
            .cloned()
            .collect())
    }

    /// Set one attribute.
    pub fn update(&self, id: ObjectId, attribute: &str, value: impl Into<Value>) -> Result<(), Error> {
        let mut state = self.inner.state.lock();
        state
            .graph
            .set_attribute(&self.inner.schema, id, attribute, value.into())?;
        state.dirty = true;
        Ok(())
    }

    /// Delete an object.
    ///
    /// Objects it referenced that are deleted when orphaned go with it once
    /// nothing else references them. Returns every removed id, `id` first.
    pub fn delete(&self, id: ObjectId) -> Result<Vec<ObjectId>, Error> {
        let mut state = self.inner.state.lock();
        let removed = state.graph.remove(id).ok_or(Error::NotFound(id))?;
        let mut deleted = vec![id];
        deleted.extend(invariant::cascade_orphans(
            &mut state.graph,
            &self.inner.schema,
            &removed,
        ));
        state.dirty = true;
        debug!(object = %id, cascaded = deleted.len() - 1, "Deleted object");
        Ok(deleted)
    }

    /// Validate and atomically write the store to disk.
    ///
    /// Runs the back-reference pass first, so orphaned objects are never
    /// persisted.
    pub fn save(&self) -> Result<(), SaveError> {
        let mut state = self.inner.state.lock();
        let schema = &self.inner.schema;

        let orphans = invariant::enforce_back_references(&mut state.graph, schema);
        state
            .graph
            .check_required(schema)
            .map_err(SaveError::Validation)?;

        let metadata = file::StoreMetadata {
            signature: schema.signature().to_string(),
            version: schema.ordinal(),
            written_at: super::current_timestamp(),
            object_count: state.graph.len() as u64,
        };
        let bytes = file::encode(&metadata, &state.graph).map_err(SaveError::Write)?;
        file::write_atomic(&self.inner.path, &bytes, self.inner.sync).map_err(SaveError::Write)?;

        state.dirty = false;
        debug!(
            path = %self.inner.path.display(),
            objects = metadata.object_count,
            orphans_removed = orphans.len(),
            "Saved store"
        );
        Ok(())
    }
}
