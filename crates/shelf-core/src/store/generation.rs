//! Store generations - one materialized store per schema version during migration.

use super::file::{self, StoreMetadata};
use super::graph::ObjectGraph;
use crate::catalog::SchemaVersion;
use crate::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A store instance at one schema version.
///
/// Generations produced by a migration step live in the manager's scratch
/// directory and are deleted once the next step (or the final swap) has
/// consumed them.
#[derive(Debug)]
pub struct StoreGeneration {
    schema: Arc<SchemaVersion>,
    graph: ObjectGraph,
    path: Option<PathBuf>,
}

impl StoreGeneration {
    /// Wrap an in-memory graph conforming to `schema`.
    pub fn new(schema: Arc<SchemaVersion>, graph: ObjectGraph) -> Self {
        Self {
            schema,
            graph,
            path: None,
        }
    }

    /// Load the store at `path`, whose header must match `schema`.
    pub fn load(path: &Path, schema: Arc<SchemaVersion>) -> Result<Self, Error> {
        let (metadata, graph) = file::read_store(path)?;
        if metadata.signature != schema.signature() {
            return Err(Error::InvalidData(format!(
                "store signature {} does not match schema version {}",
                metadata.signature,
                schema.ordinal()
            )));
        }
        Ok(Self {
            schema,
            graph,
            path: Some(path.to_path_buf()),
        })
    }

    /// Schema version this generation conforms to.
    pub fn schema(&self) -> &Arc<SchemaVersion> {
        &self.schema
    }

    /// The object graph.
    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    /// Mutable access to the object graph.
    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        &mut self.graph
    }

    /// Take the graph out of this generation.
    pub fn into_graph(self) -> ObjectGraph {
        self.graph
    }

    /// File this generation was loaded from or written to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Header describing the current contents.
    pub fn metadata(&self) -> StoreMetadata {
        StoreMetadata {
            signature: self.schema.signature().to_string(),
            version: self.schema.ordinal(),
            written_at: crate::store::current_timestamp(),
            object_count: self.graph.len() as u64,
        }
    }

    /// Encode this generation into store file bytes.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        file::encode(&self.metadata(), &self.graph)
    }

    /// Durably write this generation to a new file at `path`.
    pub fn write_to(&mut self, path: &Path, sync: bool) -> Result<(), Error> {
        file::write_file(path, &self.encode()?, sync)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Delete the backing file, if any. Used once a scratch generation is consumed.
    pub fn discard(mut self) -> Result<(), Error> {
        if let Some(path) = self.path.take() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, EntityDef, ScalarType};
    use crate::store::Value;

    fn schema() -> Arc<SchemaVersion> {
        let book =
            EntityDef::new("Book").with_attribute(AttributeDef::new("title", ScalarType::String));
        Arc::new(SchemaVersion::new(1, "test", vec![book]).unwrap())
    }

    #[test]
    fn test_write_load_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen-1.store");
        let schema = schema();

        let mut graph = ObjectGraph::new();
        graph.insert(&schema, "Book", [("title", Value::from("Dune"))]).unwrap();
        let mut generation = StoreGeneration::new(Arc::clone(&schema), graph);
        generation.write_to(&path, true).unwrap();

        let loaded = StoreGeneration::load(&path, Arc::clone(&schema)).unwrap();
        assert_eq!(loaded.graph(), generation.graph());
        assert_eq!(loaded.metadata().object_count, 1);

        loaded.discard().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_load_rejects_other_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.store");
        let mut generation = StoreGeneration::new(schema(), ObjectGraph::new());
        generation.write_to(&path, false).unwrap();

        let other = Arc::new(
            SchemaVersion::new(
                2,
                "other",
                vec![EntityDef::new("Book")
                    .with_attribute(AttributeDef::optional("title", ScalarType::String))],
            )
            .unwrap(),
        );
        assert!(matches!(
            StoreGeneration::load(&path, other),
            Err(Error::InvalidData(_))
        ));
    }
}
