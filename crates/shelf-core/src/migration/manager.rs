//! Migration manager - brings a store up to the newest schema before it is opened.
//!
//! State machine:
//!
//! ```text
//! Unmigrated(i) -> Stepping(i -> i+1) -> ... -> Migrated(N) -> Swapped
//!        \______________________|_______________________/
//!                               v
//!                         Failed(reason)
//! ```
//!
//! Steps run strictly one after another. Every generation is written to a
//! scratch directory beside the live store; the live file is replaced only
//! once the last step has succeeded.

use super::compat::CompatibilityResolver;
use super::config::MigrationConfig;
use super::diagnostics::{DiagnosticKind, DiagnosticsSink, TracingSink};
use super::error::MigrationError;
use super::executor::{StepExecutor, StepStats};
use super::mapping::{MappingRegistry, MappingResolver};
use super::swap::{swap, ScratchDir};
use crate::catalog::SchemaCatalog;
use crate::store::file::{self, StoreMetadata};
use crate::store::{current_timestamp, ObjectGraph, PersistentStoreHandle, StoreGeneration};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Phase of a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPhase {
    /// The store is at the given schema ordinal.
    Unmigrated(u32),
    /// Executing the step between two ordinals.
    Stepping {
        /// Source ordinal.
        from: u32,
        /// Destination ordinal.
        to: u32,
    },
    /// The newest generation exists (staged or already live).
    Migrated(u32),
    /// The live store is at the newest version.
    Swapped,
    /// The run failed; the live store is unchanged.
    Failed(String),
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Unmigrated(v) => write!(f, "unmigrated(v{v})"),
            MigrationPhase::Stepping { from, to } => write!(f, "stepping(v{from} -> v{to})"),
            MigrationPhase::Migrated(v) => write!(f, "migrated(v{v})"),
            MigrationPhase::Swapped => write!(f, "swapped"),
            MigrationPhase::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

/// What a migration run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Phases in the order they were entered.
    pub phases: Vec<MigrationPhase>,
    /// Statistics per executed step.
    pub steps: Vec<StepStats>,
    /// Schema ordinal found on disk, `None` when the store did not exist.
    pub from_version: Option<u32>,
    /// Schema ordinal of the opened store.
    pub to_version: u32,
}

impl MigrationReport {
    /// Whether a missing store was created at the newest version.
    pub fn initialized(&self) -> bool {
        self.from_version.is_none()
    }

    /// Whether the live file was left untouched.
    pub fn was_noop(&self) -> bool {
        self.from_version.is_some() && self.steps.is_empty()
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct MigrationOutcome {
    /// Handle to the migrated store.
    pub handle: PersistentStoreHandle,
    /// Run report.
    pub report: MigrationReport,
}

/// Runs the migration chain for one store file.
pub struct MigrationManager {
    catalog: Arc<SchemaCatalog>,
    registry: MappingRegistry,
    config: MigrationConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationManager")
            .field("versions", &self.catalog.len())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl MigrationManager {
    /// Create a manager reporting diagnostics through `tracing`.
    pub fn new(catalog: Arc<SchemaCatalog>, registry: MappingRegistry, config: MigrationConfig) -> Self {
        Self {
            catalog,
            registry,
            config,
            diagnostics: Arc::new(TracingSink),
        }
    }

    /// Replace the diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The catalog this manager migrates through.
    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    /// Manager configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Bring the store up to the newest schema version and open it.
    ///
    /// Fatal errors are reported to the diagnostics sink before being returned.
    #[instrument(skip(self), fields(path = %self.config.store_path.display()))]
    pub fn run(&self) -> Result<MigrationOutcome, MigrationError> {
        let mut phases = Vec::new();
        match self.run_inner(&mut phases) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                phases.push(MigrationPhase::Failed(err.to_string()));
                let history: Vec<String> = phases.iter().map(ToString::to_string).collect();
                error!(error = %err, phases = ?history, "Migration failed");
                self.diagnostics.report(err.diagnostic_kind(), &err.to_string());
                Err(err)
            }
        }
    }

    fn run_inner(&self, phases: &mut Vec<MigrationPhase>) -> Result<MigrationOutcome, MigrationError> {
        let live = self.config.store_path.as_path();
        let newest = Arc::clone(self.catalog.newest());

        if !live.exists() {
            return self.initialize(live, phases);
        }

        let metadata = file::read_metadata(live).map_err(|source| MigrationError::StoreUnreadable {
            path: live.to_path_buf(),
            source,
        })?;
        let start = CompatibilityResolver::new(&self.catalog).resolve(&metadata.signature)?;
        let from_version = self.catalog.get(start).map(|v| v.ordinal()).unwrap_or_default();
        phases.push(MigrationPhase::Unmigrated(from_version));

        if start == self.catalog.newest_index() {
            phases.push(MigrationPhase::Migrated(newest.ordinal()));
            let generation = self.load_live(live, Arc::clone(&newest))?;
            phases.push(MigrationPhase::Swapped);
            debug!(version = newest.ordinal(), "Store already current");
            return Ok(self.outcome(generation.into_graph(), phases, Vec::new(), Some(from_version)));
        }

        let schema = self
            .catalog
            .get(start)
            .cloned()
            .ok_or_else(|| MigrationError::IncompatibleSchema {
                signature: metadata.signature.clone(),
            })?;
        let mut current = self.load_live(live, schema)?;
        let scratch = ScratchDir::create(live, &self.config.scratch_prefix).map_err(|e| {
            MigrationError::StepExecutionFailure {
                from: from_version,
                to: newest.ordinal(),
                reason: format!("cannot create scratch directory: {e}"),
            }
        })?;

        let resolver = MappingResolver::new(&self.catalog, &self.registry, self.diagnostics.as_ref());
        let executor = StepExecutor::new(self.config.sync_writes);
        let mut steps = Vec::new();

        for index in start..self.catalog.newest_index() {
            let from = current.schema().ordinal();
            phases.push(MigrationPhase::Stepping { from, to: from + 1 });

            let step = resolver.resolve(index)?;
            let result = executor.apply(&step, &current, &scratch)?;

            // the live file is never discarded, only scratch generations
            if index != start {
                current.discard().map_err(|e| MigrationError::StepExecutionFailure {
                    from,
                    to: from + 1,
                    reason: format!("cannot remove consumed generation: {e}"),
                })?;
            }
            steps.push(result.stats);
            current = result.generation;
        }

        phases.push(MigrationPhase::Migrated(current.schema().ordinal()));
        swap(&current, live)?;
        phases.push(MigrationPhase::Swapped);
        drop(scratch);

        let summary = format!(
            "migrated {} from v{} to v{} in {} steps",
            live.display(),
            from_version,
            newest.ordinal(),
            steps.len()
        );
        info!(from = from_version, to = newest.ordinal(), steps = steps.len(), "Migration complete");
        self.diagnostics.report(DiagnosticKind::MigrationCompleted, &summary);

        Ok(self.outcome(current.into_graph(), phases, steps, Some(from_version)))
    }

    fn initialize(
        &self,
        live: &Path,
        phases: &mut Vec<MigrationPhase>,
    ) -> Result<MigrationOutcome, MigrationError> {
        let newest = self.catalog.newest();
        phases.push(MigrationPhase::Migrated(newest.ordinal()));

        let graph = ObjectGraph::new();
        let metadata = StoreMetadata {
            signature: newest.signature().to_string(),
            version: newest.ordinal(),
            written_at: current_timestamp(),
            object_count: 0,
        };
        let failure = |reason: String| MigrationError::SwapFailure {
            path: live.to_path_buf(),
            reason,
        };
        std::fs::create_dir_all(file::parent_dir(live)).map_err(|e| failure(e.to_string()))?;
        let bytes = file::encode(&metadata, &graph).map_err(|e| failure(e.to_string()))?;
        file::write_atomic(live, &bytes, self.config.sync_writes).map_err(|e| failure(e.to_string()))?;
        phases.push(MigrationPhase::Swapped);

        self.diagnostics.report(
            DiagnosticKind::StoreInitialized,
            &format!("created {} at v{}", live.display(), newest.ordinal()),
        );
        Ok(self.outcome(graph, phases, Vec::new(), None))
    }

    fn load_live(
        &self,
        live: &Path,
        schema: Arc<crate::catalog::SchemaVersion>,
    ) -> Result<StoreGeneration, MigrationError> {
        StoreGeneration::load(live, schema).map_err(|source| MigrationError::StoreUnreadable {
            path: live.to_path_buf(),
            source,
        })
    }

    fn outcome(
        &self,
        graph: ObjectGraph,
        phases: &mut Vec<MigrationPhase>,
        steps: Vec<StepStats>,
        from_version: Option<u32>,
    ) -> MigrationOutcome {
        let newest = Arc::clone(self.catalog.newest());
        let report = MigrationReport {
            phases: std::mem::take(phases),
            steps,
            from_version,
            to_version: newest.ordinal(),
        };
        let handle = PersistentStoreHandle::open(
            self.config.store_path.clone(),
            newest,
            graph,
            self.config.sync_writes,
        );
        MigrationOutcome { handle, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, DefaultValue, EntityDef, ScalarType, SchemaVersion};
    use crate::migration::diagnostics::MemorySink;
    use crate::store::Value;

    fn catalog() -> Arc<SchemaCatalog> {
        let title = AttributeDef::new("title", ScalarType::String);
        let v1 = SchemaVersion::new(1, "v1", vec![EntityDef::new("Book").with_attribute(title.clone())]).unwrap();
        let v2 = SchemaVersion::new(
            2,
            "v2",
            vec![EntityDef::new("Book")
                .with_attribute(title.clone())
                .with_attribute(AttributeDef::optional("notes", ScalarType::String))],
        )
        .unwrap();
        let v3 = SchemaVersion::new(
            3,
            "v3",
            vec![EntityDef::new("Book")
                .with_attribute(title)
                .with_attribute(AttributeDef::optional("notes", ScalarType::String))
                .with_attribute(
                    AttributeDef::new("sort", ScalarType::Int64).with_default(DefaultValue::Int(0)),
                )],
        )
        .unwrap();
        Arc::new(SchemaCatalog::new(vec![v1, v2, v3]).unwrap())
    }

    fn seed_v1(catalog: &SchemaCatalog, path: &Path) {
        let v1 = catalog.get(0).unwrap();
        let mut generation = StoreGeneration::new(Arc::clone(v1), ObjectGraph::new());
        generation
            .graph_mut()
            .insert(v1, "Book", [("title", Value::from("Dune"))])
            .unwrap();
        generation.write_to(path, false).unwrap();
    }

    #[test]
    fn test_full_chain_phases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.store");
        let catalog = catalog();
        seed_v1(&catalog, &path);

        let sink = Arc::new(MemorySink::new());
        let manager = MigrationManager::new(
            Arc::clone(&catalog),
            MappingRegistry::new(),
            MigrationConfig::new(&path).with_sync_writes(false),
        )
        .with_diagnostics(sink.clone());

        let outcome = manager.run().unwrap();
        assert_eq!(
            outcome.report.phases,
            vec![
                MigrationPhase::Unmigrated(1),
                MigrationPhase::Stepping { from: 1, to: 2 },
                MigrationPhase::Stepping { from: 2, to: 3 },
                MigrationPhase::Migrated(3),
                MigrationPhase::Swapped,
            ]
        );
        assert_eq!(outcome.report.steps.len(), 2);
        assert_eq!(sink.count(DiagnosticKind::InferredMapping), 2);
        assert_eq!(sink.count(DiagnosticKind::MigrationCompleted), 1);

        let book = outcome.handle.get(crate::store::ObjectId(1)).unwrap();
        assert_eq!(book.attribute("sort"), &Value::Int64(0));
        assert_eq!(
            file::read_metadata(&path).unwrap().signature,
            catalog.newest().signature()
        );
        // only the live store remains
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_store_is_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("books.store");
        let manager = MigrationManager::new(
            catalog(),
            MappingRegistry::new(),
            MigrationConfig::new(&path).with_sync_writes(false),
        );

        let outcome = manager.run().unwrap();
        assert!(outcome.report.initialized());
        assert_eq!(
            outcome.report.phases,
            vec![MigrationPhase::Migrated(3), MigrationPhase::Swapped]
        );
        assert!(outcome.handle.is_empty());
        assert_eq!(file::read_metadata(&path).unwrap().version, 3);
    }

    #[test]
    fn test_incompatible_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.store");
        let foreign = SchemaVersion::new(
            1,
            "foreign",
            vec![EntityDef::new("Shelf").with_attribute(AttributeDef::new("name", ScalarType::String))],
        )
        .unwrap();
        StoreGeneration::new(Arc::new(foreign), ObjectGraph::new())
            .write_to(&path, false)
            .unwrap();

        let sink = Arc::new(MemorySink::new());
        let manager = MigrationManager::new(catalog(), MappingRegistry::new(), MigrationConfig::new(&path))
            .with_diagnostics(sink.clone());

        assert!(matches!(
            manager.run(),
            Err(MigrationError::IncompatibleSchema { .. })
        ));
        assert_eq!(sink.count(DiagnosticKind::IncompatibleSchema), 1);
    }

    #[test]
    fn test_corrupt_store_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.store");
        std::fs::write(&path, b"not a store").unwrap();

        let manager = MigrationManager::new(catalog(), MappingRegistry::new(), MigrationConfig::new(&path));
        assert!(matches!(
            manager.run(),
            Err(MigrationError::StoreUnreadable { .. })
        ));
        assert_eq!(std::fs::read(&path).unwrap(), b"not a store");
    }
}
