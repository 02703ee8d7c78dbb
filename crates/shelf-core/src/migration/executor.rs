//! Migration step executor - produces the generation for one version step.
//!
//! Phases, in order:
//! 1. copy every object of a mapped entity, keeping its id, applying copy and default rules
//! 2. link copied owning relationships through the preserved ids
//! 3. run transformers
//! 4. rebuild inverse relationships from the owning sides
//! 5. back-reference pass
//! 6. required-attribute check
//! 7. durable write into the scratch directory

use super::error::MigrationError;
use super::invariant;
use super::mapping::{AttributeRule, MappingKind, MappingStep, RelationshipRule};
use super::swap::ScratchDir;
use super::transform::GraphBuilder;
use crate::store::{ObjectGraph, StoreGeneration, StoredObject, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Statistics for one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepStats {
    /// Source schema ordinal.
    pub from: u32,
    /// Destination schema ordinal.
    pub to: u32,
    /// Whether the mapping was explicit or inferred.
    pub kind: MappingKind,
    /// Objects carried by entity mappings.
    pub objects_copied: usize,
    /// Objects created by transformers.
    pub objects_created: usize,
    /// Objects carried over by transformers.
    pub objects_carried: usize,
    /// Transformer invocations.
    pub transforms_applied: usize,
    /// Objects deleted by the back-reference pass.
    pub orphans_removed: usize,
    /// Objects in the written generation.
    pub objects_written: usize,
}

/// A written generation and the statistics of the step that produced it.
#[derive(Debug)]
pub struct StepResult {
    /// The new generation, durably written to scratch.
    pub generation: StoreGeneration,
    /// Step statistics.
    pub stats: StepStats,
}

/// Executes migration steps.
#[derive(Debug, Clone, Copy)]
pub struct StepExecutor {
    sync_writes: bool,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StepExecutor {
    /// Create an executor. `sync_writes` forces generations to disk.
    pub fn new(sync_writes: bool) -> Self {
        Self { sync_writes }
    }

    /// Run one step and write its generation into `scratch`.
    pub fn apply(
        &self,
        step: &MappingStep,
        source: &StoreGeneration,
        scratch: &ScratchDir,
    ) -> Result<StepResult, MigrationError> {
        if source.schema().signature() != step.from().signature() {
            return Err(failure(
                step,
                format!(
                    "source generation is at v{}, step expects v{}",
                    source.schema().ordinal(),
                    step.from().ordinal()
                ),
            ));
        }

        let (graph, stats) = self.migrate_graph(step, source.graph())?;
        let mut generation = StoreGeneration::new(Arc::clone(step.to()), graph);
        let path = scratch.generation_path(step.to().ordinal());
        generation
            .write_to(&path, self.sync_writes)
            .map_err(|e| failure(step, format!("writing {}: {e}", path.display())))?;

        info!(
            from = stats.from,
            to = stats.to,
            kind = %stats.kind,
            objects = stats.objects_written,
            orphans_removed = stats.orphans_removed,
            "Migration step complete"
        );
        Ok(StepResult { generation, stats })
    }

    /// Run one step in memory.
    pub fn migrate_graph(
        &self,
        step: &MappingStep,
        source: &ObjectGraph,
    ) -> Result<(ObjectGraph, StepStats), MigrationError> {
        let to = step.to();
        let mut dest = ObjectGraph::new();
        // fresh ids handed out by transformers never collide with carried ids
        dest.reserve_through(source.next_id());

        let mut stats = StepStats {
            from: step.from().ordinal(),
            to: to.ordinal(),
            kind: step.kind(),
            objects_copied: 0,
            objects_created: 0,
            objects_carried: 0,
            transforms_applied: 0,
            orphans_removed: 0,
            objects_written: 0,
        };

        for mapping in step.entities() {
            let def = to.get_entity(&mapping.entity);
            for object in source.objects_of(&mapping.entity) {
                let mut copy = StoredObject::new(object.id, mapping.entity.clone());
                for (name, rule) in &mapping.attributes {
                    let value = match rule {
                        AttributeRule::Copy { source: from } => {
                            let value = object.attribute(from);
                            match def.and_then(|d| d.get_attribute(name)) {
                                Some(attr) if value.is_null() => attr.default_value().unwrap_or(Value::Null),
                                _ => value.clone(),
                            }
                        }
                        AttributeRule::Default(value) => value.clone(),
                        AttributeRule::Transform(_) => continue,
                    };
                    copy.set_attribute(name.clone(), value);
                }
                dest.insert_object(copy);
                stats.objects_copied += 1;
            }
        }

        for mapping in step.entities() {
            for (name, rule) in &mapping.relationships {
                let RelationshipRule::Copy { source: from } = rule else {
                    continue;
                };
                for object in source.objects_of(&mapping.entity) {
                    let targets: Vec<_> = object
                        .related(from)
                        .iter()
                        .copied()
                        .filter(|t| dest.contains(*t))
                        .collect();
                    if let Some(copy) = dest.get_mut(object.id) {
                        for target in targets {
                            copy.push_related(name.clone(), target);
                        }
                    }
                }
            }
        }

        let mut builder = GraphBuilder::new(source, &mut dest, to);
        for mapping in step.entities().iter().filter(|m| !m.transforms.is_empty()) {
            for object in source.objects_of(&mapping.entity) {
                for transformer in &mapping.transforms {
                    transformer.apply(object, object.id, &mut builder).map_err(|e| {
                        failure(
                            step,
                            format!(
                                "transformer {}@{} on {} {}: {e}",
                                transformer.name(),
                                transformer.version(),
                                mapping.entity,
                                object.id
                            ),
                        )
                    })?;
                    stats.transforms_applied += 1;
                }
            }
        }
        (stats.objects_created, stats.objects_carried) = builder.counts();

        dest.rebuild_inverses(to);
        stats.orphans_removed = invariant::enforce_back_references(&mut dest, to).len();
        dest.check_required(to).map_err(|e| failure(step, e.to_string()))?;
        stats.objects_written = dest.len();

        debug!(
            from = stats.from,
            to = stats.to,
            copied = stats.objects_copied,
            created = stats.objects_created,
            carried = stats.objects_carried,
            "Migrated object graph"
        );
        Ok((dest, stats))
    }
}

fn failure(step: &MappingStep, reason: String) -> MigrationError {
    MigrationError::StepExecutionFailure {
        from: step.from().ordinal(),
        to: step.to().ordinal(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        AttributeDef, Cardinality, DefaultValue, EntityDef, RelationshipDef, ScalarType, SchemaVersion,
    };
    use crate::migration::transform::{EntityTransformer, TransformError};
    use crate::store::ObjectId;

    fn entities(subject_lifecycle: bool, extra: Vec<AttributeDef>) -> (EntityDef, EntityDef) {
        let book = EntityDef::new("Book")
            .with_attribute(AttributeDef::new("title", ScalarType::String))
            .with_attributes(extra)
            .with_relationship(RelationshipDef::owning(
                "subjects",
                "Subject",
                Cardinality::UnorderedToMany,
                "books",
            ));
        let mut subject = EntityDef::new("Subject")
            .with_attribute(AttributeDef::new("name", ScalarType::String))
            .with_relationship(RelationshipDef::inverse_of(
                "books",
                "Book",
                Cardinality::UnorderedToMany,
                "subjects",
            ));
        if subject_lifecycle {
            subject = subject.deleted_when_orphaned();
        }
        (book, subject)
    }

    fn schemas() -> (Arc<SchemaVersion>, Arc<SchemaVersion>) {
        let (book, subject) = entities(false, vec![AttributeDef::optional("rating", ScalarType::Int32)]);
        let v1 = SchemaVersion::new(1, "v1", vec![book, subject]).unwrap();
        let (book, subject) = entities(
            true,
            vec![
                AttributeDef::new("rating", ScalarType::Int32).with_default(DefaultValue::Int(3)),
                AttributeDef::optional("notes", ScalarType::String),
            ],
        );
        let v2 = SchemaVersion::new(2, "v2", vec![book, subject]).unwrap();
        (Arc::new(v1), Arc::new(v2))
    }

    fn source(schema: &SchemaVersion) -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        let rated = graph
            .insert(schema, "Book", [("title", Value::from("Rated")), ("rating", Value::Int32(5))])
            .unwrap();
        let unrated = graph.insert(schema, "Book", [("title", Value::from("Unrated"))]).unwrap();
        let fiction = graph.insert(schema, "Subject", [("name", Value::from("Fiction"))]).unwrap();
        graph.insert(schema, "Subject", [("name", Value::from("Unused"))]).unwrap();
        graph.link(schema, rated, "subjects", fiction).unwrap();
        graph.link(schema, unrated, "subjects", fiction).unwrap();
        graph
    }

    #[test]
    fn test_migrate_graph_preserves_ids_and_fills_defaults() {
        let (v1, v2) = schemas();
        let step = MappingStep::infer(Arc::clone(&v1), Arc::clone(&v2)).unwrap();
        let source = source(&v1);

        let (dest, stats) = StepExecutor::new(false).migrate_graph(&step, &source).unwrap();

        let rated = dest.get(ObjectId(1)).unwrap();
        assert_eq!(rated.attribute("title").as_str(), Some("Rated"));
        assert_eq!(rated.attribute("rating"), &Value::Int32(5));
        assert!(rated.attribute("notes").is_null());
        assert_eq!(dest.get(ObjectId(2)).unwrap().attribute("rating"), &Value::Int32(3));

        let fiction = dest.get(ObjectId(3)).unwrap();
        assert_eq!(fiction.related("books"), &[ObjectId(1), ObjectId(2)]);

        // the unused subject becomes an orphan once the lifecycle rule applies
        assert!(!dest.contains(ObjectId(4)));
        assert_eq!(stats.objects_copied, 4);
        assert_eq!(stats.orphans_removed, 1);
        assert_eq!(stats.objects_written, 3);
        assert_eq!(stats.kind, MappingKind::Inferred);
    }

    struct Broken;

    impl EntityTransformer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn version(&self) -> u32 {
            1
        }

        fn produces(&self) -> &[&str] {
            &["notes"]
        }

        fn apply(
            &self,
            _source: &StoredObject,
            _dest: ObjectId,
            _builder: &mut GraphBuilder<'_>,
        ) -> Result<(), TransformError> {
            Err(TransformError::Failed("boom".into()))
        }
    }

    #[test]
    fn test_transform_failure_is_step_failure() {
        let (v1, v2) = schemas();
        let step = MappingStep::builder(Arc::clone(&v1), Arc::clone(&v2))
            .transform("Book", Arc::new(Broken))
            .build()
            .unwrap();

        let err = StepExecutor::new(false)
            .migrate_graph(&step, &source(&v1))
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::StepExecutionFailure { from: 1, to: 2, ref reason } if reason.contains("broken@1")
        ));
    }

    #[test]
    fn test_apply_writes_generation_to_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("books.store");
        let scratch = ScratchDir::create(&live, ".shelf-migrate-").unwrap();

        let (v1, v2) = schemas();
        let step = MappingStep::infer(Arc::clone(&v1), Arc::clone(&v2)).unwrap();
        let source = StoreGeneration::new(Arc::clone(&v1), source(&v1));

        let result = StepExecutor::new(true).apply(&step, &source, &scratch).unwrap();
        assert_eq!(result.generation.path(), Some(scratch.generation_path(2).as_path()));

        let reloaded = StoreGeneration::load(&scratch.generation_path(2), v2).unwrap();
        assert_eq!(reloaded.graph(), result.generation.graph());
    }

    #[test]
    fn test_apply_rejects_wrong_source_version() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(&dir.path().join("books.store"), ".x-").unwrap();
        let (v1, v2) = schemas();
        let step = MappingStep::infer(Arc::clone(&v1), Arc::clone(&v2)).unwrap();
        let wrong = StoreGeneration::new(v2, ObjectGraph::new());

        assert!(matches!(
            StepExecutor::default().apply(&step, &wrong, &scratch),
            Err(MigrationError::StepExecutionFailure { .. })
        ));
    }
}
