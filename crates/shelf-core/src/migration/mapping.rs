//! Mapping resolution for one migration step.
//!
//! A [`MappingStep`] says how every destination attribute and owning
//! relationship of a step `v(i) -> v(i+1)` is produced. Hand-authored mappings
//! are registered per source ordinal in a [`MappingRegistry`]; any pair without
//! one is inferred from the [`SchemaDiff`]:
//!
//! | Destination attribute | Rule |
//! |-----------------------|------|
//! | same name, same type | copy |
//! | optional -> required, with default | copy (nulls take the default) |
//! | new, with default | default |
//! | new, optional | null |
//! | anything else | `UninferredAttribute` |
//!
//! Owning relationships with the same name and target are copied; new to-many
//! and optional to-one relationships start empty; a new required to-one
//! relationship cannot be inferred.

use super::diagnostics::{DiagnosticKind, DiagnosticsSink};
use super::diff::{AttributeChange, SchemaDiff};
use super::error::MigrationError;
use super::transform::EntityTransformer;
use crate::catalog::{Cardinality, EntityDef, SchemaCatalog, SchemaVersion};
use crate::store::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How a destination attribute is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeRule {
    /// Copy the named source attribute.
    Copy {
        /// Source attribute name.
        source: String,
    },
    /// Set a fixed value (null for new optional attributes).
    Default(Value),
    /// Populated by the named transformer.
    Transform(String),
}

/// How a destination owning relationship is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipRule {
    /// Copy the named source relationship, translating ids.
    Copy {
        /// Source relationship name.
        source: String,
    },
    /// Populated by the named transformer.
    Transform(String),
}

/// Where a mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// Registered by hand.
    Explicit,
    /// Inferred from the schema diff.
    Inferred,
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKind::Explicit => write!(f, "explicit"),
            MappingKind::Inferred => write!(f, "inferred"),
        }
    }
}

/// Rules for one entity present in both schemas.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    /// Entity name (same in source and destination).
    pub entity: String,
    /// Rule per destination attribute.
    pub attributes: BTreeMap<String, AttributeRule>,
    /// Rule per destination owning relationship. Relationships without a rule start empty.
    pub relationships: BTreeMap<String, RelationshipRule>,
    /// Transformers run once per source object, in order.
    pub transforms: Vec<Arc<dyn EntityTransformer>>,
}

impl EntityMapping {
    fn transformer(&self, name: &str) -> Option<&Arc<dyn EntityTransformer>> {
        self.transforms.iter().find(|t| t.name() == name)
    }
}

/// Complete mapping between two adjacent schema versions.
#[derive(Debug, Clone)]
pub struct MappingStep {
    from: Arc<SchemaVersion>,
    to: Arc<SchemaVersion>,
    kind: MappingKind,
    entities: Vec<EntityMapping>,
}

impl MappingStep {
    /// Start an explicit mapping between `from` and `to`.
    pub fn builder(from: Arc<SchemaVersion>, to: Arc<SchemaVersion>) -> MappingBuilder {
        MappingBuilder::new(from, to)
    }

    /// Infer a mapping from the schema diff alone.
    pub fn infer(from: Arc<SchemaVersion>, to: Arc<SchemaVersion>) -> Result<Self, MigrationError> {
        MappingBuilder::new(from, to).finish(MappingKind::Inferred)
    }

    /// Source schema.
    pub fn from(&self) -> &Arc<SchemaVersion> {
        &self.from
    }

    /// Destination schema.
    pub fn to(&self) -> &Arc<SchemaVersion> {
        &self.to
    }

    /// Whether the mapping was registered or inferred.
    pub fn kind(&self) -> MappingKind {
        self.kind
    }

    /// Per-entity rules, in entity name order.
    pub fn entities(&self) -> &[EntityMapping] {
        &self.entities
    }

    /// Rules for one entity.
    pub fn entity(&self, name: &str) -> Option<&EntityMapping> {
        self.entities.iter().find(|e| e.entity == name)
    }

    /// Names of every transformer in this step, as `name@version`.
    pub fn transform_names(&self) -> Vec<String> {
        self.entities
            .iter()
            .flat_map(|e| &e.transforms)
            .map(|t| format!("{}@{}", t.name(), t.version()))
            .collect()
    }

    /// Check the rules against both schemas.
    ///
    /// Every destination attribute of a mapped entity needs a rule that can
    /// produce a valid value, and so does every required to-one owning
    /// relationship.
    pub fn validate(&self) -> Result<(), MigrationError> {
        for mapping in &self.entities {
            let source = self
                .from
                .get_entity(&mapping.entity)
                .ok_or_else(|| self.invalid(format!("{} is not a source entity", mapping.entity)))?;
            let dest = self.to.get_entity(&mapping.entity).ok_or_else(|| {
                self.invalid(format!("{} is not a destination entity", mapping.entity))
            })?;

            for transformer in &mapping.transforms {
                for produced in transformer.produces() {
                    if dest.get_attribute(produced).is_none()
                        && dest.get_relationship(produced).is_none()
                    {
                        return Err(self.invalid(format!(
                            "transformer {} produces unknown {}.{}",
                            transformer.name(),
                            dest.name,
                            produced
                        )));
                    }
                }
            }

            self.validate_attributes(mapping, source, dest)?;
            self.validate_relationships(mapping, source, dest)?;
        }
        Ok(())
    }

    fn validate_attributes(
        &self,
        mapping: &EntityMapping,
        source: &EntityDef,
        dest: &EntityDef,
    ) -> Result<(), MigrationError> {
        for name in mapping.attributes.keys() {
            if dest.get_attribute(name).is_none() {
                return Err(self.invalid(format!("rule for unknown {}.{}", dest.name, name)));
            }
        }

        for attribute in &dest.attributes {
            let Some(rule) = mapping.attributes.get(&attribute.name) else {
                return Err(self.uninferred(&dest.name, &attribute.name));
            };
            match rule {
                AttributeRule::Copy { source: from } => {
                    let from_def = source.get_attribute(from).ok_or_else(|| {
                        self.invalid(format!("copy from unknown {}.{}", source.name, from))
                    })?;
                    if from_def.scalar != attribute.scalar {
                        return Err(self.uninferred(&dest.name, &attribute.name));
                    }
                    if from_def.optional && !attribute.optional && !attribute.has_default() {
                        return Err(self.uninferred(&dest.name, &attribute.name));
                    }
                }
                AttributeRule::Default(value) => {
                    if value.is_null() && !attribute.optional {
                        return Err(self.uninferred(&dest.name, &attribute.name));
                    }
                    if !attribute.accepts(value) {
                        return Err(self.invalid(format!(
                            "default for {}.{} is not a {}",
                            dest.name, attribute.name, attribute.scalar
                        )));
                    }
                }
                AttributeRule::Transform(name) => self.check_transform(mapping, name, &attribute.name)?,
            }
        }
        Ok(())
    }

    fn validate_relationships(
        &self,
        mapping: &EntityMapping,
        source: &EntityDef,
        dest: &EntityDef,
    ) -> Result<(), MigrationError> {
        for (name, rule) in &mapping.relationships {
            let rel = dest
                .get_relationship(name)
                .filter(|r| r.owning)
                .ok_or_else(|| self.invalid(format!("rule for non-owning {}.{}", dest.name, name)))?;
            match rule {
                RelationshipRule::Copy { source: from } => {
                    let from_rel = source
                        .get_relationship(from)
                        .filter(|r| r.owning && r.target == rel.target)
                        .ok_or_else(|| {
                            self.invalid(format!("cannot copy {}.{} into {}", source.name, from, name))
                        })?;
                    if rel.cardinality == Cardinality::ToOne && from_rel.cardinality.is_to_many() {
                        return Err(self.uninferred(&dest.name, name));
                    }
                }
                RelationshipRule::Transform(transformer) => {
                    self.check_transform(mapping, transformer, name)?
                }
            }
        }

        for rel in dest.owning_relationships() {
            if rel.cardinality == Cardinality::ToOne
                && !rel.optional
                && !mapping.relationships.contains_key(&rel.name)
            {
                return Err(self.uninferred(&dest.name, &rel.name));
            }
        }
        Ok(())
    }

    fn check_transform(
        &self,
        mapping: &EntityMapping,
        transformer: &str,
        produced: &str,
    ) -> Result<(), MigrationError> {
        match mapping.transformer(transformer) {
            Some(t) if t.produces().contains(&produced) => Ok(()),
            _ => Err(self.invalid(format!(
                "{}.{} expects transformer {} to produce it",
                mapping.entity, produced, transformer
            ))),
        }
    }

    fn uninferred(&self, entity: &str, attribute: &str) -> MigrationError {
        MigrationError::UninferredAttribute {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            from: self.from.ordinal(),
            to: self.to.ordinal(),
        }
    }

    fn invalid(&self, reason: String) -> MigrationError {
        MigrationError::StepExecutionFailure {
            from: self.from.ordinal(),
            to: self.to.ordinal(),
            reason: format!("invalid mapping: {reason}"),
        }
    }
}

/// Builds a mapping: explicit parts first, the remainder inferred.
pub struct MappingBuilder {
    from: Arc<SchemaVersion>,
    to: Arc<SchemaVersion>,
    transforms: BTreeMap<String, Vec<Arc<dyn EntityTransformer>>>,
    renames: BTreeMap<(String, String), String>,
}

impl MappingBuilder {
    fn new(from: Arc<SchemaVersion>, to: Arc<SchemaVersion>) -> Self {
        Self {
            from,
            to,
            transforms: BTreeMap::new(),
            renames: BTreeMap::new(),
        }
    }

    /// Run `transformer` for every source object of `entity`.
    ///
    /// The attributes and relationships it produces are excluded from inference.
    pub fn transform(mut self, entity: impl Into<String>, transformer: Arc<dyn EntityTransformer>) -> Self {
        self.transforms.entry(entity.into()).or_default().push(transformer);
        self
    }

    /// Copy source attribute `source` into destination attribute `dest`.
    pub fn rename_attribute(
        mut self,
        entity: impl Into<String>,
        dest: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.renames.insert((entity.into(), dest.into()), source.into());
        self
    }

    /// Finish an explicit mapping.
    pub fn build(self) -> Result<MappingStep, MigrationError> {
        self.finish(MappingKind::Explicit)
    }

    fn finish(mut self, kind: MappingKind) -> Result<MappingStep, MigrationError> {
        let diff = SchemaDiff::compute(&self.from, &self.to);
        let mut step = MappingStep {
            from: Arc::clone(&self.from),
            to: Arc::clone(&self.to),
            kind,
            entities: Vec::new(),
        };

        for dest in self.to.entities() {
            let Some(source) = self.from.get_entity(&dest.name) else {
                continue;
            };
            let transforms = self.transforms.remove(&dest.name).unwrap_or_default();
            let changes = diff
                .entity(&dest.name)
                .map(|c| c.attribute_changes())
                .unwrap_or_default();

            let mut mapping = EntityMapping {
                entity: dest.name.clone(),
                attributes: BTreeMap::new(),
                relationships: BTreeMap::new(),
                transforms,
            };

            for attribute in &dest.attributes {
                let rule = if let Some(t) = claimed_by(&mapping.transforms, &attribute.name) {
                    AttributeRule::Transform(t.to_string())
                } else if let Some(from) = self.renames.get(&(dest.name.clone(), attribute.name.clone())) {
                    AttributeRule::Copy {
                        source: from.clone(),
                    }
                } else if source.get_attribute(&attribute.name).is_some() {
                    if !copyable(changes, &attribute.name) {
                        return Err(step.uninferred(&dest.name, &attribute.name));
                    }
                    AttributeRule::Copy {
                        source: attribute.name.clone(),
                    }
                } else if let Some(default) = attribute.default_value() {
                    AttributeRule::Default(default)
                } else if attribute.optional {
                    AttributeRule::Default(Value::Null)
                } else {
                    return Err(step.uninferred(&dest.name, &attribute.name));
                };
                mapping.attributes.insert(attribute.name.clone(), rule);
            }

            for rel in dest.owning_relationships() {
                if let Some(t) = claimed_by(&mapping.transforms, &rel.name) {
                    mapping
                        .relationships
                        .insert(rel.name.clone(), RelationshipRule::Transform(t.to_string()));
                } else if source
                    .get_relationship(&rel.name)
                    .is_some_and(|r| r.owning && r.target == rel.target)
                {
                    mapping.relationships.insert(
                        rel.name.clone(),
                        RelationshipRule::Copy {
                            source: rel.name.clone(),
                        },
                    );
                }
            }

            step.entities.push(mapping);
        }

        if let Some(entity) = self.transforms.keys().next() {
            return Err(step.invalid(format!("transformer registered on unmapped entity {entity}")));
        }

        debug!(
            from = step.from.ordinal(),
            to = step.to.ordinal(),
            kind = %kind,
            changes = diff.change_count(),
            "Built mapping"
        );
        Ok(step)
    }
}

fn claimed_by<'a>(transforms: &'a [Arc<dyn EntityTransformer>], name: &str) -> Option<&'a str> {
    transforms
        .iter()
        .find(|t| t.produces().contains(&name))
        .map(|t| t.name())
}

fn copyable(changes: &[AttributeChange], attribute: &str) -> bool {
    changes
        .iter()
        .filter(|c| c.attribute_name() == attribute)
        .all(|c| match c {
            AttributeChange::TypeChanged { .. } => false,
            AttributeChange::OptionalityChanged {
                to_optional,
                has_default,
                ..
            } => *to_optional || *has_default,
            _ => true,
        })
}

/// Factory producing a hand-authored mapping for one source version.
pub type MappingFactory = Box<
    dyn Fn(&Arc<SchemaVersion>, &Arc<SchemaVersion>) -> Result<MappingStep, MigrationError>
        + Send
        + Sync,
>;

/// Hand-authored mappings keyed by source ordinal.
#[derive(Default)]
pub struct MappingRegistry {
    explicit: BTreeMap<u32, MappingFactory>,
}

impl fmt::Debug for MappingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRegistry")
            .field("source_ordinals", &self.explicit.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MappingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the mapping for the step starting at `from_ordinal`, replacing any previous one.
    pub fn register<F>(&mut self, from_ordinal: u32, factory: F)
    where
        F: Fn(&Arc<SchemaVersion>, &Arc<SchemaVersion>) -> Result<MappingStep, MigrationError>
            + Send
            + Sync
            + 'static,
    {
        self.explicit.insert(from_ordinal, Box::new(factory));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, from_ordinal: u32, factory: F) -> Self
    where
        F: Fn(&Arc<SchemaVersion>, &Arc<SchemaVersion>) -> Result<MappingStep, MigrationError>
            + Send
            + Sync
            + 'static,
    {
        self.register(from_ordinal, factory);
        self
    }

    /// Check whether a mapping is registered for `from_ordinal`.
    pub fn contains(&self, from_ordinal: u32) -> bool {
        self.explicit.contains_key(&from_ordinal)
    }

    fn get(&self, from_ordinal: u32) -> Option<&MappingFactory> {
        self.explicit.get(&from_ordinal)
    }
}

/// Resolves the mapping for each step of a catalog.
pub struct MappingResolver<'a> {
    catalog: &'a SchemaCatalog,
    registry: &'a MappingRegistry,
    diagnostics: &'a dyn DiagnosticsSink,
}

impl<'a> MappingResolver<'a> {
    /// Create a resolver.
    pub fn new(
        catalog: &'a SchemaCatalog,
        registry: &'a MappingRegistry,
        diagnostics: &'a dyn DiagnosticsSink,
    ) -> Self {
        Self {
            catalog,
            registry,
            diagnostics,
        }
    }

    /// Mapping for the step from catalog index `source_index` to the next one.
    ///
    /// Registered mappings win; otherwise the mapping is inferred and an
    /// `InferredMapping` diagnostic is reported. The result is validated either way.
    pub fn resolve(&self, source_index: usize) -> Result<MappingStep, MigrationError> {
        let (from, to) = match (self.catalog.get(source_index), self.catalog.get(source_index + 1)) {
            (Some(from), Some(to)) => (Arc::clone(from), Arc::clone(to)),
            (Some(from), None) => {
                return Err(MigrationError::StepExecutionFailure {
                    from: from.ordinal(),
                    to: from.ordinal() + 1,
                    reason: "no newer schema version".to_string(),
                })
            }
            _ => {
                return Err(MigrationError::StepExecutionFailure {
                    from: source_index as u32 + 1,
                    to: source_index as u32 + 2,
                    reason: "source version not in catalog".to_string(),
                })
            }
        };

        let step = match self.registry.get(from.ordinal()) {
            Some(factory) => {
                let step = factory(&from, &to)?;
                if step.from.signature() != from.signature() || step.to.signature() != to.signature() {
                    return Err(step.invalid(format!(
                        "registered for v{} but built for v{} -> v{}",
                        from.ordinal(),
                        step.from.ordinal(),
                        step.to.ordinal()
                    )));
                }
                step
            }
            None => {
                let step = MappingStep::infer(Arc::clone(&from), Arc::clone(&to))?;
                let diff = SchemaDiff::compute(&from, &to);
                self.diagnostics.report(DiagnosticKind::InferredMapping, &diff.to_string());
                step
            }
        };

        step.validate()?;
        Ok(step)
    }
}
