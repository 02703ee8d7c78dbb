//! The book store data model.
//!
//! Seven schema versions ship with the binary. Every step is inferred except
//! v5 -> v6, which replaces the free-text `Book.authorList` with `Author`
//! objects and makes `Book.subjects` ordered.

mod transformers;

pub use transformers::{AuthorMaterializer, SubjectCarryover};

use crate::catalog::{load_catalog, SchemaCatalog, SchemaResource};
use crate::migration::{
    DiagnosticsSink, MappingRegistry, MappingStep, MigrationConfig, MigrationError, MigrationManager,
    MigrationOutcome, TracingSink,
};
use std::sync::Arc;
use tracing::error;

/// Schema resources, oldest first.
pub const SCHEMA_RESOURCES: &[SchemaResource] = &[
    SchemaResource {
        tag: "books_v1",
        source: include_str!("../../schemas/books_v1.json"),
    },
    SchemaResource {
        tag: "books_v2",
        source: include_str!("../../schemas/books_v2.json"),
    },
    SchemaResource {
        tag: "books_v3",
        source: include_str!("../../schemas/books_v3.json"),
    },
    SchemaResource {
        tag: "books_v4",
        source: include_str!("../../schemas/books_v4.json"),
    },
    SchemaResource {
        tag: "books_v5",
        source: include_str!("../../schemas/books_v5.json"),
    },
    SchemaResource {
        tag: "books_v6",
        source: include_str!("../../schemas/books_v6.json"),
    },
    SchemaResource {
        tag: "books_v7",
        source: include_str!("../../schemas/books_v7.json"),
    },
];

/// Source ordinal of the step that materializes authors.
pub const AUTHOR_STEP: u32 = 5;

/// Load and validate the bundled catalog.
pub fn bundled_catalog() -> Result<SchemaCatalog, MigrationError> {
    load_reported(SCHEMA_RESOURCES, &TracingSink)
}

/// Load and validate a catalog, reporting a rejected one to `diagnostics`.
pub fn load_reported(
    resources: &[SchemaResource],
    diagnostics: &dyn DiagnosticsSink,
) -> Result<SchemaCatalog, MigrationError> {
    load_catalog(resources).map_err(|e| {
        let err = MigrationError::from(e);
        error!(error = %err, "Schema catalog rejected");
        diagnostics.report(err.diagnostic_kind(), &err.to_string());
        err
    })
}

/// Hand-authored mappings for the bundled catalog.
pub fn bundled_mappings() -> MappingRegistry {
    MappingRegistry::new().with(AUTHOR_STEP, |from, to| {
        MappingStep::builder(Arc::clone(from), Arc::clone(to))
            .transform("Book", Arc::new(AuthorMaterializer))
            .transform("Book", Arc::new(SubjectCarryover))
            .build()
    })
}

/// Migration manager over the bundled catalog and mappings.
pub fn manager(config: MigrationConfig) -> Result<MigrationManager, MigrationError> {
    manager_with(config, Arc::new(TracingSink))
}

/// Like [`manager`], with every diagnostic (catalog errors included) sent to `diagnostics`.
pub fn manager_with(
    config: MigrationConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,
) -> Result<MigrationManager, MigrationError> {
    let catalog = load_reported(SCHEMA_RESOURCES, diagnostics.as_ref())?;
    Ok(MigrationManager::new(Arc::new(catalog), bundled_mappings(), config).with_diagnostics(diagnostics))
}

/// Migrate the store described by `config` and open it.
pub fn open(config: MigrationConfig) -> Result<MigrationOutcome, MigrationError> {
    manager(config)?.run()
}

/// Like [`open`], reporting to `diagnostics`.
pub fn open_with(
    config: MigrationConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,
) -> Result<MigrationOutcome, MigrationError> {
    manager_with(config, diagnostics)?.run()
}
