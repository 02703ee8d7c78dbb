//! Progressive schema migration.
//!
//! Brings a store written under any catalogued schema version forward to the
//! newest one, one adjacent version at a time:
//!
//! | Component | Role |
//! |-----------|------|
//! | [`CompatibilityResolver`] | store signature -> catalog position |
//! | [`MappingResolver`] | registered or inferred [`MappingStep`] per version pair |
//! | [`StepExecutor`] | runs a step, producing a durably written generation |
//! | [`invariant`] | back-reference pass for `delete_when_orphaned` entities |
//! | [`swap`] | scratch directory and the final atomic replace |
//! | [`MigrationManager`] | state machine driving the chain |
//!
//! # Example
//!
//! ```ignore
//! use shelf_core::books;
//! use shelf_core::migration::MigrationConfig;
//!
//! let outcome = books::open(MigrationConfig::new("library.store"))?;
//! println!("opened at v{}", outcome.report.to_version);
//! let store = outcome.handle;
//! ```

pub mod compat;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod executor;
pub mod invariant;
pub mod manager;
pub mod mapping;
pub mod swap;
pub mod transform;

pub use compat::CompatibilityResolver;
pub use config::{MigrationConfig, DEFAULT_SCRATCH_PREFIX};
pub use diagnostics::{DiagnosticKind, DiagnosticsSink, MemorySink, TracingSink};
pub use diff::{AttributeChange, EntityChange, RelationshipChange, SchemaDiff};
pub use error::MigrationError;
pub use executor::{StepExecutor, StepResult, StepStats};
pub use manager::{MigrationManager, MigrationOutcome, MigrationPhase, MigrationReport};
pub use mapping::{
    AttributeRule, EntityMapping, MappingBuilder, MappingFactory, MappingKind, MappingRegistry,
    MappingResolver, MappingStep, RelationshipRule,
};
pub use swap::ScratchDir;
pub use transform::{EntityTransformer, GraphBuilder, TransformError};
