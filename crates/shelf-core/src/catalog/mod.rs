//! Schema catalog for shelf stores.
//!
//! The catalog holds every historical and current data-model version, each with
//! its entities, attributes, relationships and structural signature.

mod bundle;
mod catalog;
mod entity;
mod error;
mod field;
mod relation;
mod schema;
mod types;

pub use bundle::{load_catalog, parse_schema, SchemaResource};
pub use catalog::SchemaCatalog;
pub use entity::{EntityDef, LifecycleRules};
pub use error::CatalogError;
pub use field::{AttributeDef, DefaultValue};
pub use relation::{Cardinality, RelationshipDef};
pub use schema::{entity_hash, schema_signature, SchemaVersion};
pub use types::ScalarType;
