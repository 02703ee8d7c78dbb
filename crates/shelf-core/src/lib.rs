//! Shelf Core - schema catalog, single-file object store and progressive migration.
//!
//! A store is opened only through a migration run, which brings it up to the
//! newest catalogued schema first and hands back a [`PersistentStoreHandle`].

pub mod books;
pub mod catalog;
pub mod error;
pub mod migration;
pub mod names;
pub mod store;

pub use catalog::{
    AttributeDef, Cardinality, CatalogError, DefaultValue, EntityDef, LifecycleRules, RelationshipDef,
    ScalarType, SchemaCatalog, SchemaVersion,
};
pub use error::Error;
pub use migration::{
    MigrationConfig, MigrationError, MigrationManager, MigrationOutcome, MigrationReport,
};
pub use names::NameComponents;
pub use store::{
    FetchRequest, ObjectGraph, ObjectId, PersistentStoreHandle, SaveError, StoreMetadata,
    StoredObject, Value,
};
