//! Single-file object store.
//!
//! A store is an [`ObjectGraph`] persisted as one file whose header records the
//! signature of the schema version it conforms to. During migration each schema
//! version gets its own [`StoreGeneration`]; once migrated, the store is reached
//! only through a [`PersistentStoreHandle`].

pub mod file;
mod generation;
mod graph;
mod handle;
mod object;
mod value;

pub use file::{read_metadata, read_store, write_atomic, StoreMetadata, MAGIC};
pub use generation::StoreGeneration;
pub use graph::ObjectGraph;
pub use handle::{FetchRequest, PersistentStoreHandle, SaveError};
pub use object::{ObjectId, StoredObject};
pub use value::Value;

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}
