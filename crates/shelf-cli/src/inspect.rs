//! Read-only store inspection.

use shelf_core::migration::{CompatibilityResolver, MigrationError};
use shelf_core::store::{read_metadata, read_store, StoreMetadata};
use shelf_core::SchemaCatalog;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a store relates to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// At the newest catalogued version.
    Current,
    /// At an older catalogued version.
    NeedsMigration,
    /// Signature matches no catalogued version.
    Incompatible,
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreStatus::Current => write!(f, "current"),
            StoreStatus::NeedsMigration => write!(f, "needs migration"),
            StoreStatus::Incompatible => write!(f, "incompatible"),
        }
    }
}

/// What `inspect` found in a store file.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub path: PathBuf,
    pub metadata: StoreMetadata,
    pub catalog_version: Option<u32>,
    pub status: StoreStatus,
    /// Objects per entity; empty when the body was not decoded.
    pub entity_counts: BTreeMap<String, usize>,
}

/// Inspect a store without migrating or modifying it.
///
/// The body is decoded only when the store is compatible with the catalog.
pub fn inspect(path: &Path, catalog: &SchemaCatalog) -> Result<Inspection, MigrationError> {
    let unreadable = |source| MigrationError::StoreUnreadable {
        path: path.to_path_buf(),
        source,
    };
    let metadata = read_metadata(path).map_err(unreadable)?;

    let resolver = CompatibilityResolver::new(catalog);
    let (catalog_version, status) = match resolver.resolve(&metadata.signature) {
        Ok(index) => {
            let status = if index == catalog.newest_index() {
                StoreStatus::Current
            } else {
                StoreStatus::NeedsMigration
            };
            (catalog.get(index).map(|v| v.ordinal()), status)
        }
        Err(MigrationError::IncompatibleSchema { .. }) => (None, StoreStatus::Incompatible),
        Err(other) => return Err(other),
    };

    let entity_counts = match status {
        StoreStatus::Incompatible => BTreeMap::new(),
        _ => read_store(path).map_err(unreadable)?.1.count_by_entity(),
    };

    debug!(path = %path.display(), status = %status, "Inspected store");
    Ok(Inspection {
        path: path.to_path_buf(),
        metadata,
        catalog_version,
        status,
        entity_counts,
    })
}
