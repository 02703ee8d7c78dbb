//! Schema catalog - the ordered list of every known data-model version.

use super::error::CatalogError;
use super::SchemaVersion;
use std::sync::Arc;

/// Ordered, immutable sequence of schema versions (oldest first).
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    versions: Vec<Arc<SchemaVersion>>,
}

impl SchemaCatalog {
    /// Build a catalog, sorting by ordinal.
    ///
    /// Ordinals must be contiguous from 1 and signatures must be unique so the
    /// compatibility check can identify any store unambiguously.
    pub fn new(mut versions: Vec<SchemaVersion>) -> Result<Self, CatalogError> {
        if versions.is_empty() {
            return Err(CatalogError::Empty);
        }
        versions.sort_by_key(|v| v.ordinal());

        for (idx, version) in versions.iter().enumerate() {
            let expected = idx as u32 + 1;
            if version.ordinal() != expected {
                return Err(CatalogError::NonContiguous {
                    expected,
                    found: version.ordinal(),
                });
            }
        }

        for (idx, later) in versions.iter().enumerate() {
            if let Some(earlier) = versions[..idx]
                .iter()
                .find(|v| v.signature() == later.signature())
            {
                return Err(CatalogError::DuplicateSignature {
                    first: earlier.ordinal(),
                    second: later.ordinal(),
                    signature: later.signature().to_string(),
                });
            }
        }

        Ok(Self {
            versions: versions.into_iter().map(Arc::new).collect(),
        })
    }

    /// Number of versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// A catalog is never empty once built; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Get the version at a catalog index.
    pub fn get(&self, index: usize) -> Option<&Arc<SchemaVersion>> {
        self.versions.get(index)
    }

    /// Index of the current (newest) version.
    pub fn newest_index(&self) -> usize {
        self.versions.len() - 1
    }

    /// The current (newest) version.
    pub fn newest(&self) -> &Arc<SchemaVersion> {
        &self.versions[self.newest_index()]
    }

    /// Iterate versions oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SchemaVersion>> {
        self.versions.iter()
    }
}
