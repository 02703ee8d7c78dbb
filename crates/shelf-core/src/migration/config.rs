//! Migration configuration.

use std::path::PathBuf;

/// Default prefix of the scratch directory created next to the live store.
pub const DEFAULT_SCRATCH_PREFIX: &str = ".shelf-migrate-";

/// Migration manager configuration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path of the live store file.
    pub store_path: PathBuf,

    /// Force every written file to disk before continuing.
    pub sync_writes: bool,

    /// Prefix of the scratch directory holding intermediate generations.
    pub scratch_prefix: String,
}

impl MigrationConfig {
    /// Create a configuration for the store at `store_path`.
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            sync_writes: true,
            scratch_prefix: DEFAULT_SCRATCH_PREFIX.to_string(),
        }
    }

    /// Enable or disable fsync of written files.
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Set the scratch directory prefix.
    pub fn with_scratch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scratch_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = MigrationConfig::new("/tmp/books.store")
            .with_sync_writes(false)
            .with_scratch_prefix(".scratch-");

        assert_eq!(config.store_path, PathBuf::from("/tmp/books.store"));
        assert!(!config.sync_writes);
        assert_eq!(config.scratch_prefix, ".scratch-");
    }

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::new("books.store");
        assert!(config.sync_writes);
        assert_eq!(config.scratch_prefix, DEFAULT_SCRATCH_PREFIX);
    }
}
