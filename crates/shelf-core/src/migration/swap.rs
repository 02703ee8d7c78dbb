//! Scratch space and the final atomic replace of the live store.

use super::error::MigrationError;
use crate::error::Error;
use crate::store::file::{parent_dir, sync_dir};
use crate::store::StoreGeneration;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Private directory next to the live store holding intermediate generations.
///
/// Lives on the same filesystem as the store so the final rename is atomic.
/// The directory and anything left in it are removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a scratch directory beside `live_path`.
    pub fn create(live_path: &Path, prefix: &str) -> Result<Self, Error> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent_dir(live_path))?;
        debug!(path = %dir.path().display(), "Created scratch directory");
        Ok(Self { dir })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// File that holds the generation for schema version `ordinal`.
    pub fn generation_path(&self, ordinal: u32) -> PathBuf {
        self.dir.path().join(format!("generation-v{ordinal}.store"))
    }
}

/// Move the final generation over the live store.
///
/// The rename replaces the file in one step, so readers see either the old
/// store or the new one. The parent directory is synced afterwards.
pub fn swap(generation: &StoreGeneration, live_path: &Path) -> Result<(), MigrationError> {
    let failure = |reason: String| MigrationError::SwapFailure {
        path: live_path.to_path_buf(),
        reason,
    };

    let staged = generation
        .path()
        .ok_or_else(|| failure("generation was never written".to_string()))?;
    std::fs::rename(staged, live_path).map_err(|e| failure(e.to_string()))?;
    sync_dir(parent_dir(live_path));

    info!(
        path = %live_path.display(),
        version = generation.schema().ordinal(),
        "Swapped migrated store into place"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, EntityDef, ScalarType, SchemaVersion};
    use crate::store::{read_metadata, ObjectGraph};
    use std::sync::Arc;

    fn generation() -> StoreGeneration {
        let schema = SchemaVersion::new(
            1,
            "v1",
            vec![EntityDef::new("Book").with_attribute(AttributeDef::new("title", ScalarType::String))],
        )
        .unwrap();
        StoreGeneration::new(Arc::new(schema), ObjectGraph::new())
    }

    #[test]
    fn test_scratch_dir_is_sibling_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("books.store");

        let scratch = ScratchDir::create(&live, ".shelf-migrate-").unwrap();
        let scratch_path = scratch.path().to_path_buf();
        assert_eq!(scratch_path.parent().unwrap(), dir.path());
        assert!(scratch.generation_path(3).ends_with("generation-v3.store"));

        drop(scratch);
        assert!(!scratch_path.exists());
    }

    #[test]
    fn test_swap_replaces_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("books.store");
        std::fs::write(&live, b"old store").unwrap();

        let scratch = ScratchDir::create(&live, ".shelf-migrate-").unwrap();
        let mut generation = generation();
        generation.write_to(&scratch.generation_path(1), false).unwrap();

        swap(&generation, &live).unwrap();
        assert_eq!(read_metadata(&live).unwrap().version, 1);
        assert!(!scratch.generation_path(1).exists());
    }

    #[test]
    fn test_swap_unwritten_generation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("books.store");
        std::fs::write(&live, b"old store").unwrap();

        let err = swap(&generation(), &live).unwrap_err();
        assert!(matches!(err, MigrationError::SwapFailure { .. }));
        assert_eq!(std::fs::read(&live).unwrap(), b"old store");
    }
}
