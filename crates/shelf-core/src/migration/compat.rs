//! Compatibility resolver: maps a store signature to a catalog position.

use super::error::MigrationError;
use crate::catalog::SchemaCatalog;

/// Finds the catalog entry a store was written with.
#[derive(Debug, Clone, Copy)]
pub struct CompatibilityResolver<'a> {
    catalog: &'a SchemaCatalog,
}

impl<'a> CompatibilityResolver<'a> {
    /// Create a resolver over `catalog`.
    pub fn new(catalog: &'a SchemaCatalog) -> Self {
        Self { catalog }
    }

    /// Index of the first catalog entry (oldest first) whose signature matches.
    pub fn resolve(&self, signature: &str) -> Result<usize, MigrationError> {
        self.catalog
            .iter()
            .position(|v| v.signature() == signature)
            .ok_or_else(|| MigrationError::IncompatibleSchema {
                signature: signature.to_string(),
            })
    }

    /// Check whether `signature` is the newest version.
    pub fn is_current(&self, signature: &str) -> bool {
        self.catalog.newest().signature() == signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, EntityDef, ScalarType, SchemaVersion};

    fn catalog() -> SchemaCatalog {
        let v1 = SchemaVersion::new(
            1,
            "v1",
            vec![EntityDef::new("Book").with_attribute(AttributeDef::new("title", ScalarType::String))],
        )
        .unwrap();
        let v2 = SchemaVersion::new(
            2,
            "v2",
            vec![EntityDef::new("Book")
                .with_attribute(AttributeDef::new("title", ScalarType::String))
                .with_attribute(AttributeDef::optional("notes", ScalarType::String))],
        )
        .unwrap();
        SchemaCatalog::new(vec![v2, v1]).unwrap()
    }

    #[test]
    fn test_resolves_each_version() {
        let catalog = catalog();
        let resolver = CompatibilityResolver::new(&catalog);
        for (idx, version) in catalog.iter().enumerate() {
            assert_eq!(resolver.resolve(version.signature()).unwrap(), idx);
        }
        assert!(resolver.is_current(catalog.newest().signature()));
        assert!(!resolver.is_current(catalog.get(0).unwrap().signature()));
    }

    #[test]
    fn test_unknown_signature_is_incompatible() {
        let catalog = catalog();
        let err = CompatibilityResolver::new(&catalog).resolve("deadbeef").unwrap_err();
        assert!(matches!(err, MigrationError::IncompatibleSchema { signature } if signature == "deadbeef"));
    }
}
