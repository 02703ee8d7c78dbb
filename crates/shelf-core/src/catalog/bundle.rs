//! Schema resource bundle - JSON schema documents shipped with the binary.

use super::error::CatalogError;
use super::{EntityDef, SchemaCatalog, SchemaVersion};
use serde::Deserialize;

/// A schema document as stored in a resource file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    version: u32,
    entities: Vec<EntityDef>,
}

/// A named schema resource.
#[derive(Debug, Clone, Copy)]
pub struct SchemaResource {
    /// Resource tag (file stem).
    pub tag: &'static str,
    /// JSON source text.
    pub source: &'static str,
}

impl SchemaResource {
    /// Parse and validate this resource.
    pub fn load(&self) -> Result<SchemaVersion, CatalogError> {
        parse_schema(self.tag, self.source)
    }
}

/// Parse one JSON schema document into a validated schema version.
pub fn parse_schema(tag: &str, source: &str) -> Result<SchemaVersion, CatalogError> {
    let document: SchemaDocument =
        serde_json::from_str(source).map_err(|e| CatalogError::Malformed {
            tag: tag.to_string(),
            reason: e.to_string(),
        })?;
    SchemaVersion::new(document.version, tag, document.entities)
}

/// Load every resource and assemble the catalog, ordered by version ordinal.
pub fn load_catalog(resources: &[SchemaResource]) -> Result<SchemaCatalog, CatalogError> {
    let versions = resources
        .iter()
        .map(SchemaResource::load)
        .collect::<Result<Vec<_>, _>>()?;
    SchemaCatalog::new(versions)
}
