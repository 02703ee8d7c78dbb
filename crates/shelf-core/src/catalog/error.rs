//! Catalog load errors.

use thiserror::Error;

/// Errors raised while loading or validating schema definitions.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A schema resource could not be parsed.
    #[error("schema resource '{tag}' is malformed: {reason}")]
    Malformed {
        /// Resource tag.
        tag: String,
        /// Parser message.
        reason: String,
    },

    /// Two definitions share a name where names must be unique.
    #[error("duplicate {kind} '{name}' in schema version {ordinal}")]
    Duplicate {
        /// What was duplicated (entity, attribute, relationship).
        kind: &'static str,
        /// The duplicated name.
        name: String,
        /// Schema version ordinal.
        ordinal: u32,
    },

    /// A relationship points at an entity that does not exist.
    #[error("relationship {entity}.{relationship} targets unknown entity '{target}'")]
    UnknownTarget {
        /// Source entity.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// Missing target.
        target: String,
    },

    /// A relationship's inverse is missing or does not point back.
    #[error("relationship {entity}.{relationship} has no matching inverse '{inverse}'")]
    BrokenInverse {
        /// Source entity.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// Declared inverse name.
        inverse: String,
    },

    /// Both or neither sides of a relationship pair claim ownership.
    #[error("relationship pair {entity}.{relationship} must have exactly one owning side")]
    Ownership {
        /// Source entity.
        entity: String,
        /// Relationship name.
        relationship: String,
    },

    /// A declared default does not fit its attribute type.
    #[error("default for {entity}.{attribute} does not fit its type")]
    DefaultMismatch {
        /// Entity name.
        entity: String,
        /// Attribute name.
        attribute: String,
    },

    /// Version ordinals must run 1..=N without gaps.
    #[error("schema versions are not contiguous: expected ordinal {expected}, found {found}")]
    NonContiguous {
        /// Expected ordinal.
        expected: u32,
        /// Ordinal actually present.
        found: u32,
    },

    /// Two versions have identical structure and cannot be told apart.
    #[error("schema versions {first} and {second} share signature {signature}")]
    DuplicateSignature {
        /// Earlier ordinal.
        first: u32,
        /// Later ordinal.
        second: u32,
        /// Shared signature.
        signature: String,
    },

    /// The catalog contains no versions.
    #[error("schema catalog is empty")]
    Empty,
}
