//! Core error types.

use crate::catalog::ScalarType;
use crate::store::ObjectId;
use thiserror::Error;

/// Store and data-access errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The store file failed its framing or checksum checks.
    #[error("store file corrupted: {0}")]
    Corrupted(String),

    /// Entity not present in the schema.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// Attribute not present on the entity.
    #[error("unknown attribute {entity}.{attribute}")]
    UnknownAttribute {
        /// Entity name.
        entity: String,
        /// Attribute name.
        attribute: String,
    },

    /// Relationship not present on the entity, or not usable in this direction.
    #[error("unknown relationship {entity}.{relationship}")]
    UnknownRelationship {
        /// Entity name.
        entity: String,
        /// Relationship name.
        relationship: String,
    },

    /// Relationship target is of the wrong entity.
    #[error("{entity}.{relationship} expects {expected}, got {found}")]
    TargetMismatch {
        /// Owner entity name.
        entity: String,
        /// Owning relationship name.
        relationship: String,
        /// Declared target entity.
        expected: String,
        /// Entity of the supplied target.
        found: String,
    },

    /// Value does not match the attribute type.
    #[error("{entity}.{attribute} expects {expected}")]
    TypeMismatch {
        /// Entity name.
        entity: String,
        /// Attribute name.
        attribute: String,
        /// Declared type.
        expected: ScalarType,
    },

    /// A required attribute is null.
    #[error("{entity} {id} is missing required attribute '{attribute}'")]
    MissingRequired {
        /// Entity name.
        entity: String,
        /// Offending object.
        id: ObjectId,
        /// Attribute name.
        attribute: String,
    },

    /// Object not found.
    #[error("object {0} not found")]
    NotFound(ObjectId),

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
