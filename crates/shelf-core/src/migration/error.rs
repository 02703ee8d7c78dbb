//! Migration-specific error types.

use super::diagnostics::DiagnosticKind;
use crate::catalog::CatalogError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The store's signature matches no schema version in the catalog.
    #[error("store signature {signature} matches no known schema version")]
    IncompatibleSchema {
        /// Signature recorded in the store header.
        signature: String,
    },

    /// A destination attribute or relationship has no copy, default or transform.
    #[error("cannot infer {entity}.{attribute} migrating v{from} to v{to}")]
    UninferredAttribute {
        /// Destination entity.
        entity: String,
        /// Destination attribute or relationship.
        attribute: String,
        /// Source schema ordinal.
        from: u32,
        /// Destination schema ordinal.
        to: u32,
    },

    /// Producing the generation for one step failed.
    #[error("migration step v{from} -> v{to} failed: {reason}")]
    StepExecutionFailure {
        /// Source schema ordinal.
        from: u32,
        /// Destination schema ordinal.
        to: u32,
        /// Description of the failure.
        reason: String,
    },

    /// Replacing the live store with the migrated one failed.
    #[error("could not replace {}: {reason}", path.display())]
    SwapFailure {
        /// Live store path.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The live store could not be read.
    #[error("store {} is unreadable: {source}", path.display())]
    StoreUnreadable {
        /// Live store path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: crate::error::Error,
    },

    /// The bundled catalog failed validation.
    #[error("schema catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl MigrationError {
    /// Diagnostic kind under which this error is reported.
    pub fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            MigrationError::IncompatibleSchema { .. } => DiagnosticKind::IncompatibleSchema,
            MigrationError::UninferredAttribute { .. } => DiagnosticKind::UninferredAttribute,
            MigrationError::StepExecutionFailure { .. } => DiagnosticKind::StepExecutionFailure,
            MigrationError::SwapFailure { .. } => DiagnosticKind::SwapFailure,
            MigrationError::StoreUnreadable { .. } => DiagnosticKind::StoreUnreadable,
            MigrationError::Catalog(_) => DiagnosticKind::CatalogError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::UninferredAttribute {
            entity: "Book".to_string(),
            attribute: "isbn13".to_string(),
            from: 3,
            to: 4,
        };
        assert!(err.to_string().contains("Book.isbn13"));
        assert!(err.to_string().contains("v3 to v4"));
    }

    #[test]
    fn test_diagnostic_kinds() {
        let err = MigrationError::IncompatibleSchema {
            signature: "ab".into(),
        };
        assert_eq!(err.diagnostic_kind(), DiagnosticKind::IncompatibleSchema);

        let err = MigrationError::SwapFailure {
            path: PathBuf::from("books.store"),
            reason: "denied".into(),
        };
        assert_eq!(err.diagnostic_kind(), DiagnosticKind::SwapFailure);
        assert!(err.to_string().contains("books.store"));
    }
}
