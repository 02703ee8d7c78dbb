//! Diagnostics sink for migration events.

use parking_lot::Mutex;
use std::fmt;
use tracing::{error, info, warn};

/// Kind of a reported migration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A step fell back to an inferred mapping.
    InferredMapping,
    /// A missing store was created at the newest version.
    StoreInitialized,
    /// A migration chain finished and the store was swapped in.
    MigrationCompleted,
    /// The store signature matched no catalog entry.
    IncompatibleSchema,
    /// A mapping could not be inferred.
    UninferredAttribute,
    /// A step failed to produce its generation.
    StepExecutionFailure,
    /// The final replace of the live store failed.
    SwapFailure,
    /// The live store could not be read.
    StoreUnreadable,
    /// The bundled catalog is invalid.
    CatalogError,
}

impl DiagnosticKind {
    /// Stable name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::InferredMapping => "inferred_mapping",
            DiagnosticKind::StoreInitialized => "store_initialized",
            DiagnosticKind::MigrationCompleted => "migration_completed",
            DiagnosticKind::IncompatibleSchema => "incompatible_schema",
            DiagnosticKind::UninferredAttribute => "uninferred_attribute",
            DiagnosticKind::StepExecutionFailure => "step_execution_failure",
            DiagnosticKind::SwapFailure => "swap_failure",
            DiagnosticKind::StoreUnreadable => "store_unreadable",
            DiagnosticKind::CatalogError => "catalog_error",
        }
    }

    /// Whether the kind reports a fatal condition.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DiagnosticKind::InferredMapping
                | DiagnosticKind::StoreInitialized
                | DiagnosticKind::MigrationCompleted
        )
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of migration events.
pub trait DiagnosticsSink: Send + Sync {
    /// Record one event.
    fn report(&self, kind: DiagnosticKind, detail: &str);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, kind: DiagnosticKind, detail: &str) {
        match kind {
            DiagnosticKind::InferredMapping => warn!(kind = %kind, "{detail}"),
            k if k.is_fatal() => error!(kind = %kind, "{detail}"),
            _ => info!(kind = %kind, "{detail}"),
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(DiagnosticKind, String)>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, oldest first.
    pub fn events(&self) -> Vec<(DiagnosticKind, String)> {
        self.events.lock().clone()
    }

    /// Number of events of one kind.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.events.lock().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl DiagnosticsSink for MemorySink {
    fn report(&self, kind: DiagnosticKind, detail: &str) {
        self.events.lock().push((kind, detail.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.report(DiagnosticKind::InferredMapping, "v1 -> v2");
        sink.report(DiagnosticKind::SwapFailure, "denied");

        assert_eq!(sink.count(DiagnosticKind::InferredMapping), 1);
        let events = sink.events();
        assert_eq!(events[1], (DiagnosticKind::SwapFailure, "denied".to_string()));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(DiagnosticKind::InferredMapping.to_string(), "inferred_mapping");
        assert!(DiagnosticKind::IncompatibleSchema.is_fatal());
        assert!(!DiagnosticKind::MigrationCompleted.is_fatal());
    }
}
