//! Output formatters for command results.

use crate::inspect::Inspection;
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use shelf_core::migration::MigrationReport;
use shelf_core::SchemaCatalog;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format the report of a migration run.
    fn format_report(&self, report: &MigrationReport) -> String;

    /// Format a store inspection.
    fn format_inspection(&self, inspection: &Inspection) -> String;

    /// Format the schema catalog.
    fn format_catalog(&self, catalog: &SchemaCatalog) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn short_signature(signature: &str) -> &str {
    signature.get(..12).unwrap_or(signature)
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_report(&self, report: &MigrationReport) -> String {
        let headline = match report.from_version {
            None => format!("Created empty store at v{}", report.to_version),
            Some(from) if report.was_noop() => format!("Store already at v{from}"),
            Some(from) => format!(
                "Migrated v{} -> v{} in {} step(s)",
                from,
                report.to_version,
                report.steps.len()
            ),
        };
        if report.steps.is_empty() {
            return headline;
        }

        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("step"),
            Cell::new("mapping"),
            Cell::new("copied"),
            Cell::new("created"),
            Cell::new("carried"),
            Cell::new("transforms"),
            Cell::new("orphans"),
            Cell::new("written"),
        ]);
        for step in &report.steps {
            table.add_row(vec![
                Cell::new(format!("v{} -> v{}", step.from, step.to)),
                Cell::new(step.kind),
                Cell::new(step.objects_copied),
                Cell::new(step.objects_created),
                Cell::new(step.objects_carried),
                Cell::new(step.transforms_applied),
                Cell::new(step.orphans_removed),
                Cell::new(step.objects_written),
            ]);
        }
        format!("{headline}\n{table}")
    }

    fn format_inspection(&self, inspection: &Inspection) -> String {
        let mut table = Table::new();
        table.set_header(vec![Cell::new("property"), Cell::new("value")]);
        table.add_row(vec![Cell::new("path"), Cell::new(inspection.path.display())]);
        table.add_row(vec![Cell::new("status"), Cell::new(inspection.status)]);
        table.add_row(vec![
            Cell::new("signature"),
            Cell::new(short_signature(&inspection.metadata.signature)),
        ]);
        table.add_row(vec![
            Cell::new("recorded version"),
            Cell::new(format!("v{}", inspection.metadata.version)),
        ]);
        if let Some(version) = inspection.catalog_version {
            table.add_row(vec![Cell::new("catalog version"), Cell::new(format!("v{version}"))]);
        }
        table.add_row(vec![Cell::new("objects"), Cell::new(inspection.metadata.object_count)]);

        if inspection.entity_counts.is_empty() {
            return table.to_string();
        }

        let mut counts = Table::new();
        counts.set_header(vec![Cell::new("entity"), Cell::new("objects")]);
        for (entity, count) in &inspection.entity_counts {
            counts.add_row(vec![Cell::new(entity), Cell::new(count)]);
        }
        format!("{table}\n{counts}")
    }

    fn format_catalog(&self, catalog: &SchemaCatalog) -> String {
        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("version"),
            Cell::new("tag"),
            Cell::new("signature"),
            Cell::new("entities"),
        ]);
        for version in catalog.iter() {
            table.add_row(vec![
                Cell::new(format!("v{}", version.ordinal())),
                Cell::new(version.tag()),
                Cell::new(short_signature(version.signature())),
                Cell::new(version.entity_names().join(", ")),
            ]);
        }
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &MigrationReport) -> String {
        let steps: Vec<serde_json::Value> = report
            .steps
            .iter()
            .map(|step| {
                serde_json::json!({
                    "from": step.from,
                    "to": step.to,
                    "mapping": step.kind.to_string(),
                    "objects_copied": step.objects_copied,
                    "objects_created": step.objects_created,
                    "objects_carried": step.objects_carried,
                    "transforms_applied": step.transforms_applied,
                    "orphans_removed": step.orphans_removed,
                    "objects_written": step.objects_written,
                })
            })
            .collect();
        let phases: Vec<String> = report.phases.iter().map(ToString::to_string).collect();

        serde_json::to_string_pretty(&serde_json::json!({
            "from_version": report.from_version,
            "to_version": report.to_version,
            "initialized": report.initialized(),
            "phases": phases,
            "steps": steps,
        }))
        .unwrap_or_else(|_| "{}".to_string())
    }

    fn format_inspection(&self, inspection: &Inspection) -> String {
        serde_json::to_string_pretty(&serde_json::json!({
            "path": inspection.path.display().to_string(),
            "status": inspection.status.to_string(),
            "metadata": inspection.metadata,
            "catalog_version": inspection.catalog_version,
            "entities": inspection.entity_counts,
        }))
        .unwrap_or_else(|_| "{}".to_string())
    }

    fn format_catalog(&self, catalog: &SchemaCatalog) -> String {
        let versions: Vec<serde_json::Value> = catalog
            .iter()
            .map(|version| {
                serde_json::json!({
                    "version": version.ordinal(),
                    "tag": version.tag(),
                    "signature": version.signature(),
                    "entities": version.entity_names(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&versions).unwrap_or_else(|_| "[]".to_string())
    }
}
