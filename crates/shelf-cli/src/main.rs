//! Shelf command-line tool.
//!
//! Migrates book stores to the newest schema and inspects them.

mod formatter;
mod inspect;

use clap::{Parser, Subcommand};
use formatter::{create_formatter, OutputFormat};
use shelf_core::books;
use shelf_core::migration::{MigrationConfig, DEFAULT_SCRATCH_PREFIX};
use std::path::PathBuf;

/// Shelf - progressive schema migration for local book stores
#[derive(Parser, Debug)]
#[command(name = "shelf")]
#[command(version, about = "Migrate and inspect local book stores")]
pub struct Args {
    /// Output format (table, json)
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring a store up to the newest schema, creating it if missing
    Migrate {
        /// Path to the store file
        store: PathBuf,

        /// Skip fsync on written generations
        #[arg(long)]
        no_sync: bool,

        /// Prefix for the scratch directory created beside the store
        #[arg(long, default_value = DEFAULT_SCRATCH_PREFIX)]
        scratch_prefix: String,
    },
    /// Show a store's schema version and contents without changing it
    Inspect {
        /// Path to the store file
        store: PathBuf,
    },
    /// List the bundled schema versions
    Catalog,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shelf_core=info".parse().unwrap())
                .add_directive("shelf=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let formatter = create_formatter(args.format);

    match args.command {
        Command::Migrate {
            store,
            no_sync,
            scratch_prefix,
        } => {
            let config = MigrationConfig::new(store)
                .with_sync_writes(!no_sync)
                .with_scratch_prefix(scratch_prefix);
            let outcome = books::open(config)?;
            println!("{}", formatter.format_report(&outcome.report));
        }
        Command::Inspect { store } => {
            let catalog = books::bundled_catalog()?;
            let inspection = inspect::inspect(&store, &catalog)?;
            println!("{}", formatter.format_inspection(&inspection));
        }
        Command::Catalog => {
            let catalog = books::bundled_catalog()?;
            println!("{}", formatter.format_catalog(&catalog));
        }
    }

    Ok(())
}
