//! snapdeploy CLI
//!
//! Command-line snapshot export and import for a store image file.
//!
//! # Commands
//!
//! - `export` - Write a full application snapshot
//! - `import` - Restore a full application snapshot
//! - `export-data` - Write records of selected types and their relationships
//! - `import-data` - Restore a data snapshot
//! - `inspect` - Show a snapshot's manifest and whether it can be imported

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// snapdeploy snapshot tools.
#[derive(Parser)]
#[command(name = "snapdeploy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store image (JSON)
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Path to the schema document (JSON)
    #[arg(global = true, long)]
    schema: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the application into a snapshot directory
    Export {
        /// Snapshot directory (absolute)
        dir: PathBuf,
    },

    /// Import a snapshot directory into the store
    Import {
        /// Snapshot directory (absolute)
        dir: PathBuf,

        /// Keep existing content that the snapshot does not mention
        #[arg(short, long)]
        extend_existing: bool,
    },

    /// Export records of the given types and their relationships
    ExportData {
        /// Snapshot directory (absolute)
        dir: PathBuf,

        /// Comma-separated type names
        #[arg(short, long)]
        types: String,
    },

    /// Import a data snapshot into the store
    ImportData {
        /// Snapshot directory (absolute)
        dir: PathBuf,

        /// Skip per-node lifecycle callbacks
        #[arg(long)]
        no_inner_callbacks: bool,

        /// Run callbacks after each commit
        #[arg(long)]
        outer_callbacks: bool,

        /// Cascade deletes to dependent nodes
        #[arg(long)]
        cascading_delete: bool,
    },

    /// Show a snapshot's manifest and compatibility
    Inspect {
        /// Snapshot directory
        dir: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Export { dir } => {
            let store = cli.store.ok_or("Store path required for export")?;
            commands::export::run(&store, cli.schema.as_deref(), &dir)?;
        }
        Commands::Import {
            dir,
            extend_existing,
        } => {
            let store = cli.store.ok_or("Store path required for import")?;
            commands::import::run(&store, cli.schema.as_deref(), &dir, extend_existing)?;
        }
        Commands::ExportData { dir, types } => {
            let store = cli.store.ok_or("Store path required for export-data")?;
            commands::data::export(&store, &dir, &types)?;
        }
        Commands::ImportData {
            dir,
            no_inner_callbacks,
            outer_callbacks,
            cascading_delete,
        } => {
            let store = cli.store.ok_or("Store path required for import-data")?;
            let options = snapdeploy_core::DataImportOptions {
                inner_callbacks: !no_inner_callbacks,
                outer_callbacks,
                cascading_delete,
            };
            commands::data::import(&store, &dir, options)?;
        }
        Commands::Inspect { dir, format } => {
            commands::inspect::run(&dir, &format)?;
        }
        Commands::Version => {
            println!("snapdeploy CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("snapdeploy Core v{}", snapdeploy_core::VERSION);
        }
    }

    Ok(())
}
