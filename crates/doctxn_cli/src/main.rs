//! DocTxn CLI
//!
//! Command-line tools for DocTxn databases.
//!
//! # Commands
//!
//! - `run` - Execute a JSON-lines command script against a database
//! - `inspect` - Display collections, indexes and statistics
//! - `dump-journal` - Dump commit journal records for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DocTxn command-line database tools.
#[derive(Parser)]
#[command(name = "doctxn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script of JSON command documents, one per line
    Run {
        /// Script file
        script: PathBuf,
    },

    /// Display collections, indexes and statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump journal records for debugging
    DumpJournal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { script } => {
            commands::run::run(cli.path.as_deref(), &script)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::DumpJournal { limit, format } => {
            let path = cli.path.ok_or("Database path required for dump-journal")?;
            commands::dump_journal::run(&path, limit, &format)?;
        }
        Commands::Version => {
            println!("DocTxn CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("DocTxn Core v{}", doctxn_core::VERSION);
        }
    }

    Ok(())
}
