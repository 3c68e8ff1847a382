//! Docket CLI
//!
//! Command-line tools for running lazy batches against an in-memory server.
//!
//! # Commands
//!
//! - `batch` - Seed a server, queue loads and queries, flush them as one batch
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Docket command-line tools.
#[derive(Parser)]
#[command(name = "docket")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flush loads and queries against a seeded server as one batch
    Batch {
        /// JSON file mapping document keys to documents
        #[arg(short, long)]
        seed: PathBuf,

        /// Index to create, as `name=collection`
        #[arg(short, long = "index")]
        indexes: Vec<String>,

        /// Document key to load
        #[arg(short, long = "load")]
        loads: Vec<String>,

        /// Index query, as `index:query`
        #[arg(short, long = "query")]
        queries: Vec<String>,

        /// Retry queries until their index is no longer stale
        #[arg(short, long)]
        wait_non_stale: bool,

        /// Stale reads an index serves before it catches up (0 = never)
        #[arg(long, default_value = "1")]
        stale_reads: u32,

        /// Maximum stale retry rounds
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Batch {
            seed,
            indexes,
            loads,
            queries,
            wait_non_stale,
            stale_reads,
            max_retries,
            format,
        } => {
            let options = commands::batch::BatchOptions {
                seed,
                indexes,
                loads,
                queries,
                wait_non_stale,
                stale_reads,
                max_retries,
            };
            commands::batch::run(&options, &format)?;
        }
        Commands::Version => {
            println!("Docket CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Docket Client v{}", docket_client::VERSION);
        }
    }

    Ok(())
}
