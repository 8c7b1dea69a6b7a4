//! CLI module for the product search ingestion tool.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Resumable product catalog ingestion and similarity search.
#[derive(Debug, Parser)]
#[command(name = "psearch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'c',
        global = true,
        help = "Path to the configuration file"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest the dataset into the vector store, resuming from the checkpoint
    Ingest(commands::IngestArgs),

    /// Search ingested products
    Search(commands::SearchArgs),

    /// Check checkpoint and infrastructure status (embedding server, Qdrant)
    Status,

    /// Inspect or reset the ingestion checkpoint
    #[command(subcommand)]
    Checkpoint(commands::CheckpointCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
