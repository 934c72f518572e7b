//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lectern - Consolidate training courses into one curriculum outline.
#[derive(Debug, Parser)]
#[command(name = "lectern")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path (TOML)
    #[arg(short, long, global = true, env = "LECTERN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (section titles only)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a graph snapshot into a database file
    Import(ImportArgs),

    /// Show batch and chunk sizes for a context size
    Plan(PlanArgs),

    /// Generate a consolidated outline for a request
    Generate(GenerateArgs),

    /// Print the effective configuration
    Config,
}

/// Arguments for the import command.
#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// Snapshot JSON file
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Database file to create or update
    #[arg(short, long)]
    pub db: PathBuf,
}

/// Arguments for the plan command.
#[derive(Debug, Parser)]
pub struct PlanArgs {
    /// Context size in tokens (defaults to the configured size)
    #[arg(long)]
    pub context_size: Option<usize>,
}

/// Arguments for the generate command.
#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Request JSON file listing the selected courses
    #[arg(short, long)]
    pub request: PathBuf,

    /// Database file holding the graph
    #[arg(short, long, conflicts_with = "snapshot")]
    pub db: Option<PathBuf>,

    /// Snapshot JSON file loaded into an in-memory graph
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Write the full outcome as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override the configured model
    #[arg(short, long)]
    pub model: Option<String>,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}
