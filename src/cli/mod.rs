//! Command line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Turn lecture notes into grounded exam questions and summaries.
#[derive(Debug, Parser)]
#[command(name = "examprep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index a document, replacing the previous one
    Upload(commands::UploadArgs),

    /// Show the chunks nearest to a query
    Search(commands::SearchArgs),

    /// Generate a quiz or summary from the indexed document
    Generate(commands::GenerateArgs),

    /// Show daemon and index status
    Status,

    /// Forget the indexed document
    Reset,

    /// Start, stop or restart the background daemon
    Serve(commands::ServeArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
