use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Query text")]
    pub query: String,

    #[arg(long, short = 'k', help = "Number of chunks to return")]
    pub k: Option<usize>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    let k = args.k.unwrap_or(config.retrieval.default_k);
    if k == 0 {
        anyhow::bail!("k must be at least 1");
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  k: {k}");
    }

    let client = DaemonClient::new(&config);
    let results = client
        .retrieve(query, k)
        .await
        .context("search failed")?;

    if verbose {
        eprintln!("Timing: {}ms", results.duration_ms);
        eprintln!();
    }

    print!("{}", formatter.format_search_results(&results));
    Ok(())
}
