use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, ContextPolicy, ExamKind, OutputFormat};

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(value_enum, help = "What to generate")]
    pub kind: ExamKind,

    #[arg(
        long,
        short = 'q',
        help = "Ground the output in chunks nearest to this query instead of the opening chunks"
    )]
    pub query: Option<String>,

    #[arg(long, short = 'k', help = "Number of context chunks")]
    pub k: Option<usize>,
}

pub async fn handle_generate(args: GenerateArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    let n = args.k.unwrap_or(config.retrieval.context_chunks);
    if n == 0 {
        anyhow::bail!("k must be at least 1");
    }
    let query = args
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());
    let policy = ContextPolicy::resolve(config.retrieval.context_policy, query, args.kind, n);

    if verbose {
        eprintln!("Generating {} from {:?}", args.kind, policy);
    }

    let client = DaemonClient::new(&config);
    let exam = client
        .generate(args.kind, policy)
        .await
        .context("generation failed")?;

    print!("{}", formatter.format_exam(&exam));
    Ok(())
}
