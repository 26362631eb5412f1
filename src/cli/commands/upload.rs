use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct UploadArgs {
    #[arg(required = true, help = "Lecture material to index (.pdf, .pptx, .txt, .md, .rst)")]
    pub file: PathBuf,
}

pub async fn handle_upload(args: UploadArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    if !args.file.is_file() {
        anyhow::bail!("file not found: {}", args.file.display());
    }

    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config);

    if verbose {
        eprintln!("Uploading: {}", args.file.display());
        eprintln!(
            "  Chunking: {} words, {} overlap",
            config.chunking.chunk_size, config.chunking.overlap
        );
    }

    let upload = client
        .upload(&args.file)
        .await
        .context("upload failed")?;

    print!("{}", formatter.format_upload(&upload));
    Ok(())
}
