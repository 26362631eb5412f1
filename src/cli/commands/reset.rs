use anyhow::Result;

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

pub async fn handle_reset(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    DaemonClient::new(&config).reset().await?;

    let snapshot = config.storage.snapshot_path();
    if snapshot.exists() {
        std::fs::remove_file(&snapshot)?;
    }

    print!("{}", formatter.format_message("Index cleared."));
    Ok(())
}
