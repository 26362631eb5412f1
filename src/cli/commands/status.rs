use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::client::DaemonClient;
use crate::models::{API_KEY_ENV, Config, OutputFormat};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config);

    let daemon_status = if client.is_running() {
        client.status().await.ok()
    } else {
        None
    };

    let status = match daemon_status {
        Some(s) => StatusInfo {
            daemon_running: s.running,
            daemon_idle_secs: Some(s.idle_secs),
            requests_served: Some(s.requests_served),
            embedding_model: s.embedding_model,
            dimension: Some(s.dimension),
            generation_model: s.generation_model,
            api_key_present: s.api_key_present,
            corpus: s.corpus,
            snapshot_path: s.snapshot_path,
        },
        None => StatusInfo {
            daemon_running: false,
            embedding_model: config.embedding.model_id.clone(),
            dimension: Some(config.embedding.dimension as usize),
            generation_model: config.generation.model.clone(),
            api_key_present: std::env::var(API_KEY_ENV).is_ok(),
            snapshot_path: config
                .storage
                .persist
                .then(|| config.storage.snapshot_path()),
            ..Default::default()
        },
    };

    print!("{}", formatter.format_status(&status));

    if !status.daemon_running {
        eprintln!();
        eprintln!("Hint: daemon not running. It will start automatically on first upload.");
        eprintln!("      Or start manually with: examprep serve");
    } else if status.corpus.is_none() {
        eprintln!();
        eprintln!("Hint: no document indexed. Run: examprep upload <file>");
    }
    if !status.api_key_present {
        eprintln!("Warning: {API_KEY_ENV} is not set; generate will fail until it is.");
    }

    Ok(())
}
