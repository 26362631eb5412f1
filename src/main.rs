use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use examprep::cli::commands::{
    handle_config, handle_generate, handle_reset, handle_search, handle_serve, handle_status,
    handle_upload,
};
use examprep::cli::output::get_formatter;
use examprep::cli::{Cli, Commands};
use examprep::error::{AppError, DaemonError};
use examprep::models::{Config, OutputFormat};

/// Detect ONNX Runtime library path and set ORT_DYLIB_PATH if not already set.
/// Must be called before any ort code runs.
fn detect_and_set_ort_path() {
    if std::env::var("ORT_DYLIB_PATH")
        .map(|p| Path::new(&p).exists())
        .unwrap_or(false)
    {
        return;
    }

    let home = std::env::var("HOME").unwrap_or_default();

    let found = if cfg!(target_os = "macos") {
        [
            format!("{home}/.local/lib/examprep/libonnxruntime.dylib"),
            "/opt/homebrew/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
            "/usr/local/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else if cfg!(target_os = "linux") {
        [
            format!("{home}/.local/lib/examprep/libonnxruntime.so"),
            "/usr/lib/libonnxruntime.so".into(),
            "/usr/local/lib/libonnxruntime.so".into(),
            "/usr/lib/x86_64-linux-gnu/libonnxruntime.so".into(),
            "/usr/lib/aarch64-linux-gnu/libonnxruntime.so".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else {
        None
    };

    if let Some(path) = found {
        // SAFETY: Called at program start before any threads are spawned.
        unsafe {
            std::env::set_var("ORT_DYLIB_PATH", path);
        }
    }
}

/// Log to stderr. `EXAMPREP_LOG` or `RUST_LOG` override the default level.
fn init_tracing(verbose: bool, daemon: bool) {
    let default = if verbose {
        "debug"
    } else if daemon {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("EXAMPREP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    detect_and_set_ort_path();
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose, matches!(cli.command, Commands::Serve(_)));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let resolved = Config::load().unwrap_or_default();
    let format = cli.format.unwrap_or(resolved.config.output.default_format);
    let verbose = cli.verbose;

    // The daemon handles its own signals so it can remove the socket and PID file.
    let result = if matches!(cli.command, Commands::Serve(_)) {
        run_command(cli.command, format, verbose).await
    } else {
        tokio::select! {
            result = run_command(cli.command, format, verbose) => result,
            _ = shutdown_signal() => {
                eprintln!("\nReceived shutdown signal, cleaning up...");
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprint!("{}", get_formatter(format).format_error(&describe(&e)));
        std::process::exit(1);
    }

    Ok(())
}

/// Prefer the short message a person can act on over the full error chain.
fn describe(error: &anyhow::Error) -> String {
    for cause in error.chain() {
        if let Some(app) = cause.downcast_ref::<AppError>() {
            return app.user_message();
        }
        if let Some(DaemonError::Remote(message)) = cause.downcast_ref::<DaemonError>() {
            return message.clone();
        }
    }
    format!("{error:#}")
}

async fn run_command(command: Commands, format: OutputFormat, verbose: bool) -> Result<()> {
    match command {
        Commands::Upload(args) => handle_upload(args, format, verbose).await?,
        Commands::Search(args) => handle_search(args, format, verbose).await?,
        Commands::Generate(args) => handle_generate(args, format, verbose).await?,
        Commands::Status => handle_status(format, verbose).await?,
        Commands::Reset => handle_reset(format, verbose).await?,
        Commands::Serve(args) => handle_serve(args).await?,
        Commands::Config(cmd) => handle_config(cmd, format, verbose).await?,
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
