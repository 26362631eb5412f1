use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{API_KEY_ENV, Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(
            long,
            short = 'g',
            help = "Create global config instead of project config"
        )]
        global: bool,
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path {
        #[arg(long, help = "Show all possible config paths")]
        all: bool,
    },
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => handle_init(global, force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path { all } => handle_path(all),
    }
}

fn handle_init(global: bool, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let (scope, config_path) = if global {
        let path = Config::global_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
        ("Global", path)
    } else {
        let path = Config::project_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine project directory"))?;
        ("Project", path)
    };

    if config_path.exists() && !force {
        anyhow::bail!(
            "{scope} config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    let path = if global {
        Config::init_global().context("failed to create global config")?
    } else {
        Config::init_project().context("failed to create project config")?
    };
    print!(
        "{}",
        formatter.format_message(&format!(
            "Created {} config at: {}",
            scope.to_lowercase(),
            path.display()
        ))
    );

    Ok(())
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let resolved = Config::load()?;

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "config": resolved.config,
            "project_path": resolved.project_path,
            "global_path": resolved.global_path,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match (&resolved.project_path, &resolved.global_path) {
        (Some(path), _) => println!("# Project config: {}", path.display()),
        (None, Some(path)) => println!("# Global config: {}", path.display()),
        (None, None) => println!("# Built-in defaults"),
    }
    println!(
        "# {}: {}",
        API_KEY_ENV,
        if std::env::var(API_KEY_ENV).is_ok() {
            "set"
        } else {
            "not set"
        }
    );
    println!();
    print!("{}", toml::to_string_pretty(&resolved.config)?);

    Ok(())
}

fn handle_path(show_all: bool) -> Result<()> {
    let project_path = Config::project_path();
    let global_path = Config::global_path();

    println!("Configuration paths:");
    println!();

    if let Some(ref path) = project_path {
        if path.exists() {
            println!("Project config (active): {}", path.display());
        } else if show_all {
            println!("Project config (would be): {}", path.display());
        }
    }

    if let Some(ref path) = global_path {
        if path.exists() {
            println!("Global config (active): {}", path.display());
        } else if show_all {
            println!("Global config (would be): {}", path.display());
        }
    }

    if show_all {
        if let Some(dir) = Config::data_dir() {
            println!("Data directory: {}", dir.display());
        }
        if let Ok(cwd) = std::env::current_dir() {
            let env_path = cwd.join(".env");
            if env_path.exists() {
                println!(".env file (active): {}", env_path.display());
            } else {
                println!(".env file (would be): {}", env_path.display());
            }
        }
    }

    Ok(())
}
