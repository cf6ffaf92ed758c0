//! SceneForge - voice-driven scene editing
//!
//! CLI entry point: runs the websocket server or inspects the registry.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use sceneforge::classifier::Classifier;
use sceneforge::cli::{Cli, Command, OutputFormat, RegistryAction, get_log_path};
use sceneforge::config::Config;
use sceneforge::domain::SceneSnapshot;
use sceneforge::llm::create_client;
use sceneforge::prompts::PromptLoader;
use sceneforge::server;
use scenestore::RegistryFile;

/// Where log output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogTarget {
    File,
    Stderr,
}

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, target: LogTarget) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match target {
        LogTarget::File => {
            let log_path = get_log_path();
            if let Some(log_dir) = log_path.parent() {
                fs::create_dir_all(log_dir).context("Failed to create log directory")?;
            }
            let log_file = fs::File::create(&log_path).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(log_file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?}, target: {:?})", level, target);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    let target = match cli.command {
        None | Some(Command::Serve { .. }) => LogTarget::File,
        Some(_) => LogTarget::Stderr,
    };
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), target)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("SceneForge loaded config: model={} registry={}", config.llm.model, config.storage.registry.display());

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        None => cmd_serve(&config, None).await,
        Some(Command::Serve { bind }) => cmd_serve(&config, bind).await,
        Some(Command::Registry { command }) => match command {
            RegistryAction::List { format } => cmd_registry_list(&config, format),
            RegistryAction::Remove { ids } => cmd_registry_remove(&config, ids),
        },
        Some(Command::Classify { utterance }) => cmd_classify(&config, &utterance).await,
    }
}

/// Run the websocket server until Ctrl-C
async fn cmd_serve(config: &Config, bind: Option<String>) -> Result<()> {
    debug!(?bind, "cmd_serve: called");
    config.validate().context("Invalid configuration")?;
    let addr = bind.clone().unwrap_or_else(|| config.server.bind.clone());
    println!("{} listening on {}", "SceneForge".bold(), addr.cyan());
    println!("Logs are written to: {}", get_log_path().display());
    server::serve(config, bind).await
}

/// Print every object in the registry
fn cmd_registry_list(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_registry_list: called");
    let registry = RegistryFile::open(&config.storage.registry)?;
    let objects = registry.load().context("Failed to read registry")?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&objects)?);
        return Ok(());
    }

    if objects.is_empty() {
        println!("Registry {} is empty.", registry.path().display());
        return Ok(());
    }

    println!("{} objects in {}", objects.len(), registry.path().display());
    println!();
    for obj in &objects {
        println!("  {}", obj.id.bold());
        println!("    name:     {}", obj.name);
        println!("    color:    {}", obj.color);
        println!("    position: {}", obj.position);
        println!("    path:     {}", obj.path.dimmed());
    }
    Ok(())
}

/// Delete objects by id, reporting any that were not present
fn cmd_registry_remove(config: &Config, ids: Vec<String>) -> Result<()> {
    debug!(?ids, "cmd_registry_remove: called");
    let registry = RegistryFile::open(&config.storage.registry)?;
    let removed = registry.delete(&ids).context("Failed to update registry")?;

    for id in &ids {
        if removed.contains(id) {
            println!("{} {}", "removed".green(), id);
        } else {
            println!("{} {}", "not found".yellow(), id);
        }
    }
    Ok(())
}

/// Classify one utterance against the persisted registry
async fn cmd_classify(config: &Config, utterance: &str) -> Result<()> {
    debug!(%utterance, "cmd_classify: called");
    let registry = RegistryFile::open(&config.storage.registry)?;
    let snapshot = SceneSnapshot::from_objects(&registry.load().context("Failed to read registry")?);

    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let classifier = Classifier::new(llm, Arc::new(PromptLoader::default()), config.llm.max_tokens);
    let result = classifier
        .classify(utterance, &snapshot, "")
        .await
        .context("Classification failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
