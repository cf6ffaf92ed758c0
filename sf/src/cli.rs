//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// SceneForge - voice-driven scene editing server
#[derive(Parser)]
#[command(
    name = "sf",
    about = "Voice-driven scene editing over websockets",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the websocket server
    Serve {
        /// Address to bind, overriding server.bind from config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Inspect or edit the persisted registry
    Registry {
        #[command(subcommand)]
        command: RegistryAction,
    },

    /// Classify an utterance against the registry and print the result
    Classify {
        /// The utterance, e.g. "move the chair next to the table"
        utterance: String,
    },
}

/// Registry subcommands
#[derive(Debug, Subcommand)]
pub enum RegistryAction {
    /// List every persisted object
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove objects by id
    Remove {
        /// Object ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

/// Where `serve` writes its log
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sceneforge")
        .join("logs")
        .join("sceneforge.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use text or json", s))
            }
        }
    }
}
