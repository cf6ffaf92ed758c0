//! SceneForge configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main SceneForge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Websocket server settings
    pub server: ServerConfig,

    /// Chat-completions endpoint used for classification, decomposition and placement
    pub llm: LlmConfig,

    /// Generation collaborators (ASR, text-to-image, image-to-3D, color)
    pub services: ServicesConfig,

    /// Registry and asset locations
    pub storage: StorageConfig,

    /// Multitask decomposition limits
    pub planning: PlanningConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.llm.base_url.trim().is_empty() {
            return Err(eyre::eyre!("llm.base-url must not be empty"));
        }
        for (name, url) in [
            ("transcription", &self.services.transcription.url),
            ("image", &self.services.image.url),
            ("mesh", &self.services.mesh.url),
            ("color", &self.services.color.url),
        ] {
            if url.trim().is_empty() {
                return Err(eyre::eyre!("services.{}.url must not be empty", name));
            }
        }
        if self.planning.max_review_attempts == 0 {
            return Err(eyre::eyre!("planning.max-review-attempts must be at least 1"));
        }
        if let Some(env) = &self.llm.api_key_env
            && std::env::var(env).is_err()
        {
            return Err(eyre::eyre!("LLM API key not found. Set the {} environment variable.", env));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .sceneforge.yml
        let local_config = PathBuf::from(".sceneforge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/sceneforge/sceneforge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sceneforge").join("sceneforge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Websocket server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. 0.0.0.0:8000
    pub bind: String,

    /// Capacity of the per-session inbound and outbound message queues
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            channel_capacity: 256,
        }
    }
}

/// Chat-completions endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier sent with every request
    pub model: String,

    /// Base URL; requests go to `{base-url}/v1/chat/completions`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable holding a bearer token, if the endpoint needs one
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-32b-instruct".to_string(),
            base_url: "http://localhost:8080".to_string(),
            api_key_env: None,
            max_tokens: 2048,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key, if one is configured
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env.as_ref().and_then(|env| std::env::var(env).ok())
    }
}

/// One generation collaborator endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl EndpointConfig {
    fn new(url: &str, timeout_ms: u64) -> Self {
        Self {
            url: url.to_string(),
            timeout_ms,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::new("", 120_000)
    }
}

/// Generation collaborator endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Speech-to-text
    pub transcription: EndpointConfig,

    /// Text-to-image
    pub image: EndpointConfig,

    /// Image-to-3D reconstruction
    pub mesh: EndpointConfig,

    /// Whether to ask the reconstruction service for textured meshes
    #[serde(rename = "mesh-texture")]
    pub mesh_texture: bool,

    /// Visual question answering, used to read the object's color
    pub color: EndpointConfig,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            transcription: EndpointConfig::new("http://localhost:8082/transcribe", 120_000),
            image: EndpointConfig::new("http://localhost:8083/generate", 300_000),
            mesh: EndpointConfig::new("http://localhost:8081/generate", 900_000),
            mesh_texture: true,
            color: EndpointConfig::new("http://localhost:8084/answer", 120_000),
        }
    }
}

/// Registry and asset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Registry document (JSON array of scene objects)
    pub registry: PathBuf,

    /// Generated reference images
    #[serde(rename = "images-dir")]
    pub images_dir: PathBuf,

    /// Generated glTF binaries
    #[serde(rename = "models-dir")]
    pub models_dir: PathBuf,

    /// Standalone HTML preview pages
    #[serde(rename = "previews-dir")]
    pub previews_dir: PathBuf,

    /// Prefix for the asset URL the viewer loads
    #[serde(rename = "model-url-prefix")]
    pub model_url_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = PathBuf::from("data");
        Self {
            registry: root.join("models.json"),
            images_dir: root.join("images"),
            models_dir: root.join("models"),
            previews_dir: root.join("html"),
            model_url_prefix: "../../models".to_string(),
        }
    }
}

/// Multitask decomposition limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Decompose/review rounds before giving up
    #[serde(rename = "max-review-attempts")]
    pub max_review_attempts: u32,

    /// How deeply a multitask may nest inside another multitask
    #[serde(rename = "max-task-depth")]
    pub max_task_depth: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_review_attempts: 3,
            max_task_depth: 4,
        }
    }
}
