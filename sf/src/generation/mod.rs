//! Generation collaborators
//!
//! Speech-to-text, text-to-image, image-to-3D and visual question answering
//! run as separate services. The engine only sees these traits; `http`
//! provides the reqwest-backed implementations.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

mod http;

pub use http::{HttpColorExtractor, HttpImageGenerator, HttpMeshGenerator, HttpTranscriber};

use crate::config::ServicesConfig;

/// Errors from a generation service
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{service} returned {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} unreachable: {source}")]
    Network {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} timed out")]
    Timeout { service: &'static str },

    #[error("{service} returned an unexpected payload: {message}")]
    InvalidPayload { service: &'static str, message: String },
}

impl GenerationError {
    pub fn service(&self) -> &'static str {
        match self {
            Self::Status { service, .. }
            | Self::Network { service, .. }
            | Self::Timeout { service }
            | Self::InvalidPayload { service, .. } => service,
        }
    }
}

/// Speech-to-text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, GenerationError>;
}

/// Text-to-image
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Render `prompt`, returning PNG bytes
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, GenerationError>;
}

/// Image-to-3D reconstruction
#[async_trait]
pub trait MeshGenerator: Send + Sync {
    /// Reconstruct a binary glTF mesh from a PNG
    async fn generate(&self, image: &[u8], texture: bool) -> Result<Vec<u8>, GenerationError>;
}

/// Visual question answering
#[async_trait]
pub trait ColorExtractor: Send + Sync {
    async fn answer(&self, image: &[u8], question: &str) -> Result<String, GenerationError>;
}

/// The set of collaborators one server instance uses
#[derive(Clone)]
pub struct Generators {
    pub transcriber: Arc<dyn Transcriber>,
    pub images: Arc<dyn ImageGenerator>,
    pub meshes: Arc<dyn MeshGenerator>,
    pub colors: Arc<dyn ColorExtractor>,
    /// Ask the mesh service for textured output
    pub mesh_texture: bool,
}

impl Generators {
    /// HTTP clients for every configured service
    pub fn from_config(config: &ServicesConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            transcriber: Arc::new(HttpTranscriber::new(&config.transcription)?),
            images: Arc::new(HttpImageGenerator::new(&config.image)?),
            meshes: Arc::new(HttpMeshGenerator::new(&config.mesh)?),
            colors: Arc::new(HttpColorExtractor::new(&config.color)?),
            mesh_texture: config.mesh_texture,
        })
    }
}

/// Prompt sent to the image service for an object description
pub fn image_prompt(description: &str) -> String {
    format!(
        "A stylized 3D render of a single entire {}, centered, non-cropped, isolated on a plain background, realistic, high contrast game asset style, VR-ready, front 3/4 view.",
        description
    )
}

/// Question sent to the color service for an object description
pub fn color_question(description: &str) -> String {
    format!("What color is the {} in the image?", description)
}
