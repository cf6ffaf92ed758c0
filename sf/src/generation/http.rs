//! reqwest-backed generation clients

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ColorExtractor, GenerationError, ImageGenerator, MeshGenerator, Transcriber};
use crate::config::EndpointConfig;

/// One configured endpoint with its own timeout
struct Endpoint {
    service: &'static str,
    url: String,
    http: Client,
}

impl Endpoint {
    fn new(service: &'static str, config: &EndpointConfig) -> Result<Self, GenerationError> {
        debug!(%service, url = %config.url, timeout_ms = config.timeout_ms, "Endpoint::new: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|source| GenerationError::Network { service, source })?;
        Ok(Self {
            service,
            url: config.url.clone(),
            http,
        })
    }

    fn map_send_error(&self, source: reqwest::Error) -> GenerationError {
        if source.is_timeout() {
            GenerationError::Timeout { service: self.service }
        } else {
            GenerationError::Network {
                service: self.service,
                source,
            }
        }
    }

    /// Reject non-success statuses, keeping the body for the log
    async fn check(&self, response: Response) -> Result<Response, GenerationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        debug!(service = self.service, %status, "check: non-success status");
        Err(GenerationError::Status {
            service: self.service,
            status: status.as_u16(),
            message,
        })
    }

    async fn post_json(&self, body: &serde_json::Value) -> Result<Response, GenerationError> {
        let response = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.check(response).await
    }

    async fn bytes(&self, response: Response) -> Result<Vec<u8>, GenerationError> {
        let bytes = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        if bytes.is_empty() {
            return Err(GenerationError::InvalidPayload {
                service: self.service,
                message: "empty body".to_string(),
            });
        }
        Ok(bytes.to_vec())
    }

    async fn json<T: for<'de> Deserialize<'de>>(&self, response: Response) -> Result<T, GenerationError> {
        response.json().await.map_err(|e| GenerationError::InvalidPayload {
            service: self.service,
            message: e.to_string(),
        })
    }
}

/// Speech-to-text over HTTP: raw audio in, `{"text": ...}` out
pub struct HttpTranscriber {
    endpoint: Endpoint,
}

impl HttpTranscriber {
    pub fn new(config: &EndpointConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            endpoint: Endpoint::new("transcription", config)?,
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionReply {
    text: String,
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, GenerationError> {
        debug!(bytes = audio.len(), "transcribe: called");
        let ep = &self.endpoint;
        let response = ep
            .http
            .post(&ep.url)
            .header("content-type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| ep.map_send_error(e))?;
        let reply: TranscriptionReply = ep.json(ep.check(response).await?).await?;
        Ok(reply.text.trim().to_string())
    }
}

/// Text-to-image over HTTP: `{"prompt": ...}` in, PNG bytes out
pub struct HttpImageGenerator {
    endpoint: Endpoint,
}

impl HttpImageGenerator {
    pub fn new(config: &EndpointConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            endpoint: Endpoint::new("image", config)?,
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        debug!(%prompt, "ImageGenerator::generate: called");
        let response = self.endpoint.post_json(&serde_json::json!({ "prompt": prompt })).await?;
        let image = self.endpoint.bytes(response).await?;
        info!(bytes = image.len(), "Image generated");
        Ok(image)
    }
}

/// Image-to-3D over HTTP: `{"image": <base64>, "texture": bool}` in, glb out
pub struct HttpMeshGenerator {
    endpoint: Endpoint,
}

impl HttpMeshGenerator {
    pub fn new(config: &EndpointConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            endpoint: Endpoint::new("mesh", config)?,
        })
    }
}

#[async_trait]
impl MeshGenerator for HttpMeshGenerator {
    async fn generate(&self, image: &[u8], texture: bool) -> Result<Vec<u8>, GenerationError> {
        debug!(bytes = image.len(), %texture, "MeshGenerator::generate: called");
        let body = serde_json::json!({
            "image": STANDARD.encode(image),
            "texture": texture,
        });
        let response = self.endpoint.post_json(&body).await?;
        let mesh = self.endpoint.bytes(response).await?;
        info!(bytes = mesh.len(), "Mesh generated");
        Ok(mesh)
    }
}

/// Visual question answering over HTTP: `{"image", "question"}` in, `{"answer"}` out
pub struct HttpColorExtractor {
    endpoint: Endpoint,
}

impl HttpColorExtractor {
    pub fn new(config: &EndpointConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            endpoint: Endpoint::new("color", config)?,
        })
    }
}

#[derive(Deserialize)]
struct AnswerReply {
    #[serde(default)]
    answer: String,
}

#[async_trait]
impl ColorExtractor for HttpColorExtractor {
    async fn answer(&self, image: &[u8], question: &str) -> Result<String, GenerationError> {
        debug!(%question, "answer: called");
        let body = serde_json::json!({
            "image": STANDARD.encode(image),
            "question": question,
        });
        let response = self.endpoint.post_json(&body).await?;
        let reply: AnswerReply = self.endpoint.json(response).await?;
        Ok(reply.answer.trim().to_string())
    }
}
