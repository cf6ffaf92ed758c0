//! Task-level error taxonomy

use thiserror::Error;

use crate::assets::AssetError;
use crate::generation::GenerationError;
use crate::llm::LlmError;
use crate::prompts::PromptError;
use crate::protocol::ChannelError;
use crate::registry::StoreError;

/// Why a task (one utterance, or one of its subtasks) failed
#[derive(Debug, Error)]
pub enum TaskError {
    /// The model or a service replied with something unusable
    #[error("Malformed response from {source_name}: {message}")]
    MalformedResponse { source_name: &'static str, message: String },

    /// A manipulate/delete target is not in the registry
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Generation service failed: {0}")]
    GenerationServiceFailure(#[from] GenerationError),

    #[error("Decomposition not approved after {attempts} attempts")]
    DecompositionStalled { attempts: u32 },

    #[error("Multitask nesting deeper than {max_depth}")]
    TaskDepthExceeded { max_depth: usize },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Registry error: {0}")]
    Registry(#[from] StoreError),

    #[error("Client channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl TaskError {
    pub fn malformed(source_name: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            source_name,
            message: message.into(),
        }
    }

    /// Whether the session has to end; everything else only ends the task
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::Channel(_))
    }
}
