//! LLM client module
//!
//! Every caller in this crate (classification, decomposition, review,
//! placement, naming) speaks to one OpenAI-compatible chat-completions
//! endpoint through the [`LlmClient`] trait. Replies carry no schema
//! guarantee; callers use [`extract_json`] and parse defensively.

use std::sync::Arc;

use tracing::debug;

mod chat;
pub mod client;
mod error;
mod types;

pub use chat::ChatCompletionsClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};

use crate::config::LlmConfig;

/// Create the configured LLM client
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(model = %config.model, base_url = %config.base_url, "create_client: called");
    Ok(Arc::new(ChatCompletionsClient::from_config(config)?))
}

/// Pull the JSON payload out of a model reply
///
/// Models often wrap JSON in a ```json fence or surround it with prose. This
/// returns the slice from the first opening brace or bracket to the matching
/// last closing one, or `None` when there is nothing JSON-shaped.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    if end < start {
        debug!("extract_json: closing delimiter precedes opening");
        return None;
    }
    Some(&text[start..=end])
}
