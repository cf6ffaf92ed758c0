//! Intent classifier
//!
//! Wraps the chat-completions endpoint with the fixed classification prompt,
//! turning (utterance, scene snapshot, clarification) into a
//! [`ClassificationResult`]. Stateless between calls.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::domain::{ClassificationResult, SceneSnapshot};
use crate::error::TaskError;
use crate::llm::{CompletionRequest, LlmClient, extract_json};
use crate::prompts::PromptLoader;

const SYSTEM_PROMPT: &str =
    "You are an AI assistant designed to classify tasks based on user requests and the current scene.";

pub struct Classifier {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_tokens: u32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
        }
    }

    /// Classify one utterance against the scene
    ///
    /// `clarification` carries the conversation context and, after a
    /// clarification round, the transcript of what the user pointed at.
    /// An unparseable reply is a [`TaskError::MalformedResponse`]; it is not
    /// retried.
    pub async fn classify(
        &self,
        utterance: &str,
        snapshot: &SceneSnapshot,
        clarification: &str,
    ) -> Result<ClassificationResult, TaskError> {
        debug!(%utterance, nodes = snapshot.len(), clarification_len = clarification.len(), "classify: called");
        let prompt = self.prompts.render(
            "classify",
            &json!({
                "task": utterance,
                "scene": snapshot.prompt_lines(),
                "clarification": clarification,
            }),
        )?;

        let response = self
            .llm
            .complete(CompletionRequest::single(SYSTEM_PROMPT, prompt, self.max_tokens))
            .await?;

        let result = parse_classification(&response.content)?;
        info!(
            classification = %result.classification,
            requires_disambiguation = result.requires_disambiguation,
            requires_pointing = result.requires_pointing,
            "Classified task"
        );
        Ok(result)
    }
}

/// Parse a classifier reply
pub fn parse_classification(reply: &str) -> Result<ClassificationResult, TaskError> {
    let body = extract_json(reply).ok_or_else(|| TaskError::malformed("classifier", "no JSON object in reply"))?;
    if !body.starts_with('{') {
        return Err(TaskError::malformed("classifier", "expected a JSON object"));
    }
    serde_json::from_str(body).map_err(|e| TaskError::malformed("classifier", e.to_string()))
}
