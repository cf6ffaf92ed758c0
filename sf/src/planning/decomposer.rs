//! Decomposer - LLM-driven split of a multitask into subtasks
//!
//! decompose → review, repeated until the reviewer's verdict does not
//! contain "negative" or the attempt ceiling is hit.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::llm::{CompletionRequest, LlmClient, extract_json};
use crate::prompts::PromptLoader;

const DECOMPOSE_SYSTEM_PROMPT: &str =
    "You are an AI assistant that splits requests for a 3D scene into ordered single-object actions.";

const REVIEW_SYSTEM_PROMPT: &str = "You are a strict reviewer of task decompositions for a 3D scene editor.";

/// Decomposition output when the model wraps the list in an object
#[derive(Debug, Deserialize)]
struct SubtaskList {
    subtasks: Vec<String>,
}

/// Decomposer splits multitask utterances into ordered subtasks
pub struct Decomposer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
    max_attempts: u32,
}

impl Decomposer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_tokens: u32, max_attempts: u32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Produce a reviewed, ordered list of subtasks for `utterance`
    ///
    /// Each rejected attempt feeds the reviewer's verdict into the next
    /// decomposition. Fails with [`TaskError::DecompositionStalled`] once
    /// `max_attempts` splits have all been rejected.
    pub async fn plan(&self, utterance: &str) -> Result<Vec<String>, TaskError> {
        info!(%utterance, max_attempts = self.max_attempts, "Decomposing multitask");
        let mut feedback: Option<String> = None;

        for attempt in 1..=self.max_attempts {
            let subtasks = self.decompose(utterance, feedback.as_deref()).await?;
            let verdict = self.review(utterance, &subtasks).await?;

            if !is_rejection(&verdict) {
                info!(attempt, count = subtasks.len(), ?subtasks, "Decomposition approved");
                return Ok(subtasks);
            }

            warn!(attempt, %verdict, "Decomposition rejected by reviewer");
            feedback = Some(verdict);
        }

        Err(TaskError::DecompositionStalled {
            attempts: self.max_attempts,
        })
    }

    /// Split `utterance` into subtasks
    pub async fn decompose(&self, utterance: &str, feedback: Option<&str>) -> Result<Vec<String>, TaskError> {
        debug!(%utterance, has_feedback = feedback.is_some(), "decompose: called");
        let prompt = self.prompts.render(
            "decompose",
            &json!({
                "task": utterance,
                "feedback": feedback,
            }),
        )?;
        let response = self
            .llm
            .complete(CompletionRequest::single(DECOMPOSE_SYSTEM_PROMPT, prompt, self.max_tokens))
            .await?;
        parse_subtasks(&response.content)
    }

    /// Ask the reviewer for a verdict on `subtasks`
    pub async fn review(&self, utterance: &str, subtasks: &[String]) -> Result<String, TaskError> {
        debug!(%utterance, count = subtasks.len(), "review: called");
        let prompt = self.prompts.render(
            "review",
            &json!({
                "task": utterance,
                "subtasks": subtasks,
            }),
        )?;
        let response = self
            .llm
            .complete(CompletionRequest::single(REVIEW_SYSTEM_PROMPT, prompt, self.max_tokens))
            .await?;
        Ok(response.content.trim().to_string())
    }
}

/// Whether a reviewer verdict rejects the split
pub fn is_rejection(verdict: &str) -> bool {
    verdict.to_lowercase().contains("negative")
}

/// Parse a decomposition reply: a JSON array of strings, or `{"subtasks": [...]}`
pub fn parse_subtasks(reply: &str) -> Result<Vec<String>, TaskError> {
    let body = extract_json(reply).ok_or_else(|| TaskError::malformed("decomposer", "no JSON in reply"))?;

    let subtasks: Vec<String> = if body.starts_with('[') {
        serde_json::from_str(body)
    } else {
        serde_json::from_str::<SubtaskList>(body).map(|list| list.subtasks)
    }
    .map_err(|e| TaskError::malformed("decomposer", e.to_string()))?;

    let subtasks: Vec<String> = subtasks
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if subtasks.is_empty() {
        return Err(TaskError::malformed("decomposer", "decomposition produced zero subtasks"));
    }
    Ok(subtasks)
}
