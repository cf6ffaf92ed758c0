//! Position resolver
//!
//! Turns a spatial instruction into a symbolic [`PlacementRequest`]. The
//! client converts that into world coordinates; nothing here does geometry.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::domain::{Direction, PlacementRequest, SceneSnapshot, USER_NODE_ID};
use crate::error::TaskError;
use crate::llm::{CompletionRequest, LlmClient, extract_json};
use crate::prompts::PromptLoader;

const SYSTEM_PROMPT: &str = "You determine spatial directions from natural language instructions.";

/// Placement as the model writes it; every field may be missing or odd
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlacement {
    reference_id: Option<String>,
    direction: Option<String>,
    distance: Option<Value>,
}

pub struct PositionResolver {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
}

impl PositionResolver {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_tokens: u32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
        }
    }

    /// Derive a placement for `utterance` from the scene
    pub async fn resolve(&self, utterance: &str, snapshot: &SceneSnapshot) -> Result<PlacementRequest, TaskError> {
        debug!(%utterance, nodes = snapshot.len(), "resolve: called");
        let prompt = self.prompts.render(
            "position",
            &json!({
                "task": utterance,
                "scene": snapshot.prompt_lines(),
            }),
        )?;
        let response = self
            .llm
            .complete(CompletionRequest::single(SYSTEM_PROMPT, prompt, self.max_tokens))
            .await?;

        let placement = parse_placement(&response.content)?;
        info!(
            reference_id = %placement.reference_id,
            direction = %placement.direction,
            distance = placement.distance,
            "Resolved placement"
        );
        Ok(placement)
    }
}

/// Parse a position reply, filling in the defaults
///
/// A missing reference means the user; a missing direction means in front;
/// a missing or non-positive distance takes the per-direction default.
pub fn parse_placement(reply: &str) -> Result<PlacementRequest, TaskError> {
    let body = extract_json(reply).ok_or_else(|| TaskError::malformed("position resolver", "no JSON in reply"))?;
    let raw: RawPlacement =
        serde_json::from_str(body).map_err(|e| TaskError::malformed("position resolver", e.to_string()))?;

    let reference_id = raw
        .reference_id
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| USER_NODE_ID.to_string());

    let direction = match raw.direction.as_deref().map(str::trim) {
        None | Some("") => Direction::Front,
        Some(d) => d
            .parse::<Direction>()
            .map_err(|e| TaskError::malformed("position resolver", e))?,
    };

    let distance = match raw.distance {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = match &value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().trim_end_matches('m').trim().parse().ok(),
                _ => None,
            };
            match parsed {
                Some(d) if d.is_finite() && d > 0.0 => Some(d),
                _ => {
                    warn!(%value, %direction, "Unusable distance, using default");
                    None
                }
            }
        }
    };

    Ok(PlacementRequest::new(reference_id, direction, distance))
}
