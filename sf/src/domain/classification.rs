//! Structured classifier verdict

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::{Position, PositionParseError};

/// What kind of task an utterance is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Classification {
    Create,
    Manipulate,
    Delete,
    Multitask,
    /// Anything else the model came up with; logged and skipped
    Other(String),
}

impl From<String> for Classification {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "create" => Self::Create,
            "manipulate" => Self::Manipulate,
            "delete" => Self::Delete,
            "multitask" => Self::Multitask,
            _ => Self::Other(s),
        }
    }
}

impl From<Classification> for String {
    fn from(c: Classification) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Manipulate => write!(f, "manipulate"),
            Self::Delete => write!(f, "delete"),
            Self::Multitask => write!(f, "multitask"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

/// The classifier's reply, parsed leniently
///
/// Missing fields take their defaults; `null` where a string is expected
/// reads as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationResult {
    pub classification: Classification,
    pub manipulate_objects: Vec<String>,
    pub delete_objects: Vec<String>,
    pub requires_disambiguation: bool,
    pub disambiguation_candidates: Vec<String>,
    pub disambiguation_phrases: Vec<String>,
    pub requires_pointing: bool,
    pub spatial_phrases: Vec<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub final_action: String,
    #[serde(deserialize_with = "lenient_text")]
    pub final_position: String,
}

impl ClassificationResult {
    /// Whether a clarification round with the client is needed
    pub fn needs_clarification(&self) -> bool {
        self.requires_disambiguation || self.requires_pointing
    }

    /// Rewritten utterance, if the classifier produced one
    pub fn final_action(&self) -> Option<&str> {
        let action = self.final_action.trim();
        (!action.is_empty()).then_some(action)
    }

    /// Resolved coordinate, if the classifier produced one
    pub fn final_position(&self) -> Result<Option<Position>, PositionParseError> {
        let text = self.final_position.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse().map(Some)
    }
}

/// Accept a string, `null`, a number, or an `{x, y, z}` object as text
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        serde_json::Value::Object(ref map) if map.contains_key("x") => {
            let coord = |k: &str| map.get(k).map(|v| v.to_string()).unwrap_or_default();
            format!("{} {} {}", coord("x"), coord("y"), coord("z"))
        }
        other => other.to_string(),
    })
}
