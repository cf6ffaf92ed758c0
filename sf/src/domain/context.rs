//! Cross-task conversation context

use std::fmt;

use super::Position;

/// Append-only log of what earlier subtasks of one utterance did
///
/// Fed back to the classifier so later subtasks can refer to objects the
/// earlier ones created or moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationContext {
    lines: Vec<String>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_created(&mut self, id: &str, position: &Position) {
        self.lines.push(format!(
            "Created object in previous task: {{'id': {}, 'position': {}}}",
            id, position
        ));
    }

    pub fn record_manipulated(&mut self, id: &str, position: &Position) {
        self.lines.push(format!(
            "Manipulated object in previous task: {{'id': {}, 'position': {}}}",
            id, position
        ));
    }

    pub fn record_deleted(&mut self, id: &str) {
        self.lines.push(format!("Deleted object {} in previous task.", id));
    }

    pub fn record_not_found(&mut self, id: &str) {
        self.lines.push(format!("Object {} was not found in previous task.", id));
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for ConversationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
