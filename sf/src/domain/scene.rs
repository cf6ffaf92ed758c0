//! Scene snapshot as reported by the client

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Position, SceneObject};

/// Node id the client uses for the person wearing the headset
pub const USER_NODE_ID: &str = "user";

/// One entry of the client's semantic graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<serde_json::Value>,
}

impl From<&SceneObject> for SceneNode {
    fn from(obj: &SceneObject) -> Self {
        Self {
            id: obj.id.clone(),
            name: obj.name.clone(),
            color: Some(obj.color.clone()),
            position: Some(obj.position),
            rotation: None,
        }
    }
}

/// Read-only view of the scene for one task
///
/// Replaced wholesale by `environment_data` messages between tasks; the
/// engine never edits it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneSnapshot {
    nodes: Vec<SceneNode>,
}

impl SceneSnapshot {
    pub fn new(nodes: Vec<SceneNode>) -> Self {
        Self { nodes }
    }

    /// Build a snapshot from persisted registry records
    pub fn from_objects(objects: &[SceneObject]) -> Self {
        Self::new(objects.iter().map(SceneNode::from).collect())
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// One compact JSON line per node, as fed to the prompts
    pub fn prompt_lines(&self) -> Vec<String> {
        debug!(nodes = self.nodes.len(), "prompt_lines: called");
        self.nodes
            .iter()
            .filter_map(|node| serde_json::to_string(node).ok())
            .collect()
    }
}

/// Payload of an `environment_data` message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentData {
    #[serde(rename = "semanticGraph", default)]
    pub semantic_graph: SceneSnapshot,

    #[serde(rename = "nameCounters", default)]
    pub name_counters: HashMap<String, u64>,
}
