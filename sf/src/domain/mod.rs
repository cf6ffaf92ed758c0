//! Domain types for SceneForge
//!
//! What the task engine reasons about: the client's scene snapshot, the
//! classifier's structured verdict, symbolic placement requests, per-session
//! name counters and the cross-task conversation context.

mod classification;
mod context;
mod counters;
mod placement;
mod scene;

pub use classification::{Classification, ClassificationResult};
pub use context::ConversationContext;
pub use counters::{NameCounters, first_free_id};
pub use placement::{Direction, PlacementRequest};
pub use scene::{EnvironmentData, SceneNode, SceneSnapshot, USER_NODE_ID};

// Re-export scenestore types for convenience
pub use scenestore::{Position, PositionParseError, SceneObject};
