//! Registry actor messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use scenestore::{Position, RegistryError, SceneObject, UpsertOutcome};

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Registry actor is not running")]
    ChannelError,
}

/// Response from registry operations
pub type StoreResponse<T> = Result<T, StoreError>;

/// Commands sent to the RegistryStore actor
#[derive(Debug)]
pub enum RegistryCommand {
    LoadAll {
        reply: oneshot::Sender<StoreResponse<Vec<SceneObject>>>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<StoreResponse<Option<SceneObject>>>,
    },
    Upsert {
        object: SceneObject,
        reply: oneshot::Sender<StoreResponse<UpsertOutcome>>,
    },
    UpdatePosition {
        id: String,
        position: Position,
        reply: oneshot::Sender<StoreResponse<Option<SceneObject>>>,
    },
    Delete {
        ids: Vec<String>,
        reply: oneshot::Sender<StoreResponse<Vec<String>>>,
    },

    // Id reservation for in-flight creates
    ReserveId {
        base: String,
        start: u64,
        reply: oneshot::Sender<StoreResponse<(String, u64)>>,
    },
    ReleaseId {
        id: String,
    },

    Shutdown,
}
