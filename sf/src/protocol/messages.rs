//! Inbound and outbound message types

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, EnvironmentData, PlacementRequest, Position, SceneObject};

/// Text messages the client sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Latest scene snapshot and name counters, cached for the next task
    EnvironmentData(EnvironmentData),

    /// Reply to `calculate_position`
    WorldPosition { position: Position },

    /// Reply to `start_pointing_object`
    PointingObject { object_id: String },

    /// Reply to `start_pointing_location`
    PointingLocation { position: Position },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EnvironmentData(_) => "environment_data",
            Self::WorldPosition { .. } => "world_position",
            Self::PointingObject { .. } => "pointing_object",
            Self::PointingLocation { .. } => "pointing_location",
        }
    }
}

/// Anything that can arrive from the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Message(ClientMessage),
    /// Raw audio frame, opaque to the server
    Audio(Vec<u8>),
}

/// Messages the server sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Transcription {
        transcription: String,
    },
    CalculatePosition {
        reference_id: String,
        direction: Direction,
        distance: f64,
    },
    StartPointingObject {
        disambiguation_phrase: String,
        disambiguation_candidates: Vec<String>,
    },
    StartPointingLocation {
        spatial_phrase: String,
    },
    NewModel {
        model: SceneObject,
    },
    DeleteObject {
        object_id: String,
    },
    ObjectNotFound {
        object_id: String,
    },
    TaskFailed {
        error: String,
    },
}

impl From<PlacementRequest> for ServerMessage {
    fn from(req: PlacementRequest) -> Self {
        Self::CalculatePosition {
            reference_id: req.reference_id,
            direction: req.direction,
            distance: req.distance,
        }
    }
}
