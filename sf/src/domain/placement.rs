//! Symbolic placement requests

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::USER_NODE_ID;

/// Direction relative to the reference object or the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Front,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Distance used when the instruction gives none
    pub fn default_distance(self) -> f64 {
        match self {
            Self::Up | Self::Down => 0.5,
            _ => 1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "front" => Ok(Self::Front),
            "back" | "behind" => Ok(Self::Back),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "up" | "above" | "on" => Ok(Self::Up),
            "down" | "below" | "under" => Ok(Self::Down),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Where to put an object, relative to something the client can locate
///
/// The client turns this into world coordinates; the server never does
/// geometry itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    /// An object id, or `user`
    pub reference_id: String,
    pub direction: Direction,
    /// Meters, always positive
    pub distance: f64,
}

impl PlacementRequest {
    pub fn new(reference_id: impl Into<String>, direction: Direction, distance: Option<f64>) -> Self {
        let distance = distance
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or_else(|| direction.default_distance());
        Self {
            reference_id: reference_id.into(),
            direction,
            distance,
        }
    }

    /// One meter in front of the user
    pub fn in_front_of_user() -> Self {
        Self::new(USER_NODE_ID, Direction::Front, None)
    }
}
