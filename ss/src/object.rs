//! Scene object records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point in world space
///
/// Serializes as `{"x": .., "y": .., "z": ..}`, the shape the viewer uses for
/// entity positions. Deserializes from that shape or from an `"x y z"` string.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "PositionRepr")]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Raise the vertical coordinate to at least `floor`
    pub fn with_floor(self, floor: f64) -> Self {
        Self {
            y: self.y.max(floor),
            ..self
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid position '{input}': expected three numbers")]
pub struct PositionParseError {
    pub input: String,
}

impl FromStr for Position {
    type Err = PositionParseError;

    /// Parse `"x y z"`; commas and surrounding brackets are tolerated
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PositionParseError { input: s.to_string() };
        let cleaned = s.trim().trim_matches(|c| matches!(c, '(' | ')' | '[' | ']' | '{' | '}'));
        let coords = cleaned
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f64>().map_err(|_| err()))
            .collect::<Result<Vec<_>, _>>()?;

        match coords.as_slice() {
            [x, y, z] if x.is_finite() && y.is_finite() && z.is_finite() => Ok(Self::new(*x, *y, *z)),
            _ => Err(err()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PositionRepr {
    Object { x: f64, y: f64, z: f64 },
    Text(String),
}

impl TryFrom<PositionRepr> for Position {
    type Error = PositionParseError;

    fn try_from(repr: PositionRepr) -> Result<Self, Self::Error> {
        match repr {
            PositionRepr::Object { x, y, z } => Ok(Self::new(x, y, z)),
            PositionRepr::Text(text) => text.parse(),
        }
    }
}

/// A placed object, as persisted in the registry and broadcast to clients
///
/// The position is not optional: an object whose placement is still being
/// resolved cannot be represented by this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: String,
    pub name: String,
    #[serde(default = "unknown_color")]
    pub color: String,
    /// URL of the generated glTF asset, relative to the viewer
    pub path: String,
    pub position: Position,
}

fn unknown_color() -> String {
    "unknown".to_string()
}

impl SceneObject {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        color: impl Into<String>,
        path: impl Into<String>,
        position: Position,
    ) -> Self {
        let color = color.into();
        Self {
            id: id.into(),
            name: name.into(),
            color: if color.trim().is_empty() { unknown_color() } else { color },
            path: path.into(),
            position,
        }
    }
}
