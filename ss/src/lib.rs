//! SceneStore - persisted registry of scene objects
//!
//! The registry is a single JSON document holding every object currently in
//! the scene. It is always read in full, mutated in memory and written back
//! in full. Writes go to a temp file in the same directory that is then
//! renamed over the registry, so a crash mid-write never leaves a truncated
//! file behind. An advisory lock file serializes read-modify-write cycles
//! across processes.
//!
//! # Modules
//!
//! - [`object`] - `SceneObject` and `Position`
//! - [`store`] - `RegistryFile`, the on-disk registry
//! - [`error`] - `RegistryError`

pub mod error;
pub mod object;
pub mod store;

pub use error::RegistryError;
pub use object::{Position, PositionParseError, SceneObject};
pub use store::{RegistryFile, UpsertOutcome};
