//! SceneForge - voice-driven scene editing
//!
//! A websocket server that turns spoken requests into edits of a shared 3D
//! scene: it classifies each utterance, asks the client to point at things
//! when the request is ambiguous, and creates, moves or deletes objects in
//! the persisted registry.

pub mod assets;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod disambiguation;
pub mod domain;
pub mod engine;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod llm;
pub mod placement;
pub mod planning;
pub mod prompts;
pub mod protocol;
pub mod registry;
pub mod server;

pub use config::Config;
pub use error::TaskError;
