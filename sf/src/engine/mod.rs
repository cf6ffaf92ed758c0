//! Task engine
//!
//! Drives one utterance from classification to scene mutations.

mod orchestrator;

pub use orchestrator::Orchestrator;
