//! Multitask planning
//!
//! Splits a multi-part utterance into ordered single-object subtasks and
//! has a reviewer approve the split before anything runs.

mod decomposer;

pub use decomposer::{Decomposer, is_rejection, parse_subtasks};
