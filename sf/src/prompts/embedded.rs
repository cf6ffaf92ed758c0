//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Intent classification (create / manipulate / delete / multitask)
pub const CLASSIFY: &str = include_str!("../../prompts/classify.pmt");

/// Short object description used for image generation
pub const DESCRIBE: &str = include_str!("../../prompts/describe.pmt");

/// Bare noun name used to mint object ids
pub const NAME: &str = include_str!("../../prompts/name.pmt");

/// Spatial instruction to symbolic placement
pub const POSITION: &str = include_str!("../../prompts/position.pmt");

/// Multitask split into ordered subtasks
pub const DECOMPOSE: &str = include_str!("../../prompts/decompose.pmt");

/// Reviewer verdict on a split
pub const REVIEW: &str = include_str!("../../prompts/review.pmt");

/// Standalone model-viewer page for a generated asset
pub const PREVIEW: &str = include_str!("../../prompts/preview.html");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "classify" => Some(CLASSIFY),
        "describe" => Some(DESCRIBE),
        "name" => Some(NAME),
        "position" => Some(POSITION),
        "decompose" => Some(DECOMPOSE),
        "review" => Some(REVIEW),
        "preview" => Some(PREVIEW),
        _ => None,
    };
    if found.is_none() {
        debug!("get_embedded: no match found");
    }
    found
}
