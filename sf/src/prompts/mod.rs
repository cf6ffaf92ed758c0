//! Prompt Template System
//!
//! Loads and renders the fixed prompt contracts the task engine sends to the
//! chat-completions endpoint, plus the HTML preview page for generated assets.
//!
//! Template loading chain:
//! 1. `.sceneforge/prompts/{name}.pmt` (user override)
//! 2. `prompts/{name}.pmt` (repo default)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{PromptError, PromptLoader};
