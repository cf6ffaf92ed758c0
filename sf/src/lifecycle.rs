//! Object lifecycle manager
//!
//! Create, move and delete scene objects. A create runs the generation
//! collaborators first and touches the registry only at the very end, so a
//! failure anywhere before that leaves the registry as it was.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::assets::AssetStore;
use crate::domain::{NameCounters, Position, SceneObject, SceneSnapshot};
use crate::error::TaskError;
use crate::generation::{Generators, color_question, image_prompt};
use crate::llm::{CompletionRequest, LlmClient};
use crate::placement::PositionResolver;
use crate::prompts::PromptLoader;
use crate::protocol::{ClientLink, ServerMessage};
use crate::registry::RegistryStore;

const DESCRIBE_SYSTEM_PROMPT: &str =
    "You are an AI assistant designed to help users extract the object they need to create in a VR environment.";

const NAME_SYSTEM_PROMPT: &str =
    "You are an AI assistant designed to help users extract the name of the main object based on their request.";

const UNKNOWN_DESCRIPTION: &str = "unknown object";
const UNKNOWN_COLOR: &str = "unknown";
const FALLBACK_NAME: &str = "object";

/// Strip the quotes and trailing period models like to add
fn clean_reply(reply: &str) -> &str {
    reply
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim_end_matches('.')
        .trim()
}

/// Object description for image generation; never empty
pub fn normalize_description(reply: &str) -> String {
    let cleaned = clean_reply(reply);
    if cleaned.is_empty() {
        UNKNOWN_DESCRIPTION.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Base name for id minting
///
/// Lower case ASCII letters, digits and underscores only. Every run of other
/// characters becomes a single underscore, and leading or trailing
/// underscores are dropped.
pub fn normalize_name(reply: &str) -> String {
    let mut cleaned = String::new();
    for c in clean_reply(reply).to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            cleaned.push(c);
        } else if !cleaned.ends_with('_') {
            cleaned.push('_');
        }
    }
    let cleaned = cleaned.trim_matches('_').to_string();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

pub struct LifecycleManager {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
    generators: Generators,
    assets: Arc<AssetStore>,
    registry: RegistryStore,
    resolver: PositionResolver,
}

impl LifecycleManager {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLoader>,
        max_tokens: u32,
        generators: Generators,
        assets: Arc<AssetStore>,
        registry: RegistryStore,
    ) -> Self {
        let resolver = PositionResolver::new(llm.clone(), prompts.clone(), max_tokens);
        Self {
            llm,
            prompts,
            max_tokens,
            generators,
            assets,
            registry,
            resolver,
        }
    }

    /// Generate a new object from `utterance`, place it, persist and broadcast it
    pub async fn create(
        &self,
        link: &mut ClientLink,
        counters: &mut NameCounters,
        utterance: &str,
        snapshot: &SceneSnapshot,
        preset: Option<Position>,
    ) -> Result<SceneObject, TaskError> {
        debug!(%utterance, ?preset, "create: called");
        let description = normalize_description(&self.ask("describe", DESCRIBE_SYSTEM_PROMPT, utterance).await?);
        let name = normalize_name(&self.ask("name", NAME_SYSTEM_PROMPT, utterance).await?);

        let (id, n) = self.registry.reserve_id(&name, counters.next_start(&name)).await?;
        counters.record(&name, n);
        info!(%id, %name, %description, "Creating object");

        match self
            .build(link, &id, &name, &description, utterance, snapshot, preset)
            .await
        {
            Ok(object) => Ok(object),
            Err(e) => {
                self.registry.release_id(&id).await;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn build(
        &self,
        link: &mut ClientLink,
        id: &str,
        name: &str,
        description: &str,
        utterance: &str,
        snapshot: &SceneSnapshot,
        preset: Option<Position>,
    ) -> Result<SceneObject, TaskError> {
        let image = self.generators.images.generate(&image_prompt(description)).await?;
        self.assets.save_image(id, &image).await?;

        let color = self
            .generators
            .colors
            .answer(&image, &color_question(description))
            .await?;
        let color = if color.trim().is_empty() {
            UNKNOWN_COLOR.to_string()
        } else {
            color
        };

        let mesh = self
            .generators
            .meshes
            .generate(&image, self.generators.mesh_texture)
            .await?;
        let path = self.assets.save_model(id, &mesh).await?;

        let position = match preset {
            Some(position) => position,
            None => self.locate(link, utterance, snapshot).await?,
        };

        let object = SceneObject::new(id, name, color, path, position);
        self.registry.upsert(object.clone()).await?;
        info!(id = %object.id, position = %object.position, "Object created");

        link.send(ServerMessage::NewModel { model: object.clone() }).await?;
        Ok(object)
    }

    /// Move an existing object
    pub async fn manipulate(
        &self,
        link: &mut ClientLink,
        id: &str,
        utterance: &str,
        snapshot: &SceneSnapshot,
        preset: Option<Position>,
    ) -> Result<SceneObject, TaskError> {
        debug!(%id, %utterance, ?preset, "manipulate: called");
        if self.registry.get(id).await?.is_none() {
            return Err(TaskError::ObjectNotFound(id.to_string()));
        }

        let position = match preset {
            Some(position) => position,
            None => self.locate(link, utterance, snapshot).await?,
        };

        // Another session may have deleted it while the client was busy
        let Some(object) = self.registry.update_position(id, position).await? else {
            return Err(TaskError::ObjectNotFound(id.to_string()));
        };
        info!(id = %object.id, position = %object.position, "Object moved");

        link.send(ServerMessage::NewModel { model: object.clone() }).await?;
        Ok(object)
    }

    /// Remove `ids` from the registry; returns the ids that were present
    ///
    /// Every requested id gets a `delete_object`, present or not. Ids that
    /// were absent additionally get an `object_not_found`.
    pub async fn delete(&self, link: &mut ClientLink, ids: &[String]) -> Result<Vec<String>, TaskError> {
        debug!(?ids, "delete: called");
        let removed = self.registry.delete(ids.to_vec()).await?;

        for id in ids {
            link.send(ServerMessage::DeleteObject { object_id: id.clone() }).await?;
            if removed.contains(id) {
                info!(%id, "Object deleted");
            } else {
                warn!(%id, "Delete target not in registry");
                link.send(ServerMessage::ObjectNotFound { object_id: id.clone() })
                    .await?;
            }
        }
        Ok(removed)
    }

    /// Symbolic placement from the model, world coordinates from the client
    async fn locate(
        &self,
        link: &mut ClientLink,
        utterance: &str,
        snapshot: &SceneSnapshot,
    ) -> Result<Position, TaskError> {
        let placement = self.resolver.resolve(utterance, snapshot).await?;
        let position = link.request_world_position(placement).await?;
        debug!(%position, "locate: client calculated position");
        Ok(position)
    }

    /// One single-turn LLM call with a prompt rendered from `template`
    async fn ask(&self, template: &str, system: &str, utterance: &str) -> Result<String, TaskError> {
        let prompt = self.prompts.render(template, &json!({ "task": utterance }))?;
        let response = self
            .llm
            .complete(CompletionRequest::single(system, prompt, self.max_tokens))
            .await?;
        Ok(response.content)
    }
}
