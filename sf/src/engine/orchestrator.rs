//! Orchestrator - the per-utterance task driver
//!
//! classify → clarify if needed → reclassify → dispatch. Multitasks expand
//! into subtasks on an explicit work list, run depth-first in the order the
//! decomposer returned them, with the conversation context threaded through.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::assets::AssetStore;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::disambiguation::clarify;
use crate::domain::{Classification, ConversationContext, NameCounters, Position, SceneSnapshot};
use crate::error::TaskError;
use crate::generation::Generators;
use crate::lifecycle::LifecycleManager;
use crate::llm::LlmClient;
use crate::planning::Decomposer;
use crate::prompts::PromptLoader;
use crate::protocol::{ClientLink, ServerMessage};
use crate::registry::RegistryStore;

/// One pending task on the work list
#[derive(Debug, Clone)]
struct WorkItem {
    utterance: String,
    preset: Option<Position>,
    /// Number of multitasks this item is nested inside
    depth: usize,
}

pub struct Orchestrator {
    classifier: Classifier,
    decomposer: Decomposer,
    lifecycle: LifecycleManager,
    max_task_depth: usize,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLoader>,
        generators: Generators,
        assets: Arc<AssetStore>,
        registry: RegistryStore,
    ) -> Self {
        debug!("Orchestrator::new: called");
        let max_tokens = config.llm.max_tokens;
        Self {
            classifier: Classifier::new(llm.clone(), prompts.clone(), max_tokens),
            decomposer: Decomposer::new(
                llm.clone(),
                prompts.clone(),
                max_tokens,
                config.planning.max_review_attempts,
            ),
            lifecycle: LifecycleManager::new(llm, prompts, max_tokens, generators, assets, registry),
            max_task_depth: config.planning.max_task_depth,
        }
    }

    /// Handle one top-level utterance against the link's latest environment
    ///
    /// The snapshot is fixed for the whole utterance. Returns the context
    /// accumulated across subtasks; it is discarded by the caller.
    pub async fn handle_utterance(
        &self,
        link: &mut ClientLink,
        counters: &mut NameCounters,
        utterance: &str,
    ) -> Result<ConversationContext, TaskError> {
        info!(%utterance, "Handling utterance");
        let environment = link.environment().clone();
        counters.merge(&environment.name_counters);
        let snapshot = environment.semantic_graph;

        let mut context = ConversationContext::new();
        let mut work = VecDeque::from([WorkItem {
            utterance: utterance.to_string(),
            preset: None,
            depth: 0,
        }]);

        while let Some(item) = work.pop_front() {
            let subtasks = self.handle_item(link, counters, &snapshot, &mut context, item).await?;
            for subtask in subtasks.into_iter().rev() {
                work.push_front(subtask);
            }
        }

        debug!(lines = context.lines().len(), "handle_utterance: finished");
        Ok(context)
    }

    /// Run one work item; a multitask returns its subtasks instead
    async fn handle_item(
        &self,
        link: &mut ClientLink,
        counters: &mut NameCounters,
        snapshot: &SceneSnapshot,
        context: &mut ConversationContext,
        item: WorkItem,
    ) -> Result<Vec<WorkItem>, TaskError> {
        debug!(utterance = %item.utterance, depth = item.depth, "handle_item: called");
        let prior = context.to_string();
        let mut result = self.classifier.classify(&item.utterance, snapshot, &prior).await?;

        if result.needs_clarification() {
            let transcript = clarify(link, &result).await?;
            let clarification = format!("{}{}", prior, transcript);
            result = self
                .classifier
                .classify(&item.utterance, snapshot, &clarification)
                .await?;
            if result.needs_clarification() {
                warn!("Classifier still asks for clarification after one round, proceeding");
            }
        }

        let preset = match result.final_position() {
            Ok(Some(position)) => Some(position),
            Ok(None) => item.preset,
            Err(e) => return Err(TaskError::malformed("classifier", e.to_string())),
        };
        let utterance = result.final_action().unwrap_or(&item.utterance).to_string();

        match &result.classification {
            Classification::Multitask => {
                if item.depth >= self.max_task_depth {
                    return Err(TaskError::TaskDepthExceeded {
                        max_depth: self.max_task_depth,
                    });
                }
                let subtasks = self.decomposer.plan(&utterance).await?;
                return Ok(subtasks
                    .into_iter()
                    .map(|subtask| WorkItem {
                        utterance: subtask,
                        preset,
                        depth: item.depth + 1,
                    })
                    .collect());
            }

            Classification::Create => {
                let object = self
                    .lifecycle
                    .create(link, counters, &utterance, snapshot, preset)
                    .await?;
                context.record_created(&object.id, &object.position);
            }

            Classification::Manipulate => {
                if result.manipulate_objects.is_empty() {
                    warn!(%utterance, "Manipulate task names no objects");
                }
                for id in &result.manipulate_objects {
                    match self.lifecycle.manipulate(link, id, &utterance, snapshot, preset).await {
                        Ok(object) => context.record_manipulated(&object.id, &object.position),
                        Err(TaskError::ObjectNotFound(missing)) => {
                            warn!(id = %missing, "Manipulate target not in registry");
                            link.send(ServerMessage::ObjectNotFound { object_id: missing }).await?;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            Classification::Delete => {
                if result.delete_objects.is_empty() {
                    warn!(%utterance, "Delete task names no objects");
                }
                let removed = self.lifecycle.delete(link, &result.delete_objects).await?;
                for id in &result.delete_objects {
                    if removed.contains(id) {
                        context.record_deleted(id);
                    } else {
                        context.record_not_found(id);
                    }
                }
            }

            Classification::Other(kind) => {
                warn!(classification = %kind, %utterance, "Unhandled classification, skipping");
            }
        }

        Ok(Vec::new())
    }
}
