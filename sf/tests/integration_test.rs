//! Integration tests for SceneForge
//!
//! These drive the task engine end to end with a scripted LLM, stub
//! generation services and an in-memory client on the other end of the link.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use sceneforge::assets::AssetStore;
use sceneforge::config::Config;
use sceneforge::domain::{Direction, EnvironmentData, NameCounters, Position, SceneObject, SceneSnapshot};
use sceneforge::engine::Orchestrator;
use sceneforge::error::TaskError;
use sceneforge::generation::{ColorExtractor, GenerationError, Generators, ImageGenerator, MeshGenerator, Transcriber};
use sceneforge::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
use sceneforge::prompts::PromptLoader;
use sceneforge::protocol::{ClientEvent, ClientLink, ClientMessage, ServerMessage};
use sceneforge::registry::RegistryStore;
use sceneforge::server::Session;

// =============================================================================
// Test doubles
// =============================================================================

/// Replays canned replies in order and keeps every user prompt
struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Some(msg) = request.messages.last() {
            self.prompts.lock().unwrap().push(msg.content.clone());
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .map(CompletionResponse::text)
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }
}

struct StubTranscriber(String);

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, GenerationError> {
        Ok(self.0.clone())
    }
}

struct StubImages;

#[async_trait]
impl ImageGenerator for StubImages {
    async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, GenerationError> {
        Ok(b"png-bytes".to_vec())
    }
}

struct StubMeshes {
    fail: bool,
}

#[async_trait]
impl MeshGenerator for StubMeshes {
    async fn generate(&self, _image: &[u8], _texture: bool) -> Result<Vec<u8>, GenerationError> {
        if self.fail {
            return Err(GenerationError::Status {
                service: "mesh",
                status: 500,
                message: "reconstruction crashed".to_string(),
            });
        }
        Ok(b"glb-bytes".to_vec())
    }
}

struct StubColors;

#[async_trait]
impl ColorExtractor for StubColors {
    async fn answer(&self, _image: &[u8], _question: &str) -> Result<String, GenerationError> {
        Ok("red".to_string())
    }
}

fn generators(mesh_fails: bool, transcription: &str) -> Generators {
    Generators {
        transcriber: Arc::new(StubTranscriber(transcription.to_string())),
        images: Arc::new(StubImages),
        meshes: Arc::new(StubMeshes { fail: mesh_fails }),
        colors: Arc::new(StubColors),
        mesh_texture: true,
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    temp: TempDir,
    config: Config,
    registry: RegistryStore,
}

impl Harness {
    async fn new(objects: &[SceneObject]) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        let root = temp.path();
        config.storage.registry = root.join("data").join("models.json");
        config.storage.images_dir = root.join("data").join("images");
        config.storage.models_dir = root.join("data").join("models");
        config.storage.previews_dir = root.join("data").join("html");

        let registry = RegistryStore::spawn(&config.storage.registry).expect("Failed to spawn registry");
        for obj in objects {
            registry.upsert(obj.clone()).await.expect("Failed to seed registry");
        }
        Self { temp, config, registry }
    }

    fn orchestrator(&self, llm: Arc<ScriptedLlm>, generators: Generators) -> Orchestrator {
        let prompts = Arc::new(PromptLoader::embedded_only());
        let assets = Arc::new(AssetStore::new(&self.config.storage, prompts.clone()));
        Orchestrator::new(&self.config, llm, prompts, generators, assets, self.registry.clone())
    }

    /// Raw registry file; empty when nothing was ever written
    fn registry_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.config.storage.registry).unwrap_or_default()
    }

    async fn ids(&self) -> Vec<String> {
        self.registry
            .load_all()
            .await
            .expect("Failed to load registry")
            .into_iter()
            .map(|o| o.id)
            .collect()
    }
}

fn object(id: &str, name: &str, position: Position) -> SceneObject {
    SceneObject::new(id, name, "brown", format!("../../models/{}.glb", id), position)
}

fn environment(objects: &[SceneObject], counters: &[(&str, u64)]) -> EnvironmentData {
    EnvironmentData {
        semantic_graph: SceneSnapshot::from_objects(objects),
        name_counters: counters.iter().map(|(k, v)| (k.to_string(), *v)).collect::<HashMap<_, _>>(),
    }
}

/// How the fake client answers each kind of request
#[derive(Clone)]
struct ClientScript {
    world_position: Position,
    /// Every reply is sent at once for each pointing prompt
    pointed_objects: Vec<String>,
    pointed_location: Position,
}

impl Default for ClientScript {
    fn default() -> Self {
        Self {
            world_position: Position::new(0.0, 0.0, 1.0),
            pointed_objects: Vec::new(),
            pointed_location: Position::new(0.0, 0.0, 0.0),
        }
    }
}

/// Answer requests until the server side goes away; returns everything sent
async fn respond(
    mut out_rx: mpsc::Receiver<ServerMessage>,
    in_tx: mpsc::Sender<ClientEvent>,
    script: ClientScript,
) -> Vec<ServerMessage> {
    let mut seen = Vec::new();
    while let Some(msg) = out_rx.recv().await {
        let replies = match &msg {
            ServerMessage::CalculatePosition { .. } => vec![ClientMessage::WorldPosition {
                position: script.world_position,
            }],
            ServerMessage::StartPointingObject { .. } => script
                .pointed_objects
                .iter()
                .map(|id| ClientMessage::PointingObject { object_id: id.clone() })
                .collect(),
            ServerMessage::StartPointingLocation { .. } => vec![ClientMessage::PointingLocation {
                position: script.pointed_location,
            }],
            _ => Vec::new(),
        };
        seen.push(msg);
        for reply in replies {
            let _ = in_tx.send(ClientEvent::Message(reply)).await;
        }
    }
    seen
}

/// Run one utterance against `env`, answering the engine with `script`
async fn run_utterance(
    orchestrator: &Orchestrator,
    counters: &mut NameCounters,
    env: EnvironmentData,
    utterance: &str,
    script: ClientScript,
) -> (Result<Vec<String>, TaskError>, Vec<ServerMessage>) {
    let (out_tx, out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);
    let mut link = ClientLink::new(out_tx, in_rx);

    // The environment is cached the way the idle session loop caches it
    in_tx
        .send(ClientEvent::Message(ClientMessage::EnvironmentData(env)))
        .await
        .unwrap();
    in_tx.send(ClientEvent::Audio(vec![0u8; 4])).await.unwrap();
    link.next_audio().await.unwrap();

    let responder = tokio::spawn(respond(out_rx, in_tx, script));
    let result = orchestrator
        .handle_utterance(&mut link, counters, utterance)
        .await
        .map(|context| context.lines().to_vec());
    drop(link);

    let sent = tokio::time::timeout(Duration::from_secs(5), responder)
        .await
        .expect("responder did not finish")
        .unwrap();
    (result, sent)
}

fn calculate_position(sent: &[ServerMessage]) -> Option<(String, Direction, f64)> {
    sent.iter().find_map(|msg| match msg {
        ServerMessage::CalculatePosition {
            reference_id,
            direction,
            distance,
        } => Some((reference_id.clone(), *direction, *distance)),
        _ => None,
    })
}

fn new_models(sent: &[ServerMessage]) -> Vec<SceneObject> {
    sent.iter()
        .filter_map(|msg| match msg {
            ServerMessage::NewModel { model } => Some(model.clone()),
            _ => None,
        })
        .collect()
}

fn pointing_prompts(sent: &[ServerMessage]) -> usize {
    sent.iter()
        .filter(|msg| {
            matches!(
                msg,
                ServerMessage::StartPointingObject { .. } | ServerMessage::StartPointingLocation { .. }
            )
        })
        .count()
}

// =============================================================================
// Placement scenarios
// =============================================================================

#[tokio::test]
async fn test_move_chair_in_front_of_user() {
    let chair = object("chair1", "chair", Position::new(3.0, 0.0, 3.0));
    let harness = Harness::new(std::slice::from_ref(&chair)).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "manipulate", "manipulate_objects": ["chair1"], "requires_disambiguation": false, "requires_pointing": false}"#,
        r#"{"reference_id": "user", "direction": "front"}"#,
    ]);
    let orchestrator = harness.orchestrator(llm.clone(), generators(false, ""));

    let script = ClientScript {
        world_position: Position::new(0.0, 0.0, 1.0),
        ..Default::default()
    };
    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        environment(&[chair], &[("chair", 1)]),
        "Place the chair in front of me",
        script,
    )
    .await;

    let lines = result.unwrap();
    assert_eq!(pointing_prompts(&sent), 0);
    assert_eq!(calculate_position(&sent), Some(("user".to_string(), Direction::Front, 1.0)));

    let moved = new_models(&sent);
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].id, "chair1");
    assert_eq!(moved[0].position, Position::new(0.0, 0.0, 1.0));

    let stored = harness.registry.get("chair1").await.unwrap().unwrap();
    assert_eq!(stored.position, Position::new(0.0, 0.0, 1.0));
    assert_eq!(lines, vec!["Manipulated object in previous task: {'id': chair1, 'position': 0 0 1}"]);
    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_move_table_left_of_sofa() {
    let table = object("table1", "table", Position::new(0.0, 0.0, 0.0));
    let sofa = object("sofa1", "sofa", Position::new(2.0, 0.0, 1.0));
    let harness = Harness::new(&[table.clone(), sofa.clone()]).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "manipulate", "manipulate_objects": ["table1"]}"#,
        r#"{"reference_id": "sofa1", "direction": "left", "distance": 2}"#,
    ]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        environment(&[table, sofa], &[]),
        "Put the table 2 meters to the left of the sofa",
        ClientScript::default(),
    )
    .await;

    result.unwrap();
    assert_eq!(calculate_position(&sent), Some(("sofa1".to_string(), Direction::Left, 2.0)));
}

#[tokio::test]
async fn test_create_lamp_on_table() {
    let table = object("table1", "table", Position::new(1.0, 0.0, 0.0));
    let harness = Harness::new(std::slice::from_ref(&table)).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "create"}"#,
        "a small desk lamp",
        "Lamp",
        r#"{"reference_id": "table1", "direction": "up"}"#,
    ]);
    let orchestrator = harness.orchestrator(llm.clone(), generators(false, ""));

    let script = ClientScript {
        world_position: Position::new(1.0, 0.8, 0.0),
        ..Default::default()
    };
    let mut counters = NameCounters::new();
    let (result, sent) = run_utterance(
        &orchestrator,
        &mut counters,
        environment(&[table], &[]),
        "Place a lamp on the table",
        script,
    )
    .await;

    let lines = result.unwrap();
    assert_eq!(calculate_position(&sent), Some(("table1".to_string(), Direction::Up, 0.5)));

    let created = new_models(&sent);
    assert_eq!(created.len(), 1);
    let lamp = &created[0];
    assert_eq!(lamp.id, "lamp1");
    assert_eq!(lamp.name, "lamp");
    assert_eq!(lamp.color, "red");
    assert_eq!(lamp.path, "../../models/lamp1.glb");
    assert_eq!(lamp.position, Position::new(1.0, 0.8, 0.0));

    assert_eq!(harness.registry.get("lamp1").await.unwrap().as_ref(), Some(lamp));
    assert_eq!(counters.get("lamp"), 1);
    assert_eq!(lines, vec!["Created object in previous task: {'id': lamp1, 'position': 1 0.8 0}"]);

    let data = harness.temp.path().join("data");
    assert!(data.join("images").join("lamp1.png").exists());
    assert_eq!(std::fs::read(data.join("models").join("lamp1.glb")).unwrap(), b"glb-bytes");
    assert!(data.join("html").join("lamp1.html").exists());

    // describe and name see the utterance
    let prompts = llm.prompts();
    assert!(prompts[1].contains("Place a lamp on the table"));
    assert!(prompts[2].contains("Place a lamp on the table"));
}

#[tokio::test]
async fn test_create_with_path_like_name_stays_in_asset_dirs() {
    let harness = Harness::new(&[]).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "create", "final_position": "0 0 1"}"#,
        "a crate",
        "../../../escaped",
    ]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        EnvironmentData::default(),
        "Create a ../../../escaped",
        ClientScript::default(),
    )
    .await;

    result.unwrap();
    let created = new_models(&sent);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].id, "escaped1");
    assert_eq!(created[0].path, "../../models/escaped1.glb");
    assert_eq!(harness.ids().await, vec!["escaped1"]);

    let data = harness.temp.path().join("data");
    assert!(data.join("images").join("escaped1.png").exists());
    assert!(data.join("models").join("escaped1.glb").exists());
    assert!(!harness.temp.path().join("escaped1.png").exists());
}

#[tokio::test]
async fn test_manipulate_does_not_resurrect_concurrently_deleted_object() {
    let chair = object("chair1", "chair", Position::new(3.0, 0.0, 3.0));
    let harness = Harness::new(std::slice::from_ref(&chair)).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "manipulate", "manipulate_objects": ["chair1"]}"#,
        r#"{"reference_id": "user", "direction": "front"}"#,
    ]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    let (out_tx, mut out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);
    let mut link = ClientLink::new(out_tx, in_rx);
    in_tx
        .send(ClientEvent::Message(ClientMessage::EnvironmentData(environment(
            &[chair],
            &[],
        ))))
        .await
        .unwrap();
    in_tx.send(ClientEvent::Audio(vec![0u8; 4])).await.unwrap();
    link.next_audio().await.unwrap();

    // Another session removes the chair while this one waits on the client
    let registry = harness.registry.clone();
    let responder = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(msg) = out_rx.recv().await {
            if matches!(msg, ServerMessage::CalculatePosition { .. }) {
                registry.delete(vec!["chair1".to_string()]).await.unwrap();
                let reply = ClientMessage::WorldPosition {
                    position: Position::new(0.0, 0.0, 1.0),
                };
                let _ = in_tx.send(ClientEvent::Message(reply)).await;
            }
            seen.push(msg);
        }
        seen
    });

    let result = orchestrator
        .handle_utterance(&mut link, &mut NameCounters::new(), "Bring the chair in front of me")
        .await;
    drop(link);
    let sent = tokio::time::timeout(Duration::from_secs(5), responder)
        .await
        .expect("responder did not finish")
        .unwrap();

    assert!(result.unwrap().is_empty());
    assert!(harness.ids().await.is_empty());
    assert!(new_models(&sent).is_empty());
    assert!(sent.contains(&ServerMessage::ObjectNotFound {
        object_id: "chair1".to_string()
    }));
}

// =============================================================================
// Delete scenarios
// =============================================================================

#[tokio::test]
async fn test_remove_table_in_front_of_user() {
    let table = object("table1", "table", Position::new(0.0, 0.0, 1.0));
    let chair = object("chair1", "chair", Position::new(2.0, 0.0, 0.0));
    let harness = Harness::new(&[table.clone(), chair.clone()]).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "delete", "delete_objects": ["table1"], "requires_disambiguation": false}"#,
    ]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        environment(&[table, chair], &[]),
        "Remove the table in front of me",
        ClientScript::default(),
    )
    .await;

    let lines = result.unwrap();
    assert_eq!(
        sent,
        vec![ServerMessage::DeleteObject {
            object_id: "table1".to_string()
        }]
    );
    assert_eq!(harness.ids().await, vec!["chair1"]);
    assert_eq!(lines, vec!["Deleted object table1 in previous task."]);
}

#[tokio::test]
async fn test_delete_absent_id_leaves_registry_untouched() {
    let chair = object("chair1", "chair", Position::new(2.0, 0.0, 0.0));
    let harness = Harness::new(std::slice::from_ref(&chair)).await;
    let before = harness.registry_bytes();
    let llm = ScriptedLlm::new(&[r#"{"classification": "delete", "delete_objects": ["ghost9"]}"#]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        environment(&[chair], &[]),
        "Delete the ghost",
        ClientScript::default(),
    )
    .await;

    assert_eq!(result.unwrap(), vec!["Object ghost9 was not found in previous task."]);
    assert_eq!(harness.registry_bytes(), before);
    assert_eq!(
        sent,
        vec![
            ServerMessage::DeleteObject {
                object_id: "ghost9".to_string()
            },
            ServerMessage::ObjectNotFound {
                object_id: "ghost9".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_manipulate_missing_object_reports_and_continues() {
    let chair = object("chair1", "chair", Position::new(0.0, 0.0, 0.0));
    let harness = Harness::new(std::slice::from_ref(&chair)).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "manipulate", "manipulate_objects": ["ghost1", "chair1"], "final_position": "4 0 4"}"#,
    ]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        environment(&[chair], &[]),
        "Move both of them over there",
        ClientScript::default(),
    )
    .await;

    result.unwrap();
    assert_eq!(
        sent[0],
        ServerMessage::ObjectNotFound {
            object_id: "ghost1".to_string()
        }
    );
    let moved = new_models(&sent);
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].position, Position::new(4.0, 0.0, 4.0));
    // A preset position skips the placement round trip
    assert!(calculate_position(&sent).is_none());
}

// =============================================================================
// Disambiguation
// =============================================================================

#[tokio::test]
async fn test_disambiguation_then_reclassification() {
    let chair1 = object("chair1", "chair", Position::new(0.0, 0.0, 0.0));
    let chair2 = object("chair2", "chair", Position::new(0.0, 0.0, 2.0));
    let harness = Harness::new(&[chair1.clone(), chair2.clone()]).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "manipulate", "requires_disambiguation": true,
            "disambiguation_candidates": ["chair1", "chair2"], "disambiguation_phrases": ["that"],
            "requires_pointing": true, "spatial_phrases": ["here"]}"#,
        r#"{"classification": "manipulate", "manipulate_objects": ["chair2"],
            "final_action": "Place chair2 at 2 0.5 3", "final_position": "2 0.5 3"}"#,
    ]);
    let orchestrator = harness.orchestrator(llm.clone(), generators(false, ""));

    let script = ClientScript {
        // The first pick is not a candidate and is ignored
        pointed_objects: vec!["table7".to_string(), "chair2".to_string()],
        pointed_location: Position::new(2.0, -1.0, 3.0),
        ..Default::default()
    };
    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        environment(&[chair1, chair2], &[]),
        "Place that over here",
        script,
    )
    .await;

    result.unwrap();
    assert_eq!(pointing_prompts(&sent), 2);
    assert_eq!(
        sent[0],
        ServerMessage::StartPointingObject {
            disambiguation_phrase: "that".to_string(),
            disambiguation_candidates: vec!["chair1".to_string(), "chair2".to_string()],
        }
    );

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("For the disambiguation phrase that, the user clarified object: chair2"));
    assert!(prompts[1].contains("For the spatial phrase here, the user pointed to location: 2 0.5 3"));

    let stored = harness.registry.get("chair2").await.unwrap().unwrap();
    assert_eq!(stored.position, Position::new(2.0, 0.5, 3.0));
    assert_eq!(
        harness.registry.get("chair1").await.unwrap().unwrap().position,
        Position::new(0.0, 0.0, 0.0)
    );
}

#[tokio::test]
async fn test_single_candidate_resolves_without_prompt() {
    let chair = object("chair1", "chair", Position::new(0.0, 0.0, 0.0));
    let harness = Harness::new(std::slice::from_ref(&chair)).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "manipulate", "requires_disambiguation": true,
            "disambiguation_candidates": ["chair1"], "disambiguation_phrases": ["it"]}"#,
        r#"{"classification": "manipulate", "manipulate_objects": ["chair1"], "final_position": "1 0 1"}"#,
    ]);
    let orchestrator = harness.orchestrator(llm.clone(), generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        environment(&[chair], &[]),
        "Move it to 1 0 1",
        ClientScript::default(),
    )
    .await;

    result.unwrap();
    assert_eq!(pointing_prompts(&sent), 0);
    assert!(llm.prompts()[1].contains("the user clarified object: chair1"));
}

#[tokio::test]
async fn test_disambiguation_without_candidates_is_malformed() {
    let harness = Harness::new(&[]).await;
    let before = harness.registry_bytes();
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "manipulate", "requires_disambiguation": true, "disambiguation_phrases": ["that"]}"#,
    ]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        EnvironmentData::default(),
        "Move that",
        ClientScript::default(),
    )
    .await;

    assert!(matches!(result, Err(TaskError::MalformedResponse { .. })));
    assert!(sent.is_empty());
    assert_eq!(harness.registry_bytes(), before);
}

// =============================================================================
// Multitask
// =============================================================================

#[tokio::test]
async fn test_multitask_reviewed_once_then_runs_in_order() {
    let harness = Harness::new(&[]).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "multitask"}"#,
        r#"["create a chair and a table"]"#,
        "Negative: the request names two objects",
        r#"["create a chair", "create a table next to the chair"]"#,
        "Looks good",
        r#"{"classification": "create", "final_position": "1 0 1"}"#,
        "wooden chair",
        "chair",
        r#"{"classification": "create", "final_position": "2 0 1"}"#,
        "wooden table",
        "table",
    ]);
    let orchestrator = harness.orchestrator(llm.clone(), generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        EnvironmentData::default(),
        "Make a chair and a table next to it",
        ClientScript::default(),
    )
    .await;

    let lines = result.unwrap();
    assert_eq!(llm.remaining(), 0);

    let prompts = llm.prompts();
    // The rejection is fed back into the second decomposition
    assert!(prompts[3].contains("Negative: the request names two objects"));
    // The second subtask is classified with the first one's outcome
    assert!(prompts[8].contains("Created object in previous task: {'id': chair1, 'position': 1 0 1}"));

    let ids: Vec<String> = new_models(&sent).into_iter().map(|o| o.id).collect();
    assert_eq!(ids, vec!["chair1", "table1"]);
    assert_eq!(lines.len(), 2);
    assert_eq!(harness.ids().await, vec!["chair1", "table1"]);
}

#[tokio::test]
async fn test_multitask_stalls_after_max_attempts() {
    let harness = Harness::new(&[]).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "multitask"}"#,
        r#"["a"]"#,
        "negative",
        r#"["b"]"#,
        "NEGATIVE",
        r#"["c"]"#,
        "still negative",
    ]);
    let orchestrator = harness.orchestrator(llm.clone(), generators(false, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        EnvironmentData::default(),
        "Do several things",
        ClientScript::default(),
    )
    .await;

    assert!(matches!(result, Err(TaskError::DecompositionStalled { attempts: 3 })));
    assert!(sent.is_empty());
    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_nested_multitask_depth_is_bounded() {
    let mut harness = Harness::new(&[]).await;
    harness.config.planning.max_task_depth = 1;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "multitask"}"#,
        r#"["do two more things"]"#,
        "fine",
        r#"{"classification": "multitask"}"#,
    ]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    let (result, _) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        EnvironmentData::default(),
        "Do things within things",
        ClientScript::default(),
    )
    .await;

    assert!(matches!(result, Err(TaskError::TaskDepthExceeded { max_depth: 1 })));
}

// =============================================================================
// Create: ids and failures
// =============================================================================

#[tokio::test]
async fn test_create_skips_ids_already_in_registry() {
    let existing = [
        object("chair1", "chair", Position::new(0.0, 0.0, 0.0)),
        object("chair2", "chair", Position::new(1.0, 0.0, 0.0)),
    ];
    let harness = Harness::new(&existing).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "create", "final_position": "3 0 0"}"#,
        "chair",
        "chair",
    ]);
    let orchestrator = harness.orchestrator(llm, generators(false, ""));

    // The client's counters lag behind the registry
    let mut counters = NameCounters::new();
    let (result, sent) = run_utterance(
        &orchestrator,
        &mut counters,
        environment(&existing, &[("chair", 1)]),
        "Add another chair",
        ClientScript::default(),
    )
    .await;

    result.unwrap();
    assert_eq!(new_models(&sent)[0].id, "chair3");
    assert_eq!(counters.get("chair"), 3);
    assert_eq!(harness.ids().await, vec!["chair1", "chair2", "chair3"]);
}

#[tokio::test]
async fn test_mesh_failure_leaves_registry_untouched() {
    let harness = Harness::new(&[]).await;
    let before = harness.registry_bytes();
    let llm = ScriptedLlm::new(&[r#"{"classification": "create"}"#, "a red chair", "chair"]);
    let orchestrator = harness.orchestrator(llm, generators(true, ""));

    let (result, sent) = run_utterance(
        &orchestrator,
        &mut NameCounters::new(),
        EnvironmentData::default(),
        "Create a red chair",
        ClientScript::default(),
    )
    .await;

    match result {
        Err(TaskError::GenerationServiceFailure(e)) => assert_eq!(e.service(), "mesh"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(new_models(&sent).is_empty());
    assert_eq!(harness.registry_bytes(), before);
    // The image was generated before the failure and stays orphaned
    assert!(harness.temp.path().join("data/images/chair1.png").exists());
}

// =============================================================================
// Session loop
// =============================================================================

async fn drain(mut out_rx: mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut seen = Vec::new();
    while let Some(msg) = out_rx.recv().await {
        seen.push(msg);
    }
    seen
}

#[tokio::test]
async fn test_session_reports_task_failure_and_keeps_going() {
    let harness = Harness::new(&[]).await;
    let llm = ScriptedLlm::new(&[
        "I am not sure what you mean",
        r#"{"classification": "delete", "delete_objects": ["ghost1"]}"#,
    ]);
    let gens = generators(false, "remove the ghost");
    let transcriber = gens.transcriber.clone();
    let orchestrator = Arc::new(harness.orchestrator(llm, gens));

    let (out_tx, out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);
    in_tx.send(ClientEvent::Audio(vec![1, 2, 3])).await.unwrap();
    in_tx.send(ClientEvent::Audio(vec![4, 5, 6])).await.unwrap();
    drop(in_tx);

    let session = Session::new(orchestrator, transcriber);
    tokio::time::timeout(Duration::from_secs(5), session.run(ClientLink::new(out_tx, in_rx)))
        .await
        .expect("session did not end after disconnect");

    let sent = drain(out_rx).await;
    assert_eq!(sent.len(), 5);
    assert_eq!(
        sent[0],
        ServerMessage::Transcription {
            transcription: "remove the ghost".to_string()
        }
    );
    assert!(matches!(&sent[1], ServerMessage::TaskFailed { error } if error.contains("Malformed")));
    assert!(matches!(sent[2], ServerMessage::Transcription { .. }));
    assert_eq!(
        sent[3],
        ServerMessage::DeleteObject {
            object_id: "ghost1".to_string()
        }
    );
    assert_eq!(
        sent[4],
        ServerMessage::ObjectNotFound {
            object_id: "ghost1".to_string()
        }
    );
}

#[tokio::test]
async fn test_session_skips_empty_transcription() {
    let harness = Harness::new(&[]).await;
    let llm = ScriptedLlm::new(&[]);
    let gens = generators(false, "   ");
    let transcriber = gens.transcriber.clone();
    let orchestrator = Arc::new(harness.orchestrator(llm.clone(), gens));

    let (out_tx, out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);
    in_tx.send(ClientEvent::Audio(vec![0])).await.unwrap();
    drop(in_tx);

    Session::new(orchestrator, transcriber)
        .run(ClientLink::new(out_tx, in_rx))
        .await;

    let sent = drain(out_rx).await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], ServerMessage::Transcription { .. }));
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn test_disconnect_aborts_in_flight_create() {
    let harness = Harness::new(&[]).await;
    let llm = ScriptedLlm::new(&[
        r#"{"classification": "create"}"#,
        "a chair",
        "chair",
        r#"{"reference_id": "user", "direction": "front"}"#,
    ]);
    let gens = generators(false, "make a chair");
    let transcriber = gens.transcriber.clone();
    let orchestrator = Arc::new(harness.orchestrator(llm, gens));

    let (out_tx, mut out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);
    in_tx.send(ClientEvent::Audio(vec![0])).await.unwrap();

    let session = tokio::spawn(Session::new(orchestrator, transcriber).run(ClientLink::new(out_tx, in_rx)));

    // Wait until the engine blocks on the placement round trip, then vanish
    loop {
        match out_rx.recv().await {
            Some(ServerMessage::CalculatePosition { .. }) => break,
            Some(_) => continue,
            None => panic!("session ended before asking for a position"),
        }
    }
    drop(out_rx);
    drop(in_tx);

    tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .expect("session did not abort")
        .unwrap();
    assert!(harness.ids().await.is_empty());
}

// =============================================================================
// Registry store
// =============================================================================

#[tokio::test]
async fn test_upsert_same_id_keeps_latest_values() {
    let harness = Harness::new(&[]).await;
    harness
        .registry
        .upsert(object("desk1", "desk", Position::new(0.0, 0.0, 0.0)))
        .await
        .unwrap();
    harness
        .registry
        .upsert(object("desk1", "desk", Position::new(5.0, 0.0, 5.0)))
        .await
        .unwrap();

    let all = harness.registry.load_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].position, Position::new(5.0, 0.0, 5.0));
}

#[tokio::test]
async fn test_concurrent_reservations_never_collide() {
    let harness = Harness::new(&[object("cup1", "cup", Position::default())]).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = harness.registry.clone();
        handles.push(tokio::spawn(async move { registry.reserve_id("cup", 1).await.unwrap().0 }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert!(!ids.contains(&"cup1".to_string()));
}
