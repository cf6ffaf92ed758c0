//! Websocket session server
//!
//! `GET /ws` upgrades to a websocket; each connection gets a reader task, a
//! writer task and a [`Session`]. `GET /health` answers `ok`.

mod session;

pub use session::Session;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use eyre::{Context, Result};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::assets::AssetStore;
use crate::config::Config;
use crate::engine::Orchestrator;
use crate::generation::{Generators, Transcriber};
use crate::llm::create_client;
use crate::prompts::PromptLoader;
use crate::protocol::{ClientEvent, ClientLink, ClientMessage, ServerMessage};
use crate::registry::RegistryStore;

/// Shared by every connection
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    transcriber: Arc<dyn Transcriber>,
    channel_capacity: usize,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, transcriber: Arc<dyn Transcriber>, channel_capacity: usize) -> Self {
        Self {
            orchestrator,
            transcriber,
            channel_capacity: channel_capacity.max(1),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Build every collaborator from config and serve until Ctrl-C
pub async fn serve(config: &Config, bind: Option<String>) -> Result<()> {
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    debug!(%addr, "serve: called");

    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let prompts = Arc::new(PromptLoader::default());
    let generators = Generators::from_config(&config.services).context("Failed to create generation clients")?;
    let assets = Arc::new(AssetStore::new(&config.storage, prompts.clone()));
    let registry = RegistryStore::spawn(&config.storage.registry).context("Failed to open registry")?;

    let transcriber = generators.transcriber.clone();
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        llm,
        prompts,
        generators,
        assets,
        registry.clone(),
    ));
    let state = AppState::new(orchestrator, transcriber, config.server.channel_capacity);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    info!(%addr, registry = %config.storage.registry.display(), "SceneForge listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Err(e) = registry.shutdown().await {
        debug!(error = %e, "serve: registry already stopped");
    }
    info!("SceneForge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn health() -> &'static str {
    "ok"
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Wire one websocket to a session
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(state.channel_capacity);
    let (in_tx, in_rx) = mpsc::channel::<ClientEvent>(state.channel_capacity);

    let session = Session::new(state.orchestrator.clone(), state.transcriber.clone());
    let session_id = session.id();
    info!(session = %session_id, "WebSocket connection established");

    // OUTBOUND: server → client
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json)).await {
                warn!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
        debug!("WebSocket writer task ended");
    });

    // INBOUND: client → server
    let mut reader = tokio::spawn(read_loop(stream, in_tx));
    let mut session = tokio::spawn(session.run(ClientLink::new(out_tx, in_rx)));

    let session_finished = tokio::select! {
        _ = &mut reader => false,
        _ = &mut session => true,
    };

    // Dropping the outbound receiver is what tells a running task the client is gone
    writer.abort();
    if session_finished {
        reader.abort();
    } else if let Err(e) = session.await {
        warn!(session = %session_id, error = %e, "Session task failed");
    }
    info!(session = %session_id, "WebSocket connection closed");
}

/// Decode frames into events until the client goes away
///
/// Text that is not JSON ends the connection; JSON with an unknown `type` is
/// skipped.
async fn read_loop(mut stream: SplitStream<WebSocket>, in_tx: mpsc::Sender<ClientEvent>) {
    while let Some(frame) = stream.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => {
                let value: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(error = %e, "Protocol violation: text frame is not JSON");
                        break;
                    }
                };
                match serde_json::from_value::<ClientMessage>(value) {
                    Ok(msg) => ClientEvent::Message(msg),
                    Err(e) => {
                        warn!(error = %e, "Unknown text message received, skipping");
                        continue;
                    }
                }
            }
            Ok(Message::Binary(bytes)) => ClientEvent::Audio(bytes),
            Ok(Message::Close(_)) => {
                info!("Client closed WebSocket connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket receive error");
                break;
            }
        };

        if in_tx.send(event).await.is_err() {
            debug!("read_loop: session gone");
            break;
        }
    }
    debug!("WebSocket reader task ended");
}
