//! ClientLink - one session's view of its client connection
//!
//! Owns the outbound queue, the inbound event stream, the latest cached
//! environment and the single pending-clarification slot.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ClientEvent, ClientMessage, ServerMessage};
use crate::domain::{EnvironmentData, PlacementRequest, Position};

/// Lowest height a pointed location may have
pub const POINTING_FLOOR: f64 = 0.5;

/// Errors on the client connection; all of them end the session
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Client disconnected")]
    Disconnected,

    #[error("Outbound queue closed")]
    OutboundClosed,

    #[error("A {pending} request is already outstanding")]
    ClarificationOutstanding { pending: &'static str },
}

const WORLD_POSITION: &str = "calculate_position";
const POINTING_OBJECT: &str = "start_pointing_object";
const POINTING_LOCATION: &str = "start_pointing_location";

/// A session's duplex connection to its client
pub struct ClientLink {
    outbound: mpsc::Sender<ServerMessage>,
    inbound: mpsc::Receiver<ClientEvent>,
    environment: EnvironmentData,
    /// Name of the request awaiting a reply, if any
    pending: Option<&'static str>,
}

impl ClientLink {
    pub fn new(outbound: mpsc::Sender<ServerMessage>, inbound: mpsc::Receiver<ClientEvent>) -> Self {
        Self {
            outbound,
            inbound,
            environment: EnvironmentData::default(),
            pending: None,
        }
    }

    /// Most recent environment the client reported
    pub fn environment(&self) -> &EnvironmentData {
        &self.environment
    }

    /// A sender whose `closed()` resolves once the client is gone
    pub fn watcher(&self) -> mpsc::Sender<ServerMessage> {
        self.outbound.clone()
    }

    pub async fn send(&self, msg: ServerMessage) -> Result<(), ChannelError> {
        debug!(?msg, "send: called");
        self.outbound.send(msg).await.map_err(|_| ChannelError::OutboundClosed)
    }

    /// Wait for the next audio frame while idle
    ///
    /// Environment updates are cached on the way; stray replies are dropped.
    pub async fn next_audio(&mut self) -> Result<Vec<u8>, ChannelError> {
        debug!("next_audio: called");
        loop {
            match self.recv().await? {
                ClientEvent::Audio(bytes) => return Ok(bytes),
                ClientEvent::Message(ClientMessage::EnvironmentData(env)) => self.cache_environment(env),
                ClientEvent::Message(other) => {
                    warn!(kind = other.kind(), "Dropping reply with no pending request");
                }
            }
        }
    }

    /// Ask the client to turn a symbolic placement into world coordinates
    pub async fn request_world_position(&mut self, placement: PlacementRequest) -> Result<Position, ChannelError> {
        debug!(?placement, "request_world_position: called");
        self.round_trip(WORLD_POSITION, placement.into(), |msg| match msg {
            ClientMessage::WorldPosition { position } => Ok(position),
            other => Err(other),
        })
        .await
    }

    /// Ask the user to point at one of `candidates`; returns the chosen id
    ///
    /// Ids outside the candidate set are ignored and the wait continues on
    /// the same request without re-sending the prompt.
    pub async fn request_object_pointing(&mut self, phrase: &str, candidates: &[String]) -> Result<String, ChannelError> {
        debug!(%phrase, ?candidates, "request_object_pointing: called");
        let prompt = ServerMessage::StartPointingObject {
            disambiguation_phrase: phrase.to_string(),
            disambiguation_candidates: candidates.to_vec(),
        };
        self.round_trip(POINTING_OBJECT, prompt, |msg| match msg {
            ClientMessage::PointingObject { object_id } if candidates.contains(&object_id) => Ok(object_id),
            ClientMessage::PointingObject { object_id } => {
                warn!(%object_id, ?candidates, "Client pointed at an object outside the candidate set");
                Err(ClientMessage::PointingObject { object_id })
            }
            other => Err(other),
        })
        .await
    }

    /// Ask the user to point at a location; the height is clamped to the floor
    pub async fn request_location_pointing(&mut self, phrase: &str) -> Result<Position, ChannelError> {
        debug!(%phrase, "request_location_pointing: called");
        let prompt = ServerMessage::StartPointingLocation {
            spatial_phrase: phrase.to_string(),
        };
        self.round_trip(POINTING_LOCATION, prompt, |msg| match msg {
            ClientMessage::PointingLocation { position } => Ok(position.with_floor(POINTING_FLOOR)),
            other => Err(other),
        })
        .await
    }

    /// Send `prompt`, then block until `accept` takes a reply
    async fn round_trip<T>(
        &mut self,
        request: &'static str,
        prompt: ServerMessage,
        accept: impl FnMut(ClientMessage) -> Result<T, ClientMessage>,
    ) -> Result<T, ChannelError> {
        self.begin(request)?;
        let result = match self.send(prompt).await {
            Ok(()) => self.await_reply(request, accept).await,
            Err(e) => Err(e),
        };
        self.pending = None;
        result
    }

    fn begin(&mut self, request: &'static str) -> Result<(), ChannelError> {
        if let Some(pending) = self.pending {
            return Err(ChannelError::ClarificationOutstanding { pending });
        }
        debug!(%request, "begin: awaiting client reply");
        self.pending = Some(request);
        Ok(())
    }

    async fn await_reply<T>(
        &mut self,
        request: &'static str,
        mut accept: impl FnMut(ClientMessage) -> Result<T, ClientMessage>,
    ) -> Result<T, ChannelError> {
        loop {
            match self.recv().await? {
                ClientEvent::Audio(bytes) => {
                    warn!(bytes = bytes.len(), "Dropping audio received while a task is running");
                }
                ClientEvent::Message(ClientMessage::EnvironmentData(env)) => self.cache_environment(env),
                ClientEvent::Message(msg) => match accept(msg) {
                    Ok(reply) => return Ok(reply),
                    Err(other) => {
                        warn!(expected = request, got = other.kind(), "Ignoring reply that does not answer the pending request");
                    }
                },
            }
        }
    }

    fn cache_environment(&mut self, env: EnvironmentData) {
        info!(
            nodes = env.semantic_graph.len(),
            counters = env.name_counters.len(),
            "Environment updated"
        );
        self.environment = env;
    }

    async fn recv(&mut self) -> Result<ClientEvent, ChannelError> {
        self.inbound.recv().await.ok_or(ChannelError::Disconnected)
    }
}
