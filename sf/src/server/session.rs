//! Session - one client connection's thread of control
//!
//! Waits for audio, transcribes it, and hands the text to the orchestrator.
//! Only one utterance is in flight at a time. A disconnect aborts it.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::NameCounters;
use crate::engine::Orchestrator;
use crate::error::TaskError;
use crate::generation::Transcriber;
use crate::protocol::{ClientLink, ServerMessage};

pub struct Session {
    id: Uuid,
    orchestrator: Arc<Orchestrator>,
    transcriber: Arc<dyn Transcriber>,
    counters: NameCounters,
}

impl Session {
    pub fn new(orchestrator: Arc<Orchestrator>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            id: Uuid::now_v7(),
            orchestrator,
            transcriber,
            counters: NameCounters::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serve the client until it disconnects
    pub async fn run(mut self, mut link: ClientLink) {
        info!(session = %self.id, "Session started");

        loop {
            let audio = match link.next_audio().await {
                Ok(audio) => audio,
                Err(e) => {
                    debug!(session = %self.id, error = %e, "run: link closed while idle");
                    break;
                }
            };

            let watcher = link.watcher();
            let started = Instant::now();
            let outcome = tokio::select! {
                outcome = self.handle_audio(&mut link, audio) => outcome,
                _ = watcher.closed() => {
                    warn!(session = %self.id, "Client disconnected mid-task, aborting");
                    break;
                }
            };

            let elapsed = started.elapsed();
            info!(
                session = %self.id,
                elapsed_secs = elapsed.as_secs(),
                "Total time: {} mins {} secs",
                elapsed.as_secs() / 60,
                elapsed.as_secs() % 60
            );

            if let Err(e) = outcome {
                info!(session = %self.id, error = %e, "Session ending");
                break;
            }
        }

        info!(session = %self.id, "Session closed");
    }

    /// Transcribe one audio frame and run the resulting utterance
    ///
    /// Task failures are reported to the client and swallowed; only errors
    /// that end the session come back out.
    pub async fn handle_audio(&mut self, link: &mut ClientLink, audio: Vec<u8>) -> Result<(), TaskError> {
        debug!(session = %self.id, bytes = audio.len(), "handle_audio: called");
        let transcription = match self.transcriber.transcribe(&audio).await {
            Ok(text) => text,
            Err(e) => return self.report(link, e.into()).await,
        };
        info!(session = %self.id, %transcription, "Transcribed audio");
        link.send(ServerMessage::Transcription {
            transcription: transcription.clone(),
        })
        .await?;

        if transcription.trim().is_empty() {
            warn!(session = %self.id, "Empty transcription, nothing to do");
            return Ok(());
        }

        match self
            .orchestrator
            .handle_utterance(link, &mut self.counters, &transcription)
            .await
        {
            Ok(context) => {
                debug!(session = %self.id, lines = context.lines().len(), "handle_audio: utterance complete");
                Ok(())
            }
            Err(e) => self.report(link, e).await,
        }
    }

    async fn report(&self, link: &ClientLink, err: TaskError) -> Result<(), TaskError> {
        if err.is_fatal_to_session() {
            return Err(err);
        }
        error!(session = %self.id, error = %err, "Task failed");
        link.send(ServerMessage::TaskFailed { error: err.to_string() }).await?;
        Ok(())
    }
}
