//! RegistryStore - actor that owns the registry file
//!
//! Processes commands via channels so concurrent sessions never interleave
//! their read-modify-write cycles.

use std::collections::HashSet;
use std::path::Path;

use scenestore::{Position, RegistryFile, SceneObject, UpsertOutcome};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{RegistryCommand, StoreError, StoreResponse};
use crate::domain::first_free_id;

/// Handle to send commands to the RegistryStore
#[derive(Debug, Clone)]
pub struct RegistryStore {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryStore {
    /// Spawn a new RegistryStore actor over the registry at `path`
    pub fn spawn(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!(path = %path.as_ref().display(), "spawn: called");
        let file = RegistryFile::open(path.as_ref())?;
        let existing = file.load()?;
        info!(path = %file.path().display(), objects = existing.len(), "RegistryStore spawned");

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(file, rx));
        Ok(Self { tx })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StoreResponse<T>>) -> RegistryCommand,
    ) -> StoreResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    /// Every object in the registry
    pub async fn load_all(&self) -> StoreResponse<Vec<SceneObject>> {
        debug!("load_all: called");
        self.request(|reply| RegistryCommand::LoadAll { reply }).await
    }

    /// Look up one object by id
    pub async fn get(&self, id: &str) -> StoreResponse<Option<SceneObject>> {
        debug!(%id, "get: called");
        let id = id.to_string();
        self.request(|reply| RegistryCommand::Get { id, reply }).await
    }

    /// Insert or replace by id; also drops any reservation on that id
    pub async fn upsert(&self, object: SceneObject) -> StoreResponse<UpsertOutcome> {
        debug!(id = %object.id, "upsert: called");
        self.request(|reply| RegistryCommand::Upsert { object, reply }).await
    }

    /// Move an object that is still in the registry; `None` if it is gone
    pub async fn update_position(&self, id: &str, position: Position) -> StoreResponse<Option<SceneObject>> {
        debug!(%id, %position, "update_position: called");
        let id = id.to_string();
        self.request(|reply| RegistryCommand::UpdatePosition { id, position, reply })
            .await
    }

    /// Remove the given ids, returning those that were present
    pub async fn delete(&self, ids: Vec<String>) -> StoreResponse<Vec<String>> {
        debug!(?ids, "delete: called");
        self.request(|reply| RegistryCommand::Delete { ids, reply }).await
    }

    /// Reserve the first `{base}{n}` with `n >= start` that is neither
    /// persisted nor reserved, returning the id and its `n`
    pub async fn reserve_id(&self, base: &str, start: u64) -> StoreResponse<(String, u64)> {
        debug!(%base, %start, "reserve_id: called");
        let base = base.to_string();
        self.request(|reply| RegistryCommand::ReserveId { base, start, reply })
            .await
    }

    /// Give back a reservation that will never be upserted
    pub async fn release_id(&self, id: &str) {
        debug!(%id, "release_id: called");
        if self
            .tx
            .send(RegistryCommand::ReleaseId { id: id.to_string() })
            .await
            .is_err()
        {
            warn!(%id, "release_id: registry actor is gone");
        }
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        debug!("shutdown: called");
        self.tx
            .send(RegistryCommand::Shutdown)
            .await
            .map_err(|_| StoreError::ChannelError)
    }
}

/// Actor loop - processes commands sequentially
async fn actor_loop(file: RegistryFile, mut rx: mpsc::Receiver<RegistryCommand>) {
    debug!("actor_loop: called");
    let mut reserved: HashSet<String> = HashSet::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RegistryCommand::LoadAll { reply } => {
                debug!("actor_loop: LoadAll command");
                let _ = reply.send(file.load().map_err(StoreError::from));
            }

            RegistryCommand::Get { id, reply } => {
                debug!(%id, "actor_loop: Get command");
                let _ = reply.send(file.get(&id).map_err(StoreError::from));
            }

            RegistryCommand::Upsert { object, reply } => {
                debug!(id = %object.id, "actor_loop: Upsert command");
                let id = object.id.clone();
                let result = file.upsert(object).map_err(StoreError::from);
                if result.is_ok() {
                    reserved.remove(&id);
                }
                let _ = reply.send(result);
            }

            RegistryCommand::UpdatePosition { id, position, reply } => {
                debug!(%id, "actor_loop: UpdatePosition command");
                let _ = reply.send(file.update_position(&id, position).map_err(StoreError::from));
            }

            RegistryCommand::Delete { ids, reply } => {
                debug!(?ids, "actor_loop: Delete command");
                let _ = reply.send(file.delete(&ids).map_err(StoreError::from));
            }

            RegistryCommand::ReserveId { base, start, reply } => {
                debug!(%base, %start, "actor_loop: ReserveId command");
                let result = file.load().map_err(StoreError::from).map(|objects| {
                    let persisted: HashSet<String> = objects.into_iter().map(|o| o.id).collect();
                    let (id, n) = first_free_id(&base, start, |candidate| {
                        persisted.contains(candidate) || reserved.contains(candidate)
                    });
                    reserved.insert(id.clone());
                    (id, n)
                });
                let _ = reply.send(result);
            }

            RegistryCommand::ReleaseId { id } => {
                debug!(%id, "actor_loop: ReleaseId command");
                reserved.remove(&id);
            }

            RegistryCommand::Shutdown => {
                info!("RegistryStore shutting down");
                break;
            }
        }
    }

    debug!("actor_loop: exited");
}
