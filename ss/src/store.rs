//! RegistryFile - the on-disk registry document

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::object::{Position, SceneObject};

/// Whether an upsert added a new record or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Handle to the registry file on disk
///
/// Every mutation is a locked read-modify-write of the whole document. A
/// missing or empty file reads as an empty registry.
#[derive(Debug, Clone)]
pub struct RegistryFile {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Exclusive advisory lock, released on drop
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl RegistryFile {
    /// Open (without reading) the registry at `path`, creating its directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "RegistryFile::open: called");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| RegistryError::io(parent, e))?;
        }

        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every object in the registry
    pub fn load(&self) -> Result<Vec<SceneObject>, RegistryError> {
        debug!(path = ?self.path, "load: called");
        let _guard = self.lock()?;
        self.read_unlocked()
    }

    /// Look up one object by id
    pub fn get(&self, id: &str) -> Result<Option<SceneObject>, RegistryError> {
        debug!(%id, "get: called");
        Ok(self.load()?.into_iter().find(|obj| obj.id == id))
    }

    /// Insert the object, or replace the record that has the same id
    pub fn upsert(&self, object: SceneObject) -> Result<UpsertOutcome, RegistryError> {
        debug!(id = %object.id, "upsert: called");
        let _guard = self.lock()?;
        let mut objects = self.read_unlocked()?;

        let outcome = match objects.iter_mut().find(|existing| existing.id == object.id) {
            Some(existing) => {
                *existing = object;
                UpsertOutcome::Replaced
            }
            None => {
                objects.push(object);
                UpsertOutcome::Inserted
            }
        };

        self.write_unlocked(&objects)?;
        debug!(?outcome, count = objects.len(), "upsert: saved");
        Ok(outcome)
    }

    /// Set the position of an existing object, returning the updated record
    ///
    /// Returns `None` without writing when no object has that id.
    pub fn update_position(&self, id: &str, position: Position) -> Result<Option<SceneObject>, RegistryError> {
        debug!(%id, %position, "update_position: called");
        let _guard = self.lock()?;
        let mut objects = self.read_unlocked()?;

        let Some(existing) = objects.iter_mut().find(|obj| obj.id == id) else {
            debug!(%id, "update_position: no such object, registry untouched");
            return Ok(None);
        };
        existing.position = position;
        let updated = existing.clone();

        self.write_unlocked(&objects)?;
        Ok(Some(updated))
    }

    /// Remove every object whose id is in `ids`, returning the ids removed
    ///
    /// Ids that are not present are ignored. When nothing matches the file is
    /// not rewritten.
    pub fn delete(&self, ids: &[String]) -> Result<Vec<String>, RegistryError> {
        debug!(?ids, "delete: called");
        let _guard = self.lock()?;
        let objects = self.read_unlocked()?;

        let (removed, remaining): (Vec<_>, Vec<_>) = objects.into_iter().partition(|obj| ids.contains(&obj.id));

        if removed.is_empty() {
            debug!("delete: no matching ids, registry untouched");
            return Ok(Vec::new());
        }

        self.write_unlocked(&remaining)?;
        let removed_ids: Vec<String> = removed.into_iter().map(|obj| obj.id).collect();
        info!(removed = ?removed_ids, "Removed objects from registry");
        Ok(removed_ids)
    }

    fn lock(&self) -> Result<LockGuard, RegistryError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| RegistryError::io(&self.lock_path, e))?;
        file.lock_exclusive().map_err(|source| RegistryError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;
        Ok(LockGuard { file })
    }

    fn read_unlocked(&self) -> Result<Vec<SceneObject>, RegistryError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("read_unlocked: registry file missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(RegistryError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|source| RegistryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the full document to a sibling temp file, then rename it into place
    fn write_unlocked(&self, objects: &[SceneObject]) -> Result<(), RegistryError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let tmp = NamedTempFile::new_in(&dir).map_err(|e| RegistryError::io(&dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, objects)?;
            writer.flush().map_err(|e| RegistryError::io(tmp.path(), e))?;
        }
        tmp.as_file().sync_all().map_err(|e| RegistryError::io(tmp.path(), e))?;

        tmp.persist(&self.path).map_err(|e| RegistryError::Replace {
            path: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}
