//! AssetStore - generated images, meshes and preview pages on disk

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::prompts::{PromptError, PromptLoader};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render preview: {0}")]
    Preview(#[from] PromptError),
}

/// Writes generated artifacts under the configured directories
///
/// Files are written before the registry is touched. If a create fails
/// afterwards they stay on disk, unreferenced.
pub struct AssetStore {
    images_dir: PathBuf,
    models_dir: PathBuf,
    previews_dir: PathBuf,
    model_url_prefix: String,
    prompts: Arc<PromptLoader>,
}

/// File stem for an object id; never contains a path separator or a dot
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

impl AssetStore {
    pub fn new(config: &StorageConfig, prompts: Arc<PromptLoader>) -> Self {
        debug!(?config, "AssetStore::new: called");
        Self {
            images_dir: config.images_dir.clone(),
            models_dir: config.models_dir.clone(),
            previews_dir: config.previews_dir.clone(),
            model_url_prefix: config.model_url_prefix.trim_end_matches('/').to_string(),
            prompts,
        }
    }

    /// URL the viewer loads the model from
    pub fn model_url(&self, id: &str) -> String {
        format!("{}/{}.glb", self.model_url_prefix, file_stem(id))
    }

    /// Store the reference image as `{id}.png`
    pub async fn save_image(&self, id: &str, png: &[u8]) -> Result<PathBuf, AssetError> {
        let path = self.images_dir.join(format!("{}.png", file_stem(id)));
        write(&path, png).await?;
        debug!(?path, "save_image: written");
        Ok(path)
    }

    /// Store the mesh as `{id}.glb` plus an HTML preview; returns the model URL
    pub async fn save_model(&self, id: &str, glb: &[u8]) -> Result<String, AssetError> {
        let stem = file_stem(id);
        let model_path = self.models_dir.join(format!("{}.glb", stem));
        write(&model_path, glb).await?;

        let page = self.prompts.render(
            "preview",
            &json!({
                "title": handlebars::html_escape(id),
                "model_data": STANDARD.encode(glb),
            }),
        )?;
        let preview_path = self.previews_dir.join(format!("{}.html", stem));
        write(&preview_path, page.as_bytes()).await?;

        info!(model = %model_path.display(), preview = %preview_path.display(), "Model assets saved");
        Ok(self.model_url(id))
    }
}

async fn write(path: &Path, data: &[u8]) -> Result<(), AssetError> {
    let io_err = |source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(path, data).await.map_err(io_err)
}
