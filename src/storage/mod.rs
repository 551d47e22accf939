//! Storage layout: category routing, tree scanning, and maintenance
//!
//! The on-disk tree is rooted at the configured `comfy_path`:
//!
//! ```text
//! comfy_path/
//!   checkpoints/<baseModel>/<sanitized-name>/{model file, metadata.json, model_card.html, images/}
//!   loras/...
//!   embeddings/...
//! ```
//!
//! `metadata.json` is the source of truth: a directory without it is not a
//! managed model, whatever else it contains.
//!
//! Submodules:
//! - [`scan`] - tree walking, duplicate and orphan detection
//! - [`usage`] - folder sizes and filesystem statistics
//! - [`export`] - deletion and export copying

pub mod export;
pub mod scan;
pub mod usage;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{ModelInfo, ModelType};

pub use export::{ExportReport, PathExportResult};
pub use scan::{DuplicateGroup, OrphanFile};
pub use usage::StorageUsage;

/// Name of the per-model metadata file (the commit point of a download)
pub const METADATA_FILE: &str = "metadata.json";

/// Name of the generated gallery page
pub const MODEL_CARD_FILE: &str = "model_card.html";

/// Subdirectory holding preview images
pub const IMAGES_DIR: &str = "images";

/// File extensions treated as model binaries during orphan scans
pub const MODEL_EXTENSIONS: &[&str] = &["safetensors", "ckpt", "pt", "pth", "bin", "onnx"];

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`.
///
/// Idempotent: sanitizing an already-sanitized string is a no-op.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Filesystem layout policy rooted at `comfy_path`
#[derive(Clone, Debug)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Create a layout over `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Layout`] when `root` is empty.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(Error::Layout("comfy_path is not configured".to_string()));
        }
        Ok(Self { root })
    }

    /// The layout root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The deterministic directory for a model:
    /// `root / typeDir(type) / baseModel / sanitize(name)`.
    pub fn model_dir(&self, model_type: ModelType, base_model: &str, name: &str) -> PathBuf {
        self.root
            .join(model_type.dir_name())
            .join(sanitize(base_model))
            .join(sanitize(name))
    }

    /// Resolve and create the directory for `info`, including its `images/`
    /// subdirectory.
    pub async fn ensure_model_dir(&self, info: &ModelInfo) -> Result<PathBuf> {
        let dir = self.model_dir(info.model_type, &info.base_model, &info.name);
        tokio::fs::create_dir_all(dir.join(IMAGES_DIR))
            .await
            .map_err(|e| {
                Error::Layout(format!(
                    "failed to create model directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        Ok(dir)
    }

    /// Locate the directory for a model on disk.
    ///
    /// Tries the deterministic sanitized path first; when absent, scans the
    /// type's category directory for any `metadata.json` whose `id` matches
    /// and returns its parent.
    pub fn find_path(
        &self,
        id: i64,
        model_type: ModelType,
        base_model: &str,
        name: &str,
    ) -> Option<PathBuf> {
        let deterministic = self.model_dir(model_type, base_model, name);
        if deterministic.join(METADATA_FILE).is_file() {
            return Some(deterministic);
        }

        let category = self.root.join(model_type.dir_name());
        scan::scan_category(&category)
            .find(|record| record.id == id)
            .and_then(|record| record.path)
    }

    /// Write `metadata.json` (pretty-printed UTF-8) into `dir`.
    pub async fn write_metadata(&self, dir: &Path, info: &ModelInfo) -> Result<()> {
        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(info)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| Error::from_write_error(e, &path))?;
        Ok(())
    }
}
