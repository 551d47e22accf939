//! Configuration types for modelhub-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Library configuration, consumed read-only by the core.
///
/// Every field has a serde default so a host can deserialize a partial map;
/// `comfy_path` is the only setting without a usable default and is checked
/// by [`Config::validate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem root of the layout tree (the inference app's model dir)
    #[serde(default)]
    pub comfy_path: PathBuf,

    /// Bearer token added to all remote requests when non-empty
    #[serde(default)]
    pub api_key: String,

    /// Maximum preview images fetched per model (default: 9)
    #[serde(default = "default_top_image_count")]
    pub top_image_count: usize,

    /// Pagination size hint passed to the remote client (default: 100)
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,

    /// Fetch the model binary (default: true)
    #[serde(default = "default_true")]
    pub download_model: bool,

    /// Fetch preview images (default: true)
    #[serde(default = "default_true")]
    pub download_images: bool,

    /// Include images the remote flagged as NSFW (default: false)
    #[serde(default)]
    pub download_nsfw: bool,

    /// Parallel image workers per job (default: 4)
    #[serde(default = "default_download_threads")]
    pub download_threads: usize,

    /// Emit `model_card.html` after a successful download (default: true)
    #[serde(default = "default_true")]
    pub create_html: bool,

    /// Open the gallery with the host's default handler after emission
    /// (default: false)
    #[serde(default)]
    pub auto_open_html: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            comfy_path: PathBuf::new(),
            api_key: String::new(),
            top_image_count: default_top_image_count(),
            fetch_batch_size: default_fetch_batch_size(),
            download_model: true,
            download_images: true,
            download_nsfw: false,
            download_threads: default_download_threads(),
            create_html: true,
            auto_open_html: false,
        }
    }
}

impl Config {
    /// Check the configuration for values the core cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `comfy_path` is empty or
    /// `download_threads` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.comfy_path.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "comfy_path must point at the layout root".to_string(),
                key: Some("comfy_path".to_string()),
            });
        }
        if self.download_threads == 0 {
            return Err(Error::Config {
                message: "download_threads must be at least 1".to_string(),
                key: Some("download_threads".to_string()),
            });
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_top_image_count() -> usize {
    9
}

fn default_fetch_batch_size() -> usize {
    100
}

fn default_download_threads() -> usize {
    4
}
