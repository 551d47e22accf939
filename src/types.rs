//! Core types for modelhub-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Download status of a queued URL
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Queued and waiting to start
    Queued,
    /// Currently downloading
    Downloading,
    /// Successfully completed
    Completed,
    /// Failed with error
    Failed,
    /// Cancelled by the caller
    Canceled,
}

impl Status {
    /// Whether this status is terminal (absorbing — no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Canceled)
    }
}

/// Coarse model classification determining the target subdirectory.
///
/// Variant names mirror the remote service's `type` strings so the enum
/// deserializes straight off the wire; anything unrecognized becomes
/// [`ModelType::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Full checkpoint weights
    Checkpoint,
    /// Low-rank adaptation
    #[serde(rename = "LORA")]
    Lora,
    /// LoCon variant of low-rank adaptation (routed with LORA)
    LoCon,
    /// Textual inversion embedding
    TextualInversion,
    /// Variational autoencoder
    #[serde(rename = "VAE")]
    Vae,
    /// ControlNet conditioning model
    Controlnet,
    /// Upscaling model
    Upscaler,
    /// Anything else
    #[serde(other)]
    Other,
}

impl ModelType {
    /// The category directory this type routes to under the layout root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ModelType::Checkpoint => "checkpoints",
            ModelType::Lora | ModelType::LoCon => "loras",
            ModelType::TextualInversion => "embeddings",
            ModelType::Vae => "vae",
            ModelType::Controlnet => "controlnet",
            ModelType::Upscaler => "upscale_models",
            ModelType::Other => "other",
        }
    }

    /// All category directories, each listed once.
    pub fn all_dirs() -> &'static [&'static str] {
        &[
            "checkpoints",
            "loras",
            "embeddings",
            "vae",
            "controlnet",
            "upscale_models",
            "other",
        ]
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelType::Checkpoint => "Checkpoint",
            ModelType::Lora => "LORA",
            ModelType::LoCon => "LoCon",
            ModelType::TextualInversion => "TextualInversion",
            ModelType::Vae => "VAE",
            ModelType::Controlnet => "Controlnet",
            ModelType::Upscaler => "Upscaler",
            ModelType::Other => "Other",
        };
        write!(f, "{}", s)
    }
}

/// A generation resource referenced by a preview image (checkpoint, lora, ...)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResource {
    /// Resource kind as reported by the remote ("checkpoint", "lora", ...)
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Resource name
    #[serde(default)]
    pub name: String,
}

/// Generation parameters attached to a preview image
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// Positive prompt used to generate the image
    #[serde(default)]
    pub prompt: String,
    /// Checkpoint the image was generated with
    #[serde(default)]
    pub model: String,
    /// Additional resources used during generation
    #[serde(default)]
    pub resources: Vec<ImageResource>,
}

/// Reaction counts for a preview image
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStats {
    /// Thumbs-up reactions
    #[serde(default)]
    pub like_count: u64,
    /// Heart reactions
    #[serde(default)]
    pub heart_count: u64,
    /// Laugh reactions
    #[serde(default)]
    pub laugh_count: u64,
}

impl ImageStats {
    /// Combined reaction score used to rank images.
    pub fn score(&self) -> u64 {
        self.like_count + self.heart_count + self.laugh_count
    }
}

/// One preview image attached to a model version
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    /// Remote URL of the image (or video) file
    pub url: String,
    /// Whether the remote flagged this image as NSFW
    #[serde(default)]
    pub nsfw: bool,
    /// Generation parameters
    #[serde(default)]
    pub meta: ImageMeta,
    /// Reaction counts
    #[serde(default)]
    pub stats: ImageStats,
    /// Local path once downloaded (None until then, or when the fetch failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

/// Value object describing one downloadable model, populated from remote
/// metadata and enriched by the download pipeline.
///
/// Serialized verbatim as `metadata.json` inside the model directory; that
/// file is the source of truth for "this directory contains a managed model".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Stable model identifier on the remote service
    pub id: i64,
    /// Identifier of the downloaded version
    pub version_id: i64,
    /// Model name
    pub name: String,
    /// Model classification
    #[serde(rename = "type")]
    pub model_type: ModelType,
    /// Upstream model family (free-form: "SD1.5", "SDXL", "Pony", ...)
    pub base_model: String,
    /// Creator username
    #[serde(default)]
    pub creator: String,
    /// Version display name
    #[serde(default)]
    pub version_name: String,
    /// Model description (HTML from the remote; escaped at render time)
    #[serde(default)]
    pub description: String,
    /// Ordered, de-duplicated tag list
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque download URL for the primary model file
    pub download_url: String,
    /// Primary file size in bytes, when the remote reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Preview images, highest reaction score first
    #[serde(default)]
    pub images: Vec<ImageInfo>,
    /// Local path of the first downloaded image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<PathBuf>,
    /// When the download pipeline completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_date: Option<DateTime<Utc>>,
    /// Last time this record was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Absolute local directory holding the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ModelInfo {
    /// The remote page for this model (`https://<host>/models/<id>`).
    pub fn remote_page(&self, host: &str) -> String {
        format!("{}/models/{}", host.trim_end_matches('/'), self.id)
    }
}

/// Metadata fetch result: the [`ModelInfo`] plus transport details that do
/// not belong in `metadata.json`.
#[derive(Clone, Debug)]
pub struct FetchedModel {
    /// The populated model record
    pub info: ModelInfo,
    /// Name of the primary file as reported by the version metadata
    pub file_name: Option<String>,
}

/// One URL's end-to-end download job
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    /// The model-page URL (unique key in the queue)
    pub url: String,
    /// Ordinal position among pending tasks; smaller runs earlier
    pub priority: usize,
    /// Current lifecycle status
    pub status: Status,
    /// Model file progress, 0..=100, monotonic
    pub model_progress: u8,
    /// Image fan-out progress, 0..=100, monotonic
    pub image_progress: u8,
    /// When the task left the queue and started downloading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the task entered a terminal state (set exactly once)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// One-line failure or completion message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Populated model record on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
}

impl DownloadTask {
    /// Create a fresh QUEUED task for `url` at queue position `priority`.
    pub fn new(url: impl Into<String>, priority: usize) -> Self {
        Self {
            url: url.into(),
            priority,
            status: Status::Queued,
            model_progress: 0,
            image_progress: 0,
            start_time: None,
            end_time: None,
            error_message: None,
            model_info: None,
        }
    }
}

/// Event emitted on the downloader's broadcast channel
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Number of pending tasks changed (enqueue/dequeue/clear)
    QueueSize {
        /// Pending task count after the change
        size: usize,
    },

    /// A task's fields changed; carries a full snapshot
    TaskUpdated {
        /// The task after the mutation
        task: DownloadTask,
    },

    /// The pending order changed; carries a consistent snapshot
    QueueReordered {
        /// Pending URLs in their new order
        urls: Vec<String>,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Incremental progress report delivered to a per-job callback.
///
/// Numeric fields are `-1` when unchanged since the previous report.
#[derive(Clone, Debug)]
pub struct ProgressUpdate {
    /// Human-readable stage description
    pub message: String,
    /// Model file progress 0..=100, or -1
    pub model_progress: i32,
    /// Image fan-out progress 0..=100, or -1
    pub image_progress: i32,
    /// Task status at the time of the report
    pub status: Status,
    /// Bytes transferred since the previous report, or -1
    pub bytes: i64,
}

impl ProgressUpdate {
    /// A report that only carries a message and status.
    pub fn message(message: impl Into<String>, status: Status) -> Self {
        Self {
            message: message.into(),
            model_progress: -1,
            image_progress: -1,
            status,
            bytes: -1,
        }
    }
}

/// Per-job progress observer
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Aggregate queue statistics snapshot
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of pending (QUEUED) tasks
    pub queued: usize,
    /// Number of tasks currently downloading
    pub downloading: usize,
    /// Number of completed tasks
    pub completed: usize,
    /// Number of failed tasks
    pub failed: usize,
    /// Number of cancelled tasks
    pub canceled: usize,
    /// Bytes observed in the bandwidth window
    pub window_bytes: u64,
}
