//! Wire types for the remote model-hosting API
//!
//! These structs mirror the JSON returned by `GET /api/v1/models/{id}` and
//! `GET /api/v1/model-versions/{id}`. Every field the library does not
//! consume is simply omitted; serde ignores unknown fields by default.

use serde::Deserialize;

use crate::types::{ImageMeta, ImageStats, ModelType};

/// `GET /api/v1/models/{id}` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModelResponse {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub creator: Option<CreatorRef>,
    #[serde(default)]
    pub model_versions: Vec<VersionSummary>,
}

/// Creator block inside a model response
#[derive(Debug, Deserialize)]
pub(crate) struct CreatorRef {
    #[serde(default)]
    pub username: String,
}

/// Version entry inside a model response; ordered newest-first by the remote
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VersionSummary {
    pub id: i64,
}

/// `GET /api/v1/model-versions/{id}` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VersionResponse {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_model: String,
    #[serde(default)]
    pub files: Vec<WireFile>,
    #[serde(default)]
    pub images: Vec<WireImage>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// One downloadable file inside a version
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    /// Size in kilobytes as reported by the remote
    #[serde(rename = "sizeKB", default)]
    pub size_kb: Option<f64>,
    #[serde(default)]
    pub metadata: Option<WireFileMetadata>,
    #[serde(default)]
    pub primary: Option<bool>,
}

impl WireFile {
    /// Whether this file uses the safer serialization format.
    pub(crate) fn is_safetensors(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.format.as_deref())
            .is_some_and(|f| f.eq_ignore_ascii_case("SafeTensor"))
            || self
                .name
                .as_deref()
                .is_some_and(|n| n.ends_with(".safetensors"))
    }

    /// File size in bytes, when reported.
    pub(crate) fn size_bytes(&self) -> Option<u64> {
        self.size_kb.map(|kb| (kb * 1024.0) as u64)
    }
}

/// Serialization format metadata attached to a file
#[derive(Debug, Deserialize)]
pub(crate) struct WireFileMetadata {
    #[serde(default)]
    pub format: Option<String>,
}

/// One preview image inside a version
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireImage {
    pub url: String,
    /// The remote reports nsfw either as a boolean or a level string
    /// ("None", "Soft", "Mature", "X")
    #[serde(default)]
    pub nsfw: NsfwFlag,
    #[serde(default)]
    pub meta: Option<ImageMeta>,
    #[serde(default)]
    pub stats: ImageStats,
}

/// Tolerant nsfw field: boolean or level string
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
pub(crate) enum NsfwFlag {
    Bool(bool),
    Level(String),
    #[default]
    #[serde(skip)]
    Unknown,
}

impl NsfwFlag {
    /// Collapse to a boolean: any level other than "None" counts as nsfw.
    pub(crate) fn as_bool(&self) -> bool {
        match self {
            NsfwFlag::Bool(b) => *b,
            NsfwFlag::Level(level) => !level.eq_ignore_ascii_case("none"),
            NsfwFlag::Unknown => false,
        }
    }
}
