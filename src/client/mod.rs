//! Remote model-hosting service client
//!
//! One [`HubClient`] per process, sharing a pooled `reqwest::Client`. The
//! bearer token is attached per request rather than baked into the client so
//! a host can swap configurations without rebuilding the connection pool.
//!
//! Submodules:
//! - [`parse`] - model-page URL parsing
//! - [`wire`] - serde structs for the remote JSON
//! - [`download`] - streaming file download and image fetch

pub(crate) mod download;
pub mod parse;
pub(crate) mod wire;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{FetchedModel, ImageInfo, ModelInfo};

pub use parse::{image_basename, parse_model_url};

/// Default remote service root
pub const DEFAULT_BASE_URL: &str = "https://civitai.com";

/// Transfer progress observer: `(bytes_so_far, total_bytes)`
pub type TransferProgress<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Abstraction over the remote service, enabling worker tests without a
/// network. [`HubClient`] is the production implementation.
#[async_trait]
pub trait ModelHost: Send + Sync {
    /// Remote service root used for user-facing links.
    fn base_url(&self) -> &str {
        DEFAULT_BASE_URL
    }

    /// Fetch and assemble model metadata.
    ///
    /// When `version_id` is `None` the latest version is used. At most
    /// `max_images` images are retained, ranked by reaction score.
    async fn fetch_model_info(
        &self,
        model_id: i64,
        version_id: Option<i64>,
        max_images: usize,
    ) -> Result<FetchedModel>;

    /// Stream a (potentially multi-gigabyte) file to `dest_dir`.
    ///
    /// `file_name` is used when given; otherwise the name is derived from
    /// the response's Content-Disposition header or the URL. Progress is
    /// reported with a monotonically non-decreasing byte count; the final
    /// report always covers the full size. Cancellation is honored between
    /// chunks and surfaces as [`Error::Cancelled`].
    async fn download_file(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: Option<&str>,
        size_hint: Option<u64>,
        on_progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;

    /// Fetch a single image to `dest` with a short timeout.
    async fn download_image(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP client for the model-hosting service
#[derive(Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HubClient {
    /// Create a client from the library configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("modelhub-dl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Override the service root (tests point this at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        let trimmed = self.base_url.trim_end_matches('/').len();
        self.base_url.truncate(trimmed);
        self
    }

    /// The configured service root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attach the bearer token when one is configured.
    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.authorize(self.http.get(&url)).send().await?;
        let response = check_status(response, &url)?;
        Ok(response.json::<T>().await?)
    }
}

/// Map an error status to the domain error kind; pass success through.
fn check_status(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status.as_u16() {
        401 | 403 => Error::Unauthorized(context.to_string()),
        404 => Error::NotFound(context.to_string()),
        429 => Error::RateLimited(context.to_string()),
        _ => match response.error_for_status() {
            // Unreachable: error_for_status always errors on non-success
            Ok(_) => Error::Internal(format!("unexpected status {status} for {context}")),
            Err(e) => Error::Network(e),
        },
    })
}

/// Pick the file to download: prefer the safer serialization format when the
/// remote returns alternatives, then the remote's own primary flag, then the
/// first file.
pub(crate) fn select_primary_file(files: &[wire::WireFile]) -> Option<&wire::WireFile> {
    files
        .iter()
        .find(|f| f.is_safetensors())
        .or_else(|| files.iter().find(|f| f.primary == Some(true)))
        .or_else(|| files.first())
}

/// Rank images by combined reaction score, descending. The sort is stable so
/// ties keep the server's original order; the list is then truncated to
/// `max_images`.
pub(crate) fn rank_images(mut images: Vec<ImageInfo>, max_images: usize) -> Vec<ImageInfo> {
    images.sort_by_key(|img| std::cmp::Reverse(img.stats.score()));
    images.truncate(max_images);
    images
}

/// De-duplicate tags preserving first-seen order.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

#[async_trait]
impl ModelHost for HubClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_model_info(
        &self,
        model_id: i64,
        version_id: Option<i64>,
        max_images: usize,
    ) -> Result<FetchedModel> {
        let model_url = format!("{}/api/v1/models/{}", self.base_url, model_id);
        let model: wire::ModelResponse = self.get_json(model_url).await?;

        // The remote lists versions newest-first; absent an explicit request
        // we take the latest.
        let version_id = match version_id {
            Some(v) => v,
            None => {
                model
                    .model_versions
                    .first()
                    .ok_or_else(|| Error::NotFound(format!("model {model_id} has no versions")))?
                    .id
            }
        };

        let version_url = format!("{}/api/v1/model-versions/{}", self.base_url, version_id);
        let version: wire::VersionResponse = self.get_json(version_url).await?;

        let primary = select_primary_file(&version.files);
        let download_url = primary
            .and_then(|f| f.download_url.clone())
            .or(version.download_url.clone())
            .ok_or_else(|| {
                Error::NotFound(format!("model version {version_id} has no downloadable file"))
            })?;
        let file_name = primary.and_then(|f| f.name.clone());
        let size = primary.and_then(|f| f.size_bytes());

        let images: Vec<ImageInfo> = version
            .images
            .into_iter()
            .map(|img| ImageInfo {
                nsfw: img.nsfw.as_bool(),
                meta: img.meta.unwrap_or_default(),
                stats: img.stats,
                url: img.url,
                local_path: None,
            })
            .collect();
        let images = rank_images(images, max_images);

        tracing::info!(
            model_id,
            version_id,
            image_count = images.len(),
            "Fetched model metadata"
        );

        let info = ModelInfo {
            id: model.id,
            version_id: version.id,
            name: model.name,
            model_type: model.model_type,
            base_model: version.base_model,
            creator: model.creator.map(|c| c.username).unwrap_or_default(),
            version_name: version.name,
            description: model.description,
            tags: dedup_tags(model.tags),
            download_url,
            size,
            images,
            thumbnail: None,
            download_date: None,
            last_updated: None,
            path: None,
        };

        Ok(FetchedModel { info, file_name })
    }

    async fn download_file(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: Option<&str>,
        size_hint: Option<u64>,
        on_progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let request = self.authorize(self.http.get(url));
        download::stream_to_file(
            request,
            url,
            dest_dir,
            file_name,
            size_hint,
            on_progress,
            cancel,
        )
        .await
    }

    async fn download_image(&self, url: &str, dest: &Path) -> Result<()> {
        let request = self
            .authorize(self.http.get(url))
            .timeout(download::IMAGE_TIMEOUT);
        download::fetch_image(request, url, dest).await
    }
}

/// Convenience alias used by the downloader
pub type SharedHost = Arc<dyn ModelHost>;
