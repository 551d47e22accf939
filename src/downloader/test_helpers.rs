//! Shared fixtures for downloader unit tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::client::{ModelHost, TransferProgress, rank_images};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::StorageLayout;
use crate::types::{FetchedModel, ImageInfo, ImageMeta, ImageStats, ModelInfo, ModelType};

use super::ModelDownloader;

/// Scriptable in-memory [`ModelHost`].
pub(crate) struct MockHost {
    /// Template returned by `fetch_model_info` (images get ranked/truncated
    /// like the real client does)
    pub model: std::sync::Mutex<ModelInfo>,
    /// Primary file name reported alongside the metadata
    pub file_name: Option<String>,
    /// Number of chunks the fake model file is written in
    pub file_chunks: usize,
    /// Bytes per chunk
    pub chunk_size: usize,
    /// Pause between chunks (lets tests cancel mid-stream)
    pub chunk_delay: Duration,
    /// When set, `fetch_model_info` fails with NotFound
    pub fail_metadata: AtomicBool,
    /// Image URLs whose download fails
    pub fail_images: std::sync::Mutex<HashSet<String>>,
    /// Number of `download_image` calls actually made
    pub image_calls: AtomicUsize,
    /// Number of `download_file` calls made
    pub file_calls: AtomicUsize,
}

impl MockHost {
    pub(crate) fn new(model: ModelInfo) -> Self {
        Self {
            model: std::sync::Mutex::new(model),
            file_name: Some("model.safetensors".to_string()),
            file_chunks: 4,
            chunk_size: 1024,
            chunk_delay: Duration::ZERO,
            fail_metadata: AtomicBool::new(false),
            fail_images: std::sync::Mutex::new(HashSet::new()),
            image_calls: AtomicUsize::new(0),
            file_calls: AtomicUsize::new(0),
        }
    }

    /// A slow variant whose file stream takes long enough to cancel.
    pub(crate) fn slow(model: ModelInfo) -> Self {
        Self {
            file_chunks: 50,
            chunk_delay: Duration::from_millis(20),
            ..Self::new(model)
        }
    }
}

#[async_trait]
impl ModelHost for MockHost {
    async fn fetch_model_info(
        &self,
        model_id: i64,
        _version_id: Option<i64>,
        max_images: usize,
    ) -> Result<FetchedModel> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(Error::NotFound(format!("model {model_id}")));
        }
        let mut info = self.model.lock().unwrap().clone();
        info.id = model_id;
        info.images = rank_images(info.images, max_images);
        Ok(FetchedModel {
            info,
            file_name: self.file_name.clone(),
        })
    }

    async fn download_file(
        &self,
        _url: &str,
        dest_dir: &Path,
        file_name: Option<&str>,
        _size_hint: Option<u64>,
        on_progress: TransferProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.file_calls.fetch_add(1, Ordering::SeqCst);
        let dest = dest_dir.join(file_name.unwrap_or("model.safetensors"));
        let total = (self.file_chunks * self.chunk_size) as u64;
        let chunk = vec![0u8; self.chunk_size];
        let mut written: u64 = 0;
        let mut bytes = Vec::with_capacity(total as usize);

        for _ in 0..self.file_chunks {
            if cancel.is_cancelled() {
                // Partial file stays, mirroring the streaming client.
                tokio::fs::write(&dest, &bytes).await?;
                return Err(Error::Cancelled);
            }
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            bytes.extend_from_slice(&chunk);
            written += chunk.len() as u64;
            on_progress(written, Some(total));
        }

        tokio::fs::write(&dest, &bytes).await?;
        Ok(dest)
    }

    async fn download_image(&self, url: &str, dest: &Path) -> Result<()> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_images.lock().unwrap().contains(url) {
            return Err(Error::Internal(format!("injected failure for {url}")));
        }
        tokio::fs::write(dest, b"imagebytes").await?;
        Ok(())
    }
}

/// A plain model record for fixtures.
pub(crate) fn sample_model(name: &str) -> ModelInfo {
    ModelInfo {
        id: 100,
        version_id: 1000,
        name: name.to_string(),
        model_type: ModelType::Lora,
        base_model: "SDXL".to_string(),
        creator: "tester".to_string(),
        version_name: "v1.0".to_string(),
        description: "fixture model".to_string(),
        tags: vec!["fixture".to_string()],
        download_url: "https://host/api/download/models/1000".to_string(),
        size: Some(4096),
        images: Vec::new(),
        thumbnail: None,
        download_date: None,
        last_updated: None,
        path: None,
    }
}

/// `count` images with descending scores; the first `nsfw_count` are flagged.
pub(crate) fn sample_images(count: usize, nsfw_count: usize) -> Vec<ImageInfo> {
    (0..count)
        .map(|i| ImageInfo {
            url: format!("https://cdn.host/previews/img{i}.png"),
            nsfw: i < nsfw_count,
            meta: ImageMeta {
                prompt: format!("prompt {i}"),
                model: "base".to_string(),
                resources: vec![],
            },
            stats: ImageStats {
                like_count: (count - i) as u64,
                heart_count: 0,
                laugh_count: 0,
            },
            local_path: None,
        })
        .collect()
}

/// Downloader over a [`MockHost`] writing into a temp layout root.
pub(crate) fn create_test_downloader(host: MockHost) -> (ModelDownloader, Arc<MockHost>, TempDir) {
    let temp = TempDir::new().expect("temp dir");
    let config = Config {
        comfy_path: temp.path().to_path_buf(),
        ..Default::default()
    };
    let layout = StorageLayout::new(temp.path()).expect("layout");
    let host = Arc::new(host);
    let downloader = ModelDownloader::with_host(config, host.clone(), layout);
    (downloader, host, temp)
}

/// Same, but with a caller-tweaked config (comfy_path is still overridden).
pub(crate) fn create_test_downloader_with_config(
    host: MockHost,
    mut config: Config,
) -> (ModelDownloader, Arc<MockHost>, TempDir) {
    let temp = TempDir::new().expect("temp dir");
    config.comfy_path = temp.path().to_path_buf();
    let layout = StorageLayout::new(temp.path()).expect("layout");
    let host = Arc::new(host);
    let downloader = ModelDownloader::with_host(config, host.clone(), layout);
    (downloader, host, temp)
}

/// URL fixture for a given model id.
pub(crate) fn model_url(id: i64) -> String {
    format!("https://civitai.com/models/{id}")
}
