//! Per-job download pipeline.
//!
//! One worker handles one URL end to end:
//! parse → metadata → folder → model file → image fan-out → metadata.json →
//! gallery. `metadata.json` is the commit point: any abort before it leaves
//! an untracked directory the next scan ignores; after it the job is
//! considered done and a racing cancel is ignored.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::client::parse_model_url;
use crate::error::{Error, Result};
use crate::gallery;
use crate::storage::IMAGES_DIR;
use crate::types::{ModelInfo, ProgressCallback, ProgressUpdate, Status};

use super::images::download_images;
use super::{ModelDownloader, TaskPatch};

/// Shared context for a single download worker.
pub(crate) struct WorkerContext {
    pub(crate) url: String,
    pub(crate) downloader: ModelDownloader,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) progress: Option<ProgressCallback>,
}

impl WorkerContext {
    /// Push a stage message to the per-job callback.
    fn report_message(&self, message: &str) {
        if let Some(cb) = &self.progress {
            cb(ProgressUpdate::message(message, Status::Downloading));
        }
    }

    /// Record model-file progress on the task and the callback.
    fn report_model_progress(&self, percent: u8, bytes_delta: u64) {
        self.downloader.update_task(
            &self.url,
            TaskPatch {
                model_progress: Some(percent),
                ..Default::default()
            },
        );
        if let Some(cb) = &self.progress {
            cb(ProgressUpdate {
                message: String::new(),
                model_progress: i32::from(percent),
                image_progress: -1,
                status: Status::Downloading,
                bytes: bytes_delta as i64,
            });
        }
    }

    /// Record image fan-out progress on the task and the callback.
    pub(super) fn report_image_progress(&self, percent: u8) {
        self.downloader.update_task(
            &self.url,
            TaskPatch {
                image_progress: Some(percent),
                ..Default::default()
            },
        );
        if let Some(cb) = &self.progress {
            cb(ProgressUpdate {
                message: String::new(),
                model_progress: -1,
                image_progress: i32::from(percent),
                status: Status::Downloading,
                bytes: -1,
            });
        }
    }

    fn remove_from_active(&self) {
        self.downloader.lock_active().remove(&self.url);
    }
}

/// Run one download job to its terminal state.
pub(crate) async fn run_download_task(ctx: WorkerContext) {
    let url = ctx.url.clone();
    let result = execute_pipeline(&ctx).await;

    match result {
        Ok(info) => {
            let message = format!("Successfully downloaded {}", info.name);
            tracing::info!(url = %url, model_id = info.id, "Download complete");
            if let Some(cb) = &ctx.progress {
                cb(ProgressUpdate {
                    message: message.clone(),
                    model_progress: 100,
                    image_progress: 100,
                    status: Status::Completed,
                    bytes: -1,
                });
            }
            ctx.downloader
                .complete(&url, true, Some(message), Some(info));
        }
        Err(e) if e.is_cancelled() => {
            tracing::info!(url = %url, "Download cancelled");
            if let Some(cb) = &ctx.progress {
                cb(ProgressUpdate::message("Cancelled", Status::Canceled));
            }
            ctx.downloader.mark_canceled(&url);
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(url = %url, error = %message, "Download failed");
            if let Some(cb) = &ctx.progress {
                cb(ProgressUpdate::message(message.clone(), Status::Failed));
            }
            ctx.downloader.complete(&url, false, Some(message), None);
        }
    }

    ctx.remove_from_active();
}

/// The multi-stage pipeline. Any error unwinds to `run_download_task`,
/// which maps it onto the task's terminal state.
async fn execute_pipeline(ctx: &WorkerContext) -> Result<ModelInfo> {
    let config = ctx.downloader.config();

    if ctx.cancel_token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Stage 1: parse the model-page URL
    let (model_id, version_id) = parse_model_url(&ctx.url)?;

    // Stage 2: fetch metadata
    ctx.report_message("Fetching model metadata");
    let fetched = ctx
        .downloader
        .host
        .fetch_model_info(model_id, version_id, config.top_image_count)
        .await?;
    let mut info = fetched.info;

    // Stage 3: resolve the target directory
    let dir = ctx.downloader.layout.ensure_model_dir(&info).await?;

    // Stage 4: stream the model binary
    if config.download_model {
        // Fail before streaming when the metadata size already exceeds free
        // space; a mid-stream ENOSPC would waste the whole transfer.
        if let Some(size) = info.size
            && let Ok(available) = ctx.downloader.layout.available_space()
            && available < size
        {
            return Err(Error::DiskFull { path: dir.clone() });
        }

        ctx.report_message(&format!("Downloading {}", info.name));
        let reported = AtomicU64::new(0);
        let on_progress = |bytes_so_far: u64, total: Option<u64>| {
            let previous = reported.swap(bytes_so_far, Ordering::Relaxed);
            let delta = bytes_so_far.saturating_sub(previous);
            ctx.downloader.bandwidth.add_data_point(delta);
            let percent = match total {
                Some(total) if total > 0 => ((bytes_so_far * 100) / total).min(100) as u8,
                _ => 0,
            };
            ctx.report_model_progress(percent, delta);
        };
        let model_path = ctx
            .downloader
            .host
            .download_file(
                &info.download_url,
                &dir,
                fetched.file_name.as_deref(),
                info.size,
                &on_progress,
                &ctx.cancel_token,
            )
            .await?;
        if info.size.is_none() {
            info.size = tokio::fs::metadata(&model_path).await.ok().map(|m| m.len());
        }
    }
    ctx.report_model_progress(100, 0);

    // Stage 5: NSFW filter
    if !config.download_nsfw {
        let before = info.images.len();
        info.images.retain(|img| !img.nsfw);
        let filtered = before - info.images.len();
        if filtered > 0 {
            tracing::info!(url = %ctx.url, filtered, "Filtered NSFW images");
        }
    }

    // Stage 6: image fan-out
    if config.download_images && !info.images.is_empty() {
        ctx.report_message("Downloading preview images");
        let images_dir = dir.join(IMAGES_DIR);
        let outcome = download_images(ctx, &mut info, &images_dir).await?;
        tracing::info!(
            url = %ctx.url,
            downloaded = outcome.downloaded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Image fan-out finished"
        );
    }
    ctx.report_image_progress(100);
    info.thumbnail = info
        .images
        .iter()
        .find_map(|img| img.local_path.clone());

    // Stage 7: persist metadata.json — the commit point. No cancellation
    // checks beyond this line.
    let now = Utc::now();
    info.path = Some(dir.clone());
    info.download_date = Some(now);
    info.last_updated = Some(now);
    ctx.downloader.layout.write_metadata(&dir, &info).await?;

    // Stage 8: gallery emission; failures log but never fail the job
    if config.create_html {
        match gallery::write_model_card(&info, &dir, ctx.downloader.host.base_url()).await {
            Ok(card_path) => {
                if config.auto_open_html
                    && let Err(e) = opener::open(&card_path)
                {
                    tracing::warn!(path = %card_path.display(), error = %e, "Could not open gallery");
                }
            }
            Err(e) => {
                tracing::error!(url = %ctx.url, error = %e, "Gallery emission failed");
            }
        }
    }

    Ok(info)
}
