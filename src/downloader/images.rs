//! Bounded parallel preview-image fan-out.
//!
//! Up to `download_threads` images are in flight at once. Individual image
//! failures are logged and tolerated; only cancellation aborts the batch.
//! Progress advances to `floor(done / total * 100)` after each completion
//! (successful or not) and never regresses.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use futures::stream;

use crate::client::image_basename;
use crate::error::{Error, Result};
use crate::types::ModelInfo;

use super::worker::WorkerContext;

/// Counts from one image batch
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct ImageOutcome {
    /// Files fetched over the network
    pub downloaded: usize,
    /// Files already on disk (no HTTP call made)
    pub skipped: usize,
    /// Failed fetches (job continues)
    pub failed: usize,
}

/// Download every image in `info.images` into `images_dir`, writing the
/// resulting local paths back into the records.
pub(super) async fn download_images(
    ctx: &WorkerContext,
    info: &mut ModelInfo,
    images_dir: &Path,
) -> Result<ImageOutcome> {
    let total = info.images.len();
    let jobs: Vec<(usize, String, PathBuf)> = info
        .images
        .iter()
        .enumerate()
        .map(|(index, img)| {
            (
                index,
                img.url.clone(),
                images_dir.join(image_basename(&img.url)),
            )
        })
        .collect();

    let mut completions = stream::iter(jobs.into_iter().map(|(index, url, dest)| {
        let host = ctx.downloader.host.clone();
        let cancel = ctx.cancel_token.clone();
        async move {
            // Checked before each dispatch; pending futures in the buffer
            // resolve as cancelled instead of issuing their GET.
            if cancel.is_cancelled() {
                return (index, dest, FetchResult::Cancelled);
            }
            if dest.exists() {
                return (index, dest, FetchResult::Skipped);
            }
            match host.download_image(&url, &dest).await {
                Ok(()) => (index, dest, FetchResult::Downloaded),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Image download failed");
                    (index, dest, FetchResult::Failed)
                }
            }
        }
    }))
    .buffer_unordered(ctx.downloader.config.download_threads.max(1));

    let mut outcome = ImageOutcome::default();
    let mut done = 0usize;
    let mut local_paths: Vec<Option<PathBuf>> = vec![None; total];

    while let Some((index, dest, result)) = completions.next().await {
        match result {
            FetchResult::Cancelled => return Err(Error::Cancelled),
            FetchResult::Downloaded => {
                outcome.downloaded += 1;
                local_paths[index] = Some(dest);
            }
            FetchResult::Skipped => {
                outcome.skipped += 1;
                local_paths[index] = Some(dest);
            }
            FetchResult::Failed => outcome.failed += 1,
        }

        done += 1;
        ctx.report_image_progress(((done * 100) / total) as u8);

        // Checked after each completion as well, so a cancel arriving while
        // the last requests drain still stops the job promptly.
        if ctx.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }
    }

    for (image, path) in info.images.iter_mut().zip(local_paths) {
        image.local_path = path;
    }
    Ok(outcome)
}

enum FetchResult {
    Downloaded,
    Skipped,
    Failed,
    Cancelled,
}
