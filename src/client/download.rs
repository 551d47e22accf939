//! Streaming file download and image fetch
//!
//! The model binary is streamed chunk-by-chunk straight to disk; nothing is
//! buffered in memory. Progress reports are throttled to one per
//! [`PROGRESS_CALLBACK_INTERVAL`] bytes and are monotonically non-decreasing;
//! the final report always covers the full transferred size.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::{TransferProgress, check_status, parse::image_basename};

/// Bytes written between two progress reports
pub(crate) const PROGRESS_CALLBACK_INTERVAL: u64 = 256 * 1024;

/// Total timeout for a single image GET
pub(crate) const IMAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Fallback filename when neither metadata, Content-Disposition, nor the URL
/// yields a usable name
const FALLBACK_FILE_NAME: &str = "model.safetensors";

/// Stream the response of `request` into `dest_dir`, honoring cancellation
/// between chunks.
///
/// Name resolution order: explicit `file_name`, the response's
/// Content-Disposition, the URL's last path segment, a fixed fallback.
pub(crate) async fn stream_to_file(
    request: reqwest::RequestBuilder,
    url: &str,
    dest_dir: &Path,
    file_name: Option<&str>,
    size_hint: Option<u64>,
    on_progress: TransferProgress<'_>,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let response = request.send().await?;
    let response = check_status(response, url)?;

    let name = file_name
        .map(str::to_string)
        .or_else(|| content_disposition_filename(&response))
        .unwrap_or_else(|| {
            let basename = image_basename(url);
            if basename == "image" {
                FALLBACK_FILE_NAME.to_string()
            } else {
                basename
            }
        });
    let dest_path = dest_dir.join(name);

    let total = response.content_length().filter(|len| *len > 0).or(size_hint);

    let mut file = tokio::fs::File::create(&dest_path)
        .await
        .map_err(|e| Error::from_write_error(e, &dest_path))?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    let mut last_reported: u64 = 0;

    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            // Leave the partial file in place; the layout ignores untracked
            // directories until metadata.json exists.
            return Err(Error::Cancelled);
        }
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::from_write_error(e, &dest_path))?;
        written += chunk.len() as u64;

        if written - last_reported >= PROGRESS_CALLBACK_INTERVAL {
            on_progress(written, total);
            last_reported = written;
        }
    }

    file.flush()
        .await
        .map_err(|e| Error::from_write_error(e, &dest_path))?;

    // Final report always closes at 100% of what was actually transferred.
    on_progress(written, Some(total.unwrap_or(written).max(written)));

    tracing::info!(url, path = %dest_path.display(), bytes = written, "File download complete");
    Ok(dest_path)
}

/// Fetch a single image into `dest`. The request carries a short total
/// timeout; images are small enough to buffer in one read.
pub(crate) async fn fetch_image(
    request: reqwest::RequestBuilder,
    url: &str,
    dest: &Path,
) -> Result<()> {
    let response = request.send().await?;
    let response = check_status(response, url)?;
    let bytes = response.bytes().await?;
    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| Error::from_write_error(e, dest))?;
    Ok(())
}

/// Extract a filename from the Content-Disposition header.
///
/// Handles `filename="quoted"` and bare `filename=token` parameters; the
/// RFC 5987 `filename*` form is rare on this service and falls through to
/// the URL-derived name.
fn content_disposition_filename(response: &reqwest::Response) -> Option<String> {
    let header = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    for param in header.split(';') {
        let param = param.trim();
        if let Some(value) = param.strip_prefix("filename=") {
            let name = value.trim().trim_matches('"').trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}
