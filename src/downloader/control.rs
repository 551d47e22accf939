//! Admission, cancellation fan-out, statistics, and shutdown.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bandwidth::BandwidthSample;
use crate::types::{Event, ProgressCallback};

use super::worker::{WorkerContext, run_download_task};
use super::ModelDownloader;

/// Poll interval used by [`ModelDownloader::wait_idle`]
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl ModelDownloader {
    /// Start downloading `url` immediately.
    ///
    /// Rejects (returns `false`) when an identical URL is already in flight
    /// or the downloader is shutting down. The URL does not need to be
    /// queued first; a queued URL is pulled out of the pending list.
    ///
    /// The optional `progress` callback receives per-stage
    /// [`crate::types::ProgressUpdate`]s; terminal outcomes are also visible
    /// to every subscriber as a task-updated event.
    pub fn start_download(&self, url: &str, progress: Option<ProgressCallback>) -> bool {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            tracing::warn!(url, "Rejecting download during shutdown");
            return false;
        }

        // Register the token before claiming the task so a concurrent
        // start_download of the same URL loses on the map insert.
        let cancel_token = CancellationToken::new();
        {
            let mut active = self.lock_active();
            if active.contains_key(url) {
                tracing::warn!(url, "Download already in flight, rejecting");
                return false;
            }
            active.insert(url.to_string(), cancel_token.clone());
        }

        if self.claim_for_download(url).is_none() {
            // Task map says downloading but no token existed; recover the slot.
            self.lock_active().remove(url);
            return false;
        }

        let ctx = WorkerContext {
            url: url.to_string(),
            downloader: self.clone(),
            cancel_token,
            progress,
        };
        tokio::spawn(async move {
            run_download_task(ctx).await;
        });
        true
    }

    /// Pop the queue head and start it. Returns the started URL.
    ///
    /// The manager imposes no global concurrency limit: a host wanting N
    /// parallel jobs calls this N times and again on each terminal event.
    pub fn start_next(&self, progress: Option<ProgressCallback>) -> Option<String> {
        loop {
            let task = self.next_url()?;
            if self.spawn_claimed(&task.url, progress.clone()) {
                return Some(task.url);
            }
            // Extremely unlikely: the URL got started directly between
            // next_url and the spawn. Try the next head.
        }
    }

    /// Spawn a worker for a task already marked DOWNLOADING by `next_url`.
    fn spawn_claimed(&self, url: &str, progress: Option<ProgressCallback>) -> bool {
        let cancel_token = CancellationToken::new();
        {
            let mut active = self.lock_active();
            if active.contains_key(url) {
                return false;
            }
            active.insert(url.to_string(), cancel_token.clone());
        }

        let ctx = WorkerContext {
            url: url.to_string(),
            downloader: self.clone(),
            cancel_token,
            progress,
        };
        tokio::spawn(async move {
            run_download_task(ctx).await;
        });
        true
    }

    /// Signal an in-flight download to stop. Returns whether a worker was
    /// found.
    pub fn cancel_download(&self, url: &str) -> bool {
        let active = self.lock_active();
        match active.get(url) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending task and signal every in-flight worker.
    pub fn cancel_all(&self) {
        self.clear();
        let tokens: Vec<CancellationToken> = {
            let active = self.lock_active();
            active.values().cloned().collect()
        };
        tracing::info!(count = tokens.len(), "Cancelling all active downloads");
        for token in tokens {
            token.cancel();
        }
    }

    /// Number of in-flight downloads.
    pub fn active_count(&self) -> usize {
        self.lock_active().len()
    }

    /// Per-second throughput history over the monitor window.
    pub fn bandwidth_history(&self) -> Vec<BandwidthSample> {
        self.bandwidth.history()
    }

    /// Mean throughput over the monitor window in bytes per second.
    pub fn bandwidth_rate_bps(&self) -> u64 {
        self.bandwidth.current_rate_bps()
    }

    /// Stop accepting new work, cancel everything, and notify subscribers.
    ///
    /// In-flight workers stop at their next cancellation checkpoint;
    /// partially written directories are left for the next scan to ignore.
    pub async fn shutdown(&self) {
        tracing::info!("Shutdown initiated");
        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        self.cancel_all();
        self.wait_idle().await;
        self.emit_event(Event::Shutdown);
    }

    /// Wait until no worker is in flight. Pending queue entries are not
    /// started by this call.
    ///
    /// Purely a convenience for hosts and tests; uses polling because worker
    /// termination is observable only through the active map.
    pub async fn wait_idle(&self) {
        loop {
            if self.active_count() == 0 {
                return;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}
