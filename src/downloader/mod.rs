//! Core downloader implementation split into focused submodules.
//!
//! The `ModelDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Pending-list and task-map operations (priority = position)
//! - [`control`] - Admission, cancellation fan-out, stats, shutdown
//! - [`worker`] - Per-job download pipeline
//! - [`images`] - Bounded parallel preview-image fan-out

mod control;
mod images;
mod queue;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use queue::TaskPatch;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio_util::sync::CancellationToken;

use crate::bandwidth::BandwidthMonitor;
use crate::client::{HubClient, SharedHost};
use crate::config::Config;
use crate::error::Result;
use crate::storage::StorageLayout;
use crate::types::{DownloadTask, Event};

/// Queue contents: the ordered pending list plus the task map.
///
/// Invariants maintained by every mutation:
/// - every URL in `pending` has a task in `tasks` with status QUEUED
/// - URLs in `pending` are unique
/// - a task whose status is not QUEUED never appears in `pending`
/// - `tasks[url].priority` equals the URL's index in `pending`
pub(crate) struct QueueInner {
    pub(crate) pending: Vec<String>,
    pub(crate) tasks: HashMap<String, DownloadTask>,
}

/// Queue and download state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Pending list + task map (short critical sections only)
    pub(crate) queue: Arc<std::sync::Mutex<QueueInner>>,
    /// Cancellation tokens of in-flight workers, keyed by URL
    pub(crate) active: Arc<std::sync::Mutex<HashMap<String, CancellationToken>>>,
    /// Cleared during shutdown so no new work is admitted
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Owns the download queue, the worker registry, and the bandwidth monitor.
/// The host enqueues model-page URLs, decides how many jobs to run in
/// parallel via [`ModelDownloader::start_next`] /
/// [`ModelDownloader::start_download`], and observes progress through
/// [`ModelDownloader::subscribe`].
#[derive(Clone)]
pub struct ModelDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Frozen configuration
    pub(crate) config: Arc<Config>,
    /// Remote service client (swappable for tests)
    pub(crate) host: SharedHost,
    /// Filesystem layout policy
    pub(crate) layout: Arc<StorageLayout>,
    /// Shared throughput monitor fed by all workers
    pub(crate) bandwidth: BandwidthMonitor,
    /// Queue and worker state
    pub(crate) queue_state: QueueState,
}

impl ModelDownloader {
    /// Create a downloader over the production [`HubClient`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error when [`Config::validate`] rejects the
    /// settings, or a layout error when the root path is unusable.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let layout = StorageLayout::new(&config.comfy_path)?;
        let client = HubClient::new(&config)?;
        Ok(Self::with_host(config, Arc::new(client), layout))
    }

    /// Create a downloader over a custom [`crate::client::ModelHost`].
    ///
    /// Used by tests and by hosts that front a different remote service.
    /// The configuration is taken as-is; call [`Config::validate`] first
    /// when it comes from user input.
    pub fn with_host(config: Config, host: SharedHost, layout: StorageLayout) -> Self {
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1024);

        let queue_state = QueueState {
            queue: Arc::new(std::sync::Mutex::new(QueueInner {
                pending: Vec::new(),
                tasks: HashMap::new(),
            })),
            active: Arc::new(std::sync::Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        Self {
            event_tx,
            config: Arc::new(config),
            host,
            layout: Arc::new(layout),
            bandwidth: BandwidthMonitor::default(),
            queue_state,
        }
    }

    /// Subscribe to downloader events.
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. A subscriber that falls more than 1024 events behind
    /// receives a `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The frozen configuration.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The storage layout this downloader writes into.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Emit an event to all subscribers.
    ///
    /// If nobody is listening the event is silently dropped; downloads never
    /// depend on subscribers being present.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Lock the queue. Callers hold the guard only for field mutations and
    /// emit events after releasing it.
    pub(crate) fn lock_queue(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.queue_state
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the active-worker token map.
    pub(crate) fn lock_active(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.queue_state
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
