//! Bandwidth monitoring with a sliding sample window
//!
//! Workers report per-chunk byte deltas; a polling consumer reads back a
//! per-second aggregated history covering the last `window_seconds`. Samples
//! older than the window are evicted lazily on read.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Default sliding window length in seconds
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;

/// One per-second throughput bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandwidthSample {
    /// Seconds since the monitor was created (bucket key)
    pub offset_secs: u64,
    /// Bytes observed during that second
    pub bytes: u64,
}

struct MonitorInner {
    /// Per-second buckets, oldest first. Two deltas landing in the same
    /// second sum into one bucket.
    samples: VecDeque<BandwidthSample>,
}

/// Sliding-window throughput tracker shared across all active workers.
///
/// Cloneable; clones share state. Writers (download workers) and readers
/// (a polling UI) both take a short mutex-guarded critical section — no I/O
/// ever happens under the lock.
#[derive(Clone)]
pub struct BandwidthMonitor {
    inner: Arc<Mutex<MonitorInner>>,
    /// Monotonic epoch for bucket keys
    epoch: Instant,
    /// Sliding window length in seconds
    window_seconds: u64,
}

impl BandwidthMonitor {
    /// Create a monitor with the given window length.
    #[must_use]
    pub fn new(window_seconds: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MonitorInner {
                samples: VecDeque::new(),
            })),
            epoch: Instant::now(),
            window_seconds: window_seconds.max(1),
        }
    }

    fn now_offset(&self) -> u64 {
        self.epoch.elapsed().as_secs()
    }

    /// Record `bytes` transferred at the current instant.
    pub fn add_data_point(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let offset = self.now_offset();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.samples.back_mut() {
            Some(last) if last.offset_secs == offset => last.bytes += bytes,
            _ => inner.samples.push_back(BandwidthSample {
                offset_secs: offset,
                bytes,
            }),
        }
    }

    /// Per-second history for the last `window_seconds`, oldest first.
    ///
    /// Evicts expired buckets as a side effect, so memory use stays bounded
    /// by the window length even without readers calling [`Self::reset`].
    pub fn history(&self) -> Vec<BandwidthSample> {
        let now = self.now_offset();
        let cutoff = now.saturating_sub(self.window_seconds);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(front) = inner.samples.front() {
            if front.offset_secs < cutoff {
                inner.samples.pop_front();
            } else {
                break;
            }
        }
        inner.samples.iter().copied().collect()
    }

    /// Total bytes observed inside the current window.
    pub fn total_bytes(&self) -> u64 {
        self.history().iter().map(|s| s.bytes).sum()
    }

    /// Mean throughput over the current window in bytes per second.
    pub fn current_rate_bps(&self) -> u64 {
        let history = self.history();
        if history.is_empty() {
            return 0;
        }
        let total: u64 = history.iter().map(|s| s.bytes).sum();
        let first = history[0].offset_secs;
        let last = history[history.len() - 1].offset_secs;
        let span = (last - first).max(1);
        total / span
    }

    /// Drop all samples.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.samples.clear();
    }
}

impl Default for BandwidthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECONDS)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_monitor_has_empty_history() {
        let monitor = BandwidthMonitor::new(60);
        assert!(monitor.history().is_empty());
        assert_eq!(monitor.total_bytes(), 0);
        assert_eq!(monitor.current_rate_bps(), 0);
    }

    #[test]
    fn zero_byte_deltas_are_ignored() {
        let monitor = BandwidthMonitor::new(60);
        monitor.add_data_point(0);
        assert!(
            monitor.history().is_empty(),
            "zero-byte samples should not create buckets"
        );
    }

    #[test]
    fn samples_in_same_second_sum_into_one_bucket() {
        let monitor = BandwidthMonitor::new(60);
        monitor.add_data_point(100);
        monitor.add_data_point(250);

        let history = monitor.history();
        // Both points land within the same wall-clock second in practice;
        // allow for a tick boundary but verify the total either way.
        let total: u64 = history.iter().map(|s| s.bytes).sum();
        assert_eq!(total, 350);
        assert!(history.len() <= 2, "at most one bucket per second");
    }

    #[test]
    fn reset_empties_history() {
        let monitor = BandwidthMonitor::new(60);
        monitor.add_data_point(1024);
        assert_eq!(monitor.total_bytes(), 1024);

        monitor.reset();
        assert!(monitor.history().is_empty());
        assert_eq!(monitor.total_bytes(), 0);
    }

    #[test]
    fn clone_shares_sample_state() {
        let original = BandwidthMonitor::new(60);
        let clone = original.clone();

        clone.add_data_point(512);
        assert_eq!(
            original.total_bytes(),
            512,
            "clone writes must be visible through the original"
        );
    }

    #[test]
    fn window_is_clamped_to_at_least_one_second() {
        let monitor = BandwidthMonitor::new(0);
        monitor.add_data_point(10);
        assert_eq!(monitor.total_bytes(), 10);
    }

    #[test]
    fn samples_older_than_the_window_are_evicted() {
        let monitor = BandwidthMonitor::new(1);
        monitor.add_data_point(777);

        // Cross two bucket boundaries so the first sample falls out of the
        // 1-second window regardless of where inside its second it landed.
        std::thread::sleep(std::time::Duration::from_millis(2100));
        monitor.add_data_point(10);

        let history = monitor.history();
        assert!(
            history.iter().all(|s| s.bytes != 777),
            "expired sample must not be returned, got {history:?}"
        );
        assert_eq!(monitor.total_bytes(), 10);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_bytes() {
        let monitor = BandwidthMonitor::new(60);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = monitor.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    m.add_data_point(10);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(monitor.total_bytes(), 8 * 100 * 10);
    }
}
