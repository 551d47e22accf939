//! Queue operations: ordered pending list + task map, priority = position.
//!
//! All methods restore the §3-style invariants before returning and emit
//! their events after the queue lock is released, so observer callbacks can
//! re-enter the downloader without deadlocking.

use chrono::Utc;

use crate::types::{DownloadTask, Event, ModelInfo, QueueStats, Status};

use super::{ModelDownloader, QueueInner};

/// Partial task mutation applied by [`ModelDownloader::update_task`].
///
/// Unset fields are left untouched. Progress values are clamped to 100 and
/// never regress; status changes are ignored once a task is terminal.
#[derive(Clone, Debug, Default)]
pub struct TaskPatch {
    /// New status
    pub status: Option<Status>,
    /// New model-file progress (0..=100)
    pub model_progress: Option<u8>,
    /// New image fan-out progress (0..=100)
    pub image_progress: Option<u8>,
    /// New error or status message
    pub error_message: Option<String>,
    /// Populated model record
    pub model_info: Option<ModelInfo>,
}

impl QueueInner {
    /// Refresh every pending task's priority to its current list index.
    fn reindex(&mut self) {
        for (index, url) in self.pending.iter().enumerate() {
            if let Some(task) = self.tasks.get_mut(url) {
                task.priority = index;
            }
        }
    }

    fn snapshot_order(&self) -> Vec<String> {
        self.pending.clone()
    }
}

impl ModelDownloader {
    /// Add a URL to the back of the queue.
    ///
    /// Returns `false` when the URL already maps to a non-terminal task
    /// (queued or in flight). A URL whose previous run ended in a terminal
    /// state is accepted again and gets a fresh task.
    pub fn add(&self, url: &str) -> bool {
        if !self
            .queue_state
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            tracing::warn!(url, "Rejecting enqueue during shutdown");
            return false;
        }

        let events = {
            let mut queue = self.lock_queue();
            if queue
                .tasks
                .get(url)
                .is_some_and(|task| !task.status.is_terminal())
            {
                return false;
            }

            let task = DownloadTask::new(url, queue.pending.len());
            queue.pending.push(url.to_string());
            queue.tasks.insert(url.to_string(), task.clone());
            vec![
                Event::TaskUpdated { task },
                Event::QueueSize {
                    size: queue.pending.len(),
                },
            ]
        };

        tracing::info!(url, "Queued download");
        for event in events {
            self.emit_event(event);
        }
        true
    }

    /// Add many URLs; returns how many were accepted.
    pub fn add_many<S: AsRef<str>>(&self, urls: &[S]) -> usize {
        urls.iter().filter(|url| self.add(url.as_ref())).count()
    }

    /// Pop the head of the queue and mark it DOWNLOADING.
    ///
    /// Returns `None` when nothing is pending.
    pub fn next_url(&self) -> Option<DownloadTask> {
        let (task, events) = {
            let mut queue = self.lock_queue();
            if queue.pending.is_empty() {
                return None;
            }
            let url = queue.pending.remove(0);
            queue.reindex();
            let size = queue.pending.len();
            let task = queue.tasks.get_mut(&url)?;
            task.status = Status::Downloading;
            task.start_time = Some(Utc::now());
            let task = task.clone();
            (
                task.clone(),
                vec![Event::TaskUpdated { task }, Event::QueueSize { size }],
            )
        };

        for event in events {
            self.emit_event(event);
        }
        Some(task)
    }

    /// Move a pending URL to `position` (clamped to the list bounds).
    ///
    /// No-op when the URL is not pending. Priorities are re-indexed and a
    /// reorder event carries the new order snapshot.
    pub fn move_to_position(&self, url: &str, position: isize) {
        let events = {
            let mut queue = self.lock_queue();
            let Some(current) = queue.pending.iter().position(|u| u == url) else {
                return;
            };
            let clamped = position.clamp(0, queue.pending.len() as isize - 1) as usize;
            if clamped != current {
                let moved = queue.pending.remove(current);
                queue.pending.insert(clamped, moved);
            }
            queue.reindex();
            vec![
                Event::QueueReordered {
                    urls: queue.snapshot_order(),
                },
                Event::QueueSize {
                    size: queue.pending.len(),
                },
            ]
        };

        for event in events {
            self.emit_event(event);
        }
    }

    /// Apply a partial mutation to a task and emit a task-updated event.
    ///
    /// Progress never regresses and terminal statuses are absorbing; a patch
    /// that changes nothing emits nothing.
    pub fn update_task(&self, url: &str, patch: TaskPatch) {
        let event = {
            let mut queue = self.lock_queue();
            let Some(task) = queue.tasks.get_mut(url) else {
                return;
            };
            let mut changed = false;

            if let Some(status) = patch.status
                && !task.status.is_terminal()
                && task.status != status
            {
                task.status = status;
                changed = true;
            }
            if let Some(progress) = patch.model_progress {
                let clamped = progress.min(100);
                if clamped > task.model_progress {
                    task.model_progress = clamped;
                    changed = true;
                }
            }
            if let Some(progress) = patch.image_progress {
                let clamped = progress.min(100);
                if clamped > task.image_progress {
                    task.image_progress = clamped;
                    changed = true;
                }
            }
            if let Some(message) = patch.error_message
                && task.error_message.as_deref() != Some(message.as_str())
            {
                task.error_message = Some(message);
                changed = true;
            }
            if let Some(info) = patch.model_info {
                task.model_info = Some(info);
                changed = true;
            }

            changed.then(|| Event::TaskUpdated { task: task.clone() })
        };

        if let Some(event) = event {
            self.emit_event(event);
        }
    }

    /// Transition a task to COMPLETED or FAILED.
    ///
    /// Stamps `end_time` exactly once; a task that is already terminal is
    /// left untouched (terminal states are absorbing). On success both
    /// progress values close at 100.
    pub fn complete(
        &self,
        url: &str,
        success: bool,
        message: Option<String>,
        model_info: Option<ModelInfo>,
    ) {
        self.finish(
            url,
            if success {
                Status::Completed
            } else {
                Status::Failed
            },
            message,
            model_info,
        );
    }

    /// Transition a task to CANCELED (used by workers observing their token).
    pub(crate) fn mark_canceled(&self, url: &str) {
        self.finish(url, Status::Canceled, None, None);
    }

    fn finish(
        &self,
        url: &str,
        status: Status,
        message: Option<String>,
        model_info: Option<ModelInfo>,
    ) {
        debug_assert!(status.is_terminal());
        let event = {
            let mut queue = self.lock_queue();
            let Some(task) = queue.tasks.get_mut(url) else {
                return;
            };
            if task.status.is_terminal() {
                return;
            }
            task.status = status;
            task.end_time = Some(Utc::now());
            if status == Status::Completed {
                task.model_progress = 100;
                task.image_progress = 100;
            }
            if message.is_some() {
                task.error_message = message;
            }
            if model_info.is_some() {
                task.model_info = model_info;
            }
            Event::TaskUpdated { task: task.clone() }
        };

        self.emit_event(event);
    }

    /// Cancel a URL.
    ///
    /// A pending task is removed from the list and marked CANCELED. An
    /// in-flight task has its worker's token flipped; the worker observes it
    /// within one chunk (or one image) and marks the task CANCELED itself. A
    /// cancel that lands after the metadata commit point is ignored and the
    /// job completes.
    ///
    /// Returns whether a transition (or token flip) occurred.
    pub fn cancel(&self, url: &str) -> bool {
        let (transitioned, in_flight, events) = {
            let mut queue = self.lock_queue();
            let Some(task) = queue.tasks.get_mut(url) else {
                return false;
            };
            match task.status {
                Status::Queued => {
                    task.status = Status::Canceled;
                    task.end_time = Some(Utc::now());
                    let task = task.clone();
                    if let Some(index) = queue.pending.iter().position(|u| u == url) {
                        queue.pending.remove(index);
                    }
                    queue.reindex();
                    let size = queue.pending.len();
                    (
                        true,
                        false,
                        vec![Event::TaskUpdated { task }, Event::QueueSize { size }],
                    )
                }
                Status::Downloading => (true, true, Vec::new()),
                // Terminal tasks cannot transition
                _ => (false, false, Vec::new()),
            }
        };

        if in_flight {
            let cancelled = {
                let active = self.lock_active();
                active.get(url).map(|token| token.cancel()).is_some()
            };
            if !cancelled {
                tracing::warn!(url, "Cancel requested for in-flight task with no worker");
            }
        }
        for event in events {
            self.emit_event(event);
        }
        if transitioned {
            tracing::info!(url, in_flight, "Cancel requested");
        }
        transitioned
    }

    /// Cancel every pending task and empty the list.
    pub fn clear(&self) {
        let events = {
            let mut queue = self.lock_queue();
            let drained: Vec<String> = queue.pending.drain(..).collect();
            let mut events = Vec::with_capacity(drained.len() + 1);
            for url in drained {
                if let Some(task) = queue.tasks.get_mut(&url) {
                    task.status = Status::Canceled;
                    task.end_time = Some(Utc::now());
                    events.push(Event::TaskUpdated { task: task.clone() });
                }
            }
            events.push(Event::QueueSize { size: 0 });
            events
        };

        tracing::info!("Queue cleared");
        for event in events {
            self.emit_event(event);
        }
    }

    /// Snapshot of one task.
    pub fn get_task(&self, url: &str) -> Option<DownloadTask> {
        self.lock_queue().tasks.get(url).cloned()
    }

    /// Pending URLs in order.
    pub fn pending_urls(&self) -> Vec<String> {
        self.lock_queue().snapshot_order()
    }

    /// Number of pending tasks.
    pub fn queue_size(&self) -> usize {
        self.lock_queue().pending.len()
    }

    /// Aggregate statistics over every task ever added this session.
    pub fn queue_stats(&self) -> QueueStats {
        let mut stats = {
            let queue = self.lock_queue();
            let mut stats = QueueStats::default();
            for task in queue.tasks.values() {
                match task.status {
                    Status::Queued => stats.queued += 1,
                    Status::Downloading => stats.downloading += 1,
                    Status::Completed => stats.completed += 1,
                    Status::Failed => stats.failed += 1,
                    Status::Canceled => stats.canceled += 1,
                }
            }
            stats
        };
        stats.window_bytes = self.bandwidth.total_bytes();
        stats
    }

    /// Claim a URL for immediate download (admission path).
    ///
    /// Removes it from the pending list when queued, or creates a fresh task
    /// when unknown or terminal. Returns `None` when the URL is already in
    /// flight.
    pub(crate) fn claim_for_download(&self, url: &str) -> Option<DownloadTask> {
        let (task, events) = {
            let mut queue = self.lock_queue();
            if queue
                .tasks
                .get(url)
                .is_some_and(|task| task.status == Status::Downloading)
            {
                return None;
            }

            let mut events = Vec::new();
            if let Some(index) = queue.pending.iter().position(|u| u == url) {
                queue.pending.remove(index);
                queue.reindex();
                events.push(Event::QueueSize {
                    size: queue.pending.len(),
                });
            }

            let mut task = queue
                .tasks
                .get(url)
                .filter(|task| task.status == Status::Queued)
                .cloned()
                .unwrap_or_else(|| DownloadTask::new(url, 0));
            task.status = Status::Downloading;
            task.start_time = Some(Utc::now());
            queue.tasks.insert(url.to_string(), task.clone());
            events.push(Event::TaskUpdated { task: task.clone() });
            (task, events)
        };

        for event in events {
            self.emit_event(event);
        }
        Some(task)
    }
}
