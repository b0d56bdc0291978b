//! The concurrent extraction pipeline
//!
//! This module wires the enumerator, a bounded pool of extraction workers,
//! and the single database writer together, and owns the only state shared
//! across components: the cancellation token and the progress counters.
//!
//! ```text
//!  Enumerator ──► ScanCoordinator ──► job channel ──► Worker 1..C
//!                        │                               │
//!                        │ cancel token                  │ message records
//!                        ▼                               ▼
//!                 ProgressTracker ◄──────────── bounded intake ──► StoreWriter
//! ```

pub mod scheduler;
pub mod worker;

pub use scheduler::{ScanCoordinator, ScanOutcome};
pub use worker::{aggregate_stats, JobOutcome, Worker, WorkerStats};

use crate::archive::ArchiveFormat;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One file job handed to a worker
#[derive(Debug, Clone)]
pub struct FileJob {
    /// Path to the container file
    pub path: PathBuf,

    /// Detected format
    pub format: ArchiveFormat,
}

/// Terminal state of one file's job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Job has started and its file report exists
    Running,

    /// Every yielded message was processed
    Completed,

    /// Finished, but some messages were skipped as malformed
    Partial,

    /// The container could not be processed
    Failed,

    /// Stopped at a message boundary by cancellation
    Cancelled,
}

impl JobStatus {
    /// Status string stored on the file report
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline-level aggregate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Jobs are being dispatched and processed
    Running,

    /// All jobs reached a terminal state
    Completed,

    /// Interrupted; everything received before the signal was committed
    Cancelled,

    /// The store failed; the run has no safe continuation
    Aborted,
}

impl RunStatus {
    /// Status string stored on the run report
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation token
///
/// Workers check it at message boundaries, the scheduler at dispatch
/// boundaries. Cancellation is not preemptive: an in-progress parse is
/// allowed to finish before the token is observed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<std::sync::atomic::AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, unsignalled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was signalled
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Aggregate progress counters
///
/// Updated by workers as they process; observers only ever see read-only
/// [`ProgressSnapshot`] values. Purely informational: nothing here affects
/// scheduling decisions.
#[derive(Debug)]
pub struct ProgressTracker {
    files_total: AtomicU64,
    files_done: AtomicU64,
    files_failed: AtomicU64,
    messages: AtomicU64,
    entities: AtomicU64,
    attachments: AtomicU64,
    active_workers: AtomicUsize,
    peak_workers: AtomicUsize,
    started: Instant,
}

impl ProgressTracker {
    /// Create a tracker; the file total is set once enumeration finishes
    pub fn new() -> Self {
        Self {
            files_total: AtomicU64::new(0),
            files_done: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            entities: AtomicU64::new(0),
            attachments: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            peak_workers: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    pub fn set_files_total(&self, total: u64) {
        self.files_total.store(total, Ordering::Relaxed);
    }

    pub fn record_message(&self, entities: u64, attachments: u64) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.entities.fetch_add(entities, Ordering::Relaxed);
        self.attachments.fetch_add(attachments, Ordering::Relaxed);
    }

    pub fn record_file_done(&self, failed: bool) {
        self.files_done.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.files_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Mark a worker as actively processing a job
    pub fn begin_job(&self) {
        let active = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_workers.fetch_max(active, Ordering::SeqCst);
    }

    /// Mark a worker as idle again
    pub fn end_job(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Take a read-only snapshot of the counters
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_done: self.files_done.load(Ordering::Relaxed),
            files_total: self.files_total.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            entities: self.entities.load(Ordering::Relaxed),
            attachments: self.attachments.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::SeqCst),
            peak_workers: self.peak_workers.load(Ordering::SeqCst),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of pipeline progress
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Files that reached a terminal state
    pub files_done: u64,

    /// Total enumerated files
    pub files_total: u64,

    /// Files that ended failed
    pub files_failed: u64,

    /// Messages processed
    pub messages: u64,

    /// Entities recognized
    pub entities: u64,

    /// Attachments seen
    pub attachments: u64,

    /// Workers currently processing a job
    pub active_workers: usize,

    /// Most workers ever simultaneously processing
    pub peak_workers: usize,

    /// Time since the tracker was created
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Messages per second since the run started
    pub fn messages_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.messages as f64 / secs
        } else {
            0.0
        }
    }
}

/// RAII guard pairing [`ProgressTracker::begin_job`] / [`ProgressTracker::end_job`]
pub struct JobGuard<'a> {
    tracker: &'a ProgressTracker,
}

impl<'a> JobGuard<'a> {
    pub fn new(tracker: &'a ProgressTracker) -> Self {
        tracker.begin_job();
        Self { tracker }
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.tracker.end_job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Completed.as_str(), "completed");
        assert_eq!(JobStatus::Partial.as_str(), "partial");
        assert_eq!(RunStatus::Cancelled.as_str(), "cancelled");
        assert_eq!(RunStatus::Aborted.as_str(), "aborted");
    }

    #[test]
    fn test_tracker_counters() {
        let tracker = ProgressTracker::new();
        tracker.set_files_total(2);
        tracker.record_message(3, 1);
        tracker.record_message(0, 0);
        tracker.record_file_done(false);
        tracker.record_file_done(true);

        let snap = tracker.snapshot();
        assert_eq!(snap.files_total, 2);
        assert_eq!(snap.files_done, 2);
        assert_eq!(snap.files_failed, 1);
        assert_eq!(snap.messages, 2);
        assert_eq!(snap.entities, 3);
        assert_eq!(snap.attachments, 1);
    }

    #[test]
    fn test_job_guard_tracks_peak() {
        let tracker = ProgressTracker::new();
        {
            let _a = JobGuard::new(&tracker);
            let _b = JobGuard::new(&tracker);
            assert_eq!(tracker.snapshot().active_workers, 2);
        }
        let snap = tracker.snapshot();
        assert_eq!(snap.active_workers, 0);
        assert_eq!(snap.peak_workers, 2);
    }
}
