//! Scan coordinator - orchestrates the parallel extraction run
//!
//! The coordinator is responsible for:
//! - Enumerating the source into an ordered file list
//! - Seeding the run report and spawning the writer
//! - Spawning the worker pool and dispatching jobs in enumeration order
//! - Observing cancellation and stopping dispatch
//! - Joining workers, finalizing the store, and assembling the outcome
//!
//! Completion order across files is unconstrained; the writer, not the
//! scheduler, is what makes the persisted state consistent regardless of
//! which worker finishes first.

use crate::archive::find_container_files;
use crate::config::ScanConfig;
use crate::db::{FileFailure, RunSeed, StoreWriter};
use crate::entities::{EntityRecognizer, PatternRecognizer};
use crate::error::Result;
use crate::pipeline::worker::Worker;
use crate::pipeline::{CancelToken, FileJob, ProgressTracker, RunStatus};
use chrono::Utc;
use crossbeam_channel::bounded;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of a completed scan
#[derive(Debug)]
pub struct ScanOutcome {
    /// Total container files enumerated
    pub files_total: u64,

    /// Files whose jobs reached a terminal state
    pub files_processed: u64,

    /// Files that ended failed
    pub files_failed: u64,

    /// Messages committed to the store
    pub messages: u64,

    /// Messages skipped as malformed
    pub messages_skipped: u64,

    /// Attachments committed
    pub attachments: u64,

    /// Entities committed
    pub entities: u64,

    /// Sum of container sizes digested
    pub bytes_processed: u64,

    /// Wall time for the run
    pub duration: Duration,

    /// Terminal pipeline state (completed or cancelled)
    pub status: RunStatus,

    /// Most workers ever simultaneously processing
    pub peak_workers: usize,

    /// Failed files with reasons, for the end-of-run summary
    pub failures: Vec<FileFailure>,
}

impl ScanOutcome {
    /// Whether the run ran to completion rather than being cancelled
    pub fn completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Coordinates the parallel extraction run
pub struct ScanCoordinator {
    /// Configuration
    config: Arc<ScanConfig>,

    /// Cancellation token shared with signal handlers
    cancel: CancelToken,

    /// Progress counters shared with observers
    tracker: Arc<ProgressTracker>,
}

impl ScanCoordinator {
    /// Create a new coordinator for a validated configuration
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config: Arc::new(config),
            cancel: CancelToken::new(),
            tracker: Arc::new(ProgressTracker::new()),
        }
    }

    /// Get the cancellation token (for signal handlers)
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Get the progress tracker (for progress display)
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    /// Run the scan
    pub fn run(self) -> Result<ScanOutcome> {
        let start_time = Instant::now();
        let started_at = Utc::now();

        // Usage errors abort before any job is dispatched
        self.config.validate().map_err(crate::error::ScanError::Config)?;

        // Enumeration failures abort before anything is dispatched: a bad
        // root is a usage error, not a per-job failure
        let files = find_container_files(&self.config.source)?;
        self.tracker.set_files_total(files.len() as u64);

        info!(
            source = %self.config.source.display(),
            files = files.len(),
            jobs = self.config.job_count,
            entities = self.config.extract_entities,
            "Starting scan"
        );

        let model_identity = self
            .config
            .extract_entities
            .then(|| PatternRecognizer::new().model_identity());

        let writer = StoreWriter::new(
            &self.config.output_path,
            self.config.queue_size,
            RunSeed {
                started_at: started_at.to_rfc3339(),
                tool_version: env!("CARGO_PKG_VERSION").into(),
                model_identity,
                concurrency: self.config.job_count,
                file_count: files.len() as u64,
            },
        )?;
        let writer_handle = writer.handle();

        // Job channel: workers claim files in dispatch order, so job starts
        // follow enumeration order
        let (job_tx, job_rx) = bounded::<FileJob>(self.config.job_count);

        let mut workers = Vec::with_capacity(self.config.job_count);
        for id in 0..self.config.job_count {
            let worker = Worker::spawn(
                id,
                Arc::clone(&self.config),
                job_rx.clone(),
                writer_handle.clone(),
                self.cancel.clone(),
                Arc::clone(&self.tracker),
            )
            .map_err(crate::error::ScanError::Worker)?;

            workers.push(worker);
        }
        drop(job_rx);

        debug!(count = workers.len(), "Workers spawned");

        // Dispatch in enumeration order; stop at the first sign of
        // cancellation. A send fails only when every worker has exited.
        for file in files {
            if self.cancel.is_cancelled() {
                info!("Cancellation observed; no further jobs dispatched");
                break;
            }

            let job = FileJob {
                path: file.path,
                format: file.format,
            };
            if job_tx.send(job).is_err() {
                warn!("All workers exited before the queue drained");
                break;
            }
        }
        drop(job_tx);

        // Wait for in-flight jobs to finish (or stop at a message boundary)
        let worker_stats: Vec<_> = workers.iter().map(Worker::shared_stats).collect();
        for worker in workers {
            let id = worker.id();
            if let Err(e) = worker.join() {
                warn!(worker = id, error = %e, "Worker failed to join cleanly");
            }
        }

        let skipped = worker_stats
            .iter()
            .map(|s| s.messages_skipped.load(std::sync::atomic::Ordering::Relaxed))
            .sum::<u64>();

        let status = if self.cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        // Everything the workers emitted is drained and committed before
        // the writer exits; a store failure surfaces here and aborts
        let summary = writer.finish(status, &Utc::now().to_rfc3339())?;

        let snapshot = self.tracker.snapshot();
        let duration = start_time.elapsed();

        info!(
            files = snapshot.files_done,
            messages = summary.messages_written,
            entities = summary.entities_written,
            status = %status,
            duration_secs = duration.as_secs(),
            "Scan finished"
        );

        Ok(ScanOutcome {
            files_total: snapshot.files_total,
            files_processed: snapshot.files_done,
            files_failed: summary.files_failed,
            messages: summary.messages_written,
            messages_skipped: skipped,
            attachments: summary.attachments_written,
            entities: summary.entities_written,
            bytes_processed: summary.bytes_processed,
            duration,
            status,
            peak_workers: snapshot.peak_workers,
            failures: summary.failures,
        })
    }
}
