//! Extraction worker logic
//!
//! Each worker:
//! - Loads its own entity recognizer instance (never shared)
//! - Pulls file jobs from the job channel in dispatch order
//! - Digests the file, opens the container, and walks its messages
//! - Emits one record per message to the writer's intake channel
//! - Checks the cancellation token at every message boundary
//!
//! Every job runs inside a panic boundary: a crash while processing one
//! container fails that file's job and frees the worker for the next one.

use crate::archive::{open_archive, MailArchive};
use crate::config::ScanConfig;
use crate::content::digest_file;
use crate::db::{FileReportSeed, MessageRecord, WriterHandle};
use crate::entities::{truncate_for_recognition, EntityRecognizer, PatternRecognizer};
use crate::error::WorkerError;
use crate::pipeline::{CancelToken, FileJob, JobGuard, JobStatus, ProgressTracker};
use chrono::Utc;
use crossbeam_channel::Receiver;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// File jobs processed to a terminal state
    pub files_processed: AtomicU64,

    /// File jobs that ended failed
    pub files_failed: AtomicU64,

    /// Messages processed
    pub messages_processed: AtomicU64,

    /// Messages skipped as malformed
    pub messages_skipped: AtomicU64,

    /// Entities recognized
    pub entities_found: AtomicU64,
}

impl WorkerStats {
    fn record_file(&self, failed: bool) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.files_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_message(&self, entities: u64) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.entities_found.fetch_add(entities, Ordering::Relaxed);
    }

    fn record_skip(&self) {
        self.messages_skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of one file's job
#[derive(Debug)]
pub enum JobOutcome {
    /// All yielded messages processed (skipped > 0 means partial)
    Completed { messages: u64, skipped: u64 },

    /// The container could not be processed
    Failed { reason: String },

    /// Stopped at a message boundary by cancellation
    Cancelled { messages: u64 },
}

/// A worker thread that processes file jobs
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        config: Arc<ScanConfig>,
        jobs: Receiver<FileJob>,
        writer: WriterHandle,
        cancel: CancelToken,
        tracker: Arc<ProgressTracker>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("extract-{}", id))
            .spawn(move || worker_loop(id, config, jobs, writer, cancel, tracker, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Get a shared handle to the statistics, readable after join
    pub fn shared_stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: "Worker thread panicked".into(),
                }),
            }
        } else {
            Ok(())
        }
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    config: Arc<ScanConfig>,
    jobs: Receiver<FileJob>,
    writer: WriterHandle,
    cancel: CancelToken,
    tracker: Arc<ProgressTracker>,
    stats: Arc<WorkerStats>,
) -> Result<(), WorkerError> {
    // One recognizer instance per worker
    let recognizer = config.extract_entities.then(PatternRecognizer::new);

    debug!(worker = id, "Worker starting");

    while let Ok(job) = jobs.recv() {
        // Dispatched but not yet started: cancellation stops it here, so no
        // new file jobs begin after the signal
        if cancel.is_cancelled() {
            break;
        }

        let _guard = JobGuard::new(&tracker);
        let path = job.path.clone();

        // Panic boundary: a crash processing this container must not take
        // down the worker or its siblings
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            process_file(
                id,
                &job,
                &config,
                recognizer.as_ref(),
                &writer,
                &cancel,
                &stats,
                &tracker,
            )
        }));

        match result {
            Ok(Ok(outcome)) => match &outcome {
                JobOutcome::Completed { messages, skipped } => {
                    debug!(worker = id, path = %path.display(), messages, skipped, "File processed");
                }
                JobOutcome::Failed { reason } => {
                    warn!(worker = id, path = %path.display(), reason = %reason, "File failed");
                }
                JobOutcome::Cancelled { messages } => {
                    info!(worker = id, path = %path.display(), messages, "File cancelled");
                }
            },
            Ok(Err(_)) => {
                // Writer gone: the run is aborting; nothing useful left to do
                error!(worker = id, "Writer channel closed; worker stopping");
                return Err(WorkerError::WriterGone { id });
            }
            Err(panic_payload) => {
                let message = panic_message(panic_payload);
                warn!(worker = id, path = %path.display(), message = %message, "Job crashed");
                stats.record_file(true);
                tracker.record_file_done(true);

                let path_str = path.display().to_string();
                if writer
                    .file_finished(
                        path_str,
                        JobStatus::Failed,
                        Some(format!("worker crashed: {}", message)),
                        0,
                    )
                    .is_err()
                {
                    return Err(WorkerError::WriterGone { id });
                }
            }
        }
    }

    debug!(
        worker = id,
        files = stats.files_processed.load(Ordering::Relaxed),
        messages = stats.messages_processed.load(Ordering::Relaxed),
        "Worker shutting down"
    );

    Ok(())
}

/// Process a single container file
///
/// Only a closed writer channel propagates as Err; every archive-level
/// problem is resolved into the returned [`JobOutcome`].
#[allow(clippy::too_many_arguments)]
fn process_file(
    worker_id: usize,
    job: &FileJob,
    config: &ScanConfig,
    recognizer: Option<&PatternRecognizer>,
    writer: &WriterHandle,
    cancel: &CancelToken,
    stats: &WorkerStats,
    tracker: &ProgressTracker,
) -> crate::error::DbResult<JobOutcome> {
    let path_str = job.path.display().to_string();
    let name = job
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.clone());

    // Digest prologue: the file report is created as the job starts
    let seed = match digest_file(&job.path) {
        Ok(digests) => FileReportSeed {
            path: path_str.clone(),
            name,
            size: Some(digests.size),
            md5: Some(digests.md5),
            sha256: Some(digests.sha256),
        },
        Err(e) => {
            writer.file_started(FileReportSeed {
                path: path_str.clone(),
                name,
                size: None,
                md5: None,
                sha256: None,
            })?;
            let reason = format!("unreadable: {}", e);
            writer.file_finished(path_str, JobStatus::Failed, Some(reason.clone()), 0)?;
            stats.record_file(true);
            tracker.record_file_done(true);
            return Ok(JobOutcome::Failed { reason });
        }
    };
    writer.file_started(seed)?;

    let mut archive: Box<dyn MailArchive> = match open_archive(&job.path, job.format) {
        Ok(archive) => archive,
        Err(e) => {
            let reason = e.to_string();
            writer.file_finished(path_str, JobStatus::Failed, Some(reason.clone()), 0)?;
            stats.record_file(true);
            tracker.record_file_done(true);
            return Ok(JobOutcome::Failed { reason });
        }
    };

    let mut msg_count = 0u64;
    let mut skipped = 0u64;
    let mut cancelled = false;

    let mut messages = archive.messages();
    loop {
        // Message boundary: the only cancellation point inside a job
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let item = match messages.next() {
            Some(item) => item,
            None => break,
        };

        let message = match item {
            Ok(message) => message,
            Err(e) if e.is_message_scoped() => {
                msg_count += 1;
                skipped += 1;
                stats.record_skip();
                debug!(worker = worker_id, error = %e, "Skipping malformed message");
                continue;
            }
            Err(e) => {
                // The container itself went bad mid-iteration
                let reason = e.to_string();
                writer.file_finished(
                    path_str,
                    JobStatus::Failed,
                    Some(reason.clone()),
                    msg_count,
                )?;
                stats.record_file(true);
                tracker.record_file_done(true);
                return Ok(JobOutcome::Failed { reason });
            }
        };

        msg_count += 1;

        let started = Utc::now();
        let entities = match recognizer {
            Some(r) => r.recognize(truncate_for_recognition(&message.body)),
            None => Vec::new(),
        };
        let ended = Utc::now();

        stats.record_message(entities.len() as u64);
        tracker.record_message(entities.len() as u64, message.attachments.len() as u64);

        let record = MessageRecord {
            filepath: path_str.clone(),
            identifier: message.identifier,
            processing_start_time: started.to_rfc3339(),
            processing_end_time: ended.to_rfc3339(),
            body: config.include_message_body.then(|| message.body),
            headers: config.include_message_body.then(|| message.headers),
            attachments: message.attachments,
            entities,
        };

        // Blocks when the writer cannot keep up: backpressure
        writer.send_message(record)?;
    }

    let (status, error, outcome) = if cancelled {
        (
            JobStatus::Cancelled,
            None,
            JobOutcome::Cancelled {
                messages: msg_count,
            },
        )
    } else if skipped > 0 {
        (
            JobStatus::Partial,
            Some(format!("{} malformed message(s) skipped", skipped)),
            JobOutcome::Completed {
                messages: msg_count,
                skipped,
            },
        )
    } else {
        (
            JobStatus::Completed,
            None,
            JobOutcome::Completed {
                messages: msg_count,
                skipped: 0,
            },
        )
    };

    writer.file_finished(path_str, status, error, msg_count)?;
    stats.record_file(false);
    tracker.record_file_done(false);

    Ok(outcome)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[Worker]) -> (u64, u64, u64, u64, u64) {
    let mut files = 0u64;
    let mut failed = 0u64;
    let mut messages = 0u64;
    let mut skipped = 0u64;
    let mut entities = 0u64;

    for worker in workers {
        files += worker.stats.files_processed.load(Ordering::Relaxed);
        failed += worker.stats.files_failed.load(Ordering::Relaxed);
        messages += worker.stats.messages_processed.load(Ordering::Relaxed);
        skipped += worker.stats.messages_skipped.load(Ordering::Relaxed);
        entities += worker.stats.entities_found.load(Ordering::Relaxed);
    }

    (files, failed, messages, skipped, entities)
}
