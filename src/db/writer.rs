//! Single-writer SQLite persistence
//!
//! This module provides the one component allowed to mutate the output
//! database. It runs in a dedicated thread and receives records from all
//! workers over a bounded channel; a full channel blocks the sending worker,
//! which is the pipeline's backpressure mechanism.
//!
//! # Guarantees
//!
//! - One transaction per message record: the message row and its attachment
//!   and entity rows become visible together or not at all
//! - Row ids are assigned at insert time and never reused
//! - File report rows are created on the job-start record and updated once
//!   with the job's terminal status
//! - Everything received before shutdown is committed before the thread
//!   exits, including on cancellation

use crate::archive::AttachmentMeta;
use crate::db::schema;
use crate::entities::EntitySpan;
use crate::error::{DbError, DbResult};
use crate::pipeline::{JobStatus, RunStatus};
use crossbeam_channel::{bounded, Receiver, Sender};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::warn;

/// Job-start record: one per file, written before any of its messages
#[derive(Debug, Clone)]
pub struct FileReportSeed {
    /// Full source path
    pub path: String,

    /// Display name (file name component)
    pub name: String,

    /// File size in bytes; None when the file could not be read
    pub size: Option<u64>,

    /// Hex MD5 digest
    pub md5: Option<String>,

    /// Hex SHA-256 digest
    pub sha256: Option<String>,
}

/// One message with its nested attachments and entities
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Source container path, used to resolve the owning file report
    pub filepath: String,

    /// Container-assigned message identifier, when the format has one
    pub identifier: Option<i64>,

    /// RFC 3339 processing start timestamp
    pub processing_start_time: String,

    /// RFC 3339 processing end timestamp
    pub processing_end_time: String,

    /// Message body; None unless content storage is enabled
    pub body: Option<String>,

    /// Raw header block; None unless content storage is enabled
    pub headers: Option<String>,

    /// Attachment metadata in part order
    pub attachments: Vec<AttachmentMeta>,

    /// Recognized entity spans
    pub entities: Vec<EntitySpan>,
}

/// Message types sent to the writer thread
#[derive(Debug)]
pub enum WriterMessage {
    /// A file's job has started
    FileStarted(FileReportSeed),

    /// Insert one message record
    Message(MessageRecord),

    /// A file's job reached a terminal state
    FileFinished {
        path: String,
        status: JobStatus,
        error: Option<String>,
        msg_count: u64,
    },

    /// Shutdown the writer after draining everything received
    Shutdown,
}

/// Statistics about write operations
#[derive(Debug, Default)]
pub struct WriterStats {
    /// File reports created
    pub files_started: AtomicU64,

    /// File jobs that reached a terminal state
    pub files_finished: AtomicU64,

    /// File jobs that ended failed
    pub files_failed: AtomicU64,

    /// Messages committed
    pub messages_written: AtomicU64,

    /// Attachments committed
    pub attachments_written: AtomicU64,

    /// Entities committed
    pub entities_written: AtomicU64,

    /// Sum of container sizes digested
    pub bytes_processed: AtomicU64,
}

impl WriterStats {
    pub fn messages_written(&self) -> u64 {
        self.messages_written.load(Ordering::Relaxed)
    }

    pub fn entities_written(&self) -> u64 {
        self.entities_written.load(Ordering::Relaxed)
    }

    pub fn attachments_written(&self) -> u64 {
        self.attachments_written.load(Ordering::Relaxed)
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    pub fn files_failed(&self) -> u64 {
        self.files_failed.load(Ordering::Relaxed)
    }
}

/// Run metadata recorded before any job is dispatched
#[derive(Debug, Clone)]
pub struct RunSeed {
    /// RFC 3339 start timestamp
    pub started_at: String,

    /// Tool version string
    pub tool_version: String,

    /// Recognizer identity; None when extraction is disabled
    pub model_identity: Option<String>,

    /// Configured worker count
    pub concurrency: usize,

    /// Number of enumerated container files
    pub file_count: u64,
}

/// One failed file for the end-of-run summary
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// Aggregate results reported after the writer finishes
#[derive(Debug)]
pub struct RunSummary {
    pub messages_written: u64,
    pub attachments_written: u64,
    pub entities_written: u64,
    pub bytes_processed: u64,
    pub files_failed: u64,
    pub failures: Vec<FileFailure>,
}

/// Handle for sending records to the writer
#[derive(Clone)]
pub struct WriterHandle {
    sender: Sender<WriterMessage>,
    stats: Arc<WriterStats>,
}

impl WriterHandle {
    /// Record a file job start (blocks when the intake channel is full)
    pub fn file_started(&self, seed: FileReportSeed) -> DbResult<()> {
        self.sender
            .send(WriterMessage::FileStarted(seed))
            .map_err(|_| DbError::ChannelClosed)
    }

    /// Send one message record (blocks when the intake channel is full)
    pub fn send_message(&self, record: MessageRecord) -> DbResult<()> {
        self.sender
            .send(WriterMessage::Message(record))
            .map_err(|_| DbError::ChannelClosed)
    }

    /// Record a file job's terminal state
    pub fn file_finished(
        &self,
        path: String,
        status: JobStatus,
        error: Option<String>,
        msg_count: u64,
    ) -> DbResult<()> {
        self.sender
            .send(WriterMessage::FileFinished {
                path,
                status,
                error,
                msg_count,
            })
            .map_err(|_| DbError::ChannelClosed)
    }

    /// Get writer statistics
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}

/// Database writer that runs in its own thread
pub struct StoreWriter {
    /// Thread handle
    handle: Option<JoinHandle<DbResult<()>>>,

    /// Handle for sending records
    writer_handle: WriterHandle,

    /// Path to the database (reopened for finalization)
    db_path: PathBuf,

    /// Row id of this run's run_report
    run_id: i64,
}

impl StoreWriter {
    /// Create the output database, record the run seed, and spawn the
    /// writer thread
    pub fn new(db_path: &Path, channel_size: usize, run: RunSeed) -> DbResult<Self> {
        let (sender, receiver) = bounded(channel_size);
        let stats = Arc::new(WriterStats::default());

        let conn = Connection::open(db_path)?;
        schema::create_database(&conn)?;

        // Partial run report up front; finalized in finish()
        conn.execute(
            "INSERT INTO run_report (start_time, tool_version, model_identity, concurrency, file_count, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.started_at,
                run.tool_version,
                run.model_identity,
                run.concurrency as i64,
                run.file_count as i64,
                RunStatus::Running.as_str(),
            ],
        )?;
        let run_id = conn.last_insert_rowid();

        let writer_handle = WriterHandle {
            sender,
            stats: Arc::clone(&stats),
        };

        let handle = thread::Builder::new()
            .name("db-writer".into())
            .spawn(move || writer_thread(conn, receiver, stats))
            .map_err(|e| DbError::CreateFailed {
                path: db_path.to_path_buf(),
                reason: format!("Failed to spawn writer thread: {}", e),
            })?;

        Ok(Self {
            handle: Some(handle),
            writer_handle,
            db_path: db_path.to_path_buf(),
            run_id,
        })
    }

    /// Get a handle for sending records to the writer
    pub fn handle(&self) -> WriterHandle {
        self.writer_handle.clone()
    }

    /// Shut the writer down, finalize the run report, and return the
    /// aggregate summary
    ///
    /// Everything received before the shutdown record is committed first. A
    /// store error from the writer thread propagates from here and aborts
    /// the run; data committed up to that point remains valid.
    pub fn finish(mut self, status: RunStatus, ended_at: &str) -> DbResult<RunSummary> {
        let _ = self.writer_handle.sender.send(WriterMessage::Shutdown);

        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.try_mark_aborted(ended_at);
                    return Err(e);
                }
                Err(_) => {
                    self.try_mark_aborted(ended_at);
                    return Err(DbError::Transaction("Writer thread panicked".into()));
                }
            }
        }

        // Reopen for finalization
        let conn = Connection::open(&self.db_path)?;

        let message_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM message", [], |row| row.get(0))?;
        let entity_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM entity", [], |row| row.get(0))?;

        conn.execute(
            "UPDATE run_report SET end_time = ?1, message_count = ?2, entity_count = ?3, status = ?4
             WHERE id = ?5",
            params![
                ended_at,
                message_count,
                entity_count,
                status.as_str(),
                self.run_id
            ],
        )?;

        schema::create_indexes(&conn)?;
        schema::optimize_for_reads(&conn)?;

        let mut failures = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT path, COALESCE(error, 'unknown error') FROM file_report
                 WHERE status = 'failed' ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(FileFailure {
                    path: row.get(0)?,
                    reason: row.get(1)?,
                })
            })?;
            for row in rows {
                failures.push(row?);
            }
        }

        let stats = &self.writer_handle.stats;
        Ok(RunSummary {
            messages_written: stats.messages_written(),
            attachments_written: stats.attachments_written(),
            entities_written: stats.entities_written(),
            bytes_processed: stats.bytes_processed(),
            files_failed: stats.files_failed(),
            failures,
        })
    }

    /// Get the database path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Best-effort run report finalization when the store has failed;
    /// committed data stays valid even if this also fails
    fn try_mark_aborted(&self, ended_at: &str) {
        if let Ok(conn) = Connection::open(&self.db_path) {
            let _ = conn.execute(
                "UPDATE run_report SET end_time = ?1, status = ?2 WHERE id = ?3",
                params![ended_at, RunStatus::Aborted.as_str(), self.run_id],
            );
        }
    }
}

/// Internal writer thread function
fn writer_thread(
    conn: Connection,
    receiver: Receiver<WriterMessage>,
    stats: Arc<WriterStats>,
) -> DbResult<()> {
    // Map from container path to file_report id, so message records can be
    // linked without a query per record
    let mut path_to_id: HashMap<String, i64> = HashMap::new();

    loop {
        match receiver.recv() {
            Ok(WriterMessage::FileStarted(seed)) => {
                insert_file_report(&conn, &mut path_to_id, &seed, &stats)?;
            }
            Ok(WriterMessage::Message(record)) => {
                insert_message_record(&conn, &path_to_id, record, &stats)?;
            }
            Ok(WriterMessage::FileFinished {
                path,
                status,
                error,
                msg_count,
            }) => {
                finish_file(&conn, &mut path_to_id, &path, status, error, msg_count)?;
                stats.files_finished.fetch_add(1, Ordering::Relaxed);
                if status == JobStatus::Failed {
                    stats.files_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(WriterMessage::Shutdown) | Err(_) => break,
        }
    }

    Ok(())
}

/// Insert the file_report row for a starting job
fn insert_file_report(
    conn: &Connection,
    path_to_id: &mut HashMap<String, i64>,
    seed: &FileReportSeed,
    stats: &WriterStats,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO file_report (path, name, size, md5, sha256, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            seed.path,
            seed.name,
            seed.size.map(|s| s as i64),
            seed.md5,
            seed.sha256,
            JobStatus::Running.as_str(),
        ],
    )?;

    path_to_id.insert(seed.path.clone(), conn.last_insert_rowid());
    stats.files_started.fetch_add(1, Ordering::Relaxed);
    if let Some(size) = seed.size {
        stats.bytes_processed.fetch_add(size, Ordering::Relaxed);
    }

    Ok(())
}

/// Insert one message record as a single transaction
fn insert_message_record(
    conn: &Connection,
    path_to_id: &HashMap<String, i64>,
    record: MessageRecord,
    stats: &WriterStats,
) -> DbResult<()> {
    let file_report_id = match lookup_file_report(conn, path_to_id, &record.filepath) {
        Some(id) => id,
        None => {
            // Should not happen: FileStarted always precedes messages
            warn!(path = %record.filepath, "Unable to link message to a file report; record dropped");
            return Ok(());
        }
    };

    let tx = conn.unchecked_transaction()?;

    {
        let mut msg_stmt = tx.prepare_cached(
            "INSERT INTO message (pff_identifier, processing_start_time, processing_end_time, body, headers, file_report_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        msg_stmt.execute(params![
            record.identifier,
            record.processing_start_time,
            record.processing_end_time,
            record.body,
            record.headers,
            file_report_id,
        ])?;
    }
    let message_id = tx.last_insert_rowid();

    {
        let mut att_stmt = tx.prepare_cached(
            "INSERT INTO attachment (name, size, content_type, message_id)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for attachment in &record.attachments {
            att_stmt.execute(params![
                attachment.name,
                attachment.size as i64,
                attachment.content_type,
                message_id,
            ])?;
        }

        let mut ent_stmt = tx.prepare_cached(
            "INSERT INTO entity (text, label, filepath, message_id, file_report_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for entity in &record.entities {
            ent_stmt.execute(params![
                entity.text,
                entity.label,
                record.filepath,
                message_id,
                file_report_id,
            ])?;
        }
    }

    tx.commit()?;

    stats.messages_written.fetch_add(1, Ordering::Relaxed);
    stats
        .attachments_written
        .fetch_add(record.attachments.len() as u64, Ordering::Relaxed);
    stats
        .entities_written
        .fetch_add(record.entities.len() as u64, Ordering::Relaxed);

    Ok(())
}

/// Record a job's terminal status on its file_report row
///
/// A row normally exists from the FileStarted record; if the job crashed
/// before it was sent, a minimal row is created so the failure is still
/// visible in the report.
fn finish_file(
    conn: &Connection,
    path_to_id: &mut HashMap<String, i64>,
    path: &str,
    status: JobStatus,
    error: Option<String>,
    msg_count: u64,
) -> DbResult<()> {
    match lookup_file_report(conn, path_to_id, path) {
        Some(id) => {
            conn.execute(
                "UPDATE file_report SET status = ?1, error = ?2, msg_count = ?3 WHERE id = ?4",
                params![status.as_str(), error, msg_count as i64, id],
            )?;
            // Terminal: no more records for this file will arrive
            path_to_id.remove(path);
        }
        None => {
            let name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            conn.execute(
                "INSERT INTO file_report (path, name, status, error, msg_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![path, name, status.as_str(), error, msg_count as i64],
            )?;
        }
    }

    Ok(())
}

fn lookup_file_report(
    conn: &Connection,
    path_to_id: &HashMap<String, i64>,
    path: &str,
) -> Option<i64> {
    path_to_id.get(path).copied().or_else(|| {
        conn.query_row(
            "SELECT id FROM file_report WHERE path = ?1 ORDER BY id DESC LIMIT 1",
            params![path],
            |row| row.get(0),
        )
        .ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed(path: &str) -> FileReportSeed {
        FileReportSeed {
            path: path.into(),
            name: Path::new(path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned(),
            size: Some(2048),
            md5: Some("a".repeat(32)),
            sha256: Some("b".repeat(64)),
        }
    }

    fn run_seed(file_count: u64) -> RunSeed {
        RunSeed {
            started_at: "2026-01-05T10:00:00+00:00".into(),
            tool_version: env!("CARGO_PKG_VERSION").into(),
            model_identity: Some("builtin-patterns/1.2".into()),
            concurrency: 2,
            file_count,
        }
    }

    fn record(path: &str, entities: Vec<EntitySpan>) -> MessageRecord {
        MessageRecord {
            filepath: path.into(),
            identifier: Some(17),
            processing_start_time: "2026-01-05T10:00:01+00:00".into(),
            processing_end_time: "2026-01-05T10:00:02+00:00".into(),
            body: None,
            headers: None,
            attachments: vec![AttachmentMeta {
                name: Some("a.pdf".into()),
                size: 9,
                content_type: Some("application/pdf".into()),
            }],
            entities,
        }
    }

    #[test]
    fn test_writer_round_trip() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("out.db");

        let writer = StoreWriter::new(&db_path, 64, run_seed(1)).unwrap();
        let handle = writer.handle();

        handle.file_started(seed("/mail/a.mbox")).unwrap();
        handle
            .send_message(record(
                "/mail/a.mbox",
                vec![EntitySpan {
                    text: "x@y.com".into(),
                    label: "EMAIL".into(),
                }],
            ))
            .unwrap();
        handle
            .file_finished("/mail/a.mbox".into(), JobStatus::Completed, None, 1)
            .unwrap();

        let summary = writer
            .finish(RunStatus::Completed, "2026-01-05T10:00:05+00:00")
            .unwrap();
        assert_eq!(summary.messages_written, 1);
        assert_eq!(summary.entities_written, 1);
        assert_eq!(summary.attachments_written, 1);
        assert!(summary.failures.is_empty());

        let conn = Connection::open(&db_path).unwrap();
        let (status, msg_count): (String, i64) = conn
            .query_row(
                "SELECT status, msg_count FROM file_report WHERE path = '/mail/a.mbox'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "completed");
        assert_eq!(msg_count, 1);

        let pff: Option<i64> = conn
            .query_row("SELECT pff_identifier FROM message", [], |row| row.get(0))
            .unwrap();
        assert_eq!(pff, Some(17));

        let (run_status, message_count): (String, i64) = conn
            .query_row(
                "SELECT status, message_count FROM run_report",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(run_status, "completed");
        assert_eq!(message_count, 1);
    }

    #[test]
    fn test_failed_file_summary() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("out.db");

        let writer = StoreWriter::new(&db_path, 64, run_seed(1)).unwrap();
        let handle = writer.handle();

        handle.file_started(seed("/mail/bad.mbox")).unwrap();
        handle
            .file_finished(
                "/mail/bad.mbox".into(),
                JobStatus::Failed,
                Some("missing leading 'From ' separator line".into()),
                0,
            )
            .unwrap();

        let summary = writer
            .finish(RunStatus::Completed, "2026-01-05T10:00:05+00:00")
            .unwrap();
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].path, "/mail/bad.mbox");
        assert!(summary.failures[0].reason.contains("separator"));
    }

    #[test]
    fn test_finish_without_start_creates_row() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("out.db");

        let writer = StoreWriter::new(&db_path, 64, run_seed(1)).unwrap();
        let handle = writer.handle();

        // Terminal record for a job that crashed before its start record
        handle
            .file_finished(
                "/mail/crash.mbox".into(),
                JobStatus::Failed,
                Some("worker crashed".into()),
                0,
            )
            .unwrap();

        let summary = writer
            .finish(RunStatus::Completed, "2026-01-05T10:00:05+00:00")
            .unwrap();
        assert_eq!(summary.failures.len(), 1);

        let conn = Connection::open(&db_path).unwrap();
        let name: String = conn
            .query_row(
                "SELECT name FROM file_report WHERE path = '/mail/crash.mbox'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "crash.mbox");
    }

    #[test]
    fn test_cancelled_run_status_recorded() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("out.db");

        let writer = StoreWriter::new(&db_path, 64, run_seed(0)).unwrap();
        let summary = writer
            .finish(RunStatus::Cancelled, "2026-01-05T10:00:05+00:00")
            .unwrap();
        assert_eq!(summary.messages_written, 0);

        let conn = Connection::open(&db_path).unwrap();
        let status: String = conn
            .query_row("SELECT status FROM run_report", [], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "cancelled");
    }

    #[test]
    fn test_ids_monotonic_across_files() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("out.db");

        let writer = StoreWriter::new(&db_path, 64, run_seed(2)).unwrap();
        let handle = writer.handle();

        for path in ["/mail/a.mbox", "/mail/b.mbox"] {
            handle.file_started(seed(path)).unwrap();
            handle.send_message(record(path, Vec::new())).unwrap();
            handle
                .file_finished(path.into(), JobStatus::Completed, None, 1)
                .unwrap();
        }

        writer
            .finish(RunStatus::Completed, "2026-01-05T10:00:05+00:00")
            .unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM message ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }
}
