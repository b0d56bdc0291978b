//! Error types for mailscan
//!
//! This module defines the error hierarchy covering:
//! - Archive detection, opening and per-message parse errors
//! - SQLite database errors
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Per-file errors stay inside that file's job; only configuration and
//!   store errors abort the whole run

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the mailscan application
#[derive(Error, Debug)]
pub enum ScanError {
    /// Archive-related errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (enumeration, file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel closed unexpectedly
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

/// Archive detection, opening and parsing errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The file is not a recognized container format
    #[error("'{path}' is not a recognized mail container")]
    UnrecognizedFormat { path: PathBuf },

    /// The container could not be opened as its detected format
    #[error("Failed to open '{path}' as {format}: {reason}")]
    OpenFailed {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    /// A single message within the container is malformed
    #[error("Malformed message {ordinal} in '{path}': {reason}")]
    MessageParse {
        path: PathBuf,
        ordinal: usize,
        reason: String,
    },

    /// I/O failure while reading the container
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Check if this error is scoped to a single message (job continues)
    /// rather than the whole container (job fails)
    pub fn is_message_scoped(&self) -> bool {
        matches!(self, ArchiveError::MessageParse { .. })
    }
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to create database file
    #[error("Failed to create database at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Writer channel closed unexpectedly
    #[error("Database writer channel closed unexpectedly")]
    ChannelClosed,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid job count
    #[error("Invalid job count {count}: must be between 1 and {max}")]
    InvalidJobCount { count: usize, max: usize },

    /// Invalid intake queue size
    #[error("Invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },

    /// Source path error
    #[error("Invalid source path '{path}': {reason}")]
    InvalidSourcePath { path: PathBuf, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked outside a job boundary
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Result channel closed while the worker still had records to emit
    #[error("Worker {id} lost its connection to the writer")]
    WriterGone { id: usize },
}

/// Result type alias for ScanError
pub type Result<T> = std::result::Result<T, ScanError>;

/// Result type alias for ArchiveError
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_scoped_errors() {
        let parse = ArchiveError::MessageParse {
            path: "/mail/a.mbox".into(),
            ordinal: 3,
            reason: "truncated".into(),
        };
        assert!(parse.is_message_scoped());

        let open = ArchiveError::OpenFailed {
            path: "/mail/a.mbox".into(),
            format: "mbox",
            reason: "no mbox separator".into(),
        };
        assert!(!open.is_message_scoped());
    }

    #[test]
    fn test_error_conversion() {
        let archive_err = ArchiveError::UnrecognizedFormat {
            path: "/mail/notes.txt".into(),
        };
        let scan_err: ScanError = archive_err.into();
        assert!(matches!(scan_err, ScanError::Archive(_)));
    }
}
