//! mailscan - Parallel Email Archive Scanner
//!
//! A tool for scanning collections of email containers (mbox and eml) at
//! scale, extracting message, attachment and entity facts into SQLite for
//! later analysis.
//!
//! # Features
//!
//! - **Parallel Extraction**: A bounded pool of worker threads, each
//!   processing one container at a time with its own recognizer instance.
//!
//! - **Single-Writer Store**: All results funnel through one SQLite writer
//!   thread over a bounded channel; a full channel blocks producers, so
//!   memory stays bounded when extraction outpaces persistence.
//!
//! - **Failure Isolation**: A corrupt container, malformed message, or
//!   crash inside one file's job never affects sibling jobs.
//!
//! - **Cooperative Cancellation**: Ctrl-C stops dispatch and lets workers
//!   stop at message boundaries; everything already received is committed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Source Enumerator                           │
//! │              (directory walk, format detection)                 │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ ordered file jobs
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                             │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker C │     │
//! │  │ parser  │  │ parser  │  │ parser  │         │ parser  │     │
//! │  │ recognz │  │ recognz │  │ recognz │         │ recognz │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       │            │            │                    │          │
//! │       └────────────┴─────┬──────┴────────────────────┘          │
//! │                          ▼                                      │
//! │            ┌──────────────────────────┐                         │
//! │            │     Intake Channel       │                         │
//! │            │  (crossbeam bounded)     │                         │
//! │            │  - Backpressure support  │                         │
//! │            └────────────┬─────────────┘                         │
//! │                         ▼                                       │
//! │            ┌──────────────────────────┐                         │
//! │            │      StoreWriter         │                         │
//! │            │  - One txn per message   │                         │
//! │            │  - WAL mode              │                         │
//! │            └──────────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────┐
//!                    │   SQLite DB      │
//!                    │  (mailscan.db)   │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Scan a directory of mail archives
//! mailscan ./dump -o scan.db -j 8 -p
//!
//! # Report mode: no entity extraction
//! mailscan ./dump --report-only -o report.db
//!
//! # Query results
//! sqlite3 scan.db "SELECT text, COUNT(*) FROM entity WHERE label='EMAIL' GROUP BY text"
//! ```

pub mod archive;
pub mod config;
pub mod content;
pub mod db;
pub mod entities;
pub mod error;
pub mod pipeline;
pub mod progress;

pub use config::{CliArgs, ScanConfig};
pub use error::{Result, ScanError};
pub use pipeline::{CancelToken, ScanCoordinator, ScanOutcome};
