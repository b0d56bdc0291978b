//! Database module for the scan output store
//!
//! All mutation of the output database funnels through one writer thread;
//! workers only ever hold a [`WriterHandle`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Worker Threads (N)                   │
//! │  - Send file/message records via bounded channel    │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ WriterMessage
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │               StoreWriter Thread                    │
//! │  - One transaction per message record               │
//! │  - File report status updates                       │
//! │  - Run report finalization                          │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌──────────────────┐
//!               │    SQLite DB     │
//!               └──────────────────┘
//! ```

pub mod schema;
pub mod writer;

pub use schema::{create_database, create_indexes, optimize_for_reads};
pub use writer::{
    FileFailure, FileReportSeed, MessageRecord, RunSeed, RunSummary, StoreWriter, WriterHandle,
    WriterMessage, WriterStats,
};
