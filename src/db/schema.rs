//! Database schema definitions and creation
//!
//! This module defines the SQLite schema for the scan output and provides
//! functions to create and configure the database. The table shapes are the
//! contract other tooling queries against; columns are never renamed.
//!
//! Note: Using INTEGER PRIMARY KEY (without AUTOINCREMENT) for speed. Rows
//! are never deleted during a run, so ids stay monotonically increasing and
//! are never reused.

use crate::error::DbResult;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// One row per source container file
const CREATE_FILE_REPORT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS file_report (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    size INTEGER,
    md5 TEXT,
    sha256 TEXT,
    status TEXT NOT NULL,         -- running/completed/partial/failed/cancelled
    error TEXT,                   -- failure reason or skip summary
    msg_count INTEGER             -- messages the container yielded
)
"#;

/// One row per parsed message
const CREATE_MESSAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS message (
    id INTEGER PRIMARY KEY,
    pff_identifier INTEGER,       -- container-assigned id; NULL for mbox
    processing_start_time TEXT,
    processing_end_time TEXT,
    body TEXT,                    -- populated only with --include-content
    headers TEXT,
    file_report_id INTEGER NOT NULL,

    FOREIGN KEY (file_report_id) REFERENCES file_report(id)
)
"#;

/// Zero or more rows per message
const CREATE_ATTACHMENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS attachment (
    id INTEGER PRIMARY KEY,
    name TEXT,
    size INTEGER,
    content_type TEXT,
    message_id INTEGER NOT NULL,

    FOREIGN KEY (message_id) REFERENCES message(id)
)
"#;

/// Zero or more rows per message
///
/// file_report_id duplicates what a join through message would give, kept
/// for fast per-file entity queries.
const CREATE_ENTITY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entity (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL,
    label TEXT NOT NULL,
    filepath TEXT,
    message_id INTEGER NOT NULL,
    file_report_id INTEGER NOT NULL,

    FOREIGN KEY (message_id) REFERENCES message(id),
    FOREIGN KEY (file_report_id) REFERENCES file_report(id)
)
"#;

/// Exactly one row per invocation
const CREATE_RUN_REPORT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS run_report (
    id INTEGER PRIMARY KEY,
    start_time TEXT NOT NULL,
    end_time TEXT,
    tool_version TEXT NOT NULL,
    model_identity TEXT,          -- NULL when entity extraction is disabled
    concurrency INTEGER NOT NULL,
    file_count INTEGER,
    message_count INTEGER,
    entity_count INTEGER,
    status TEXT NOT NULL          -- running/completed/cancelled/aborted
)
"#;

/// Indexes for common queries, created after the scan completes so inserts
/// stay fast
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_file_report_path ON file_report(path)",
    "CREATE INDEX IF NOT EXISTS idx_file_report_status ON file_report(status)",
    "CREATE INDEX IF NOT EXISTS idx_message_file ON message(file_report_id)",
    "CREATE INDEX IF NOT EXISTS idx_attachment_message ON attachment(message_id)",
    "CREATE INDEX IF NOT EXISTS idx_entity_message ON entity(message_id)",
    "CREATE INDEX IF NOT EXISTS idx_entity_file ON entity(file_report_id)",
    "CREATE INDEX IF NOT EXISTS idx_entity_label ON entity(label)",
];

/// SQLite pragmas for write throughput during the scan
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
"#;

/// SQLite pragmas applied after the scan completes
const READ_PRAGMAS: &str = r#"
PRAGMA synchronous = FULL;
PRAGMA optimize;
"#;

/// Create and configure a new database for writing
pub fn create_database(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;

    conn.execute(CREATE_FILE_REPORT_TABLE, [])?;
    conn.execute(CREATE_MESSAGE_TABLE, [])?;
    conn.execute(CREATE_ATTACHMENT_TABLE, [])?;
    conn.execute(CREATE_ENTITY_TABLE, [])?;
    conn.execute(CREATE_RUN_REPORT_TABLE, [])?;

    Ok(())
}

/// Create indexes (called after the scan for better insert performance)
pub fn create_indexes(conn: &Connection) -> DbResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Apply read-optimized settings and refresh planner statistics
pub fn optimize_for_reads(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(READ_PRAGMAS)?;
    conn.execute("ANALYZE", [])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_database() {
        let conn = Connection::open_in_memory().unwrap();
        create_database(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in ["attachment", "entity", "file_report", "message", "run_report"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_create_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        create_database(&conn).unwrap();
        create_indexes(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(count >= 7);
    }

    #[test]
    fn test_create_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_database(&conn).unwrap();
        create_database(&conn).unwrap();
        create_indexes(&conn).unwrap();
        create_indexes(&conn).unwrap();
    }
}
