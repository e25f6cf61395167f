//! SQL schema bootstrap.
//!
//! The DDL is idempotent and the column names are fixed: databases written
//! by older builds must keep working when reopened.

use crate::error::Result;
use rusqlite::Connection;

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    lastChangedClock INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS documents_lastChangedClock ON documents (lastChangedClock);
CREATE TABLE IF NOT EXISTS tombstones (
    id TEXT PRIMARY KEY,
    clock INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS clock (
    documentClock INTEGER NOT NULL,
    tombstoneHistoryStartsAtClock INTEGER NOT NULL
);
INSERT INTO clock (documentClock, tombstoneHistoryStartsAtClock)
SELECT 0, 0 WHERE NOT EXISTS (SELECT 1 FROM clock);
";

/// Create the four core tables and seed the single clock row when absent.
/// Safe to run against a database that already has them.
pub(crate) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

/// Whether this database already carries the core tables. Any probe error
/// or an empty `clock` table reads as not initialized.
pub(crate) fn probe_initialized(conn: &Connection) -> bool {
    conn.query_row("SELECT 1 FROM clock LIMIT 1", [], |_| Ok(()))
        .is_ok()
}
