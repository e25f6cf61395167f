//! Access to the room's single-row `clock` table.

use crate::{error::Result, Clock};
use rusqlite::Connection;

pub(crate) fn document_clock(conn: &Connection) -> Result<Clock> {
    let clock: i64 = conn.query_row("SELECT documentClock FROM clock", [], |row| row.get(0))?;
    Ok(clock as Clock)
}

pub(crate) fn tombstone_history_start(conn: &Connection) -> Result<Clock> {
    let clock: i64 = conn.query_row("SELECT tombstoneHistoryStartsAtClock FROM clock", [], |row| {
        row.get(0)
    })?;
    Ok(clock as Clock)
}

/// Advance the document clock by one and return the new value.
pub(crate) fn advance_document_clock(conn: &Connection) -> Result<Clock> {
    conn.execute("UPDATE clock SET documentClock = documentClock + 1", [])?;
    document_clock(conn)
}

pub(crate) fn set_tombstone_history_start(conn: &Connection, clock: Clock) -> Result<()> {
    conn.execute(
        "UPDATE clock SET tombstoneHistoryStartsAtClock = ?1",
        [clock as i64],
    )?;
    Ok(())
}
