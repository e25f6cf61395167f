//! The transaction handle.
//!
//! A [`StoreTransaction`] is handed to the body closure of
//! [`RoomStore::transaction`](crate::RoomStore::transaction). Every write
//! goes straight to SQL inside the open atomic scope, so reads later in the
//! same body observe earlier writes. The document clock advances at most
//! once per transaction, on the first mutation of record state; metadata
//! writes never touch it.

use crate::{changes::Change, clock, error::Result, Clock, RecordId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A live record as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The record state blob.
    pub state: serde_json::Value,
    /// Clock at which this record last changed.
    pub last_changed_clock: Clock,
}

/// A remembered deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Id of the deleted record.
    pub id: RecordId,
    /// Clock at which the deletion was committed.
    pub clock: Clock,
}

/// Handle to the store within one atomic scope.
pub struct StoreTransaction<'conn> {
    conn: &'conn Connection,
    did_increment_clock: bool,
    prune_requested: bool,
}

impl<'conn> StoreTransaction<'conn> {
    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            did_increment_clock: false,
            prune_requested: false,
        }
    }

    /// The current document clock.
    pub fn get_clock(&self) -> Result<Clock> {
        clock::document_clock(self.conn)
    }

    /// The watermark below which tombstone history has been pruned.
    pub fn get_tombstone_history_start(&self) -> Result<Clock> {
        clock::tombstone_history_start(self.conn)
    }

    // First mutation in a transaction bumps the clock; later ones reuse it.
    fn advance_clock(&mut self) -> Result<Clock> {
        if self.did_increment_clock {
            self.get_clock()
        } else {
            self.did_increment_clock = true;
            clock::advance_document_clock(self.conn)
        }
    }

    /// Look up a single record by id.
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = self
            .conn
            .query_row(
                "SELECT state, lastChangedClock FROM documents WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match row {
            Some((state, last_changed)) => Ok(Some(Document {
                state: serde_json::from_str(&state)?,
                last_changed_clock: last_changed as Clock,
            })),
            None => Ok(None),
        }
    }

    /// Insert or replace a record, stamping it with this transaction's
    /// clock. Any tombstone for the same id is cleared: a record is either
    /// live or deleted, never both.
    pub fn set_document(&mut self, id: &str, state: serde_json::Value) -> Result<()> {
        let clock = self.advance_clock()?;
        let serialized = serde_json::to_string(&state)?;
        self.conn.execute(
            "INSERT INTO documents (id, state, lastChangedClock) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state,
                                           lastChangedClock = excluded.lastChangedClock",
            params![id, serialized, clock as i64],
        )?;
        self.conn
            .execute("DELETE FROM tombstones WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Remove a record and remember the deletion. Deleting an id with no
    /// live record still writes a tombstone at this transaction's clock.
    pub fn delete_document(&mut self, id: &str) -> Result<()> {
        let clock = self.advance_clock()?;
        self.conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        self.conn.execute(
            "INSERT OR REPLACE INTO tombstones (id, clock) VALUES (?1, ?2)",
            params![id, clock as i64],
        )?;
        self.prune_requested = true;
        Ok(())
    }

    /// All live records, as a point-in-time vector. Order is unspecified.
    pub fn documents(&self) -> Result<Vec<(RecordId, Document)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, state, lastChangedClock FROM documents")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, state, last_changed) = row?;
            documents.push((
                id,
                Document {
                    state: serde_json::from_str(&state)?,
                    last_changed_clock: last_changed as Clock,
                },
            ));
        }
        Ok(documents)
    }

    /// Ids of all live records.
    pub fn document_ids(&self) -> Result<Vec<RecordId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM documents")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// All remembered deletions.
    pub fn tombstones(&self) -> Result<Vec<Tombstone>> {
        let mut stmt = self.conn.prepare("SELECT id, clock FROM tombstones")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut tombstones = Vec::new();
        for row in rows {
            let (id, clock) = row?;
            tombstones.push(Tombstone {
                id,
                clock: clock as Clock,
            });
        }
        Ok(tombstones)
    }

    /// Read a room metadata value.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a room metadata value. Does not advance the clock.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Compute the catch-up batch for a client whose cursor is
    /// `since_clock`.
    ///
    /// A cursor ahead of the document clock means the caller's state is
    /// corrupt; the batch restarts from scratch. A cursor behind the
    /// tombstone history watermark cannot be served incrementally, so the
    /// batch opens with [`Change::WipeAll`] and resends everything.
    pub fn get_changes_since(&self, since_clock: Clock) -> Result<Vec<Change>> {
        let document_clock = self.get_clock()?;
        if since_clock == document_clock {
            return Ok(Vec::new());
        }
        let history_start = self.get_tombstone_history_start()?;

        let mut changes = Vec::new();
        // A cursor of -1 sits strictly below every stored clock and reads
        // as "from the beginning".
        let mut cursor = since_clock as i64;
        if since_clock > document_clock {
            tracing::warn!(
                since_clock,
                document_clock,
                "change cursor is ahead of the document clock, resending from scratch"
            );
            cursor = -1;
        }
        if cursor < history_start as i64 {
            changes.push(Change::WipeAll);
            cursor = -1;
        }

        let mut stmt = self
            .conn
            .prepare("SELECT state FROM documents WHERE lastChangedClock > ?1")?;
        let rows = stmt.query_map(params![cursor], |row| row.get::<_, String>(0))?;
        for state in rows {
            changes.push(Change::Put(serde_json::from_str(&state?)?));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id FROM tombstones WHERE clock > ?1")?;
        let rows = stmt.query_map(params![cursor], |row| row.get::<_, String>(0))?;
        for id in rows {
            changes.push(Change::Delete(id?));
        }

        Ok(changes)
    }

    pub(crate) fn prune_requested(&self) -> bool {
        self.prune_requested
    }
}
