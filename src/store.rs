//! The room document store.
//!
//! A [`RoomStore`] owns the SQL handle for one sync room and is the single
//! writer for it: the host serializes all access, so no internal locking is
//! needed. Mutations happen through [`RoomStore::transaction`], which opens
//! an atomic scope, advances the document clock at most once, notifies
//! change listeners when the clock moved, and schedules deferred tombstone
//! pruning after deletes.

use crate::{
    clock,
    error::Result,
    listener::{ChangeEvent, ListenerBus, Subscription},
    prune::{cohort_cutoff, PruneConfig, PruneScheduler},
    schema,
    snapshot::{RoomSnapshot, SnapshotDocument, SCHEMA_METADATA_KEY},
    txn::StoreTransaction,
    Clock, SourceTag,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::time::Instant;

/// Result of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome<T> {
    /// The document clock after commit.
    pub new_clock: Clock,
    /// Whether this transaction advanced the clock.
    pub did_change: bool,
    /// Whatever the body returned.
    pub result: T,
}

/// Persistent, clock-ordered document store for one sync room.
pub struct RoomStore {
    conn: Connection,
    listeners: ListenerBus,
    prune_config: PruneConfig,
    scheduler: PruneScheduler,
}

impl RoomStore {
    /// Open a store over `conn` with default prune bounds.
    ///
    /// Issues idempotent DDL; pre-existing data is retained. When a seed
    /// snapshot is supplied, all four tables are wiped and repopulated from
    /// it instead, atomically within the constructor's own scope.
    pub fn new(conn: Connection, snapshot: Option<RoomSnapshot>) -> Result<Self> {
        Self::with_config(conn, snapshot, PruneConfig::default())
    }

    /// Open a store with explicit prune bounds.
    pub fn with_config(
        conn: Connection,
        snapshot: Option<RoomSnapshot>,
        prune_config: PruneConfig,
    ) -> Result<Self> {
        {
            let tx = conn.unchecked_transaction()?;
            schema::create_tables(&tx)?;
            if let Some(snapshot) = &snapshot {
                ingest_snapshot(&tx, snapshot)?;
            }
            tx.commit()?;
        }

        Ok(Self {
            conn,
            listeners: ListenerBus::new(),
            scheduler: PruneScheduler::new(prune_config.window),
            prune_config,
        })
    }

    /// Consume the store and hand the SQL handle back to the host.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Whether `conn` already carries the core tables. Used by hosts to
    /// choose between reopening in place and a cold load from a legacy
    /// snapshot. Any probe error reads as not initialized.
    pub fn has_been_initialized(conn: &Connection) -> bool {
        schema::probe_initialized(conn)
    }

    /// The room's monotonic document clock.
    pub fn clock(&self) -> Result<Clock> {
        clock::document_clock(&self.conn)
    }

    /// The watermark below which tombstone history has been pruned.
    pub fn tombstone_history_start(&self) -> Result<Clock> {
        clock::tombstone_history_start(&self.conn)
    }

    /// Register a change listener. Listeners fire exactly when a committed
    /// transaction advanced the clock, in registration order, and receive
    /// the transaction's source tag and the new clock.
    pub fn on_change(&self, listener: impl FnMut(&ChangeEvent) + 'static) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Run `body` atomically against the store.
    ///
    /// The body receives a [`StoreTransaction`] whose writes hit SQL
    /// immediately inside the scope. On success the scope commits, with
    /// listeners notified first when the clock advanced. On error the scope
    /// rolls back, no listener fires, and the error propagates unchanged.
    pub fn transaction<T>(
        &mut self,
        source: impl Into<SourceTag>,
        body: impl FnOnce(&mut StoreTransaction<'_>) -> Result<T>,
    ) -> Result<TransactionOutcome<T>> {
        let source = source.into();
        let clock_before = clock::document_clock(&self.conn)?;

        let tx = self.conn.unchecked_transaction()?;
        let mut txn = StoreTransaction::new(&tx);
        let result = body(&mut txn)?;
        let prune_requested = txn.prune_requested();
        drop(txn);

        let new_clock = clock::document_clock(&tx)?;
        let did_change = new_clock > clock_before;
        if did_change {
            self.listeners.notify(&ChangeEvent { source, new_clock });
        }
        tx.commit()?;

        if prune_requested {
            self.scheduler.request(Instant::now());
        }

        Ok(TransactionOutcome {
            new_clock,
            did_change,
            result,
        })
    }

    /// Whether a deferred prune is armed.
    pub fn prune_scheduled(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Run the deferred prune if its throttle window has elapsed by `now`.
    /// Returns whether a prune transaction ran. Hosts call this from their
    /// event loop once control has returned to it.
    pub fn run_scheduled_prune(&mut self, now: Instant) -> Result<bool> {
        if !self.scheduler.fire_due(now) {
            return Ok(false);
        }
        self.prune_tombstones()?;
        Ok(true)
    }

    /// Trim tombstone history down to its configured bound, in a
    /// transaction of its own. Returns the number of tombstones dropped.
    ///
    /// Keeps at least the `prune_buffer` most recent tombstones, widening
    /// the cut so a cohort sharing one clock is never split, and advances
    /// the history watermark to the oldest retained tombstone's clock.
    /// Never touches the document clock, so listeners do not fire.
    pub fn prune_tombstones(&mut self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM tombstones", [], |row| row.get(0))?;
        if count as usize <= self.prune_config.max_tombstones {
            return Ok(0);
        }

        let mut stmt = tx.prepare("SELECT clock FROM tombstones ORDER BY clock DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut clocks = Vec::with_capacity(count as usize);
        for clock in rows {
            clocks.push(clock? as Clock);
        }
        drop(stmt);

        let cutoff = cohort_cutoff(&clocks, self.prune_config.prune_buffer);
        if cutoff == 0 || cutoff >= clocks.len() {
            // The straddling cohort runs to the end; nothing can be dropped
            // without splitting it.
            return Ok(0);
        }

        let watermark = clocks[cutoff - 1];
        clock::set_tombstone_history_start(&tx, watermark)?;
        let dropped = tx.execute(
            "DELETE FROM tombstones WHERE clock < ?1",
            params![watermark as i64],
        )?;
        tx.commit()?;

        tracing::debug!(dropped, watermark, "pruned tombstone history");
        Ok(dropped)
    }

    /// Export the room as a snapshot. New exports always populate
    /// `documentClock`, never the legacy field.
    pub fn snapshot(&self) -> Result<RoomSnapshot> {
        let document_clock = self.clock()?;
        let history_start = self.tombstone_history_start()?;

        let mut stmt = self
            .conn
            .prepare("SELECT state, lastChangedClock FROM documents ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut documents = Vec::new();
        for row in rows {
            let (state, last_changed) = row?;
            documents.push(SnapshotDocument {
                state: serde_json::from_str(&state)?,
                last_changed_clock: last_changed as Clock,
            });
        }
        drop(stmt);

        let mut stmt = self.conn.prepare("SELECT id, clock FROM tombstones")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut tombstones = BTreeMap::new();
        for row in rows {
            let (id, clock) = row?;
            tombstones.insert(id, clock as Clock);
        }
        drop(stmt);

        let schema_descriptor = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![SCHEMA_METADATA_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(crate::Error::from)?
            .map(|value| serde_json::from_str(&value))
            .transpose()?;

        Ok(RoomSnapshot {
            document_clock: Some(document_clock),
            clock: None,
            tombstone_history_starts_at_clock: Some(history_start),
            documents,
            tombstones: if tombstones.is_empty() {
                None
            } else {
                Some(tombstones)
            },
            schema: schema_descriptor,
        })
    }
}

/// Wipe the four tables and repopulate them from `snapshot`. Runs inside
/// the constructor's transaction.
fn ingest_snapshot(conn: &Connection, snapshot: &RoomSnapshot) -> Result<()> {
    let document_clock = snapshot.resolved_document_clock();
    let history_start = snapshot.resolved_tombstone_history_start();

    conn.execute("DELETE FROM documents", [])?;
    conn.execute("DELETE FROM tombstones", [])?;
    conn.execute("DELETE FROM metadata", [])?;
    conn.execute("DELETE FROM clock", [])?;

    for document in &snapshot.documents {
        let id = document.record_id()?;
        conn.execute(
            "INSERT INTO documents (id, state, lastChangedClock) VALUES (?1, ?2, ?3)",
            params![
                id,
                serde_json::to_string(&document.state)?,
                document.last_changed_clock as i64
            ],
        )?;
    }

    if let Some(tombstones) = &snapshot.tombstones {
        for (id, clock) in tombstones {
            conn.execute(
                "INSERT INTO tombstones (id, clock) VALUES (?1, ?2)",
                params![id, *clock as i64],
            )?;
        }
    }

    if let Some(schema_descriptor) = &snapshot.schema {
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)",
            params![SCHEMA_METADATA_KEY, serde_json::to_string(schema_descriptor)?],
        )?;
    }

    conn.execute(
        "INSERT INTO clock (documentClock, tombstoneHistoryStartsAtClock) VALUES (?1, ?2)",
        params![document_clock as i64, history_start as i64],
    )?;

    tracing::debug!(
        documents = snapshot.documents.len(),
        document_clock,
        "seeded room from snapshot"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_store() -> RoomStore {
        RoomStore::new(Connection::open_in_memory().unwrap(), None).unwrap()
    }

    #[test]
    fn fresh_store_starts_at_clock_zero() {
        let store = empty_store();
        assert_eq!(store.clock().unwrap(), 0);
        assert_eq!(store.tombstone_history_start().unwrap(), 0);
    }

    #[test]
    fn clock_advances_once_per_transaction() {
        let mut store = empty_store();

        let outcome = store
            .transaction("test", |txn| {
                txn.set_document("r:1", json!({"id": "r:1"}))?;
                txn.set_document("r:2", json!({"id": "r:2"}))?;
                txn.delete_document("r:1")?;
                txn.get_clock()
            })
            .unwrap();

        assert_eq!(outcome.new_clock, 1);
        assert_eq!(outcome.result, 1);
        assert!(outcome.did_change);
    }

    #[test]
    fn read_your_writes_within_a_transaction() {
        let mut store = empty_store();

        store
            .transaction("test", |txn| {
                txn.set_document("r:1", json!({"id": "r:1", "n": 1}))?;
                let doc = txn.get_document("r:1")?.unwrap();
                assert_eq!(doc.state, json!({"id": "r:1", "n": 1}));
                assert_eq!(doc.last_changed_clock, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn metadata_does_not_advance_the_clock() {
        let mut store = empty_store();

        let outcome = store
            .transaction("test", |txn| {
                txn.set_metadata("owner", "alice")?;
                txn.get_metadata("owner")
            })
            .unwrap();

        assert!(!outcome.did_change);
        assert_eq!(outcome.new_clock, 0);
        assert_eq!(outcome.result.as_deref(), Some("alice"));
    }

    #[test]
    fn set_document_clears_a_prior_tombstone() {
        let mut store = empty_store();

        store
            .transaction("test", |txn| txn.set_document("r:1", json!({"id": "r:1"})))
            .unwrap();
        store
            .transaction("test", |txn| txn.delete_document("r:1"))
            .unwrap();
        store
            .transaction("test", |txn| txn.set_document("r:1", json!({"id": "r:1"})))
            .unwrap();

        let tombstones = store
            .transaction("test", |txn| txn.tombstones())
            .unwrap()
            .result;
        assert!(tombstones.is_empty());
    }

    #[test]
    fn snapshot_construction_replaces_existing_state() {
        let conn = Connection::open_in_memory().unwrap();
        let mut store = RoomStore::new(conn, None).unwrap();
        store
            .transaction("test", |txn| txn.set_document("r:old", json!({"id": "r:old"})))
            .unwrap();
        let conn = store.conn;

        let snapshot = RoomSnapshot {
            document_clock: Some(3),
            documents: vec![SnapshotDocument {
                state: json!({"id": "r:new"}),
                last_changed_clock: 3,
            }],
            ..Default::default()
        };
        let mut store = RoomStore::new(conn, Some(snapshot)).unwrap();

        assert_eq!(store.clock().unwrap(), 3);
        let ids = store
            .transaction("test", |txn| txn.document_ids())
            .unwrap()
            .result;
        assert_eq!(ids, vec!["r:new".to_string()]);
    }

    #[test]
    fn snapshot_without_document_id_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let snapshot = RoomSnapshot {
            documents: vec![SnapshotDocument {
                state: json!({"n": "a"}),
                last_changed_clock: 1,
            }],
            ..Default::default()
        };

        let result = RoomStore::new(conn, Some(snapshot));
        assert!(matches!(result, Err(crate::Error::InvalidSnapshot(_))));
    }
}
