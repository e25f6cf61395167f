//! # Berth Store
//!
//! A clock-ordered, tombstoned document store: the persistent backend for a
//! real-time collaborative sync room.
//!
//! The store holds the authoritative copy of every record in a room,
//! remembers deletions long enough for lagging clients to reconcile, exposes
//! an incremental change feed keyed by a monotonic logical clock, and offers
//! transactional mutation with change notifications.
//!
//! ## Design Principles
//!
//! - **Single writer**: the host serializes all access to a room, so the
//!   store needs no internal locking.
//! - **One clock tick per transaction**: however many records a transaction
//!   touches, the document clock advances at most once.
//! - **Bounded history**: tombstones are pruned past a soft cap; clients
//!   that fall behind the pruned horizon are told to wipe and resync.
//! - **No spurious notifications**: listeners fire exactly when a committed
//!   transaction advanced the clock.
//!
//! ## Core Concepts
//!
//! ### Documents and tombstones
//!
//! Records are opaque JSON blobs carrying a stable string `id`. A live
//! record is a row in `documents`; a deleted one leaves a tombstone tagged
//! with the clock of its deletion. The two keyspaces are disjoint.
//!
//! ### The document clock
//!
//! Every committed mutating transaction advances the room's `documentClock`
//! by exactly one, and every write is stamped with it. The clock is the
//! cursor currency of the change feed: a client holding clock `c` catches
//! up with [`StoreTransaction::get_changes_since`].
//!
//! ### The change feed
//!
//! A catch-up batch is a sequence of [`Change`] entries: `Put` for records
//! changed past the cursor, `Delete` for tombstones past it, and `WipeAll`
//! first when the cursor has fallen behind the pruned tombstone horizon.
//!
//! ## Quick Start
//!
//! ```rust
//! use berth_store::RoomStore;
//! use rusqlite::Connection;
//! use serde_json::json;
//!
//! let conn = Connection::open_in_memory().unwrap();
//! let mut store = RoomStore::new(conn, None).unwrap();
//!
//! // Mutate atomically; the clock ticks once.
//! let outcome = store
//!     .transaction("edit", |txn| {
//!         txn.set_document("shape:1", json!({"id": "shape:1", "x": 10}))?;
//!         txn.set_document("shape:2", json!({"id": "shape:2", "x": 20}))?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert!(outcome.did_change);
//! assert_eq!(outcome.new_clock, 1);
//!
//! // Catch a client up from clock 0.
//! let changes = store
//!     .transaction("sync", |txn| txn.get_changes_since(0))
//!     .unwrap()
//!     .result;
//! assert_eq!(changes.len(), 2);
//! ```
//!
//! ## Cold start
//!
//! A room whose database has never been initialized can be seeded from a
//! legacy snapshot fetched asynchronously from cold storage; see
//! [`open_room`] and [`SnapshotLoader`].

pub mod changes;
pub mod error;
pub mod listener;
pub mod loader;
pub mod prune;
pub mod snapshot;
pub mod store;
pub mod txn;

mod clock;
mod schema;

// Re-export main types at crate root
pub use changes::Change;
pub use error::{Error, Result};
pub use listener::{ChangeEvent, Subscription};
pub use loader::{open_room, LoadOutcome, SnapshotLoader};
pub use prune::{PruneConfig, MAX_TOMBSTONES, PRUNE_BUFFER};
pub use snapshot::{RoomSnapshot, SnapshotDocument, SCHEMA_METADATA_KEY};
pub use store::{RoomStore, TransactionOutcome};
pub use txn::{Document, StoreTransaction, Tombstone};

/// Type aliases for clarity
pub type RecordId = String;
pub type SourceTag = String;
pub type Clock = u64;
