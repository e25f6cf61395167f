//! Cold-load path.
//!
//! The only suspension point in the public API: when a room's database has
//! never been initialized, its legacy snapshot is fetched asynchronously
//! from cold storage before the store is constructed. Once constructed,
//! every store operation is synchronous.

use crate::{error::Result, snapshot::RoomSnapshot, store::RoomStore};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Outcome of a cold-storage snapshot lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// The room exists in cold storage; seed the store from its snapshot.
    RoomFound {
        /// The legacy snapshot to ingest.
        snapshot: RoomSnapshot,
    },
    /// The room has never been persisted; start empty.
    NotFound,
}

/// Fetches legacy room snapshots from cold storage.
#[allow(async_fn_in_trait)]
pub trait SnapshotLoader {
    /// Look up the snapshot for the room identified by `slug`.
    async fn load_snapshot(&self, slug: &str) -> Result<LoadOutcome>;
}

/// Open the store for a room, consulting `loader` only on cold start.
///
/// A database that already carries the core tables is reopened in place and
/// the loader is never called.
pub async fn open_room<L: SnapshotLoader>(
    conn: Connection,
    slug: &str,
    loader: &L,
) -> Result<RoomStore> {
    if RoomStore::has_been_initialized(&conn) {
        return RoomStore::new(conn, None);
    }

    match loader.load_snapshot(slug).await? {
        LoadOutcome::RoomFound { snapshot } => RoomStore::new(conn, Some(snapshot)),
        LoadOutcome::NotFound => RoomStore::new(conn, None),
    }
}
