//! Snapshot types for seeding and exporting room state.
//!
//! A snapshot is the self-contained serialized form of a room, used to
//! bootstrap a store from cold storage and to migrate rooms between hosts.

use crate::{error::Result, Clock, Error, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved metadata key carrying the serialized record schema descriptor.
pub const SCHEMA_METADATA_KEY: &str = "schema";

/// A single document row inside a snapshot.
///
/// `state` is the self-describing record blob and must carry a string `id`
/// field; the id becomes the primary key on ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    /// The record state blob.
    pub state: serde_json::Value,
    /// Clock at which this record last changed.
    pub last_changed_clock: Clock,
}

impl SnapshotDocument {
    /// Extract the record id embedded in the state blob.
    pub fn record_id(&self) -> Result<&str> {
        self.state
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                Error::InvalidSnapshot("document state is missing a string `id` field".into())
            })
    }
}

/// A point-in-time serialized room.
///
/// Older snapshots carried the document clock under the name `clock`; new
/// snapshots always write `documentClock`. Uses `BTreeMap` for tombstones so
/// serialization order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSnapshot {
    /// The room's monotonic document clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_clock: Option<Clock>,
    /// Legacy name for the document clock. Read as a fallback, never written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<Clock>,
    /// Watermark below which tombstones have been pruned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstone_history_starts_at_clock: Option<Clock>,
    /// Live records.
    pub documents: Vec<SnapshotDocument>,
    /// Deleted record ids, each tagged with its deletion clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstones: Option<BTreeMap<RecordId, Clock>>,
    /// Serialized record schema descriptor, opaque to this layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

impl RoomSnapshot {
    /// The document clock this snapshot resolves to: `documentClock`, then
    /// the legacy `clock` name, then zero.
    pub fn resolved_document_clock(&self) -> Clock {
        self.document_clock.or(self.clock).unwrap_or(0)
    }

    /// The tombstone history watermark this snapshot resolves to, defaulting
    /// to the resolved document clock.
    pub fn resolved_tombstone_history_start(&self) -> Clock {
        self.tombstone_history_starts_at_clock
            .unwrap_or_else(|| self.resolved_document_clock())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_document_clock_with_legacy_fallback() {
        let snapshot = RoomSnapshot {
            document_clock: Some(7),
            clock: Some(3),
            ..Default::default()
        };
        assert_eq!(snapshot.resolved_document_clock(), 7);

        let legacy = RoomSnapshot {
            clock: Some(3),
            ..Default::default()
        };
        assert_eq!(legacy.resolved_document_clock(), 3);

        let empty = RoomSnapshot::default();
        assert_eq!(empty.resolved_document_clock(), 0);
    }

    #[test]
    fn watermark_defaults_to_document_clock() {
        let snapshot = RoomSnapshot {
            document_clock: Some(12),
            ..Default::default()
        };
        assert_eq!(snapshot.resolved_tombstone_history_start(), 12);

        let explicit = RoomSnapshot {
            document_clock: Some(12),
            tombstone_history_starts_at_clock: Some(4),
            ..Default::default()
        };
        assert_eq!(explicit.resolved_tombstone_history_start(), 4);
    }

    #[test]
    fn record_id_extraction() {
        let doc = SnapshotDocument {
            state: json!({"id": "r:1", "n": "a"}),
            last_changed_clock: 1,
        };
        assert_eq!(doc.record_id().unwrap(), "r:1");

        let missing = SnapshotDocument {
            state: json!({"n": "a"}),
            last_changed_clock: 1,
        };
        assert!(matches!(missing.record_id(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn json_roundtrip() {
        let mut tombstones = BTreeMap::new();
        tombstones.insert("r:2".to_string(), 4);

        let snapshot = RoomSnapshot {
            document_clock: Some(5),
            tombstone_history_starts_at_clock: Some(2),
            documents: vec![SnapshotDocument {
                state: json!({"id": "r:1", "n": "a"}),
                last_changed_clock: 5,
            }],
            tombstones: Some(tombstones),
            schema: Some(json!({"version": 1})),
            ..Default::default()
        };

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("documentClock"));
        assert!(json.contains("tombstoneHistoryStartsAtClock"));

        let restored = RoomSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn legacy_snapshot_parses() {
        let json = r#"{
            "clock": 9,
            "documents": [{"state": {"id": "r:1"}, "lastChangedClock": 9}]
        }"#;

        let snapshot = RoomSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.resolved_document_clock(), 9);
        assert_eq!(snapshot.resolved_tombstone_history_start(), 9);
        assert_eq!(snapshot.documents.len(), 1);
        assert!(snapshot.tombstones.is_none());
    }
}
