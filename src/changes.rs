//! Incremental change feed entries.
//!
//! A catch-up batch is a sequence of tagged entries. On the wire each entry
//! is an array whose first element is the tag: `["wipe_all"]`,
//! `["put", state]` or `["delete", id]`. A `WipeAll` appears at most once
//! per batch and, if present, is the first entry.

use crate::RecordId;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const WIPE_ALL_TAG: &str = "wipe_all";
const PUT_TAG: &str = "put";
const DELETE_TAG: &str = "delete";

/// A single entry of the incremental change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// The consumer must discard all local state before applying the rest
    /// of the batch.
    WipeAll,
    /// The consumer stores `state` under the id carried inside it.
    Put(serde_json::Value),
    /// The consumer removes the record with this id.
    Delete(RecordId),
}

impl Change {
    /// Whether this entry is the full-resend marker.
    pub fn is_wipe_all(&self) -> bool {
        matches!(self, Change::WipeAll)
    }
}

impl Serialize for Change {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Change::WipeAll => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(WIPE_ALL_TAG)?;
                seq.end()
            }
            Change::Put(state) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(PUT_TAG)?;
                seq.serialize_element(state)?;
                seq.end()
            }
            Change::Delete(id) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(DELETE_TAG)?;
                seq.serialize_element(id)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Change {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ChangeVisitor;

        impl<'de> Visitor<'de> for ChangeVisitor {
            type Value = Change;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tagged change entry array")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Change, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let tag: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;

                match tag.as_str() {
                    WIPE_ALL_TAG => Ok(Change::WipeAll),
                    PUT_TAG => {
                        let state = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        Ok(Change::Put(state))
                    }
                    DELETE_TAG => {
                        let id = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        Ok(Change::Delete(id))
                    }
                    other => Err(de::Error::unknown_variant(
                        other,
                        &[WIPE_ALL_TAG, PUT_TAG, DELETE_TAG],
                    )),
                }
            }
        }

        deserializer.deserialize_seq(ChangeVisitor)
    }
}
