// JSON snapshots of a revision store.
//
// Shape:
//   {
//     "uuidCounter": 6,
//     "encoding": "base64",            // optional, "utf8" when absent
//     "revisions": [
//       { "id": "0", "data": "..." },
//       { "id": "1", "data": "...", "parentId": "0" }
//     ]
//   }
//
// Array order is revision order. `utf8` renders `data` as text and replaces
// invalid sequences, so binary deltas do not survive it; `base64` is exact.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::chain::{RevisionEntry, RevisionId, Revisions, StoreOptions};
use crate::codec::Codec;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("revision {id}: data is not valid base64: {source}")]
    Base64 {
        id: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("invalid revision id {0:?}")]
    InvalidId(String),
    #[error("duplicate revision id {0}")]
    DuplicateId(RevisionId),
    #[error("revision {id} refers to parent {parent}, which does not precede it")]
    ForwardParent { id: RevisionId, parent: RevisionId },
}

/// How `data` is rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8 text, lossy for bytes that are not valid UTF-8.
    Utf8,
    /// Standard base64, exact for any bytes.
    #[default]
    Base64,
}

impl TextEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Base64 => "base64",
        }
    }

    fn render(self, data: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(data).into_owned(),
            TextEncoding::Base64 => BASE64.encode(data),
        }
    }

    fn parse(self, id: &str, text: String) -> Result<Bytes, SnapshotError> {
        match self {
            TextEncoding::Utf8 => Ok(Bytes::from(text.into_bytes())),
            TextEncoding::Base64 => BASE64
                .decode(text.as_bytes())
                .map(Bytes::from)
                .map_err(|source| SnapshotError::Base64 {
                    id: id.to_owned(),
                    source,
                }),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "base64" => Ok(TextEncoding::Base64),
            other => Err(format!("unknown encoding {other:?} (expected utf8 or base64)")),
        }
    }
}

/// Serialized store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub uuid_counter: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<TextEncoding>,
    pub revisions: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub id: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn parse_id(text: &str) -> Result<RevisionId, SnapshotError> {
    text.parse()
        .map_err(|_| SnapshotError::InvalidId(text.to_owned()))
}

// ---------------------------------------------------------------------------
// Store conversion
// ---------------------------------------------------------------------------

impl<C> Revisions<C> {
    /// Capture the entries and id counter.
    pub fn to_snapshot(&self) -> Snapshot {
        let encoding = self.snapshot_encoding();
        Snapshot {
            uuid_counter: self.next_id().get(),
            encoding: Some(encoding),
            revisions: self
                .entries()
                .iter()
                .map(|entry| SnapshotEntry {
                    id: entry.id().to_string(),
                    data: encoding.render(entry.data()),
                    parent_id: entry.parent().map(|parent| parent.to_string()),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        self.to_snapshot().to_json()
    }
}

impl<C: Codec + 'static> Revisions<C> {
    /// Rebuild a store from a snapshot.
    ///
    /// Ids must be numeric and unique. Parents are not resolved here; a
    /// dangling `parentId` surfaces as a broken chain on reconstruction.
    pub fn from_snapshot(
        snapshot: Snapshot,
        codec: C,
        options: StoreOptions,
    ) -> Result<Self, SnapshotError> {
        Self::from_snapshot_shared(snapshot, Arc::new(codec), options)
    }

    /// [`from_snapshot`](Self::from_snapshot) around a shared codec.
    pub fn from_snapshot_shared(
        snapshot: Snapshot,
        codec: Arc<C>,
        options: StoreOptions,
    ) -> Result<Self, SnapshotError> {
        let encoding = snapshot.encoding.unwrap_or(TextEncoding::Utf8);
        let mut positions = std::collections::HashMap::with_capacity(snapshot.revisions.len());
        let mut entries = Vec::with_capacity(snapshot.revisions.len());
        let mut next_id = snapshot.uuid_counter;

        for revision in snapshot.revisions {
            let id = parse_id(&revision.id)?;
            if positions.insert(id, entries.len()).is_some() {
                return Err(SnapshotError::DuplicateId(id));
            }
            next_id = next_id.max(id.get().saturating_add(1));

            let data = encoding.parse(&revision.id, revision.data)?;
            let entry = match revision.parent_id.as_deref().map(parse_id).transpose()? {
                Some(parent) => RevisionEntry::delta(id, data, parent),
                None => RevisionEntry::root(id, data),
            };
            entries.push(entry);
        }

        // Parents must come earlier in the array, which rules out cycles.
        // Parents missing altogether surface as broken chains on read.
        for (index, entry) in entries.iter().enumerate() {
            if let Some(parent) = entry.parent() {
                if positions.get(&parent).is_some_and(|&at| at >= index) {
                    return Err(SnapshotError::ForwardParent {
                        id: entry.id(),
                        parent,
                    });
                }
            }
        }

        debug!(
            "loaded {} revisions ({encoding}), next id {next_id}",
            entries.len()
        );
        Ok(Self::from_parts(entries, next_id, codec, options))
    }

    pub fn from_json(json: &str, codec: C, options: StoreOptions) -> Result<Self, SnapshotError> {
        Self::from_snapshot(Snapshot::from_json(json)?, codec, options)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
