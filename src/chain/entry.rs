// Revision entries and their ids.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Store-unique revision identifier.
///
/// Ids are handed out by a per-store counter and survive serialization,
/// where they are written as decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RevisionId(pub u64);

impl RevisionId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RevisionId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(RevisionId)
    }
}

impl Serialize for RevisionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RevisionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// One stored revision: raw content for the root, a delta otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEntry {
    pub(crate) id: RevisionId,
    pub(crate) data: Bytes,
    pub(crate) parent: Option<RevisionId>,
}

impl RevisionEntry {
    pub(crate) fn root(id: RevisionId, data: Bytes) -> Self {
        Self {
            id,
            data,
            parent: None,
        }
    }

    pub(crate) fn delta(id: RevisionId, delta: Bytes, parent: RevisionId) -> Self {
        Self {
            id,
            data: delta,
            parent: Some(parent),
        }
    }

    pub fn id(&self) -> RevisionId {
        self.id
    }

    /// Stored bytes: the content itself for a root, a delta otherwise.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Id of the delta base, `None` for a root.
    pub fn parent(&self) -> Option<RevisionId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_serializes_as_string() {
        let json = serde_json::to_string(&RevisionId(42)).unwrap();
        assert_eq!(json, "\"42\"");
        let id: RevisionId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(id, RevisionId(7));
    }

    #[test]
    fn id_rejects_non_numeric() {
        assert!(serde_json::from_str::<RevisionId>("\"abc\"").is_err());
        assert!(serde_json::from_str::<RevisionId>("12").is_err());
        assert!("-1".parse::<RevisionId>().is_err());
    }

    #[test]
    fn root_and_delta_entries() {
        let root = RevisionEntry::root(RevisionId(0), Bytes::from_static(b"hello"));
        assert!(root.is_root());
        assert_eq!(root.data().as_ref(), b"hello");

        let child = RevisionEntry::delta(RevisionId(1), Bytes::from_static(b"d"), root.id());
        assert!(!child.is_root());
        assert_eq!(child.parent(), Some(RevisionId(0)));
    }
}
