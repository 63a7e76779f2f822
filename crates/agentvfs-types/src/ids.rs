//! Typed identifiers for namespaces, sessions, and snapshots.
//!
//! `NamespaceId` and `SessionId` wrap UUIDv7 (time-ordered, globally unique)
//! and display as standard UUID text for logging. The `short()` form (first 8
//! hex chars) is for human-facing output, never a lookup key.
//!
//! `SnapshotId` is different: snapshots are numbered by their namespace with a
//! monotonically increasing counter, so the id doubles as a version number.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A namespace instance identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceId(uuid::Uuid);

/// A session identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for display only.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(NamespaceId, "NamespaceId");
impl_typed_id!(SessionId, "SessionId");

// ── SnapshotId ──────────────────────────────────────────────────────────────

/// A snapshot identifier: the snapshot's version number within its namespace.
///
/// Ids start at 1 and only ever increase; an id is never reused, even after
/// the snapshot it named has been discarded.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(u64);

impl SnapshotId {
    /// The first id a namespace hands out.
    pub const FIRST: SnapshotId = SnapshotId(1);

    /// Wrap a raw version number.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw version number.
    pub fn get(self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_8_chars() {
        let id = NamespaceId::new();
        assert_eq!(id.short().len(), 8);
    }

    #[test]
    fn test_display_is_uuid_text() {
        let id = SessionId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert!(text.replace('-', "").starts_with(&id.short()));
        assert_eq!(format!("{id:?}"), format!("SessionId({})", id.short()));
    }

    #[test]
    fn test_ordering_is_time_ordered() {
        let ids: Vec<SessionId> = (0..10).map(|_| SessionId::new()).collect();
        for i in 1..ids.len() {
            assert!(ids[i] >= ids[i - 1]);
        }
    }

    #[test]
    fn test_snapshot_id_sequence() {
        let first = SnapshotId::FIRST;
        assert_eq!(first.get(), 1);
        assert_eq!(first.next().get(), 2);
        assert!(first.next() > first);
        assert_eq!(first.to_string(), "@1");
    }

    #[test]
    fn test_serde_roundtrip_session_id() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_postcard_roundtrip_snapshot_id() {
        let id = SnapshotId::from_raw(42);
        let bytes = postcard::to_stdvec(&id).unwrap();
        let parsed: SnapshotId = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(id, parsed);
    }
}
