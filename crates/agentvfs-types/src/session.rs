//! Session metadata and access scopes.
//!
//! A `Session` records that a caller began interacting with a namespace and
//! what it is allowed to touch. Like the other birth certificates in this
//! crate it is immutable after creation, which is what lets authorization
//! run as a lock-free predicate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::ids::SessionId;
use crate::path::VirtualPath;

/// The kinds of operation a session can be granted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    /// Read content or metadata.
    Read,
    /// Create, replace, delete; skill lifecycle management; snapshots.
    Write,
    /// Enumerate children of a directory.
    List,
    /// Invoke a skill.
    Execute,
}

/// What a session may see and do.
///
/// A path is in scope when it lies under at least one of `prefixes`
/// (segment-wise). An empty prefix list grants nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    pub prefixes: Vec<VirtualPath>,
    pub operations: BTreeSet<OperationKind>,
}

impl AccessScope {
    /// Create a scope from prefixes and operations.
    pub fn new(
        prefixes: impl IntoIterator<Item = VirtualPath>,
        operations: impl IntoIterator<Item = OperationKind>,
    ) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
            operations: operations.into_iter().collect(),
        }
    }

    /// Everything, everywhere.
    pub fn full() -> Self {
        Self::new([VirtualPath::root()], OperationKind::iter())
    }

    /// Read and list under the given prefixes.
    pub fn read_only(prefixes: impl IntoIterator<Item = VirtualPath>) -> Self {
        Self::new(prefixes, [OperationKind::Read, OperationKind::List])
    }

    /// Add an operation kind.
    pub fn with_operation(mut self, op: OperationKind) -> Self {
        self.operations.insert(op);
        self
    }

    /// Whether `op` is granted at all.
    pub fn allows_operation(&self, op: OperationKind) -> bool {
        self.operations.contains(&op)
    }

    /// Whether `path` lies inside one of the scope prefixes.
    pub fn contains(&self, path: &VirtualPath) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Whether `path` is a strict ancestor of one of the scope prefixes.
    ///
    /// Ancestors are navigable so a scoped session can walk down to its
    /// subtree, but nothing beside that subtree is revealed.
    pub fn is_ancestor_of_scope(&self, path: &VirtualPath) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| prefix.len() > path.len() && prefix.starts_with(path))
    }

    /// Whether a path may appear in this session's listings.
    pub fn can_see(&self, path: &VirtualPath) -> bool {
        self.contains(path) || self.is_ancestor_of_scope(path)
    }

    /// The authorization predicate.
    pub fn permits(&self, path: &VirtualPath, op: OperationKind) -> bool {
        if !self.allows_operation(op) {
            return false;
        }
        match op {
            OperationKind::List => self.can_see(path),
            OperationKind::Read | OperationKind::Write | OperationKind::Execute => {
                self.contains(path)
            }
        }
    }
}

/// Birth certificate for a caller's session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Globally unique session identifier (UUIDv7, time-ordered).
    pub id: SessionId,
    /// Who opened the session (free-form label used in logs).
    pub principal: String,
    /// What the session may touch.
    pub scope: AccessScope,
    /// When this session was created (Unix millis).
    pub created_at: u64,
}

impl Session {
    /// Create a new session record.
    pub fn new(principal: impl Into<String>, scope: AccessScope) -> Self {
        Self {
            id: SessionId::new(),
            principal: principal.into(),
            scope,
            created_at: crate::now_millis(),
        }
    }

    /// Shorthand for `self.scope.permits(..)`.
    pub fn permits(&self, path: &VirtualPath, op: OperationKind) -> bool {
        self.scope.permits(path, op)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    #[test]
    fn test_full_scope_permits_everything() {
        let scope = AccessScope::full();
        for op in OperationKind::iter() {
            assert!(scope.permits(&p("memory/a"), op));
            assert!(scope.permits(&VirtualPath::root(), op));
        }
    }

    #[test]
    fn test_prefix_containment() {
        let scope = AccessScope::new([p("memory/notes")], OperationKind::iter());
        assert!(scope.permits(&p("memory/notes"), OperationKind::Read));
        assert!(scope.permits(&p("memory/notes/a"), OperationKind::Write));
        assert!(!scope.permits(&p("memory/notesy"), OperationKind::Read));
        assert!(!scope.permits(&p("memory/other"), OperationKind::Read));
        assert!(!scope.permits(&p("skills/echo"), OperationKind::Execute));
    }

    #[test]
    fn test_ancestors_are_listable_not_readable() {
        let scope = AccessScope::read_only([p("memory/notes")]);
        assert!(scope.permits(&VirtualPath::root(), OperationKind::List));
        assert!(scope.permits(&p("memory"), OperationKind::List));
        assert!(!scope.permits(&p("memory"), OperationKind::Read));
        assert!(!scope.permits(&p("skills"), OperationKind::List));
    }

    #[test]
    fn test_operation_kinds_gate() {
        let scope = AccessScope::read_only([VirtualPath::root()]);
        assert!(scope.permits(&p("memory/a"), OperationKind::Read));
        assert!(!scope.permits(&p("memory/a"), OperationKind::Write));
        assert!(!scope.permits(&p("skills/echo"), OperationKind::Execute));

        let scope = scope.with_operation(OperationKind::Execute);
        assert!(scope.permits(&p("skills/echo"), OperationKind::Execute));
    }

    #[test]
    fn test_empty_scope_grants_nothing() {
        let scope = AccessScope::new(Vec::new(), OperationKind::iter());
        assert!(!scope.permits(&VirtualPath::root(), OperationKind::List));
        assert!(!scope.can_see(&p("memory")));
    }

    #[test]
    fn test_operation_kind_strings() {
        assert_eq!(OperationKind::Execute.to_string(), "execute");
        assert_eq!("list".parse::<OperationKind>().unwrap(), OperationKind::List);
    }

    #[test]
    fn test_json_roundtrip() {
        let s = Session::new("agent", AccessScope::read_only([p("memory")]));
        let json = serde_json::to_string(&s).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(s, parsed);
    }

    #[test]
    fn test_postcard_roundtrip() {
        let s = Session::new("agent", AccessScope::full());
        let bytes = postcard::to_stdvec(&s).unwrap();
        let parsed: Session = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(s, parsed);
    }

    #[test]
    fn test_unique_ids() {
        let a = Session::new("agent", AccessScope::full());
        let b = Session::new("agent", AccessScope::full());
        assert_ne!(a.id, b.id);
    }
}
