//! Session table and authorization.
//!
//! Sessions are immutable once opened and shared as `Arc<Session>`, so every
//! check is a pure predicate with no lock beyond the table lookup.
//! Denials never say why.

use std::sync::Arc;

use dashmap::DashMap;

use agentvfs_types::{AccessScope, OperationKind, Session, SessionId, VirtualPath};

use crate::vfs::{DirEntry, VfsError, VfsResult};

/// Open sessions of one namespace.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session with the given scope.
    pub fn open(&self, principal: impl Into<String>, scope: AccessScope) -> Arc<Session> {
        let session = Arc::new(Session::new(principal, scope));
        self.sessions.insert(session.id, session.clone());
        tracing::info!(
            session = %session.id,
            principal = %session.principal,
            prefixes = session.scope.prefixes.len(),
            "session opened"
        );
        session
    }

    /// Close a session. Later lookups of its id fail.
    pub fn close(&self, id: SessionId) -> VfsResult<Arc<Session>> {
        let (_, session) = self
            .sessions
            .remove(&id)
            .ok_or_else(|| VfsError::not_found(format!("session {id}")))?;
        tracing::info!(session = %id, principal = %session.principal, "session closed");
        Ok(session)
    }

    pub fn get(&self, id: SessionId) -> VfsResult<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| VfsError::not_found(format!("session {id}")))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Allow `op` on `path` or fail with a bare `PermissionDenied`.
pub fn authorize(session: &Session, path: &VirtualPath, op: OperationKind) -> VfsResult<()> {
    if session.permits(path, op) {
        Ok(())
    } else {
        tracing::debug!(session = %session.id, %op, "access denied");
        Err(VfsError::PermissionDenied)
    }
}

/// Keep only the children of `parent` the session may see.
///
/// Entries outside the scope survive only as directories leading to it; a
/// file sitting on an ancestor path is hidden.
pub fn filter_entries(session: &Session, parent: &VirtualPath, entries: Vec<DirEntry>) -> Vec<DirEntry> {
    entries
        .into_iter()
        .filter(|entry| {
            parent.join(&entry.name).is_ok_and(|child| {
                session.scope.contains(&child)
                    || (entry.kind.is_dir() && session.scope.is_ancestor_of_scope(&child))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn p(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    #[test]
    fn test_open_get_close() {
        let table = SessionTable::new();
        let session = table.open("agent", AccessScope::full());
        assert_eq!(table.get(session.id).unwrap().principal, "agent");
        assert_eq!(table.len(), 1);

        table.close(session.id).unwrap();
        assert!(matches!(table.get(session.id), Err(VfsError::NotFound(_))));
        assert!(matches!(table.close(session.id), Err(VfsError::NotFound(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn test_authorize() {
        let session = Session::new(
            "notes",
            AccessScope::new([p("memory/notes")], OperationKind::iter()),
        );
        assert!(authorize(&session, &p("memory/notes/a"), OperationKind::Write).is_ok());
        assert!(authorize(&session, &p("memory"), OperationKind::List).is_ok());

        let err = authorize(&session, &p("memory/other"), OperationKind::Read).unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied));
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn test_filter_entries() {
        let session = Session::new("a", AccessScope::read_only([p("memory/a")]));
        let entries = vec![
            DirEntry::directory("a"),
            DirEntry::directory("b"),
            DirEntry::file("c"),
        ];
        let visible = filter_entries(&session, &p("memory"), entries);
        assert_eq!(visible, vec![DirEntry::directory("a")]);

        let root = filter_entries(
            &session,
            &VirtualPath::root(),
            vec![DirEntry::directory("memory"), DirEntry::directory("skills")],
        );
        assert_eq!(root, vec![DirEntry::directory("memory")]);
    }

    #[test]
    fn test_filter_hides_files_on_ancestor_paths() {
        let session = Session::new("sub", AccessScope::read_only([p("memory/secret/sub")]));
        let visible = filter_entries(&session, &p("memory"), vec![DirEntry::file("secret")]);
        assert!(visible.is_empty());

        let visible = filter_entries(&session, &p("memory"), vec![DirEntry::directory("secret")]);
        assert_eq!(visible, vec![DirEntry::directory("secret")]);

        // Inside the scope, files show normally.
        let visible = filter_entries(
            &session,
            &p("memory/secret/sub"),
            vec![DirEntry::file("note"), DirEntry::directory("deeper")],
        );
        assert_eq!(visible.len(), 2);
    }
}
