//! The Namespace: the context object every operation goes through.
//!
//! A namespace owns:
//! - A router with the memory and skills backends mounted
//! - The memory store and its search index
//! - The skill registry
//! - Snapshots and the consistency gate
//! - The session table
//!
//! Every public operation is session-scoped: the caller names a session,
//! the session's scope is checked, and only then is the owning subsystem
//! touched. Several namespaces can coexist; they share nothing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use agentvfs_types::{
    AccessScope, NamespaceId, OperationKind, Session, SessionId, SnapshotId, VirtualPath,
};

use crate::access::{SessionTable, authorize, filter_entries};
use crate::config::NamespaceConfig;
use crate::index::{HashedBagOfWords, Scorer, SearchHit, SearchIndex};
use crate::memory::{MemoryEntry, MemoryStats, MemoryStore};
use crate::skills::{CallContext, Skill, SkillConfig, SkillInfo, SkillKind, SkillRegistry};
use crate::snapshot::{ConsistencyGate, RollbackReport, SnapshotInfo, SnapshotManager};
use crate::vfs::{
    FileAttr, Listing, MEMORY_SEGMENT, MemoryBackend, NamespaceRouter, Resolved, SKILLS_SEGMENT,
    SegmentOwner, SkillMountBackend, VfsError, VfsOps, VfsResult, resolve, resolve_str,
};

/// Point-in-time counters across subsystems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub memory: MemoryStats,
    pub indexed: usize,
    pub skills: usize,
    pub snapshots: usize,
    pub sessions: usize,
}

/// A virtual filesystem namespace.
pub struct Namespace {
    id: NamespaceId,
    config: NamespaceConfig,
    router: Arc<NamespaceRouter>,
    memory: Arc<MemoryStore>,
    index: Arc<SearchIndex>,
    skills: Arc<SkillRegistry>,
    snapshots: SnapshotManager,
    gate: Arc<ConsistencyGate>,
    sessions: SessionTable,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.id)
            .field("router", &self.router)
            .field("memory", &self.memory)
            .field("skills", &self.skills)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    /// Create a namespace with default configuration.
    pub fn new() -> Self {
        Self::with_config(NamespaceConfig::default())
    }

    /// Create a namespace using the default scorer sized by `config`.
    pub fn with_config(config: NamespaceConfig) -> Self {
        let scorer = Arc::new(HashedBagOfWords::new(config.index.dimensions));
        Self::with_scorer(config, scorer)
    }

    /// Create a namespace with a custom similarity scorer.
    pub fn with_scorer(config: NamespaceConfig, scorer: Arc<dyn Scorer>) -> Self {
        let index = Arc::new(SearchIndex::new(scorer, config.index.min_score));
        let memory = Arc::new(MemoryStore::new(index.clone()));
        let skills = Arc::new(SkillRegistry::new());
        let gate = Arc::new(ConsistencyGate::new());
        let snapshots = SnapshotManager::new(memory.clone(), skills.clone(), gate.clone());

        let router = Arc::new(NamespaceRouter::new());
        router.mount(MEMORY_SEGMENT, MemoryBackend::new(memory.clone()));
        router.mount(SKILLS_SEGMENT, SkillMountBackend::new(skills.clone()));

        let id = NamespaceId::new();
        tracing::info!(namespace = %id, presets = config.sessions.len(), "namespace created");

        Self {
            id,
            config,
            router,
            memory,
            index,
            skills,
            snapshots,
            gate,
            sessions: SessionTable::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> NamespaceId {
        self.id
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// The router, unchecked. Callers bypass sessions and the gate.
    pub fn router(&self) -> &Arc<NamespaceRouter> {
        &self.router
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    pub fn skills(&self) -> &Arc<SkillRegistry> {
        &self.skills
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Classify a path without touching any state.
    pub fn resolve(&self, path: &str) -> VfsResult<Resolved> {
        resolve_str(path)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub fn open_session(&self, principal: impl Into<String>, scope: AccessScope) -> Arc<Session> {
        self.sessions.open(principal, scope)
    }

    /// Open a session using a configured preset.
    pub fn open_preset(&self, principal: &str) -> VfsResult<Arc<Session>> {
        let preset = self
            .config
            .preset(principal)
            .ok_or_else(|| VfsError::not_found(format!("session preset `{principal}`")))?;
        Ok(self.sessions.open(principal, preset.scope()))
    }

    pub fn close_session(&self, id: SessionId) -> VfsResult<()> {
        self.sessions.close(id).map(|_| ())
    }

    pub fn session(&self, id: SessionId) -> VfsResult<Arc<Session>> {
        self.sessions.get(id)
    }

    /// Look up a session and check `op` on `path`. Unknown sessions are
    /// denied like any other caller.
    fn check(&self, session: SessionId, path: &VirtualPath, op: OperationKind) -> VfsResult<Arc<Session>> {
        let session = self
            .sessions
            .get(session)
            .map_err(|_| VfsError::PermissionDenied)?;
        authorize(&session, path, op)?;
        Ok(session)
    }

    fn memory_key(path: &VirtualPath) -> VfsResult<()> {
        match resolve(path) {
            Resolved {
                owner: SegmentOwner::Memory,
                remainder,
            } if !remainder.is_root() => Ok(()),
            _ => Err(VfsError::invalid_path(format!("{path} is not a memory key"))),
        }
    }

    // ========================================================================
    // Filesystem view
    // ========================================================================

    /// Attributes of any path the session can see.
    pub async fn getattr(&self, session: SessionId, path: &str) -> VfsResult<FileAttr> {
        let path = VirtualPath::parse(path)?;
        let caller = self
            .sessions
            .get(session)
            .map_err(|_| VfsError::PermissionDenied)?;
        let readable = caller.permits(&path, OperationKind::Read);
        if !readable {
            authorize(&caller, &path, OperationKind::List)?;
        }
        let attr = {
            let _read = self.gate.read().await;
            self.router.getattr(&path).await?
        };
        // Ancestors of the scope are navigable as directories only; a file
        // there is hidden exactly as listings hide it.
        if attr.is_file() && !readable {
            return Err(VfsError::not_found(path.to_string()));
        }
        Ok(attr)
    }

    /// Immediate children of a directory, filtered to what the session may see.
    pub async fn list(&self, session: SessionId, path: &str) -> VfsResult<Listing> {
        let path = VirtualPath::parse(path)?;
        let caller = self.check(session, &path, OperationKind::List)?;
        let entries = {
            let _read = self.gate.read().await;
            self.router.readdir(&path).await?
        };
        let visible = filter_entries(&caller, &path, entries);
        tracing::debug!(session = %session, path = %path, entries = visible.len(), "listed");
        Ok(Listing::new(visible))
    }

    /// Whole content of a memory entry or mounted skill manifest.
    pub async fn read(&self, session: SessionId, path: &str) -> VfsResult<Vec<u8>> {
        let path = VirtualPath::parse(path)?;
        self.check(session, &path, OperationKind::Read)?;
        let _read = self.gate.read().await;
        self.router.read_all(&path).await
    }

    /// Up to `size` bytes from `offset`.
    pub async fn read_at(
        &self,
        session: SessionId,
        path: &str,
        offset: u64,
        size: u32,
    ) -> VfsResult<Vec<u8>> {
        let path = VirtualPath::parse(path)?;
        self.check(session, &path, OperationKind::Read)?;
        let _read = self.gate.read().await;
        self.router.read(&path, offset, size).await
    }

    /// A memory entry with its version and timestamps.
    pub async fn memory_entry(&self, session: SessionId, key: &str) -> VfsResult<MemoryEntry> {
        let key = VirtualPath::parse(key)?;
        Self::memory_key(&key)?;
        self.check(session, &key, OperationKind::Read)?;
        let _read = self.gate.read().await;
        self.memory.read(&key)
    }

    /// Create or replace a memory entry. Returns the new version.
    pub async fn write(&self, session: SessionId, key: &str, content: &[u8]) -> VfsResult<u64> {
        let key = VirtualPath::parse(key)?;
        Self::memory_key(&key)?;
        self.check(session, &key, OperationKind::Write)?;
        let _write = self.gate.write().await;
        self.router.write(&key, content).await
    }

    pub async fn delete(&self, session: SessionId, key: &str) -> VfsResult<()> {
        let key = VirtualPath::parse(key)?;
        Self::memory_key(&key)?;
        self.check(session, &key, OperationKind::Write)?;
        let _write = self.gate.write().await;
        self.router.unlink(&key).await
    }

    /// Every live memory key under `prefix` the session may read.
    pub async fn list_keys(&self, session: SessionId, prefix: &str) -> VfsResult<Vec<VirtualPath>> {
        let prefix = VirtualPath::parse(prefix)?;
        let caller = self.check(session, &prefix, OperationKind::List)?;
        let keys = {
            let _read = self.gate.read().await;
            self.memory.list(&prefix)
        };
        Ok(keys
            .into_iter()
            .filter(|key| caller.permits(key, OperationKind::Read))
            .collect())
    }

    /// Similarity search over memory keys the session may read.
    pub async fn search(&self, session: SessionId, query: &str, top_k: usize) -> VfsResult<Vec<SearchHit>> {
        let caller = self
            .sessions
            .get(session)
            .map_err(|_| VfsError::PermissionDenied)?;
        let _read = self.gate.read().await;
        self.index.query_filtered(query, top_k, |key| {
            caller.permits(key, OperationKind::Read)
        })
    }

    // ========================================================================
    // Skills
    // ========================================================================

    pub async fn register_skill(
        &self,
        session: SessionId,
        implementation: Arc<dyn Skill>,
        mount_path: Option<&str>,
        kind: SkillKind,
    ) -> VfsResult<SkillInfo> {
        let mount_path = match mount_path {
            Some(raw) => VirtualPath::parse(raw)?,
            None => self.skills.default_mount_path(implementation.name())?,
        };
        self.check(session, &mount_path, OperationKind::Write)?;
        let _write = self.gate.write().await;
        self.skills.register(implementation, Some(mount_path), kind)
    }

    /// Authorize a name-addressed skill operation against its mount path.
    fn check_skill(&self, session: SessionId, name: &str, op: OperationKind) -> VfsResult<()> {
        let mount_path = self.skills.mount_path_of(name)?;
        self.check(session, &mount_path, op).map(|_| ())
    }

    pub async fn initialize_skill(
        &self,
        session: SessionId,
        name: &str,
        config: &SkillConfig,
    ) -> VfsResult<SkillInfo> {
        self.check_skill(session, name, OperationKind::Write)?;
        let _write = self.gate.write().await;
        self.skills.initialize(name, config).await
    }

    pub async fn mount_skill(&self, session: SessionId, name: &str) -> VfsResult<SkillInfo> {
        self.check_skill(session, name, OperationKind::Write)?;
        let _write = self.gate.write().await;
        self.skills.mount(name).await
    }

    pub async fn unmount_skill(&self, session: SessionId, name: &str) -> VfsResult<SkillInfo> {
        self.check_skill(session, name, OperationKind::Write)?;
        let _write = self.gate.write().await;
        self.skills.unmount(name).await
    }

    pub async fn unregister_skill(&self, session: SessionId, name: &str) -> VfsResult<SkillInfo> {
        self.check_skill(session, name, OperationKind::Write)?;
        let _write = self.gate.write().await;
        self.skills.unregister(name).await
    }

    /// Run a skill. The registry is consulted under the gate; the skill
    /// itself runs with no namespace lock held.
    pub async fn execute(
        &self,
        session: SessionId,
        name: &str,
        input: &[u8],
        mut ctx: CallContext,
    ) -> VfsResult<Vec<u8>> {
        self.check_skill(session, name, OperationKind::Execute)?;
        let invocation = {
            let _read = self.gate.read().await;
            self.skills.invocation(name)?
        };
        ctx.session = Some(session);
        if ctx.deadline.is_none() {
            ctx.deadline = self.config.skills.default_timeout();
        }
        invocation.run(input, ctx).await
    }

    /// Skills whose mount path lies in the session's scope, sorted by name.
    pub async fn list_skills(&self, session: SessionId, kind: Option<SkillKind>) -> VfsResult<Vec<SkillInfo>> {
        let caller = self.check(session, self.skills.root(), OperationKind::List)?;
        let _read = self.gate.read().await;
        Ok(self
            .skills
            .list(kind)
            .into_iter()
            .filter(|info| caller.scope.contains(&info.mount_path))
            .collect())
    }

    pub async fn get_skill(&self, session: SessionId, name: &str) -> VfsResult<SkillInfo> {
        self.check_skill(session, name, OperationKind::Read)?;
        let _read = self.gate.read().await;
        self.skills.get(name)
    }

    // ========================================================================
    // Snapshots (administrative: need Write on the root)
    // ========================================================================

    pub async fn create_snapshot(&self, session: SessionId, label: Option<String>) -> VfsResult<SnapshotInfo> {
        self.check(session, &VirtualPath::root(), OperationKind::Write)?;
        self.snapshots.create(label).await
    }

    pub async fn rollback(&self, session: SessionId, id: SnapshotId) -> VfsResult<RollbackReport> {
        self.check(session, &VirtualPath::root(), OperationKind::Write)?;
        self.snapshots.rollback(id).await
    }

    pub async fn discard_snapshot(&self, session: SessionId, id: SnapshotId) -> VfsResult<SnapshotInfo> {
        self.check(session, &VirtualPath::root(), OperationKind::Write)?;
        self.snapshots.discard(id).await
    }

    pub fn list_snapshots(&self, session: SessionId) -> VfsResult<Vec<SnapshotInfo>> {
        self.check(session, &VirtualPath::root(), OperationKind::Read)?;
        Ok(self.snapshots.list())
    }

    pub fn get_snapshot(&self, session: SessionId, id: SnapshotId) -> VfsResult<SnapshotInfo> {
        self.check(session, &VirtualPath::root(), OperationKind::Read)?;
        self.snapshots.get(id)
    }

    pub async fn stats(&self, session: SessionId) -> VfsResult<NamespaceStats> {
        self.check(session, &VirtualPath::root(), OperationKind::Read)?;
        let _read = self.gate.read().await;
        Ok(NamespaceStats {
            memory: self.memory.stats(),
            indexed: self.index.len(),
            skills: self.skills.len(),
            snapshots: self.snapshots.len(),
            sessions: self.sessions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn p(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    fn admin(ns: &Namespace) -> SessionId {
        ns.open_session("admin", AccessScope::full()).id
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let ns = Namespace::new();
        let s = admin(&ns);

        let v1 = ns.write(s, "memory/notes/a", b"one").await.unwrap();
        let v2 = ns.write(s, "/memory/notes/a/", b"two").await.unwrap();
        assert!(v2 > v1);
        assert_eq!(ns.read(s, "memory/notes/a").await.unwrap(), b"two");
        assert_eq!(ns.read_at(s, "memory/notes/a", 1, 10).await.unwrap(), b"wo");

        let entry = ns.memory_entry(s, "memory/notes/a").await.unwrap();
        assert_eq!(entry.version, v2);

        ns.delete(s, "memory/notes/a").await.unwrap();
        assert!(matches!(ns.read(s, "memory/notes/a").await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_writes_outside_memory_are_invalid() {
        let ns = Namespace::new();
        let s = admin(&ns);
        for path in ["skills/echo", "agents/x", "/", "memory"] {
            assert!(
                matches!(ns.write(s, path, b"x").await, Err(VfsError::InvalidPath(_))),
                "{path}"
            );
        }
        assert!(matches!(ns.write(s, "", b"x").await, Err(VfsError::InvalidPath(_))));
        assert!(matches!(
            ns.write(s, "memory/../skills", b"x").await,
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_root_listing_shows_reserved_segments() {
        let ns = Namespace::new();
        let s = admin(&ns);
        assert_eq!(ns.list(s, "/").await.unwrap().names(), vec!["memory", "skills"]);
        assert!(ns.list(s, "memory").await.unwrap().next().is_none());
        assert!(matches!(ns.list(s, "agents").await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_listing_a_file_is_not_found() {
        let ns = Namespace::new();
        let s = admin(&ns);
        ns.write(s, "memory/a", b"x").await.unwrap();
        assert!(matches!(ns.list(s, "memory/a").await, Err(VfsError::NotFound(_))));
        assert!(matches!(ns.list(s, "memory/b").await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_session_is_denied() {
        let ns = Namespace::new();
        let s = admin(&ns);
        ns.close_session(s).unwrap();
        assert!(matches!(ns.read(s, "memory/a").await, Err(VfsError::PermissionDenied)));
        assert!(matches!(ns.search(s, "x", 1).await, Err(VfsError::PermissionDenied)));
        assert!(matches!(ns.session(s), Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_scoped_getattr() {
        let ns = Namespace::new();
        let s = admin(&ns);
        ns.write(s, "memory/notes/a", b"x").await.unwrap();
        ns.write(s, "memory/secret", b"y").await.unwrap();

        let reader = ns
            .open_session("reader", AccessScope::new([p("memory/notes")], OperationKind::iter()))
            .id;
        assert!(ns.getattr(reader, "memory").await.unwrap().is_dir());
        assert!(ns.getattr(reader, "memory/notes/a").await.unwrap().is_file());
        assert!(matches!(
            ns.getattr(reader, "memory/secret").await,
            Err(VfsError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn test_file_on_scope_ancestor_is_hidden() {
        let ns = Namespace::new();
        let s = admin(&ns);
        ns.write(s, "memory/secret", b"outside the scope").await.unwrap();

        let scoped = ns
            .open_session(
                "sub",
                AccessScope::new([p("memory/secret/sub")], [OperationKind::Read, OperationKind::List]),
            )
            .id;
        assert!(ns.list(scoped, "memory").await.unwrap().next().is_none());
        assert!(matches!(
            ns.getattr(scoped, "memory/secret").await,
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            ns.getattr(scoped, "memory/missing").await,
            Err(VfsError::PermissionDenied)
        ));
        assert!(matches!(
            ns.read(scoped, "memory/secret").await,
            Err(VfsError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn test_search_filters_by_scope() {
        let ns = Namespace::new();
        let s = admin(&ns);
        ns.write(s, "memory/notes/a", b"hello").await.unwrap();
        ns.write(s, "memory/private/b", b"hello").await.unwrap();

        let hits = ns.search(s, "hello", 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        let scoped = ns
            .open_session("notes", AccessScope::read_only([p("memory/notes")]))
            .id;
        let hits = ns.search(scoped, "hello", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, p("memory/notes/a"));
        assert!(matches!(ns.search(s, "hello", 0).await, Err(VfsError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_snapshots_need_root_write() {
        let ns = Namespace::new();
        let scoped = ns
            .open_session("notes", AccessScope::new([p("memory")], OperationKind::iter()))
            .id;
        assert!(matches!(
            ns.create_snapshot(scoped, None).await,
            Err(VfsError::PermissionDenied)
        ));
        assert!(matches!(ns.list_snapshots(scoped), Err(VfsError::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_open_preset() {
        let config = NamespaceConfig::from_toml_str(
            "[[sessions]]\nprincipal = \"notes\"\nprefixes = [\"memory/notes\"]\noperations = [\"read\", \"write\", \"list\"]\n",
        )
        .unwrap();
        let ns = Namespace::with_config(config);
        let session = ns.open_preset("notes").unwrap();
        ns.write(session.id, "memory/notes/a", b"x").await.unwrap();
        assert!(matches!(
            ns.write(session.id, "memory/other", b"x").await,
            Err(VfsError::PermissionDenied)
        ));
        assert!(matches!(ns.open_preset("nobody"), Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_stats() {
        let ns = Namespace::new();
        let s = admin(&ns);
        ns.write(s, "memory/a", b"abc").await.unwrap();
        ns.write(s, "memory/b", b"de").await.unwrap();
        ns.create_snapshot(s, None).await.unwrap();

        let stats = ns.stats(s).await.unwrap();
        assert_eq!(stats.memory.entries, 2);
        assert_eq!(stats.memory.bytes, 5);
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.snapshots, 1);
        assert_eq!(stats.sessions, 1);
    }

    #[test]
    fn test_resolve_is_pure() {
        let ns = Namespace::new();
        let resolved = ns.resolve("memory/notes/a").unwrap();
        assert_eq!(resolved.owner, SegmentOwner::Memory);
        assert_eq!(resolved.remainder, p("notes/a"));
        assert!(ns.memory().list(&VirtualPath::root()).is_empty());
    }
}
