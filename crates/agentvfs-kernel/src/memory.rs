//! Versioned key/value memory store.
//!
//! Keys are full paths under the `memory` segment. Each key owns a slot with a
//! revision chain; a revision stays in the chain while it is current or pinned
//! by at least one snapshot, and unpinned superseded revisions are pruned on
//! the next mutation of that key.
//!
//! # Locking
//!
//! ```text
//! slots: RwLock<BTreeMap<key, Arc<Mutex<KeySlot>>>>
//!
//!   overwrite live key   slots.read()  + slot.lock()
//!   delete               slots.read()  + slot.lock()
//!   create / revive      slots.write() + slot.lock()   (structural check)
//! ```
//!
//! Content is an `Arc<[u8]>` swapped whole, so readers see the old bytes or
//! the new bytes and never a mix. The search index is refreshed while the
//! slot lock is still held, which keeps index versions in write order.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use agentvfs_types::{VirtualPath, now_millis};

use crate::index::SearchIndex;
use crate::vfs::router::MEMORY_SEGMENT;
use crate::vfs::{DirEntry, FileAttr, VfsError, VfsResult};

/// Permission bits reported for memory entries.
pub const ENTRY_PERM: u32 = 0o644;

/// Permission bits reported for memory directories.
pub const DIR_PERM: u32 = 0o755;

/// A live memory entry as seen by readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: VirtualPath,
    pub content: Arc<[u8]>,
    /// When the key was first written (Unix millis).
    pub created_at: u64,
    /// When the content was last replaced (Unix millis).
    pub updated_at: u64,
    pub version: u64,
}

impl MemoryEntry {
    /// Content length in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Content as UTF-8, replacing invalid sequences.
    pub fn content_lossy(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Live entries.
    pub entries: usize,
    /// Bytes held by live entries' current content.
    pub bytes: u64,
    /// Revisions retained across all keys (current plus pinned).
    pub revisions: usize,
    /// Deleted keys whose version counter is kept.
    pub tombstones: usize,
}

/// The metadata of one captured revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRevision {
    pub version: u64,
    pub created_at: u64,
    pub updated_at: u64,
    pub size: u64,
    /// Global update sequence the revision was committed at.
    pub sequence: u64,
}

#[derive(Debug, Clone)]
struct Revision {
    version: u64,
    content: Arc<[u8]>,
    created_at: u64,
    updated_at: u64,
    sequence: u64,
    /// Number of snapshots holding this revision.
    pins: u32,
}

#[derive(Debug, Default)]
struct KeySlot {
    /// Ascending by version. When live, the last revision is current.
    revisions: Vec<Revision>,
    live: bool,
    /// Highest version ever assigned; survives deletion.
    last_version: u64,
}

impl KeySlot {
    fn current(&self) -> Option<&Revision> {
        if self.live { self.revisions.last() } else { None }
    }

    fn revision(&self, version: u64) -> Option<&Revision> {
        self.revisions.iter().find(|r| r.version == version)
    }

    fn revision_mut(&mut self, version: u64) -> Option<&mut Revision> {
        self.revisions.iter_mut().find(|r| r.version == version)
    }

    /// Drop revisions that are neither current nor pinned.
    fn prune(&mut self) {
        let current = self.current().map(|r| r.version);
        self.revisions
            .retain(|r| r.pins > 0 || Some(r.version) == current);
    }

    fn entry(&self, key: &VirtualPath) -> Option<MemoryEntry> {
        self.current().map(|r| MemoryEntry {
            key: key.clone(),
            content: r.content.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        })
    }
}

/// Everything needed to put a key back to a captured revision.
#[derive(Debug, Clone)]
pub(crate) struct RestoredKey {
    pub captured: CapturedRevision,
    pub content: Arc<[u8]>,
}

/// A validated, fully assembled memory restore.
#[derive(Debug, Clone, Default)]
pub(crate) struct RestorePlan {
    pub keys: BTreeMap<VirtualPath, RestoredKey>,
}

/// Outcome counts of applying a [`RestorePlan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub rewritten: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// The versioned memory store.
pub struct MemoryStore {
    slots: RwLock<BTreeMap<VirtualPath, Arc<Mutex<KeySlot>>>>,
    index: Arc<SearchIndex>,
    sequence: AtomicU64,
    root: VirtualPath,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("slots", &self.slots.read().len())
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store that keeps `index` in sync.
    pub fn new(index: Arc<SearchIndex>) -> Self {
        Self {
            slots: RwLock::new(BTreeMap::new()),
            index,
            sequence: AtomicU64::new(0),
            root: VirtualPath::from_segments([MEMORY_SEGMENT]).unwrap_or_default(),
        }
    }

    /// The `memory` segment root.
    pub fn root(&self) -> &VirtualPath {
        &self.root
    }

    /// The index this store refreshes.
    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// A key must be strictly below the memory root.
    fn check_key(&self, key: &VirtualPath) -> VfsResult<()> {
        if key.len() > self.root.len() && key.starts_with(&self.root) {
            Ok(())
        } else {
            Err(VfsError::invalid_path(format!("{key} is not a memory key")))
        }
    }

    /// Reject a new key that would sit above or below a live entry.
    fn check_structure(
        slots: &BTreeMap<VirtualPath, Arc<Mutex<KeySlot>>>,
        key: &VirtualPath,
    ) -> VfsResult<()> {
        let mut ancestor = key.parent();
        while let Some(path) = ancestor {
            if slots.get(&path).is_some_and(|slot| slot.lock().live) {
                return Err(VfsError::invalid_path(format!(
                    "{key}: {path} is an entry, not a directory"
                )));
            }
            ancestor = path.parent();
        }

        let has_live_descendant = slots
            .range(key.clone()..)
            .skip_while(|(path, _)| *path == key)
            .take_while(|(path, _)| path.starts_with(key))
            .any(|(_, slot)| slot.lock().live);
        if has_live_descendant {
            return Err(VfsError::invalid_path(format!(
                "{key} is a directory with entries below it"
            )));
        }
        Ok(())
    }

    /// Append a revision and make it current. Caller holds the slot lock.
    ///
    /// A restored revision keeps the timestamps and update sequence it was
    /// captured with, so recency ordering matches the captured state.
    fn commit(
        &self,
        key: &VirtualPath,
        slot: &mut KeySlot,
        content: Arc<[u8]>,
        restored: Option<&CapturedRevision>,
    ) -> u64 {
        let (created_at, updated_at, sequence) = match restored {
            Some(captured) => (captured.created_at, captured.updated_at, captured.sequence),
            None => {
                let now = now_millis();
                let created_at = slot.current().map_or(now, |r| r.created_at);
                (created_at, now, self.next_sequence())
            }
        };
        let version = slot.last_version + 1;

        slot.revisions.push(Revision {
            version,
            content: content.clone(),
            created_at,
            updated_at,
            sequence,
            pins: 0,
        });
        slot.live = true;
        slot.last_version = version;
        slot.prune();

        self.index.refresh(key, version, sequence, &content);
        version
    }

    /// Mark a slot deleted. Caller holds the slot lock.
    fn tombstone(&self, key: &VirtualPath, slot: &mut KeySlot) {
        slot.live = false;
        slot.prune();
        self.index.invalidate(key);
    }

    /// Atomically create or replace `key`. Returns the new version.
    pub fn write(&self, key: &VirtualPath, content: &[u8]) -> VfsResult<u64> {
        self.check_key(key)?;
        let content: Arc<[u8]> = Arc::from(content);

        {
            let slots = self.slots.read();
            if let Some(slot) = slots.get(key) {
                let mut slot = slot.lock();
                if slot.live {
                    let version = self.commit(key, &mut slot, content, None);
                    tracing::debug!(key = %key, version, "memory entry replaced");
                    return Ok(version);
                }
            }
        }

        let mut slots = self.slots.write();
        Self::check_structure(&slots, key)?;
        let slot = slots.entry(key.clone()).or_default().clone();
        let mut slot = slot.lock();
        let version = self.commit(key, &mut slot, content, None);
        tracing::debug!(key = %key, version, "memory entry created");
        Ok(version)
    }

    /// The current entry at `key`.
    pub fn read(&self, key: &VirtualPath) -> VfsResult<MemoryEntry> {
        self.check_key(key)?;
        let slots = self.slots.read();
        slots
            .get(key)
            .and_then(|slot| slot.lock().entry(key))
            .ok_or_else(|| VfsError::not_found(key.to_string()))
    }

    /// A retained revision of `key`, live or pinned.
    pub fn read_version(&self, key: &VirtualPath, version: u64) -> VfsResult<MemoryEntry> {
        self.check_key(key)?;
        let slots = self.slots.read();
        let slot = slots
            .get(key)
            .ok_or_else(|| VfsError::not_found(key.to_string()))?;
        let slot = slot.lock();
        slot.revision(version)
            .map(|r| MemoryEntry {
                key: key.clone(),
                content: r.content.clone(),
                created_at: r.created_at,
                updated_at: r.updated_at,
                version: r.version,
            })
            .ok_or_else(|| VfsError::not_found(format!("{key}@{version}")))
    }

    /// Remove the entry at `key`. Its version counter is kept.
    pub fn delete(&self, key: &VirtualPath) -> VfsResult<()> {
        self.check_key(key)?;
        let slots = self.slots.read();
        let slot = slots
            .get(key)
            .ok_or_else(|| VfsError::not_found(key.to_string()))?;
        let mut slot = slot.lock();
        if !slot.live {
            return Err(VfsError::not_found(key.to_string()));
        }
        self.tombstone(key, &mut slot);
        tracing::debug!(key = %key, "memory entry deleted");
        Ok(())
    }

    /// All live keys under `prefix`, recursively, sorted.
    pub fn list(&self, prefix: &VirtualPath) -> Vec<VirtualPath> {
        let slots = self.slots.read();
        slots
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .filter(|(_, slot)| slot.lock().live)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Immediate children of `prefix`, sorted by name.
    pub fn children(&self, prefix: &VirtualPath) -> Vec<DirEntry> {
        let depth = prefix.len();
        let mut entries: Vec<DirEntry> = Vec::new();
        for key in self.list(prefix) {
            if key.len() <= depth {
                continue;
            }
            let child = key.truncate(depth + 1);
            let Some(name) = child.file_name() else {
                continue;
            };
            if entries.last().is_some_and(|e| e.name == name) {
                continue;
            }
            if key.len() == depth + 1 {
                entries.push(DirEntry::file(name));
            } else {
                entries.push(DirEntry::directory(name));
            }
        }
        crate::vfs::types::sort_dedup(&mut entries);
        entries
    }

    /// Attributes of a path under the memory root: an entry, an implicit
    /// directory, or the root itself.
    pub fn attr(&self, path: &VirtualPath) -> VfsResult<FileAttr> {
        if *path == self.root {
            return Ok(FileAttr::directory(DIR_PERM));
        }
        self.check_key(path)?;
        let slots = self.slots.read();
        if let Some(entry) = slots.get(path).and_then(|slot| slot.lock().entry(path)) {
            return Ok(FileAttr::file(
                entry.size(),
                ENTRY_PERM,
                entry.version,
                entry.updated_at,
            ));
        }
        let is_directory = slots
            .range(path.clone()..)
            .take_while(|(key, _)| key.starts_with(path))
            .any(|(key, slot)| key != path && slot.lock().live);
        if is_directory {
            Ok(FileAttr::directory(DIR_PERM))
        } else {
            Err(VfsError::not_found(path.to_string()))
        }
    }

    /// Highest version ever assigned to `key`, live or not.
    pub fn last_version(&self, key: &VirtualPath) -> Option<u64> {
        self.slots.read().get(key).map(|slot| slot.lock().last_version)
    }

    /// Counts of live entries, bytes, retained revisions, and tombstones.
    pub fn stats(&self) -> MemoryStats {
        let slots = self.slots.read();
        let mut stats = MemoryStats::default();
        for slot in slots.values() {
            let slot = slot.lock();
            stats.revisions += slot.revisions.len();
            match slot.current() {
                Some(current) => {
                    stats.entries += 1;
                    stats.bytes += current.content.len() as u64;
                }
                None => stats.tombstones += 1,
            }
        }
        stats
    }

    // ========================================================================
    // Snapshot support
    // ========================================================================

    /// Pin every live key's current revision and describe it.
    ///
    /// Callers must exclude concurrent writers for the capture to be a single
    /// logical instant.
    pub(crate) fn capture(&self) -> BTreeMap<VirtualPath, CapturedRevision> {
        let slots = self.slots.read();
        let mut captured = BTreeMap::new();
        for (key, slot) in slots.iter() {
            let mut slot = slot.lock();
            let Some(version) = slot.current().map(|r| r.version) else {
                continue;
            };
            if let Some(revision) = slot.revision_mut(version) {
                revision.pins += 1;
                captured.insert(
                    key.clone(),
                    CapturedRevision {
                        version: revision.version,
                        created_at: revision.created_at,
                        updated_at: revision.updated_at,
                        size: revision.content.len() as u64,
                        sequence: revision.sequence,
                    },
                );
            }
        }
        captured
    }

    /// Release pins taken by [`capture`](Self::capture).
    pub(crate) fn release(&self, captured: &BTreeMap<VirtualPath, CapturedRevision>) {
        let slots = self.slots.read();
        for (key, rev) in captured {
            let Some(slot) = slots.get(key) else {
                continue;
            };
            let mut slot = slot.lock();
            if let Some(revision) = slot.revision_mut(rev.version) {
                revision.pins = revision.pins.saturating_sub(1);
            }
            slot.prune();
        }
    }

    /// Gather the content of every captured revision without mutating
    /// anything. Fails if a captured revision is no longer retained.
    pub(crate) fn plan_restore(
        &self,
        captured: &BTreeMap<VirtualPath, CapturedRevision>,
    ) -> VfsResult<RestorePlan> {
        let slots = self.slots.read();
        let mut plan = RestorePlan::default();
        for (key, rev) in captured {
            let content = slots
                .get(key)
                .and_then(|slot| slot.lock().revision(rev.version).map(|r| r.content.clone()))
                .ok_or_else(|| {
                    VfsError::internal(format!("revision {key}@{} is not retained", rev.version))
                })?;
            plan.keys.insert(
                key.clone(),
                RestoredKey {
                    captured: *rev,
                    content,
                },
            );
        }
        Ok(plan)
    }

    /// Make the live key set and content match `plan`.
    ///
    /// Keys absent from the plan are deleted. Keys whose current version
    /// differs from the captured one get a new revision carrying the captured
    /// content and timestamps, so versions keep increasing.
    pub(crate) fn apply_restore(&self, plan: &RestorePlan) -> RestoreSummary {
        let mut summary = RestoreSummary::default();
        let mut slots = self.slots.write();

        for (key, slot) in slots.iter() {
            if plan.keys.contains_key(key) {
                continue;
            }
            let mut slot = slot.lock();
            if slot.live {
                self.tombstone(key, &mut slot);
                summary.removed += 1;
            }
        }

        for (key, restored) in &plan.keys {
            let slot = slots.entry(key.clone()).or_default().clone();
            let mut slot = slot.lock();
            if slot.current().map(|r| r.version) == Some(restored.captured.version) {
                summary.unchanged += 1;
                continue;
            }
            self.commit(key, &mut slot, restored.content.clone(), Some(&restored.captured));
            summary.rewritten += 1;
        }

        let live: HashSet<VirtualPath> = plan.keys.keys().cloned().collect();
        self.index.retain(&live);
        summary
    }
}
