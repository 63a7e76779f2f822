//! Snapshots and rollback.
//!
//! A snapshot freezes the memory store and the skill registry as of one
//! logical instant. Memory revisions are captured by reference: capture pins
//! each key's current revision in its chain instead of copying bytes, and
//! discarding the snapshot releases the pins.
//!
//! # Consistency gate
//!
//! ```text
//!              epoch          writers
//! reader       shared         -
//! writer       shared         shared
//! capture      shared         exclusive   blocks new writers, not readers
//! rollback     exclusive      -           excludes everything
//! ```
//!
//! Both locks are tokio `RwLock`s (fair, write-preferring) and are always
//! taken epoch first.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};

use agentvfs_types::{SnapshotId, VirtualPath, now_millis};

use crate::memory::{CapturedRevision, MemoryStore, RestoreSummary};
use crate::skills::{CapturedSkill, SkillRegistry};
use crate::vfs::{VfsError, VfsResult};

/// Two-level gate coordinating operations with snapshot capture and rollback.
#[derive(Debug, Default)]
pub struct ConsistencyGate {
    epoch: tokio::sync::RwLock<()>,
    writers: tokio::sync::RwLock<()>,
}

/// Held by read-only operations.
#[derive(Debug)]
pub struct ReadGuard<'a> {
    _epoch: RwLockReadGuard<'a, ()>,
}

/// Held by mutating operations.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    _epoch: RwLockReadGuard<'a, ()>,
    _writers: RwLockReadGuard<'a, ()>,
}

/// Held while capturing a snapshot.
#[derive(Debug)]
pub struct CaptureGuard<'a> {
    _epoch: RwLockReadGuard<'a, ()>,
    _writers: RwLockWriteGuard<'a, ()>,
}

/// Held while rolling back.
#[derive(Debug)]
pub struct ExclusiveGuard<'a> {
    _epoch: RwLockWriteGuard<'a, ()>,
}

impl ConsistencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> ReadGuard<'_> {
        ReadGuard {
            _epoch: self.epoch.read().await,
        }
    }

    pub async fn write(&self) -> WriteGuard<'_> {
        let epoch = self.epoch.read().await;
        let writers = self.writers.read().await;
        WriteGuard {
            _epoch: epoch,
            _writers: writers,
        }
    }

    pub async fn capture(&self) -> CaptureGuard<'_> {
        let epoch = self.epoch.read().await;
        let writers = self.writers.write().await;
        CaptureGuard {
            _epoch: epoch,
            _writers: writers,
        }
    }

    pub async fn exclusive(&self) -> ExclusiveGuard<'_> {
        ExclusiveGuard {
            _epoch: self.epoch.write().await,
        }
    }
}

/// Public description of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Unix millis.
    pub created_at: u64,
    /// Memory entries captured.
    pub entries: usize,
    /// Bytes of captured memory content.
    pub bytes: u64,
    /// Registry entries captured.
    pub skills: usize,
}

/// What a rollback changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackReport {
    pub snapshot: SnapshotId,
    pub memory: RestoreSummary,
    pub skills: usize,
}

#[derive(Debug)]
struct Snapshot {
    info: SnapshotInfo,
    memory: BTreeMap<VirtualPath, CapturedRevision>,
    skills: Vec<CapturedSkill>,
}

/// Creates, restores, and discards snapshots of one namespace.
#[derive(Debug)]
pub struct SnapshotManager {
    memory: Arc<MemoryStore>,
    skills: Arc<SkillRegistry>,
    gate: Arc<ConsistencyGate>,
    snapshots: RwLock<BTreeMap<SnapshotId, Arc<Snapshot>>>,
    next_id: Mutex<SnapshotId>,
}

impl SnapshotManager {
    pub fn new(
        memory: Arc<MemoryStore>,
        skills: Arc<SkillRegistry>,
        gate: Arc<ConsistencyGate>,
    ) -> Self {
        Self {
            memory,
            skills,
            gate,
            snapshots: RwLock::new(BTreeMap::new()),
            next_id: Mutex::new(SnapshotId::FIRST),
        }
    }

    /// The gate this manager coordinates through.
    pub fn gate(&self) -> &Arc<ConsistencyGate> {
        &self.gate
    }

    /// Capture memory and registry state.
    ///
    /// Waits for in-flight writes to finish and holds off new ones while
    /// capturing; readers are not blocked.
    #[tracing::instrument(skip(self), name = "snapshot.create")]
    pub async fn create(&self, label: Option<String>) -> VfsResult<SnapshotInfo> {
        let _capture = self.gate.capture().await;

        let memory = self.memory.capture();
        let skills = self.skills.capture();
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next = id.next();
            id
        };

        let info = SnapshotInfo {
            id,
            label,
            created_at: now_millis(),
            entries: memory.len(),
            bytes: memory.values().map(|r| r.size).sum(),
            skills: skills.len(),
        };
        self.snapshots.write().insert(
            id,
            Arc::new(Snapshot {
                info: info.clone(),
                memory,
                skills,
            }),
        );

        tracing::info!(snapshot = %id, entries = info.entries, skills = info.skills, "snapshot created");
        Ok(info)
    }

    /// Replace memory and registry contents with a snapshot's.
    ///
    /// The restore is assembled and validated before anything changes; if
    /// that fails, the current state is left exactly as it was.
    #[tracing::instrument(skip(self), fields(snapshot = %id), name = "snapshot.rollback")]
    pub async fn rollback(&self, id: SnapshotId) -> VfsResult<RollbackReport> {
        let _exclusive = self.gate.exclusive().await;

        let snapshot = self.snapshot(id)?;
        let plan = self.memory.plan_restore(&snapshot.memory)?;

        let memory = self.memory.apply_restore(&plan);
        self.skills.restore(&snapshot.skills);

        tracing::info!(
            snapshot = %id,
            rewritten = memory.rewritten,
            unchanged = memory.unchanged,
            removed = memory.removed,
            skills = snapshot.skills.len(),
            "rolled back"
        );
        Ok(RollbackReport {
            snapshot: id,
            memory,
            skills: snapshot.skills.len(),
        })
    }

    /// Remove a snapshot and release the revisions it pinned.
    pub async fn discard(&self, id: SnapshotId) -> VfsResult<SnapshotInfo> {
        let _write = self.gate.write().await;
        let snapshot = self
            .snapshots
            .write()
            .remove(&id)
            .ok_or_else(|| VfsError::not_found(format!("snapshot {id}")))?;
        self.memory.release(&snapshot.memory);
        tracing::info!(snapshot = %id, "snapshot discarded");
        Ok(snapshot.info.clone())
    }

    fn snapshot(&self, id: SnapshotId) -> VfsResult<Arc<Snapshot>> {
        self.snapshots
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| VfsError::not_found(format!("snapshot {id}")))
    }

    pub fn get(&self, id: SnapshotId) -> VfsResult<SnapshotInfo> {
        Ok(self.snapshot(id)?.info.clone())
    }

    /// All snapshots, oldest first.
    pub fn list(&self) -> Vec<SnapshotInfo> {
        self.snapshots
            .read()
            .values()
            .map(|s| s.info.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
