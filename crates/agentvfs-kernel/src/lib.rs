//! # agentvfs-kernel
//!
//! The namespace engine behind agentvfs.
//!
//! A [`Namespace`] exposes dynamic resources through a POSIX-like virtual
//! filesystem:
//! - `memory/<key...>`: versioned entries, searchable by similarity
//! - `skills/<name>`: pluggable executable skills with a lifecycle
//! - snapshots freezing and restoring both of the above
//! - sessions confining each caller to a scope
//!
//! ```text
//! caller ─▶ access check ─▶ router ─▶ memory store ──▶ search index
//!                                  └▶ skill registry
//!           snapshot manager ──freeze/replay──▶ memory + registry
//! ```
//!
//! The [`vfs`] module carries the [`VfsOps`] trait a FUSE adapter consumes.

pub mod access;
pub mod config;
pub mod index;
pub mod memory;
pub mod namespace;
pub mod skills;
pub mod snapshot;
pub mod vfs;

pub use access::SessionTable;
pub use config::{ConfigError, IndexConfig, NamespaceConfig, SessionPreset, SkillsConfig};
pub use index::{HashedBagOfWords, Scorer, SearchHit, SearchIndex};
pub use memory::{MemoryEntry, MemoryStats, MemoryStore, RestoreSummary};
pub use namespace::{Namespace, NamespaceStats};
pub use skills::{
    CallContext, Skill, SkillConfig, SkillInfo, SkillKind, SkillManifest, SkillRegistry,
    SkillState,
};
pub use snapshot::{ConsistencyGate, RollbackReport, SnapshotInfo, SnapshotManager};
pub use vfs::{
    DirEntry, ErrorKind, FileAttr, FileType, Listing, NamespaceRouter, Resolved, SegmentOwner,
    VfsError, VfsOps, VfsResult,
};

pub use agentvfs_types::{
    AccessScope, NamespaceId, OperationKind, Session, SessionId, SnapshotId, VirtualPath,
};
