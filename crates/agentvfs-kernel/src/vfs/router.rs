//! Namespace router: classifies paths by top-level segment and dispatches.
//!
//! The namespace root holds one mount per top-level segment. `memory` and
//! `skills` are reserved for the memory store and the skill registry; any
//! other segment is reserved for future mount types and resolves to
//! [`SegmentOwner::Reserved`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use agentvfs_types::VirtualPath;

use super::error::{VfsError, VfsResult};
use super::ops::VfsOps;
use super::types::{DirEntry, FileAttr};

/// Top-level segment owned by the memory store.
pub const MEMORY_SEGMENT: &str = "memory";

/// Top-level segment owned by the skill registry.
pub const SKILLS_SEGMENT: &str = "skills";

/// Which subsystem owns a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentOwner {
    /// The namespace root itself.
    Root,
    /// `memory/...`
    Memory,
    /// `skills/...`
    Skills,
    /// Any other top-level segment.
    Reserved(String),
}

impl SegmentOwner {
    /// Classify a top-level segment name.
    pub fn from_segment(segment: &str) -> Self {
        match segment {
            MEMORY_SEGMENT => SegmentOwner::Memory,
            SKILLS_SEGMENT => SegmentOwner::Skills,
            other => SegmentOwner::Reserved(other.to_string()),
        }
    }
}

/// Result of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Owning subsystem.
    pub owner: SegmentOwner,
    /// Path relative to the owner's segment root.
    pub remainder: VirtualPath,
}

/// Classify a path into its owning subsystem and relative remainder.
///
/// Pure: touches no state and never fails on a parsed path.
pub fn resolve(path: &VirtualPath) -> Resolved {
    match path.first() {
        None => Resolved {
            owner: SegmentOwner::Root,
            remainder: VirtualPath::root(),
        },
        Some(first) => Resolved {
            owner: SegmentOwner::from_segment(first),
            remainder: path.strip_prefix(&path.truncate(1)).unwrap_or_default(),
        },
    }
}

/// Parse then [`resolve`]. Fails with `InvalidPath` for malformed input.
pub fn resolve_str(raw: &str) -> VfsResult<Resolved> {
    let path = VirtualPath::parse(raw)?;
    Ok(resolve(&path))
}

/// The root path of a top-level segment.
pub fn segment_root(segment: &str) -> VfsResult<VirtualPath> {
    Ok(VirtualPath::root().join(segment)?)
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The top-level segment (e.g., "memory").
    pub segment: String,
    /// Whether this mount rejects writes.
    pub read_only: bool,
}

/// Routes filesystem operations to the backend mounted at a path's first
/// segment.
pub struct NamespaceRouter {
    /// Mounted backends, keyed by top-level segment.
    mounts: RwLock<BTreeMap<String, Arc<dyn VfsOps>>>,
}

impl std::fmt::Debug for NamespaceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceRouter")
            .field("mounts", &self.mounts.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for NamespaceRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceRouter {
    /// Create a new empty router.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount a backend at a top-level segment, replacing any previous one.
    pub fn mount(&self, segment: impl Into<String>, fs: impl VfsOps + 'static) {
        self.mount_arc(segment, Arc::new(fs));
    }

    /// Mount a backend (already wrapped in Arc) at a top-level segment.
    pub fn mount_arc(&self, segment: impl Into<String>, fs: Arc<dyn VfsOps>) {
        let segment = segment.into();
        tracing::debug!(segment = %segment, "mounting backend");
        self.mounts.write().insert(segment, fs);
    }

    /// Unmount the backend at a segment.
    ///
    /// Returns `true` if a mount was removed, `false` if nothing was mounted there.
    pub fn unmount(&self, segment: &str) -> bool {
        self.mounts.write().remove(segment).is_some()
    }

    /// List all current mounts.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .read()
            .iter()
            .map(|(segment, fs)| MountInfo {
                segment: segment.clone(),
                read_only: fs.read_only(),
            })
            .collect()
    }

    /// Find the backend for a path and the path relative to it.
    fn find_mount(&self, path: &VirtualPath) -> VfsResult<(Arc<dyn VfsOps>, VirtualPath)> {
        let Some(first) = path.first() else {
            return Err(VfsError::invalid_path("operation not valid on the namespace root"));
        };
        let mounts = self.mounts.read();
        let fs = mounts
            .get(first)
            .cloned()
            .ok_or_else(|| VfsError::not_found(path.to_string()))?;
        Ok((fs, resolve(path).remainder))
    }

    /// List the root directory, synthesizing entries from mount points.
    fn list_root(&self) -> Vec<DirEntry> {
        self.mounts
            .read()
            .keys()
            .map(|segment| DirEntry::directory(segment.clone()))
            .collect()
    }
}

#[async_trait]
impl VfsOps for NamespaceRouter {
    async fn getattr(&self, path: &VirtualPath) -> VfsResult<FileAttr> {
        if path.is_root() {
            return Ok(FileAttr::directory(0o755));
        }
        let (fs, relative) = self.find_mount(path)?;
        fs.getattr(&relative).await
    }

    async fn readdir(&self, path: &VirtualPath) -> VfsResult<Vec<DirEntry>> {
        if path.is_root() {
            return Ok(self.list_root());
        }
        let (fs, relative) = self.find_mount(path)?;
        fs.readdir(&relative).await
    }

    async fn read(&self, path: &VirtualPath, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let (fs, relative) = self.find_mount(path)?;
        fs.read(&relative, offset, size).await
    }

    async fn write(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<u64> {
        let (fs, relative) = self.find_mount(path)?;
        if fs.read_only() {
            return Err(VfsError::invalid_path(format!("{path} is on a read-only mount")));
        }
        fs.write(&relative, data).await
    }

    async fn unlink(&self, path: &VirtualPath) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path)?;
        if fs.read_only() {
            return Err(VfsError::invalid_path(format!("{path} is on a read-only mount")));
        }
        fs.unlink(&relative).await
    }

    fn read_only(&self) -> bool {
        // The router itself isn't read-only; individual mounts might be
        false
    }

    async fn read_all(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        let (fs, relative) = self.find_mount(path)?;
        fs.read_all(&relative).await
    }
}
