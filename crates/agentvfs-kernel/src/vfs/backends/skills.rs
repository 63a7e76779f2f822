//! Skill mount backend.
//!
//! Read-only view of the skill registry: each mounted skill appears as a
//! single manifest file at its mount path. Registered, initialized, and
//! failed skills are invisible here.

use std::sync::Arc;

use async_trait::async_trait;

use agentvfs_types::VirtualPath;

use crate::skills::SkillRegistry;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{VfsOps, slice_range};
use crate::vfs::types::{DirEntry, FileAttr};

/// Permission bits of a published manifest.
const MANIFEST_PERM: u32 = 0o444;

/// [`VfsOps`] over a [`SkillRegistry`]'s mounted skills.
#[derive(Debug, Clone)]
pub struct SkillMountBackend {
    registry: Arc<SkillRegistry>,
}

impl SkillMountBackend {
    pub fn new(registry: Arc<SkillRegistry>) -> Self {
        Self { registry }
    }

    fn full(&self, path: &VirtualPath) -> VirtualPath {
        self.registry.root().concat(path)
    }
}

#[async_trait]
impl VfsOps for SkillMountBackend {
    async fn getattr(&self, path: &VirtualPath) -> VfsResult<FileAttr> {
        let full = self.full(path);
        if path.is_root() {
            return Ok(FileAttr::directory(0o555));
        }
        if let Some((info, manifest)) = self.registry.mounted_at(&full) {
            return Ok(FileAttr::file(
                manifest.len() as u64,
                MANIFEST_PERM,
                0,
                info.registered_at,
            ));
        }
        if !self.registry.mount_children(&full).is_empty() {
            return Ok(FileAttr::directory(0o555));
        }
        Err(VfsError::not_found(full.to_string()))
    }

    async fn readdir(&self, path: &VirtualPath) -> VfsResult<Vec<DirEntry>> {
        let full = self.full(path);
        let children = self.registry.mount_children(&full);
        if children.is_empty() && !path.is_root() {
            return Err(VfsError::not_found(full.to_string()));
        }
        Ok(children)
    }

    async fn read(&self, path: &VirtualPath, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let manifest = self.manifest(path)?;
        Ok(slice_range(&manifest, offset, size))
    }

    async fn write(&self, path: &VirtualPath, _data: &[u8]) -> VfsResult<u64> {
        Err(VfsError::invalid_path(format!(
            "{} is read-only",
            self.full(path)
        )))
    }

    async fn unlink(&self, path: &VirtualPath) -> VfsResult<()> {
        Err(VfsError::invalid_path(format!(
            "{} is read-only",
            self.full(path)
        )))
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn read_all(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        Ok(self.manifest(path)?.to_vec())
    }
}

impl SkillMountBackend {
    fn manifest(&self, path: &VirtualPath) -> VfsResult<Arc<[u8]>> {
        let full = self.full(path);
        self.registry
            .mounted_at(&full)
            .map(|(_, manifest)| manifest)
            .ok_or_else(|| VfsError::not_found(full.to_string()))
    }
}
