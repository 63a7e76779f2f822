//! Memory store backend.
//!
//! Presents memory entries as files and key prefixes as implicit
//! directories. Directories exist only while at least one entry lies below
//! them; there is no mkdir.

use std::sync::Arc;

use async_trait::async_trait;

use agentvfs_types::VirtualPath;

use crate::memory::MemoryStore;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{VfsOps, slice_range};
use crate::vfs::types::{DirEntry, FileAttr};

/// [`VfsOps`] over a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
}

impl MemoryBackend {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// The full memory key for a backend-relative path.
    fn key(&self, path: &VirtualPath) -> VirtualPath {
        self.store.root().concat(path)
    }
}

#[async_trait]
impl VfsOps for MemoryBackend {
    async fn getattr(&self, path: &VirtualPath) -> VfsResult<FileAttr> {
        self.store.attr(&self.key(path))
    }

    async fn readdir(&self, path: &VirtualPath) -> VfsResult<Vec<DirEntry>> {
        let prefix = self.key(path);
        let attr = self.store.attr(&prefix)?;
        if !attr.is_dir() {
            return Err(VfsError::not_found(format!("{prefix} is not a directory")));
        }
        Ok(self.store.children(&prefix))
    }

    async fn read(&self, path: &VirtualPath, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let entry = self.store.read(&self.key(path))?;
        Ok(slice_range(&entry.content, offset, size))
    }

    async fn write(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<u64> {
        self.store.write(&self.key(path), data)
    }

    async fn unlink(&self, path: &VirtualPath) -> VfsResult<()> {
        self.store.delete(&self.key(path))
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn read_all(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        Ok(self.store.read(&self.key(path))?.content.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchIndex;

    fn p(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new(Arc::new(MemoryStore::new(Arc::new(SearchIndex::default()))))
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = backend();
        let version = fs.write(&p("notes/a"), b"hello world").await.unwrap();
        assert_eq!(version, 1);

        assert_eq!(fs.read_all(&p("notes/a")).await.unwrap(), b"hello world");
        assert_eq!(fs.read(&p("notes/a"), 6, 5).await.unwrap(), b"world");
        assert_eq!(fs.read(&p("notes/a"), 50, 5).await.unwrap(), b"");
        assert_eq!(fs.store.read(&p("memory/notes/a")).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_readdir() {
        let fs = backend();
        fs.write(&p("notes/a"), b"1").await.unwrap();
        fs.write(&p("notes/deep/b"), b"2").await.unwrap();
        fs.write(&p("top"), b"3").await.unwrap();

        let root = fs.readdir(&VirtualPath::root()).await.unwrap();
        assert_eq!(root, vec![DirEntry::directory("notes"), DirEntry::file("top")]);

        let notes = fs.readdir(&p("notes")).await.unwrap();
        assert_eq!(notes, vec![DirEntry::file("a"), DirEntry::directory("deep")]);

        assert!(matches!(fs.readdir(&p("top")).await, Err(VfsError::NotFound(_))));
        assert!(matches!(fs.readdir(&p("missing")).await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_root_is_listable() {
        let fs = backend();
        assert!(fs.readdir(&VirtualPath::root()).await.unwrap().is_empty());
        assert!(fs.getattr(&VirtualPath::root()).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_unlink() {
        let fs = backend();
        fs.write(&p("a"), b"x").await.unwrap();
        fs.unlink(&p("a")).await.unwrap();
        assert!(!fs.exists(&p("a")).await);
        assert!(matches!(fs.unlink(&p("a")).await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_write_to_segment_root_is_invalid() {
        let fs = backend();
        assert!(matches!(
            fs.write(&VirtualPath::root(), b"x").await,
            Err(VfsError::InvalidPath(_))
        ));
    }
}
