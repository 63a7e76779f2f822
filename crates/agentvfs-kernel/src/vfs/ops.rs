//! VFS operations trait.
//!
//! This trait defines the byte-oriented, path-addressed operations a FUSE
//! adapter needs (lookup, readdir, read, write, unlink) without inodes or
//! open-file handles.

use async_trait::async_trait;

use agentvfs_types::VirtualPath;

use super::types::{DirEntry, FileAttr};
use super::VfsResult;

/// Core VFS operations trait.
///
/// Paths are always relative to the backend's root. The
/// [`NamespaceRouter`](super::NamespaceRouter) handles routing and path
/// translation.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    async fn getattr(&self, path: &VirtualPath) -> VfsResult<FileAttr>;

    /// Read directory entries, sorted by name.
    async fn readdir(&self, path: &VirtualPath) -> VfsResult<Vec<DirEntry>>;

    /// Read file contents.
    ///
    /// Reads up to `size` bytes starting at `offset`.
    /// Returns fewer bytes if EOF is reached.
    async fn read(&self, path: &VirtualPath, offset: u64, size: u32) -> VfsResult<Vec<u8>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Replace a file's entire content, creating it if needed.
    ///
    /// Returns the new content version.
    async fn write(&self, path: &VirtualPath, data: &[u8]) -> VfsResult<u64>;

    /// Remove a file.
    async fn unlink(&self, path: &VirtualPath) -> VfsResult<()>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns true if this backend rejects writes.
    fn read_only(&self) -> bool;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &VirtualPath) -> bool {
        self.getattr(path).await.is_ok()
    }

    /// Read entire file contents.
    ///
    /// Backends whose content can change between `getattr` and `read` should
    /// override this with a single atomic read.
    async fn read_all(&self, path: &VirtualPath) -> VfsResult<Vec<u8>> {
        let attr = self.getattr(path).await?;
        let size = u32::try_from(attr.size).unwrap_or(u32::MAX);
        self.read(path, 0, size).await
    }
}

/// Slice `[offset, offset + size)` out of `data`, clamped to its length.
pub(crate) fn slice_range(data: &[u8], offset: u64, size: u32) -> Vec<u8> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let end = start.saturating_add(size as usize).min(data.len());
    data[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_range() {
        let data = b"hello world";
        assert_eq!(slice_range(data, 6, 5), b"world");
        assert_eq!(slice_range(data, 0, 100), b"hello world");
        assert_eq!(slice_range(data, 100, 5), b"");
        assert_eq!(slice_range(data, u64::MAX, u32::MAX), b"");
    }
}
