//! Core VFS types.
//!
//! These types are path-based (no inodes) and serializable so they can cross
//! an RPC or FUSE adapter boundary unchanged.

use serde::{Deserialize, Serialize};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file (memory entry or skill manifest).
    File,
    /// Directory (segment root or implicit key prefix).
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permissions (e.g., 0o644).
    pub perm: u32,
    /// Content version; 0 for directories.
    pub version: u64,
    /// Last modification time (Unix millis); 0 when unknown.
    pub mtime: u64,
}

impl FileAttr {
    /// Attributes for a file.
    pub fn file(size: u64, perm: u32, version: u64, mtime: u64) -> Self {
        Self {
            size,
            kind: FileType::File,
            perm,
            version,
            mtime,
        }
    }

    /// Attributes for a directory.
    pub fn directory(perm: u32) -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            perm,
            version: 0,
            mtime: 0,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// Sort by name and drop repeated names, keeping the first kind seen.
pub(crate) fn sort_dedup(entries: &mut Vec<DirEntry>) {
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries.dedup_by(|a, b| a.name == b.name);
}

/// A point-in-time directory listing.
///
/// The entries are captured when the listing is produced and handed out one
/// at a time; later mutations are not reflected, and a consumed listing
/// cannot be rewound.
#[derive(Debug)]
pub struct Listing {
    entries: std::vec::IntoIter<DirEntry>,
}

impl Listing {
    pub(crate) fn new(entries: Vec<DirEntry>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }

    /// Entries not yet yielded.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    /// Collect the remaining entry names.
    pub fn names(self) -> Vec<String> {
        self.map(|e| e.name).collect()
    }
}

impl Iterator for Listing {
    type Item = DirEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Listing {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
    }

    #[test]
    fn test_file_attr_constructors() {
        let file = FileAttr::file(1024, 0o644, 3, 10);
        assert!(file.is_file());
        assert_eq!(file.size, 1024);
        assert_eq!(file.version, 3);

        let dir = FileAttr::directory(0o755);
        assert!(dir.is_dir());
        assert_eq!(dir.perm, 0o755);
    }

    #[test]
    fn test_sort_dedup() {
        let mut entries = vec![
            DirEntry::file("b"),
            DirEntry::directory("a"),
            DirEntry::file("b"),
        ];
        sort_dedup(&mut entries);
        assert_eq!(entries, vec![DirEntry::directory("a"), DirEntry::file("b")]);
    }

    #[test]
    fn test_listing_is_single_pass() {
        let mut listing = Listing::new(vec![DirEntry::file("a"), DirEntry::file("b")]);
        assert_eq!(listing.remaining(), 2);
        assert_eq!(listing.next().map(|e| e.name), Some("a".to_string()));
        assert_eq!(listing.names(), vec!["b".to_string()]);
    }
}
