//! Virtual filesystem layer.
//!
//! This module provides the path-based view of a namespace that a FUSE
//! adapter or RPC layer consumes. Key components:
//!
//! - [`VfsOps`] - Core trait for filesystem operations
//! - [`NamespaceRouter`] - Routes operations to backends by top-level segment
//! - [`MemoryBackend`] - Memory store entries as files
//! - [`SkillMountBackend`] - Mounted skill manifests as read-only files
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: Operations use paths, not inode numbers.
//!   FUSE clients handle inode ↔ path mapping locally.
//! - **Explicit offset/size**: Reads take offset and size so no open-file
//!   handle state is needed.
//! - **Segment routing**: the root is synthesized from the mounted segments;
//!   everything below a segment belongs to exactly one backend.

pub mod backends;
mod error;
pub(crate) mod ops;
pub mod router;
pub(crate) mod types;

pub use backends::{MemoryBackend, SkillMountBackend};
pub use error::{ErrorKind, VfsError, VfsResult};
pub use ops::VfsOps;
pub use router::{
    MEMORY_SEGMENT, MountInfo, NamespaceRouter, Resolved, SKILLS_SEGMENT, SegmentOwner, resolve,
    resolve_str,
};
pub use types::{DirEntry, FileAttr, FileType, Listing};
