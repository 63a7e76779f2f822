//! Shared identity, path, and session types for agentvfs.
//!
//! This crate is the foundation the kernel builds on: typed IDs, the
//! `VirtualPath` addressing scheme, and session/scope records. It has **no
//! internal agentvfs dependencies**.
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`VirtualPath`]   | Normalized, root-anchored namespace path     |
//! | [`Session`]       | Session birth certificate (who + scope)      |
//! | [`AccessScope`]   | Allowed prefixes and operation kinds         |
//! | [`OperationKind`] | read / write / list / execute                |
//! | [`SessionId`]     | Which caller session                         |
//! | [`NamespaceId`]   | Which namespace instance                     |
//! | [`SnapshotId`]    | Monotonic snapshot version                   |
//! |-------------------|----------------------------------------------|

pub mod ids;
pub mod path;
pub mod session;

// Re-export primary types at crate root for convenience.
pub use ids::{NamespaceId, SessionId, SnapshotId};
pub use path::{MAX_SEGMENT_LEN, PathError, VirtualPath};
pub use session::{AccessScope, OperationKind, Session};

/// Current time as Unix milliseconds. Used by constructors throughout the workspace.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
