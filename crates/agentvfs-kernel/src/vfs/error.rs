//! Namespace error types.
//!
//! Every public operation fails with exactly one of these kinds.

use std::io;

use agentvfs_types::PathError;
use strum::Display;
use thiserror::Error;

/// Namespace error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Empty, malformed, or misplaced path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No such entry, skill, session, or snapshot.
    #[error("not found: {0}")]
    NotFound(String),

    /// A skill name or mount path is already taken.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// Skill lifecycle violation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Access denied. Carries no detail on purpose.
    #[error("permission denied")]
    PermissionDenied,

    /// Bad argument (e.g. a zero result bound).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A deadline expired before the operation finished.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Unexpected failure in a dependency (skill implementation, index).
    #[error("internal error: {0}")]
    Internal(String),
}

/// The error taxonomy without payloads, for matching and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidPath,
    NotFound,
    DuplicateName,
    InvalidState,
    PermissionDenied,
    InvalidArgument,
    Timeout,
    Internal,
}

impl VfsError {
    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a DuplicateName error.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    /// Create an InvalidState error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a Timeout error.
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout(what.into())
    }

    /// Create an Internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::InvalidPath(_) => ErrorKind::InvalidPath,
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::DuplicateName(_) => ErrorKind::DuplicateName,
            VfsError::InvalidState(_) => ErrorKind::InvalidState,
            VfsError::PermissionDenied => ErrorKind::PermissionDenied,
            VfsError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            VfsError::Timeout(_) => ErrorKind::Timeout,
            VfsError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<PathError> for VfsError {
    fn from(e: PathError) -> Self {
        VfsError::InvalidPath(e.to_string())
    }
}

/// Convert VfsError to std::io::Error so a FUSE adapter can map errnos.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::DuplicateName(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::InvalidState(msg) => io::Error::other(msg),
            VfsError::PermissionDenied => {
                io::Error::new(io::ErrorKind::PermissionDenied, "permission denied")
            }
            VfsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Timeout(msg) => io::Error::new(io::ErrorKind::TimedOut, msg),
            VfsError::Internal(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(VfsError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(VfsError::PermissionDenied.kind(), ErrorKind::PermissionDenied);
        assert_eq!(ErrorKind::DuplicateName.to_string(), "duplicate_name");
    }

    #[test]
    fn test_path_error_is_invalid_path() {
        let err: VfsError = PathError::Empty.into();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[test]
    fn test_permission_denied_discloses_nothing() {
        assert_eq!(VfsError::PermissionDenied.to_string(), "permission denied");
    }

    #[test]
    fn test_io_error_kinds() {
        let io_err: io::Error = VfsError::not_found("memory/a").into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

        let io_err: io::Error = VfsError::timeout("echo").into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);

        let io_err: io::Error = VfsError::PermissionDenied.into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }
}
