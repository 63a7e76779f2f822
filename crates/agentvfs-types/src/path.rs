//! Virtual paths: the addressing scheme of the namespace.
//!
//! A `VirtualPath` is a sequence of non-empty segments under a fixed root.
//! It has no relationship to host filesystem paths: there are no drive
//! prefixes, no symlinks, and no way to climb above the root.
//!
//! ```text
//! "/memory/notes/a"   → ["memory", "notes", "a"]
//! "memory//notes/a/"  → ["memory", "notes", "a"]
//! "/"                 → []            (root)
//! ""                  → InvalidPath
//! "memory/../skills"  → InvalidPath
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest segment accepted, in bytes. Matches the usual `NAME_MAX`.
pub const MAX_SEGMENT_LEN: usize = 255;

/// Why a path string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("path escapes root: {0}")]
    EscapesRoot(String),
    #[error("forbidden character {ch:?} in path: {path}")]
    ForbiddenChar { path: String, ch: char },
    #[error("segment too long in path: {0}")]
    SegmentTooLong(String),
}

/// A normalized, root-anchored path in the virtual namespace.
#[derive(Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    /// The namespace root (zero segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize a path string.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            if segment.is_empty() {
                continue;
            }
            Self::check_segment(raw, segment)?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Build a path from already-split segments, validating each one.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for segment in segments {
            let segment = segment.into();
            if segment.is_empty() {
                return Err(PathError::Empty);
            }
            if segment.contains('/') {
                return Err(PathError::ForbiddenChar {
                    path: segment,
                    ch: '/',
                });
            }
            Self::check_segment(&segment, &segment)?;
            out.push(segment);
        }
        Ok(Self { segments: out })
    }

    fn check_segment(raw: &str, segment: &str) -> Result<(), PathError> {
        if segment == "." || segment == ".." {
            return Err(PathError::EscapesRoot(raw.to_string()));
        }
        if segment.len() > MAX_SEGMENT_LEN {
            return Err(PathError::SegmentTooLong(raw.to_string()));
        }
        if let Some(ch) = segment.chars().find(|c| *c == '\\' || c.is_control()) {
            return Err(PathError::ForbiddenChar {
                path: raw.to_string(),
                ch,
            });
        }
        Ok(())
    }

    /// The path's segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Alias of [`is_root`](Self::is_root) for collection-style callers.
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// First segment, if any.
    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Last segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent path. The root has no parent.
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment.
    pub fn join(&self, segment: &str) -> Result<VirtualPath, PathError> {
        let tail = Self::from_segments([segment])?;
        Ok(self.concat(&tail))
    }

    /// Append another path's segments.
    pub fn concat(&self, tail: &VirtualPath) -> VirtualPath {
        let mut segments = self.segments.clone();
        segments.extend(tail.segments.iter().cloned());
        Self { segments }
    }

    /// Segment-wise prefix test. Every path starts with the root and with itself.
    pub fn starts_with(&self, prefix: &VirtualPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Remove a leading prefix, returning the remainder.
    pub fn strip_prefix(&self, prefix: &VirtualPath) -> Option<VirtualPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self {
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    /// The path truncated to its first `depth` segments.
    pub fn truncate(&self, depth: usize) -> VirtualPath {
        Self {
            segments: self.segments.iter().take(depth).cloned().collect(),
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.segments.join("/"))
        }
    }
}

impl fmt::Debug for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPath({self})")
    }
}

impl std::str::FromStr for VirtualPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VirtualPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for VirtualPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<VirtualPath> for String {
    fn from(path: VirtualPath) -> String {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_normalizes_slashes() {
        assert_eq!(p("/memory/notes/a"), p("memory//notes/a/"));
        assert_eq!(p("memory/notes/a").segments(), ["memory", "notes", "a"]);
        assert_eq!(p("memory/notes/a").to_string(), "memory/notes/a");
    }

    #[test]
    fn test_root() {
        let root = p("/");
        assert!(root.is_root());
        assert_eq!(root, VirtualPath::root());
        assert_eq!(root.to_string(), "/");
        assert!(root.parent().is_none());
        assert_eq!(p("///"), VirtualPath::root());
    }

    #[test]
    fn test_rejects_invalid() {
        assert_eq!(VirtualPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            VirtualPath::parse("memory/../skills"),
            Err(PathError::EscapesRoot(_))
        ));
        assert!(matches!(
            VirtualPath::parse("./memory"),
            Err(PathError::EscapesRoot(_))
        ));
        assert!(matches!(
            VirtualPath::parse("memory/a\\b"),
            Err(PathError::ForbiddenChar { ch: '\\', .. })
        ));
        assert!(matches!(
            VirtualPath::parse("memory/a\0b"),
            Err(PathError::ForbiddenChar { .. })
        ));
        let long = format!("memory/{}", "x".repeat(MAX_SEGMENT_LEN + 1));
        assert!(matches!(
            VirtualPath::parse(&long),
            Err(PathError::SegmentTooLong(_))
        ));
    }

    #[test]
    fn test_case_sensitive() {
        assert_ne!(p("memory/Notes"), p("memory/notes"));
    }

    #[test]
    fn test_prefix_ops() {
        let key = p("memory/notes/a");
        assert!(key.starts_with(&p("memory")));
        assert!(key.starts_with(&p("memory/notes/a")));
        assert!(key.starts_with(&VirtualPath::root()));
        assert!(!key.starts_with(&p("memory/not")));
        assert_eq!(key.strip_prefix(&p("memory")), Some(p("notes/a")));
        assert_eq!(key.strip_prefix(&p("skills")), None);
        assert_eq!(key.parent(), Some(p("memory/notes")));
        assert_eq!(key.file_name(), Some("a"));
        assert_eq!(VirtualPath::root().file_name(), None);
        assert_eq!(key.truncate(2), p("memory/notes"));
    }

    #[test]
    fn test_join() {
        let base = p("skills");
        assert_eq!(base.join("echo").unwrap(), p("skills/echo"));
        assert!(base.join("a/b").is_err());
        assert!(base.join("..").is_err());
        assert!(base.join("").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let key = p("memory/notes/a");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"memory/notes/a\"");
        let parsed: VirtualPath = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
        assert!(serde_json::from_str::<VirtualPath>("\"a/../b\"").is_err());
    }
}
