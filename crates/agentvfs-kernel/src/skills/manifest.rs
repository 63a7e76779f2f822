//! Skill manifest documents.
//!
//! ```text
//! ---
//! name: echo
//! description: Returns its input
//! version: 1.0.0
//! ---
//! Free-form body, returned verbatim.
//! ```
//!
//! A document that does not open with `---` has no header and is all body.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DELIMITER: &str = "---";
static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*:\s?(.*)$").expect("header line pattern compiles")
});

/// Why a manifest document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("header opened with `---` is never closed")]
    UnterminatedHeader,
    #[error("malformed header line {line}: {text:?}")]
    MalformedLine { line: usize, text: String },
}

/// A parsed skill manifest: header fields plus an opaque body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillManifest {
    pub frontmatter: BTreeMap<String, String>,
    pub body: String,
}

impl SkillManifest {
    /// Parse a manifest document.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut lines = text.split_inclusive('\n');
        let Some(first) = lines.next() else {
            return Ok(Self::default());
        };
        if first.trim_end() != DELIMITER {
            return Ok(Self {
                frontmatter: BTreeMap::new(),
                body: text.to_string(),
            });
        }

        let mut frontmatter = BTreeMap::new();
        let mut consumed = first.len();
        let mut closed = false;

        for (number, line) in lines.enumerate() {
            consumed += line.len();
            let trimmed = line.trim_end();
            if trimmed == DELIMITER {
                closed = true;
                break;
            }
            if trimmed.trim().is_empty() {
                continue;
            }
            let captures = HEADER_LINE
                .captures(trimmed)
                .ok_or_else(|| ManifestError::MalformedLine {
                    line: number + 2,
                    text: trimmed.to_string(),
                })?;
            frontmatter.insert(captures[1].to_string(), captures[2].trim().to_string());
        }

        if !closed {
            return Err(ManifestError::UnterminatedHeader);
        }

        Ok(Self {
            frontmatter,
            body: text[consumed..].to_string(),
        })
    }

    /// A header field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.frontmatter.get(key).map(String::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.field("description")
    }

    pub fn version(&self) -> Option<&str> {
        self.field("version")
    }

    /// Render as a document. Header values are flattened to one line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.frontmatter.is_empty() {
            out.push_str(DELIMITER);
            out.push('\n');
            for (key, value) in &self.frontmatter {
                out.push_str(key);
                out.push_str(": ");
                out.push_str(&value.replace(['\r', '\n'], " "));
                out.push('\n');
            }
            out.push_str(DELIMITER);
            out.push('\n');
        }
        out.push_str(&self.body);
        out
    }
}

/// Builds the header of a rendered manifest in a fixed field order.
#[derive(Debug, Default)]
pub(crate) struct ManifestWriter {
    fields: Vec<(String, String)>,
}

impl ManifestWriter {
    pub(crate) fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if !self.fields.iter().any(|(k, _)| *k == key) {
            self.fields.push((key, value.into()));
        }
        self
    }

    pub(crate) fn finish(self, body: &str) -> String {
        let mut out = String::from(DELIMITER);
        out.push('\n');
        for (key, value) in self.fields {
            out.push_str(&key);
            out.push_str(": ");
            out.push_str(&value.replace(['\r', '\n'], " "));
            out.push('\n');
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(body);
        out
    }
}
