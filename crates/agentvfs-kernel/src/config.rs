//! Namespace configuration.
//!
//! ```toml
//! [index]
//! dimensions = 256
//! min_score = 0.05
//!
//! [skills]
//! default_timeout_ms = 5000
//!
//! [[sessions]]
//! principal = "reader"
//! prefixes = ["memory/notes"]
//! operations = ["read", "list"]
//! ```
//!
//! Every section is optional; missing fields take their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agentvfs_types::{AccessScope, OperationKind, VirtualPath};

use crate::index::HashedBagOfWords;

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Search index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Embedding width of the default scorer.
    pub dimensions: usize,
    /// Hits scoring at or below this are omitted.
    pub min_score: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: HashedBagOfWords::DEFAULT_DIMENSIONS,
            min_score: 0.0,
        }
    }
}

/// Skill execution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Deadline applied to executions whose context carries none.
    pub default_timeout_ms: Option<u64>,
}

impl SkillsConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

/// A named session scope that can be opened by principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPreset {
    pub principal: String,
    pub prefixes: Vec<VirtualPath>,
    pub operations: Vec<OperationKind>,
}

impl SessionPreset {
    pub fn scope(&self) -> AccessScope {
        AccessScope::new(self.prefixes.iter().cloned(), self.operations.iter().copied())
    }
}

/// Top-level namespace configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub index: IndexConfig,
    pub skills: SkillsConfig,
    pub sessions: Vec<SessionPreset>,
}

impl NamespaceConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), presets = config.sessions.len(), "loaded namespace config");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.index.dimensions == 0 {
            return Err(ConfigError::Invalid("index.dimensions must be positive".into()));
        }
        if !self.index.min_score.is_finite() {
            return Err(ConfigError::Invalid("index.min_score must be finite".into()));
        }
        if self.skills.default_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "skills.default_timeout_ms must be positive".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for preset in &self.sessions {
            if !seen.insert(preset.principal.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate session preset `{}`",
                    preset.principal
                )));
            }
        }
        Ok(())
    }

    /// The preset for a principal.
    pub fn preset(&self, principal: &str) -> Option<&SessionPreset> {
        self.sessions.iter().find(|p| p.principal == principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NamespaceConfig::from_toml_str("").unwrap();
        assert_eq!(config, NamespaceConfig::default());
        assert_eq!(config.index.dimensions, 256);
        assert_eq!(config.skills.default_timeout(), None);
    }

    #[test]
    fn test_full_document() {
        let config = NamespaceConfig::from_toml_str(
            r#"
            [index]
            dimensions = 64
            min_score = 0.1

            [skills]
            default_timeout_ms = 250

            [[sessions]]
            principal = "reader"
            prefixes = ["memory/notes"]
            operations = ["read", "list"]
            "#,
        )
        .unwrap();

        assert_eq!(config.index.dimensions, 64);
        assert_eq!(config.skills.default_timeout(), Some(Duration::from_millis(250)));

        let preset = config.preset("reader").unwrap();
        let scope = preset.scope();
        let key = VirtualPath::parse("memory/notes/a").unwrap();
        assert!(scope.permits(&key, OperationKind::Read));
        assert!(!scope.permits(&key, OperationKind::Write));
        assert!(config.preset("writer").is_none());
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            NamespaceConfig::from_toml_str("[index]\ndimensions = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NamespaceConfig::from_toml_str("[index]\ndimensions = \"wide\"\n"),
            Err(ConfigError::Parse(_))
        ));
        let bad_path = "[[sessions]]\nprincipal = \"x\"\nprefixes = [\"memory/../etc\"]\noperations = []\n";
        assert!(matches!(
            NamespaceConfig::from_toml_str(bad_path),
            Err(ConfigError::Parse(_))
        ));
        let dup = "[[sessions]]\nprincipal = \"x\"\nprefixes = []\noperations = []\n\
                   [[sessions]]\nprincipal = \"x\"\nprefixes = []\noperations = []\n";
        assert!(matches!(
            NamespaceConfig::from_toml_str(dup),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[skills]\ndefault_timeout_ms = 1000").unwrap();

        let config = NamespaceConfig::load(file.path()).unwrap();
        assert_eq!(config.skills.default_timeout_ms, Some(1000));

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            NamespaceConfig::load(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
