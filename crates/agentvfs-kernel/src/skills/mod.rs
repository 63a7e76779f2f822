//! Skills: pluggable executable capabilities mounted into the namespace.
//!
//! A skill is any type implementing [`Skill`]. The [`SkillRegistry`] owns the
//! lifecycle record for each one and calls into the implementation only
//! through an `Arc<dyn Skill>`; it never copies implementation state.
//!
//! ```text
//! Registered ──init──▶ Initialized ──mount──▶ Mounted
//!     │                  │   ▲   ◀──unmount──    │
//!     │                  └───┘ (reconfigure)     │
//!     └──init fails──▶ Failed ◀──init/mount fails┘(from Initialized)
//! ```

pub mod manifest;
pub mod registry;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use agentvfs_types::{SessionId, VirtualPath};

pub use manifest::{ManifestError, SkillManifest};
pub use registry::{CapturedSkill, Invocation, SkillRegistry};

/// What flavor of capability a skill provides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkillKind {
    /// Runs code.
    Code,
    /// A prompt template or instruction document.
    Prompt,
    /// Wraps an external tool.
    Tool,
}

/// Lifecycle state of a registered skill.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkillState {
    Registered,
    Initialized,
    Mounted,
    /// Init or mount failed. Only `unregister` leaves this state.
    Failed,
}

impl SkillState {
    /// Whether moving from `self` to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Registered, Self::Initialized)
                | (Self::Initialized, Self::Initialized)
                | (Self::Initialized, Self::Mounted)
                | (Self::Mounted, Self::Initialized)
                | (Self::Registered, Self::Failed)
                | (Self::Initialized, Self::Failed)
        )
    }

    /// Whether `execute` is allowed.
    pub fn is_executable(self) -> bool {
        matches!(self, Self::Initialized | Self::Mounted)
    }
}

/// Free-form init configuration, a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillConfig(serde_json::Map<String, serde_json::Value>);

impl SkillConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration from a JSON value. Anything but an object is rejected.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }
}

/// Per-call context handed to [`Skill::execute`].
///
/// When `deadline` expires the caller gets `Timeout` and `cancel` is
/// triggered; implementations that run long should watch it.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// The calling session, when the call came through a namespace session.
    pub session: Option<SessionId>,
    /// Time budget for the call.
    pub deadline: Option<Duration>,
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// An executable capability.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Unique name; also the default mount point under `skills/`.
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> &str;

    /// Extra metadata published in the manifest header.
    fn metadata(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }

    /// Optional manifest document. Skills without one return `None`.
    fn document(&self) -> Option<String> {
        None
    }

    /// Prepare for execution. May be called again to reconfigure.
    async fn init(&self, config: &SkillConfig) -> anyhow::Result<()>;

    /// Run with raw input bytes, returning raw output bytes.
    async fn execute(&self, input: &[u8], ctx: &CallContext) -> anyhow::Result<Vec<u8>>;
}

/// The registry's public record of a skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillInfo {
    pub name: String,
    pub version: String,
    pub kind: SkillKind,
    pub mount_path: VirtualPath,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Parsed manifest document, when the implementation supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<SkillManifest>,
    pub state: SkillState,
    /// Message of the failure that moved the skill to `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// When the skill was registered (Unix millis).
    pub registered_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use SkillState::*;
        assert!(Registered.can_transition_to(Initialized));
        assert!(Initialized.can_transition_to(Initialized));
        assert!(Initialized.can_transition_to(Mounted));
        assert!(Mounted.can_transition_to(Initialized));
        assert!(Registered.can_transition_to(Failed));
        assert!(Initialized.can_transition_to(Failed));

        assert!(!Registered.can_transition_to(Mounted));
        assert!(!Mounted.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Initialized));
        assert!(!Failed.can_transition_to(Registered));
    }

    #[test]
    fn test_executable_states() {
        assert!(!SkillState::Registered.is_executable());
        assert!(SkillState::Initialized.is_executable());
        assert!(SkillState::Mounted.is_executable());
        assert!(!SkillState::Failed.is_executable());
    }

    #[test]
    fn test_enum_strings() {
        assert_eq!(SkillKind::Prompt.to_string(), "prompt");
        assert_eq!("tool".parse::<SkillKind>().unwrap(), SkillKind::Tool);
        assert_eq!(SkillState::Initialized.to_string(), "initialized");
        assert_eq!(
            serde_json::to_string(&SkillState::Mounted).unwrap(),
            "\"mounted\""
        );
    }

    #[test]
    fn test_skill_config() {
        let config = SkillConfig::new().with("greeting", "hi").with("retries", 3);
        assert_eq!(config.get_str("greeting"), Some("hi"));
        assert_eq!(config.get("retries"), Some(&serde_json::json!(3)));

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"greeting":"hi","retries":3}"#);

        assert!(SkillConfig::from_value(serde_json::json!({})).unwrap().is_empty());
        assert!(SkillConfig::from_value(serde_json::json!([1])).is_none());
    }

    #[test]
    fn test_call_context_builders() {
        let session = SessionId::new();
        let ctx = CallContext::new()
            .with_session(session)
            .with_deadline(Duration::from_millis(50));
        assert_eq!(ctx.session, Some(session));
        assert_eq!(ctx.deadline, Some(Duration::from_millis(50)));
        assert!(!ctx.is_cancelled());
        ctx.cancel.cancel();
        assert!(ctx.is_cancelled());
    }
}
