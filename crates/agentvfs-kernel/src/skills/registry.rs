//! Skill registry and execution engine.
//!
//! The name map is a `parking_lot::RwLock` held only for lookups and
//! structural changes. Each skill carries its own `tokio::sync::Mutex` that
//! serializes lifecycle transitions of that one skill (init may await), so a
//! slow init never blocks another skill. Execution clones the implementation
//! handle and runs with no registry lock held.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use agentvfs_types::{VirtualPath, now_millis};

use super::manifest::{ManifestWriter, SkillManifest};
use super::{CallContext, Skill, SkillConfig, SkillInfo, SkillKind, SkillState};
use crate::vfs::router::SKILLS_SEGMENT;
use crate::vfs::{DirEntry, VfsError, VfsResult};

struct SkillSlot {
    info: RwLock<SkillInfo>,
    implementation: Arc<dyn Skill>,
    lifecycle: tokio::sync::Mutex<()>,
    /// Rendered manifest, present while mounted.
    manifest: RwLock<Option<Arc<[u8]>>>,
}

impl SkillSlot {
    fn new(info: SkillInfo, implementation: Arc<dyn Skill>, manifest: Option<Arc<[u8]>>) -> Self {
        Self {
            info: RwLock::new(info),
            implementation,
            lifecycle: tokio::sync::Mutex::new(()),
            manifest: RwLock::new(manifest),
        }
    }

    fn snapshot(&self) -> SkillInfo {
        self.info.read().clone()
    }

    fn state(&self) -> SkillState {
        self.info.read().state
    }

    /// Move to `target`, or fail with `InvalidState`. Caller holds `lifecycle`.
    fn transition(&self, target: SkillState) -> VfsResult<()> {
        let mut info = self.info.write();
        if !info.state.can_transition_to(target) {
            return Err(VfsError::invalid_state(format!(
                "skill `{}`: {} -> {}",
                info.name, info.state, target
            )));
        }
        tracing::info!(skill = %info.name, from = %info.state, to = %target, "skill transition");
        info.state = target;
        if target != SkillState::Failed {
            info.failure = None;
        }
        Ok(())
    }

    /// Record a failure. Caller holds `lifecycle`.
    fn fail(&self, message: &str) -> VfsResult<()> {
        self.transition(SkillState::Failed)?;
        self.info.write().failure = Some(message.to_string());
        Ok(())
    }
}

/// A registry entry frozen for a snapshot.
#[derive(Clone)]
pub struct CapturedSkill {
    pub info: SkillInfo,
    implementation: Arc<dyn Skill>,
    manifest: Option<Arc<[u8]>>,
}

impl std::fmt::Debug for CapturedSkill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedSkill")
            .field("info", &self.info)
            .field("mounted", &self.manifest.is_some())
            .finish()
    }
}

/// A ready-to-run call, detached from the registry.
///
/// Obtaining one checks the skill's state; running it holds no lock.
pub struct Invocation {
    name: String,
    implementation: Arc<dyn Skill>,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation").field("name", &self.name).finish()
    }
}

impl Invocation {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the skill, bounded by the context's deadline.
    #[tracing::instrument(skip(self, input, ctx), fields(skill = %self.name, input_len = input.len()), name = "skill.execute")]
    pub async fn run(self, input: &[u8], ctx: CallContext) -> VfsResult<Vec<u8>> {
        let call = self.implementation.execute(input, &ctx);
        let result = match ctx.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => {
                    ctx.cancel.cancel();
                    tracing::warn!(skill = %self.name, ?deadline, "skill execution timed out");
                    return Err(VfsError::timeout(format!(
                        "skill `{}` exceeded {deadline:?}",
                        self.name
                    )));
                }
            },
            None => call.await,
        };

        result.map_err(|e| {
            tracing::debug!(skill = %self.name, error = %e, "skill execution failed");
            VfsError::internal(format!("skill `{}`: {e:#}", self.name))
        })
    }
}

/// Registry of skills, keyed by unique name.
pub struct SkillRegistry {
    slots: RwLock<BTreeMap<String, Arc<SkillSlot>>>,
    root: VirtualPath,
}

impl std::fmt::Debug for SkillRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillRegistry")
            .field("skills", &self.slots.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(BTreeMap::new()),
            root: VirtualPath::from_segments([SKILLS_SEGMENT]).unwrap_or_default(),
        }
    }

    /// The `skills` segment root.
    pub fn root(&self) -> &VirtualPath {
        &self.root
    }

    fn slot(&self, name: &str) -> VfsResult<Arc<SkillSlot>> {
        self.slots
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| VfsError::not_found(format!("skill `{name}`")))
    }

    /// Default mount path for a skill name.
    pub fn default_mount_path(&self, name: &str) -> VfsResult<VirtualPath> {
        check_name(name)?;
        Ok(self.root.join(name)?)
    }

    /// Where `name` is (or would be) mounted.
    pub fn mount_path_of(&self, name: &str) -> VfsResult<VirtualPath> {
        match self.slots.read().get(name) {
            Some(slot) => Ok(slot.info.read().mount_path.clone()),
            None => self.default_mount_path(name),
        }
    }

    /// Add a skill in the `Registered` state.
    pub fn register(
        &self,
        implementation: Arc<dyn Skill>,
        mount_path: Option<VirtualPath>,
        kind: SkillKind,
    ) -> VfsResult<SkillInfo> {
        let name = implementation.name().to_string();
        check_name(&name)?;
        let mount_path = match mount_path {
            Some(path) => path,
            None => self.default_mount_path(&name)?,
        };
        if mount_path.len() <= self.root.len() || !mount_path.starts_with(&self.root) {
            return Err(VfsError::invalid_path(format!(
                "{mount_path} is not under {}",
                self.root
            )));
        }

        let document = match implementation.document() {
            Some(text) => Some(SkillManifest::parse(&text).map_err(|e| {
                VfsError::invalid_argument(format!("skill `{name}` manifest: {e}"))
            })?),
            None => None,
        };

        let info = SkillInfo {
            description: document
                .as_ref()
                .and_then(|d| d.description())
                .unwrap_or(implementation.description())
                .to_string(),
            version: document
                .as_ref()
                .and_then(|d| d.version())
                .unwrap_or(implementation.version())
                .to_string(),
            name: name.clone(),
            kind,
            mount_path: mount_path.clone(),
            metadata: implementation.metadata(),
            document,
            state: SkillState::Registered,
            failure: None,
            registered_at: now_millis(),
        };

        let mut slots = self.slots.write();
        if slots.contains_key(&name) {
            return Err(VfsError::duplicate_name(format!("skill `{name}`")));
        }
        let claimed = slots.values().any(|slot| {
            let other = slot.info.read();
            other.mount_path.starts_with(&mount_path) || mount_path.starts_with(&other.mount_path)
        });
        if claimed {
            return Err(VfsError::duplicate_name(format!("mount path {mount_path}")));
        }
        slots.insert(
            name.clone(),
            Arc::new(SkillSlot::new(info.clone(), implementation, None)),
        );
        drop(slots);

        tracing::info!(skill = %name, %kind, mount = %mount_path, "skill registered");
        Ok(info)
    }

    /// Call the implementation's `init`. Failure moves the skill to `Failed`.
    pub async fn initialize(&self, name: &str, config: &SkillConfig) -> VfsResult<SkillInfo> {
        let slot = self.slot(name)?;
        let _lifecycle = slot.lifecycle.lock().await;

        let state = slot.state();
        if !matches!(state, SkillState::Registered | SkillState::Initialized) {
            return Err(VfsError::invalid_state(format!(
                "skill `{name}` cannot be initialized while {state}"
            )));
        }

        if let Err(e) = slot.implementation.init(config).await {
            let message = format!("{e:#}");
            tracing::warn!(skill = %name, error = %message, "skill init failed");
            slot.fail(&message)?;
            return Err(VfsError::internal(format!("skill `{name}` init: {message}")));
        }

        slot.transition(SkillState::Initialized)?;
        Ok(slot.snapshot())
    }

    /// Check that `name` may run and detach a handle to it.
    pub fn invocation(&self, name: &str) -> VfsResult<Invocation> {
        let slot = self.slot(name)?;
        let state = slot.state();
        if !state.is_executable() {
            return Err(VfsError::invalid_state(format!(
                "skill `{name}` cannot execute while {state}"
            )));
        }
        Ok(Invocation {
            name: name.to_string(),
            implementation: slot.implementation.clone(),
        })
    }

    /// Execute a skill with raw input. Output is returned unchanged.
    pub async fn execute(&self, name: &str, input: &[u8], ctx: CallContext) -> VfsResult<Vec<u8>> {
        self.invocation(name)?.run(input, ctx).await
    }

    /// Publish the skill's manifest at its mount path. Idempotent.
    pub async fn mount(&self, name: &str) -> VfsResult<SkillInfo> {
        let slot = self.slot(name)?;
        let _lifecycle = slot.lifecycle.lock().await;

        match slot.state() {
            SkillState::Mounted => return Ok(slot.snapshot()),
            SkillState::Initialized => {}
            state => {
                return Err(VfsError::invalid_state(format!(
                    "skill `{name}` cannot be mounted while {state}"
                )));
            }
        }

        let document = match slot.implementation.document() {
            Some(text) => match SkillManifest::parse(&text) {
                Ok(document) => Some(document),
                Err(e) => {
                    let message = format!("manifest: {e}");
                    tracing::warn!(skill = %name, error = %message, "skill mount failed");
                    slot.fail(&message)?;
                    return Err(VfsError::internal(format!("skill `{name}` {message}")));
                }
            },
            None => None,
        };

        let rendered = {
            let mut info = slot.info.write();
            if let Some(document) = &document {
                if let Some(description) = document.description() {
                    info.description = description.to_string();
                }
                if let Some(version) = document.version() {
                    info.version = version.to_string();
                }
            }
            info.document = document;
            render_manifest(&info)
        };
        *slot.manifest.write() = Some(Arc::from(rendered.into_bytes()));

        slot.transition(SkillState::Mounted)?;
        Ok(slot.snapshot())
    }

    /// Withdraw a mounted skill's manifest; the skill stays executable.
    pub async fn unmount(&self, name: &str) -> VfsResult<SkillInfo> {
        let slot = self.slot(name)?;
        let _lifecycle = slot.lifecycle.lock().await;
        if slot.state() != SkillState::Mounted {
            return Err(VfsError::invalid_state(format!("skill `{name}` is not mounted")));
        }
        slot.transition(SkillState::Initialized)?;
        *slot.manifest.write() = None;
        Ok(slot.snapshot())
    }

    /// Remove a skill in any state, freeing its name and mount path.
    pub async fn unregister(&self, name: &str) -> VfsResult<SkillInfo> {
        let slot = self.slot(name)?;
        let _lifecycle = slot.lifecycle.lock().await;
        let removed = {
            let mut slots = self.slots.write();
            match slots.get(name) {
                Some(current) if Arc::ptr_eq(current, &slot) => slots.remove(name),
                _ => None,
            }
        };
        if removed.is_none() {
            return Err(VfsError::not_found(format!("skill `{name}`")));
        }
        tracing::info!(skill = %name, "skill unregistered");
        Ok(slot.snapshot())
    }

    pub fn get(&self, name: &str) -> VfsResult<SkillInfo> {
        Ok(self.slot(name)?.snapshot())
    }

    /// Skills sorted by name, optionally of one kind.
    pub fn list(&self, kind: Option<SkillKind>) -> Vec<SkillInfo> {
        self.slots
            .read()
            .values()
            .map(|slot| slot.snapshot())
            .filter(|info| kind.is_none_or(|k| info.kind == k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rendered manifest of a mounted skill.
    pub fn manifest(&self, name: &str) -> VfsResult<Arc<[u8]>> {
        let slot = self.slot(name)?;
        let manifest = slot.manifest.read().clone();
        manifest.ok_or_else(|| VfsError::invalid_state(format!("skill `{name}` is not mounted")))
    }

    // ========================================================================
    // Path view (mounted skills only)
    // ========================================================================

    /// The mounted skill whose mount path is exactly `path`.
    pub fn mounted_at(&self, path: &VirtualPath) -> Option<(SkillInfo, Arc<[u8]>)> {
        self.slots.read().values().find_map(|slot| {
            let info = slot.info.read();
            if info.mount_path != *path {
                return None;
            }
            let manifest = slot.manifest.read().clone()?;
            Some((info.clone(), manifest))
        })
    }

    /// Immediate children of `prefix` among mounted skills' paths.
    pub fn mount_children(&self, prefix: &VirtualPath) -> Vec<DirEntry> {
        let depth = prefix.len();
        let mut entries: Vec<DirEntry> = self
            .slots
            .read()
            .values()
            .filter(|slot| slot.manifest.read().is_some())
            .filter_map(|slot| {
                let info = slot.info.read();
                let path = &info.mount_path;
                if path.len() <= depth || !path.starts_with(prefix) {
                    return None;
                }
                let name = path.segments()[depth].clone();
                Some(if path.len() == depth + 1 {
                    DirEntry::file(name)
                } else {
                    DirEntry::directory(name)
                })
            })
            .collect();
        crate::vfs::types::sort_dedup(&mut entries);
        entries
    }

    // ========================================================================
    // Snapshot support
    // ========================================================================

    /// Freeze every entry: record, lifecycle state, handle, manifest.
    pub fn capture(&self) -> Vec<CapturedSkill> {
        self.slots
            .read()
            .values()
            .map(|slot| CapturedSkill {
                info: slot.snapshot(),
                implementation: slot.implementation.clone(),
                manifest: slot.manifest.read().clone(),
            })
            .collect()
    }

    /// Replace the registry's contents with captured entries.
    pub fn restore(&self, captured: &[CapturedSkill]) {
        let restored: BTreeMap<String, Arc<SkillSlot>> = captured
            .iter()
            .map(|skill| {
                (
                    skill.info.name.clone(),
                    Arc::new(SkillSlot::new(
                        skill.info.clone(),
                        skill.implementation.clone(),
                        skill.manifest.clone(),
                    )),
                )
            })
            .collect();
        *self.slots.write() = restored;
    }
}

/// A skill name must be usable as a single path segment.
fn check_name(name: &str) -> VfsResult<()> {
    VirtualPath::from_segments([name])
        .map(|_| ())
        .map_err(|e| VfsError::invalid_argument(format!("skill name `{name}`: {e}")))
}

/// Render the published manifest: identity header, document fields,
/// metadata, then the document body.
fn render_manifest(info: &SkillInfo) -> String {
    let mut writer = ManifestWriter::default()
        .field("name", info.name.as_str())
        .field("description", info.description.as_str())
        .field("version", info.version.as_str())
        .field("kind", info.kind.to_string());

    if let Some(document) = &info.document {
        for (key, value) in &document.frontmatter {
            writer = writer.field(key.as_str(), value.as_str());
        }
    }
    for (key, value) in &info.metadata {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        writer = writer.field(key.as_str(), value);
    }

    let body = info.document.as_ref().map(|d| d.body.as_str()).unwrap_or("");
    writer.finish(body)
}
