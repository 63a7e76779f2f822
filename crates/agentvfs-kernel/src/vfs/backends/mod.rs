//! VFS backends.
//!
//! Backends implement [`VfsOps`](super::VfsOps) over one namespace
//! subsystem each. Paths they receive are relative to their segment root.

mod memory;
mod skills;

pub use memory::MemoryBackend;
pub use skills::SkillMountBackend;
