//! Cached compilation units and counted references to them.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::codegen::CreateInfo;
use crate::compiler::ShaderHandle;
use crate::utils::Instant;

/// Identifies the engine (render pipeline) a pass was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineId(pub u32);

/// Cache identity of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassKey {
    pub engine: EngineId,
    pub is_optimization_pass: bool,
    /// xxh3-128 of the generated source.
    pub hash: u128,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassStatus {
    Queued = 0,
    Success = 1,
    Failed = 2,
}

impl PassStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Success,
            2 => Self::Failed,
            _ => Self::Queued,
        }
    }
}

/// What a cache miss needs to create a pass.
#[derive(Debug, Clone)]
pub struct PassDescriptor {
    pub create_info: CreateInfo,
    pub should_optimize: bool,
}

/// One compiled (or compiling) shader program shared by every material whose
/// graph generates the same source.
///
/// Status only moves forward: `Queued → Success | Failed`.
pub struct Pass {
    key: PassKey,
    create_info: Arc<CreateInfo>,
    status: AtomicU8,
    refcount: AtomicU32,
    shader: OnceLock<ShaderHandle>,
    created: Instant,
    should_optimize: bool,
}

impl Pass {
    pub(crate) fn new(
        key: PassKey,
        create_info: Arc<CreateInfo>,
        should_optimize: bool,
        created: Instant,
    ) -> Self {
        Self {
            key,
            create_info,
            status: AtomicU8::new(PassStatus::Queued as u8),
            refcount: AtomicU32::new(0),
            shader: OnceLock::new(),
            created,
            should_optimize,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> PassKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> PassStatus {
        PassStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    #[inline]
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Relaxed)
    }

    /// Program handle, present once the pass succeeded.
    #[must_use]
    pub fn shader(&self) -> Option<ShaderHandle> {
        match self.status() {
            PassStatus::Success => self.shader.get().copied(),
            _ => None,
        }
    }

    #[must_use]
    pub fn create_info(&self) -> &Arc<CreateInfo> {
        &self.create_info
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created
    }

    #[must_use]
    pub fn should_optimize(&self) -> bool {
        self.should_optimize
    }

    #[must_use]
    pub fn is_optimization_pass(&self) -> bool {
        self.key.is_optimization_pass
    }

    /// Records the program and publishes `Success`.
    pub(crate) fn complete(&self, shader: ShaderHandle) {
        debug_assert_eq!(self.status(), PassStatus::Queued, "pass finished twice");
        let _ = self.shader.set(shader);
        self.status
            .store(PassStatus::Success as u8, Ordering::Release);
    }

    pub(crate) fn fail(&self) {
        debug_assert_eq!(self.status(), PassStatus::Queued, "pass finished twice");
        self.status.store(PassStatus::Failed as u8, Ordering::Release);
    }

    /// Program handle regardless of status; used when destroying.
    pub(crate) fn shader_unchecked(&self) -> Option<ShaderHandle> {
        self.shader.get().copied()
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("name", &self.create_info.name)
            .field("key", &self.key)
            .field("status", &self.status())
            .field("refcount", &self.refcount())
            .finish_non_exhaustive()
    }
}

// ─── PassRef ─────────────────────────────────────────────────────────────────

/// Counted reference to a cached [`Pass`].
///
/// Cloning increments the pass refcount and dropping decrements it. A pass is
/// only eligible for garbage collection while no `PassRef` to it exists.
/// Dropping the last reference never frees anything by itself.
pub struct PassRef {
    pass: Arc<Pass>,
}

impl PassRef {
    pub(crate) fn new(pass: &Arc<Pass>) -> Self {
        pass.refcount.fetch_add(1, Ordering::Relaxed);
        Self {
            pass: Arc::clone(pass),
        }
    }

    /// Whether both references point at the same pass.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.pass, &b.pass)
    }
}

impl Clone for PassRef {
    fn clone(&self) -> Self {
        Self::new(&self.pass)
    }
}

impl Drop for PassRef {
    fn drop(&mut self) {
        let previous = self.pass.refcount.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "pass refcount underflow");
    }
}

impl Deref for PassRef {
    type Target = Pass;

    fn deref(&self) -> &Pass {
        &self.pass
    }
}

impl fmt::Debug for PassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pass.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass() -> Arc<Pass> {
        let key = PassKey {
            engine: EngineId(0),
            is_optimization_pass: false,
            hash: 42,
        };
        Arc::new(Pass::new(key, Arc::default(), false, Instant::now()))
    }

    #[test]
    fn refs_count_clones_and_drops() {
        let p = pass();
        let a = PassRef::new(&p);
        let b = a.clone();
        assert_eq!(p.refcount(), 2);
        assert!(PassRef::ptr_eq(&a, &b));
        drop(a);
        assert_eq!(p.refcount(), 1);
        drop(b);
        assert_eq!(p.refcount(), 0);
    }

    #[test]
    fn shader_visible_only_after_success() {
        let p = pass();
        assert_eq!(p.status(), PassStatus::Queued);
        assert_eq!(p.shader(), None);
        p.complete(ShaderHandle(7));
        assert_eq!(p.status(), PassStatus::Success);
        assert_eq!(p.shader(), Some(ShaderHandle(7)));
    }
}
