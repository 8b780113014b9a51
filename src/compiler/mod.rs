//! Shader Compiler Backend
//!
//! The [`ShaderCompiler`] trait is the seam between the pass cache and
//! whatever turns a [`CreateInfo`] into a program object. It offers two
//! paths:
//!
//! | Path | Calls | Blocking |
//! |------|-------|----------|
//! | Immediate | [`compile_sync`](ShaderCompiler::compile_sync) | yes |
//! | Batched   | [`compile_batch_begin`](ShaderCompiler::compile_batch_begin) → [`compile_batch_poll`](ShaderCompiler::compile_batch_poll) → [`compile_batch_finalize`](ShaderCompiler::compile_batch_finalize) | only `finalize` |
//!
//! A [`BatchHandle`] is not `Clone`: finalizing or cancelling consumes it, so
//! a job can be resolved at most once.

pub mod validate;

#[cfg(not(target_arch = "wasm32"))]
pub mod threaded;

pub use validate::{ResourceLimits, validate_resources};

#[cfg(not(target_arch = "wasm32"))]
pub use threaded::{ProgramBuilder, SourceValidator, ThreadedCompiler};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codegen::CreateInfo;
use crate::errors::Result;

/// Scheduling priority of a batched compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompilePriority {
    /// Speculative work (optimized variants).
    Low,
    /// Ordinary deferred materials.
    Medium,
    /// Needed for the next frame.
    High,
}

/// Backend program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub u64);

/// In-flight batch job. Consumed by finalize/cancel.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BatchHandle(u64);

impl BatchHandle {
    /// Backends mint handles from their own job ids.
    #[inline]
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub trait ShaderCompiler: Send + Sync {
    /// Compiles immediately on the calling thread.
    fn compile_sync(&self, info: &CreateInfo) -> Result<ShaderHandle>;

    /// Queues `info` for background compilation.
    fn compile_batch_begin(&self, info: Arc<CreateInfo>, priority: CompilePriority)
    -> BatchHandle;

    /// `true` once `finalize` would not block.
    fn compile_batch_poll(&self, handle: &BatchHandle) -> bool;

    /// Waits for the job if needed and returns its program.
    fn compile_batch_finalize(&self, handle: BatchHandle) -> Result<ShaderHandle>;

    /// Abandons the job and releases everything it holds.
    fn compile_batch_cancel(&self, handle: BatchHandle);

    /// Frees a program the cache evicted.
    fn destroy_shader(&self, _shader: ShaderHandle) {}

    /// Whether the backend benefits from constant-folded variants.
    fn supports_optimization(&self) -> bool {
        true
    }

    fn limits(&self) -> ResourceLimits {
        ResourceLimits::default()
    }
}
