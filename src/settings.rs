//! Engine Settings
//!
//! Tuning parameters for the pass cache, the optimization heuristic and the
//! code generator.
//!
//! None of these values affect correctness. They shape *when* work happens:
//! how long optimized variants wait before compiling, how long unreferenced
//! passes linger before eviction, and which materials are worth a second,
//! constant-folded compilation at all.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_shadergraph::settings::PassCacheSettings;
//! use std::time::Duration;
//!
//! // Activate optimized variants sooner on a fast backend.
//! let settings = PassCacheSettings {
//!     optimization_delay: Duration::from_secs(2),
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::compiler::CompilePriority;
use crate::utils::Duration;

// ---------------------------------------------------------------------------
// PassCacheSettings
// ---------------------------------------------------------------------------

/// Lifetime policy of the [`PassCache`](crate::pass::PassCache).
///
/// | Field                    | Description                                         | Default |
/// |--------------------------|-----------------------------------------------------|---------|
/// | `optimization_delay`     | Age an optimized pass must reach before submission  | 10 s    |
/// | `base_gc_threshold`      | Idle time before an unreferenced base pass is freed | 60 s    |
/// | `optimized_gc_threshold` | Idle time before an unreferenced optimized pass goes| 1 s     |
/// | `enable_optimization`    | Generate optimized variants at all                  | `true`  |
///
/// Optimized variants are deliberately slower to activate and faster to evict
/// than base passes: they are cheap to regenerate but occupy compiler threads
/// and backend memory speculatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCacheSettings {
    /// Minimum age of an optimization pass before it is handed to the backend.
    pub optimization_delay: Duration,
    /// Idle time after which a zero-refcount base pass is evicted.
    pub base_gc_threshold: Duration,
    /// Idle time after which a zero-refcount optimization pass is evicted.
    pub optimized_gc_threshold: Duration,
    /// Master switch for optimized variants.
    pub enable_optimization: bool,
}

impl Default for PassCacheSettings {
    fn default() -> Self {
        Self {
            optimization_delay: Duration::from_secs(10),
            base_gc_threshold: Duration::from_secs(60),
            optimized_gc_threshold: Duration::from_secs(1),
            enable_optimization: true,
        }
    }
}

impl PassCacheSettings {
    /// GC threshold for the given variant.
    #[inline]
    #[must_use]
    pub fn gc_threshold(&self, is_optimization_pass: bool) -> Duration {
        if is_optimization_pass {
            self.optimized_gc_threshold
        } else {
            self.base_gc_threshold
        }
    }
}

// ---------------------------------------------------------------------------
// OptimizationHeuristic
// ---------------------------------------------------------------------------

/// Structural thresholds deciding whether an optimized variant is worth it.
///
/// A pass qualifies when **any** threshold is reached. Trivial materials never
/// pay for a second compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationHeuristic {
    pub min_nodes: usize,
    pub min_uniforms: usize,
    pub min_textures: usize,
}

impl Default for OptimizationHeuristic {
    fn default() -> Self {
        Self {
            min_nodes: 60,
            min_uniforms: 64,
            min_textures: 4,
        }
    }
}

impl OptimizationHeuristic {
    #[must_use]
    pub fn qualifies(&self, nodes: usize, uniforms: usize, textures: usize) -> bool {
        nodes >= self.min_nodes || uniforms >= self.min_uniforms || textures >= self.min_textures
    }
}

// ---------------------------------------------------------------------------
// CodegenOptions
// ---------------------------------------------------------------------------

/// Engine-specific layout parameters for code generation.
///
/// These values end up in the generated source and therefore in the pass
/// hash: two engines with different reserved slots never share passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenOptions {
    /// Texture units owned by the engine; material samplers start after them.
    pub reserved_texture_slots: u32,
    /// Binding slot of the material `NodeTree` uniform block.
    pub uniform_buffer_slot: u32,
    /// Binding slot of the uniform-attribute block.
    pub uniform_attribute_slot: u32,
    /// Thresholds for [`Codegen::should_optimize_heuristic`](crate::codegen::Codegen::should_optimize_heuristic).
    pub heuristic: OptimizationHeuristic,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            reserved_texture_slots: 0,
            uniform_buffer_slot: 0,
            uniform_attribute_slot: 1,
            heuristic: OptimizationHeuristic::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// MaterialOptions
// ---------------------------------------------------------------------------

/// Per-material compilation request.
///
/// `deferred = false` compiles the base pass inline (blocking the caller on a
/// cache miss); `deferred = true` submits it to the backend batch queue at
/// `priority` and lets [`PassCache::update`](crate::pass::PassCache::update)
/// finish it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialOptions {
    pub deferred: bool,
    pub priority: CompilePriority,
    pub codegen: CodegenOptions,
}

impl Default for MaterialOptions {
    fn default() -> Self {
        Self {
            deferred: true,
            priority: CompilePriority::Medium,
            codegen: CodegenOptions::default(),
        }
    }
}
