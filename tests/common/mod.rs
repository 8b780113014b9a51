//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use glam::{Vec3, Vec4};
use myth_shadergraph::codegen::CodegenOutput;
use myth_shadergraph::compiler::{
    BatchHandle, CompilePriority, ResourceLimits, ShaderCompiler, ShaderHandle,
};
use myth_shadergraph::graph::{AttributeType, DataType, ImageKey, NodeGraph, OutputKind, SamplerState};
use myth_shadergraph::material::MaterialInfo;
use myth_shadergraph::{CreateInfo, PassCache, PassCacheSettings, Result, ShaderGraphError};
use parking_lot::Mutex;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Counting compiler
// ============================================================================

/// Backend double that records every call.
///
/// Batch jobs complete when [`set_ready`](Self::set_ready) allows it.
pub struct CountingCompiler {
    pub sync_compiles: AtomicUsize,
    pub batch_begins: AtomicUsize,
    pub finalizes: AtomicUsize,
    pub cancels: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub priorities: Mutex<Vec<CompilePriority>>,
    ready: AtomicBool,
    failing: AtomicBool,
    optimization: AtomicBool,
    next_id: AtomicU64,
}

impl CountingCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sync_compiles: AtomicUsize::new(0),
            batch_begins: AtomicUsize::new(0),
            finalizes: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            priorities: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            optimization: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_supports_optimization(&self, supported: bool) {
        self.optimization.store(supported, Ordering::SeqCst);
    }

    /// Programs requested through either path.
    pub fn compiles(&self) -> usize {
        self.sync_compiles.load(Ordering::SeqCst) + self.batch_begins.load(Ordering::SeqCst)
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn outcome(&self, name: &str) -> Result<ShaderHandle> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ShaderGraphError::compile(name, "forced failure"))
        } else {
            Ok(ShaderHandle(self.next_id.fetch_add(1, Ordering::SeqCst)))
        }
    }
}

impl ShaderCompiler for CountingCompiler {
    fn compile_sync(&self, info: &CreateInfo) -> Result<ShaderHandle> {
        self.sync_compiles.fetch_add(1, Ordering::SeqCst);
        self.outcome(&info.name)
    }

    fn compile_batch_begin(&self, _info: Arc<CreateInfo>, priority: CompilePriority) -> BatchHandle {
        self.batch_begins.fetch_add(1, Ordering::SeqCst);
        self.priorities.lock().push(priority);
        BatchHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn compile_batch_poll(&self, _handle: &BatchHandle) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn compile_batch_finalize(&self, handle: BatchHandle) -> Result<ShaderHandle> {
        self.finalizes.fetch_add(1, Ordering::SeqCst);
        self.outcome(&format!("batch {}", handle.id()))
    }

    fn compile_batch_cancel(&self, _handle: BatchHandle) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy_shader(&self, _shader: ShaderHandle) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn supports_optimization(&self) -> bool {
        self.optimization.load(Ordering::SeqCst)
    }

    fn limits(&self) -> ResourceLimits {
        ResourceLimits::default()
    }
}

pub fn cache_with(compiler: &Arc<CountingCompiler>) -> Arc<PassCache> {
    init_logger();
    let backend: Arc<dyn ShaderCompiler> = compiler.clone();
    PassCache::init(backend, PassCacheSettings::default())
}

// ============================================================================
// Graphs
// ============================================================================

/// `A → B → C` feeding the surface, plus a disconnected `D` reading an
/// attribute.
pub fn chain_graph(graph: &mut NodeGraph) {
    let color = graph.uniform(Vec3::new(0.8, 0.1, 0.1));
    let a = graph.call("node_rgb", &[color], DataType::Vec3);
    let b = graph.call("node_gamma", &[a], DataType::Vec3);
    let c = graph.call("node_emission", &[b], DataType::Closure);
    graph.set_output(OutputKind::Surface, c);

    let uv = graph.attribute(AttributeType::UvMap, "UVMap");
    graph.call("node_unused", &[uv], DataType::Float);
}

/// Graph that passes the default optimization heuristic (four textures) and
/// has uniforms worth folding.
pub fn textured_graph(graph: &mut NodeGraph) {
    let uv = graph.attribute(AttributeType::UvMap, "UVMap");
    let mut layers = Vec::new();
    for i in 0..4 {
        let tex = graph.image_texture(ImageKey(i), SamplerState::default());
        layers.push(graph.call("node_tex_image", &[uv, tex], DataType::Vec4));
    }
    let blended = graph.call("node_blend4", &layers, DataType::Vec4);
    let tint = graph.uniform(Vec4::new(1.0, 0.9, 0.8, 1.0));
    let mixed = graph.call("node_mix_rgb", &[tint, blended], DataType::Vec3);
    let bsdf = graph.call("node_bsdf_principled", &[mixed], DataType::Closure);
    graph.set_output(OutputKind::Surface, bsdf);
}

pub fn no_finalize(_info: &MaterialInfo, _output: &mut CodegenOutput) {}
