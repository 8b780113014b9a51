//! Material
//!
//! Front door of the engine. Building a [`Material`] runs the whole pipeline
//! once:
//!
//! 1. the [`ConstructGraph`] callback fills a fresh [`NodeGraph`],
//! 2. the graph is pruned and its uniform attributes finalized,
//! 3. [`Codegen`] produces the base source and its hash,
//! 4. the [`PassCache`] returns the pass for that hash, invoking the
//!    [`FinalizeCodegen`] callback and the [`ShaderAssembler`] only on a miss,
//! 5. when the pass qualifies, uniforms are folded into constants and the
//!    optimized variant is requested the same way,
//! 6. the nodes are dropped and only the resource lists are kept.
//!
//! Rendering code then only calls [`Material::shader_get`] each frame.

pub mod set;

pub use set::MaterialSet;

use std::sync::Arc;

use uuid::Uuid;

use crate::codegen::{Codegen, CodegenOutput, ShaderAssembler, UniformLayout};
use crate::compiler::{CompilePriority, ShaderHandle};
use crate::errors::Result;
use crate::graph::{
    Attribute, GraphResources, LayerAttribute, MaterialFlags, NodeGraph, TextureResource,
    UniformAttribute,
};
use crate::pass::{CompileRequest, EngineId, PassCache, PassDescriptor, PassRef, PassStatus};
use crate::settings::MaterialOptions;

// ─── Callbacks ───────────────────────────────────────────────────────────────

/// Populates the node graph of a material.
pub trait ConstructGraph {
    fn construct(&mut self, graph: &mut NodeGraph);
}

impl<F> ConstructGraph for F
where
    F: FnMut(&mut NodeGraph),
{
    fn construct(&mut self, graph: &mut NodeGraph) {
        self(graph);
    }
}

/// Engine hook run on a cache miss, before stage assembly.
///
/// Typically selects templates and adds defines or extra stage code.
pub trait FinalizeCodegen {
    fn finalize(&mut self, info: &MaterialInfo, output: &mut CodegenOutput);
}

impl<F> FinalizeCodegen for F
where
    F: FnMut(&MaterialInfo, &mut CodegenOutput),
{
    fn finalize(&mut self, info: &MaterialInfo, output: &mut CodegenOutput) {
        self(info, output);
    }
}

/// What the finalize callback knows about the material being compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialInfo {
    pub name: String,
    pub engine: EngineId,
    pub uuid: Uuid,
    pub flags: MaterialFlags,
    pub is_optimization_pass: bool,
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialStatus {
    Failed,
    Queued,
    Success,
}

/// State of the optimized variant. A failed optimization reports `Skip`:
/// the material keeps using its base shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizationStatus {
    Skip,
    Queued,
    Success,
}

// ─── Material ────────────────────────────────────────────────────────────────

pub struct Material {
    name: String,
    engine: EngineId,
    uuid: Uuid,
    flags: MaterialFlags,
    resources: GraphResources,
    uniform_layout: UniformLayout,
    uniform_buffer: Vec<u8>,
    pass: PassRef,
    optimized_pass: Option<PassRef>,
    cache: Arc<PassCache>,
}

impl Material {
    /// Builds the material and requests its passes.
    ///
    /// Fails only when `cache` has been shut down; compilation problems are
    /// reported through [`Material::status`].
    pub fn new(
        cache: &Arc<PassCache>,
        name: &str,
        engine: EngineId,
        uuid: Uuid,
        mut construct: impl ConstructGraph,
        mut finalize: impl FinalizeCodegen,
        options: &MaterialOptions,
    ) -> Result<Self> {
        let mut graph = NodeGraph::new();
        construct.construct(&mut graph);
        graph.prune_unused();
        graph.finalize_uniform_attrs();

        let mut info = MaterialInfo {
            name: name.to_owned(),
            engine,
            uuid,
            flags: graph.flags(),
            is_optimization_pass: false,
        };

        let codegen = Codegen::new(&graph, options.codegen, false).with_material_uuid(uuid);
        let should_optimize = codegen.should_optimize_heuristic();
        let base = codegen.generate();
        let uniform_layout = base.uniform_layout.clone();

        let pass = cache.get_or_create(
            engine,
            base.hash,
            false,
            CompileRequest::from(options),
            || build_descriptor(base, &info, &mut finalize, should_optimize),
        )?;

        let optimization_allowed = pass.should_optimize()
            && pass.status() != PassStatus::Failed
            && cache.settings().enable_optimization
            && cache.compiler().supports_optimization();

        let optimized_pass = if optimization_allowed && graph.optimize() > 0 {
            let optimized = Codegen::new(&graph, options.codegen, true)
                .with_material_uuid(uuid)
                .generate();
            info.is_optimization_pass = true;
            let request = CompileRequest {
                deferred: true,
                priority: CompilePriority::Low,
            };
            Some(cache.get_or_create(engine, optimized.hash, true, request, || {
                build_descriptor(optimized, &info, &mut finalize, false)
            })?)
        } else {
            None
        };

        log::debug!(
            "Material '{name}' built: status {:?}, optimized variant {}",
            pass.status(),
            optimized_pass.is_some()
        );

        Ok(Self {
            name: info.name,
            engine,
            uuid,
            flags: info.flags,
            resources: graph.into_resources(),
            uniform_buffer: uniform_layout.pack(),
            uniform_layout,
            pass,
            optimized_pass,
            cache: Arc::clone(cache),
        })
    }

    // ── Status ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn status(&self) -> MaterialStatus {
        match self.pass.status() {
            PassStatus::Queued => MaterialStatus::Queued,
            PassStatus::Success => MaterialStatus::Success,
            PassStatus::Failed => MaterialStatus::Failed,
        }
    }

    #[must_use]
    pub fn optimization_status(&self) -> OptimizationStatus {
        match self.optimized_pass.as_ref().map(|p| p.status()) {
            Some(PassStatus::Queued) => OptimizationStatus::Queued,
            Some(PassStatus::Success) => OptimizationStatus::Success,
            Some(PassStatus::Failed) | None => OptimizationStatus::Skip,
        }
    }

    /// The optimized program once it is ready, the base program otherwise.
    #[must_use]
    pub fn shader_get(&self) -> Option<ShaderHandle> {
        self.optimized_pass
            .as_ref()
            .and_then(|p| p.shader())
            .or_else(|| self.pass.shader())
    }

    /// Blocks until the base pass finished compiling.
    pub fn ensure_ready(&self) {
        self.cache.ensure_ready(&self.pass);
    }

    // ── Resources ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn attributes_get(&self) -> &[Attribute] {
        &self.resources.attributes
    }

    #[must_use]
    pub fn textures_get(&self) -> &[TextureResource] {
        &self.resources.textures
    }

    #[must_use]
    pub fn uniform_attributes_get(&self) -> &[UniformAttribute] {
        &self.resources.uniform_attributes
    }

    #[must_use]
    pub fn uniform_attributes_hash(&self) -> u64 {
        self.resources.uniform_attributes_hash
    }

    #[must_use]
    pub fn layer_attributes_get(&self) -> &[LayerAttribute] {
        &self.resources.layer_attributes
    }

    /// std140 bytes of the `NodeTree` block, filled with the graph's defaults.
    #[must_use]
    pub fn uniform_buffer_get(&self) -> &[u8] {
        &self.uniform_buffer
    }

    #[must_use]
    pub fn uniform_layout(&self) -> &UniformLayout {
        &self.uniform_layout
    }

    // ── Identity ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn flags(&self) -> MaterialFlags {
        self.flags
    }

    #[must_use]
    pub fn engine(&self) -> EngineId {
        self.engine
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn pass(&self) -> &PassRef {
        &self.pass
    }

    #[must_use]
    pub fn optimized_pass(&self) -> Option<&PassRef> {
        self.optimized_pass.as_ref()
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("uuid", &self.uuid)
            .field("status", &self.status())
            .field("optimization", &self.optimization_status())
            .finish_non_exhaustive()
    }
}

fn build_descriptor(
    mut output: CodegenOutput,
    info: &MaterialInfo,
    finalize: &mut impl FinalizeCodegen,
    should_optimize: bool,
) -> Result<PassDescriptor> {
    output.name.clone_from(&info.name);
    finalize.finalize(info, &mut output);
    Ok(PassDescriptor {
        create_info: ShaderAssembler::assemble(&output)?,
        should_optimize,
    })
}
