//! Graph & Codegen Tests
//!
//! Tests for:
//! - Pruning through the public API: reachability, idempotency, flags
//! - Template selection: mesh stages vs compositor-only graphs
//! - AOV dispatch and named function outputs
//! - Determinism of the generated source and its hash
//! - Optimized codegen: uniforms folded into literals
//! - Full pipeline against the threaded reference backend

mod common;

use std::sync::Arc;

use common::{chain_graph, init_logger, no_finalize, textured_graph};
use glam::{Vec3, Vec4};
use myth_shadergraph::codegen::{Codegen, ShaderAssembler, StageTemplates};
use myth_shadergraph::graph::{AttributeType, DataType, MaterialFlags, NodeGraph, OutputKind};
use myth_shadergraph::{
    CodegenOptions, EngineId, Material, MaterialOptions, MaterialStatus, PassCache,
    PassCacheSettings, ShaderCompiler, ThreadedCompiler,
};
use uuid::Uuid;

fn pruned(construct: fn(&mut NodeGraph)) -> NodeGraph {
    let mut graph = NodeGraph::new();
    construct(&mut graph);
    graph.prune_unused();
    graph.finalize_uniform_attrs();
    graph
}

// ============================================================================
// Pruning
// ============================================================================

#[test]
fn pruning_keeps_only_the_reachable_chain() {
    let mut graph = NodeGraph::new();
    chain_graph(&mut graph);
    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.attributes().len(), 1);

    graph.prune_unused();
    assert_eq!(graph.node_count(), 3);
    assert!(graph.attributes().is_empty());

    let links = graph.link_count();
    graph.prune_unused();
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.link_count(), links);
}

#[test]
fn graph_without_outputs_prunes_to_nothing() {
    let mut graph = NodeGraph::new();
    let uv = graph.attribute(AttributeType::UvMap, "UVMap");
    graph.call("node_tex_coord", &[uv], DataType::Vec3);

    graph.prune_unused();
    assert_eq!(graph.node_count(), 0);
    assert!(graph.attributes().is_empty());
    assert!(graph.outputs().is_empty());
    assert!(!graph.flags().contains(MaterialFlags::HAS_SURFACE));
}

#[test]
fn flags_follow_registered_outputs() {
    let mut graph = NodeGraph::new();
    let density = graph.constant(0.5);
    let volume = graph.call("node_volume_principled", &[density], DataType::Closure);
    graph.set_output(OutputKind::Volume, volume);
    let height = graph.constant(Vec3::Z);
    graph.set_output(OutputKind::Displacement, height);
    graph.prune_unused();

    let flags = graph.flags();
    assert!(flags.contains(MaterialFlags::HAS_VOLUME | MaterialFlags::HAS_DISPLACEMENT));
    assert!(!flags.contains(MaterialFlags::HAS_SURFACE));
}

// ============================================================================
// Codegen
// ============================================================================

#[test]
fn compositor_only_graph_selects_compute_templates() -> anyhow::Result<()> {
    let graph = pruned(|g| {
        let color = g.uniform(Vec4::new(0.2, 0.4, 0.6, 1.0));
        let graded = g.call("node_color_balance", &[color], DataType::Vec4);
        g.add_composite_output(graded);
    });
    let output = Codegen::new(&graph, CodegenOptions::default(), false).generate();
    assert_eq!(output.templates, StageTemplates::compute());

    let info = ShaderAssembler::assemble(&output)?;
    let comp = info
        .compute_source
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("no compute stage"))?;
    assert!(info.vertex_source.is_none());
    assert!(comp.contains("vec4 nodetree_composite_0()"));
    assert!(comp.contains("compositor_store(nodetree_composite_0());"));
    Ok(())
}

#[test]
fn aovs_dispatch_on_their_hash() {
    let graph = pruned(|g| {
        let color = g.constant(Vec4::ONE);
        let bsdf = g.call("node_bsdf_diffuse", &[color], DataType::Closure);
        g.set_output(OutputKind::Surface, bsdf);
        let normal = g.call("node_normal", &[], DataType::Vec3);
        g.add_aov(0xdead, normal);
    });
    let output = Codegen::new(&graph, CodegenOptions::default(), false).generate();
    let aovs = output.aovs.as_deref().unwrap();

    assert!(aovs.contains("vec4 nodetree_aov_0()"));
    assert!(aovs.contains("vec4 nodetree_aov(uint hash)"));
    assert!(aovs.contains(&format!("if (hash == {}u) {{ return nodetree_aov_0(); }}", 0xdead)));
    assert!(graph.flags().contains(MaterialFlags::HAS_AOV));
}

#[test]
fn function_outputs_keep_their_names_and_types() {
    let graph = pruned(|g| {
        let a = g.constant(1.0);
        let b = g.uniform(2.0);
        let sum = g.call("node_math_add", &[a, b], DataType::Float);
        g.add_function_output("eval_sum", sum);
    });
    let output = Codegen::new(&graph, CodegenOptions::default(), false).generate();
    let functions = output.functions.as_deref().unwrap();
    assert!(functions.contains("float eval_sum()"));
    assert_eq!(output.templates, StageTemplates::mesh());
}

#[test]
fn generation_is_deterministic() {
    let first = Codegen::new(&pruned(textured_graph), CodegenOptions::default(), false).generate();
    let second = Codegen::new(&pruned(textured_graph), CodegenOptions::default(), false).generate();
    assert_eq!(first.hash, second.hash);
    assert_eq!(first.surface, second.surface);
    assert_eq!(first.resources, second.resources);
}

#[test]
fn engine_layout_is_part_of_the_hash() {
    let graph = pruned(textured_graph);
    let base = Codegen::new(&graph, CodegenOptions::default(), false).generate();
    let shifted = Codegen::new(
        &graph,
        CodegenOptions {
            reserved_texture_slots: 4,
            ..Default::default()
        },
        false,
    )
    .generate();
    assert_ne!(base.hash, shifted.hash);
    assert!(shifted.resources.contains("binding = 4"));
}

#[test]
fn optimized_codegen_folds_uniforms() {
    let mut graph = pruned(textured_graph);
    let base = Codegen::new(&graph, CodegenOptions::default(), false).generate();
    assert!(base.uniforms.contains("uniform NodeTree"));
    assert_eq!(base.uniform_buffers.len(), 1);

    assert_eq!(graph.optimize(), 1);
    let optimized = Codegen::new(&graph, CodegenOptions::default(), true).generate();
    assert!(optimized.uniforms.is_empty());
    assert!(optimized.uniform_buffers.is_empty());
    assert!(optimized.surface.as_deref().unwrap().contains("vec4("));
    assert_ne!(base.hash, optimized.hash);
}

// ============================================================================
// Reference backend
// ============================================================================

#[test]
fn materials_compile_on_the_threaded_backend() {
    init_logger();
    let backend: Arc<dyn ShaderCompiler> = Arc::new(ThreadedCompiler::new(2));
    let cache = PassCache::init(backend, PassCacheSettings::default());

    let deferred = Material::new(
        &cache,
        "MA_chain",
        EngineId(0),
        Uuid::new_v4(),
        chain_graph,
        no_finalize,
        &MaterialOptions::default(),
    )
    .unwrap();
    deferred.ensure_ready();
    assert_eq!(deferred.status(), MaterialStatus::Success);

    let inline = Material::new(
        &cache,
        "MA_textured",
        EngineId(0),
        Uuid::new_v4(),
        textured_graph,
        no_finalize,
        &MaterialOptions {
            deferred: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(inline.status(), MaterialStatus::Success);
    assert_eq!(inline.textures_get().len(), 4);
    assert!(inline.shader_get().is_some());

    cache.shutdown();
}
