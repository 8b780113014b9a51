//! Shader Code Generation
//!
//! Serializes a pruned [`NodeGraph`] into GLSL fragments and the binding
//! layout the backend needs.
//!
//! # Determinism
//!
//! The generated text is the cache identity of a pass, so every choice made
//! here depends only on the logical graph:
//!
//! - output variables (`tmpN`) are numbered over surviving nodes in
//!   insertion order,
//! - statements follow a Kahn topological order whose ties are broken by
//!   insertion order,
//! - uniforms (`uN`) are numbered in first-use order and laid out std140 by
//!   decreasing alignment,
//! - attributes, samplers and uniform attributes use the ids the graph
//!   assigned during pruning.
//!
//! Two graphs that differ only in slot-map keys or in nodes that pruning
//! removes therefore produce byte-identical output and the same
//! [`CodegenOutput::hash`].
//!
//! # Pipeline
//!
//! ```text
//! Codegen::new ─► generate_graphs ─► generate_uniform_buffer
//!              ─► generate_attribs ─► generate_resources ─► hash_get
//! ```
//!
//! [`Codegen::generate`] runs all stages in order. On a cache miss, the
//! engine's finalize callback edits the returned [`CodegenOutput`] and
//! [`ShaderAssembler`] renders it into a [`CreateInfo`].

pub mod assembler;
pub mod create_info;
pub mod defines;
pub mod uniforms;

pub use assembler::ShaderAssembler;
pub use create_info::{
    CreateInfo, SamplerBinding, ShaderStage, UniformBufferBinding, VertexInput,
};
pub use defines::ShaderDefines;
pub use uniforms::{UniformLayout, UniformMember};

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use smallvec::SmallVec;
use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3;

use crate::graph::{DataType, LinkId, LinkSource, NodeGraph, NodeId, OutputKind};
use crate::settings::CodegenOptions;

// ─── Output ──────────────────────────────────────────────────────────────────

/// Stage templates the assembler renders.
///
/// Names resolve against the embedded template folder; the `.glsl`
/// extension is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageTemplates {
    pub vertex: Option<String>,
    pub fragment: Option<String>,
    pub compute: Option<String>,
}

impl StageTemplates {
    #[must_use]
    pub fn mesh() -> Self {
        Self {
            vertex: Some("mesh.vert".to_owned()),
            fragment: Some("mesh.frag".to_owned()),
            compute: None,
        }
    }

    #[must_use]
    pub fn compute() -> Self {
        Self {
            vertex: None,
            fragment: None,
            compute: Some("compute.comp".to_owned()),
        }
    }
}

/// Generated source fragments and bindings of one graph.
///
/// Everything above `hash` is produced by [`Codegen`] and covered by the
/// hash. The fields below it belong to the engine's finalize callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodegenOutput {
    /// `NodeTree` uniform block declaration; empty for optimized variants.
    pub uniforms: String,
    /// Members of the `var_attrs` interface block.
    pub attribs: String,
    /// Sampler and uniform-attribute block declarations.
    pub resources: String,

    pub surface: Option<String>,
    pub volume: Option<String>,
    pub displacement: Option<String>,
    pub thickness: Option<String>,
    /// AOV functions plus the `nodetree_aov` dispatcher.
    pub aovs: Option<String>,
    pub functions: Option<String>,
    pub composites: Option<String>,

    pub uniform_layout: UniformLayout,
    pub vertex_inputs: Vec<VertexInput>,
    pub samplers: Vec<SamplerBinding>,
    pub uniform_buffers: Vec<UniformBufferBinding>,
    pub optimized: bool,

    /// xxh3-128 of everything above, seeded with the variant uuid and the
    /// material flags.
    pub hash: u128,

    // ── Finalize-editable ──
    /// Debug label carried into the [`CreateInfo`].
    pub name: String,
    pub templates: StageTemplates,
    pub defines: ShaderDefines,
    pub vertex_code: String,
    pub fragment_code: String,
    pub compute_code: String,
}

impl CodegenOutput {
    #[must_use]
    pub fn main(&self, kind: OutputKind) -> Option<&str> {
        match kind {
            OutputKind::Surface => self.surface.as_deref(),
            OutputKind::Volume => self.volume.as_deref(),
            OutputKind::Displacement => self.displacement.as_deref(),
            OutputKind::Thickness => self.thickness.as_deref(),
        }
    }

    fn main_mut(&mut self, kind: OutputKind) -> &mut Option<String> {
        match kind {
            OutputKind::Surface => &mut self.surface,
            OutputKind::Volume => &mut self.volume,
            OutputKind::Displacement => &mut self.displacement,
            OutputKind::Thickness => &mut self.thickness,
        }
    }
}

// ─── Codegen ─────────────────────────────────────────────────────────────────

pub struct Codegen<'a> {
    graph: &'a NodeGraph,
    options: CodegenOptions,
    optimized: bool,
    /// Shader variant the output is generated for.
    material_uuid: Uuid,
    /// Node output link → `tmpN` id.
    var_ids: FxHashMap<LinkId, u32>,
    /// Uniform links in first-use order.
    uniforms: Vec<LinkId>,
    uniform_ids: FxHashMap<LinkId, u32>,
    output: CodegenOutput,
}

impl<'a> Codegen<'a> {
    /// Prepares generation for a pruned graph.
    ///
    /// `optimized` selects the constant-folded variant: no uniform block is
    /// emitted and any remaining uniform is inlined as a literal.
    #[must_use]
    pub fn new(graph: &'a NodeGraph, options: CodegenOptions, optimized: bool) -> Self {
        let mut var_ids = FxHashMap::default();
        let mut uniforms = Vec::new();
        let mut uniform_ids = FxHashMap::default();

        let mut next_var = 0;
        for (_, node) in graph.nodes_in_order() {
            for output in &node.outputs {
                var_ids.insert(output.link, next_var);
                next_var += 1;
            }
        }

        let mut note_uniform = |link: LinkId| {
            if let Some(l) = graph.get_link(link)
                && matches!(l.source, LinkSource::Uniform(_))
                && !uniform_ids.contains_key(&link)
            {
                uniform_ids.insert(link, uniforms.len() as u32);
                uniforms.push(link);
            }
        };
        for (_, node) in graph.nodes_in_order() {
            for input in &node.inputs {
                note_uniform(input.link);
            }
        }
        for (_, link) in graph.outputs().tagged_links() {
            note_uniform(link);
        }

        Self {
            graph,
            options,
            optimized,
            material_uuid: Uuid::nil(),
            var_ids,
            uniforms,
            uniform_ids,
            output: CodegenOutput {
                optimized,
                ..Default::default()
            },
        }
    }

    /// Seeds the hash with the shader variant `uuid`, so variants of the
    /// same graph never share a pass.
    #[must_use]
    pub fn with_material_uuid(mut self, uuid: Uuid) -> Self {
        self.material_uuid = uuid;
        self
    }

    /// Runs every generation stage and returns the hashed output.
    #[must_use]
    pub fn generate(mut self) -> CodegenOutput {
        self.generate_graphs();
        self.generate_uniform_buffer();
        self.generate_attribs();
        self.generate_resources();
        self.output.hash = self.hash_get();

        let outputs = self.graph.outputs();
        let rasterized = OutputKind::ALL.iter().any(|&k| outputs.main(k).is_some())
            || !outputs.aovs.is_empty()
            || !outputs.functions.is_empty();
        self.output.templates = if rasterized || outputs.composites.is_empty() {
            StageTemplates::mesh()
        } else {
            StageTemplates::compute()
        };
        self.output
    }

    /// Whether an optimized variant is worth compiling.
    #[must_use]
    pub fn should_optimize_heuristic(&self) -> bool {
        self.options.heuristic.qualifies(
            self.graph.node_count(),
            self.uniforms.len(),
            self.graph.textures().len(),
        )
    }

    #[inline]
    #[must_use]
    pub fn uniform_count(&self) -> usize {
        self.uniforms.len()
    }

    // ── Stages ───────────────────────────────────────────────────────────────

    /// One function per registered output.
    pub fn generate_graphs(&mut self) {
        let outputs = self.graph.outputs();

        for kind in OutputKind::ALL {
            if let Some(link) = outputs.main(kind) {
                let ty = kind.result_type();
                let src = self.function(ty.glsl_name(), kind.function_name(), link, ty);
                *self.output.main_mut(kind) = Some(src);
            }
        }

        if !outputs.aovs.is_empty() {
            let mut src = String::new();
            let mut dispatch = String::from("vec4 nodetree_aov(uint hash)\n{\n");
            for (i, aov) in outputs.aovs.iter().enumerate() {
                let name = format!("nodetree_aov_{i}");
                src.push_str(&self.function("vec4", &name, aov.link, DataType::Vec4));
                let _ = writeln!(dispatch, "  if (hash == {}u) {{ return {name}(); }}", aov.hash);
            }
            dispatch.push_str("  return vec4(0.0);\n}\n");
            src.push_str(&dispatch);
            self.output.aovs = Some(src);
        }

        if !outputs.functions.is_empty() {
            let mut src = String::new();
            for f in &outputs.functions {
                let ty = self.graph.link_type(f.link);
                src.push_str(&self.function(ty.glsl_name(), &f.name, f.link, ty));
            }
            self.output.functions = Some(src);
        }

        if !outputs.composites.is_empty() {
            let mut src = String::new();
            for (i, &link) in outputs.composites.iter().enumerate() {
                let name = format!("nodetree_composite_{i}");
                src.push_str(&self.function("vec4", &name, link, DataType::Vec4));
            }
            self.output.composites = Some(src);
        }
    }

    /// std140 `NodeTree` block over every uniform input. Skipped for the
    /// optimized variant.
    pub fn generate_uniform_buffer(&mut self) {
        if self.optimized {
            return;
        }
        let layout = UniformLayout::std140(self.uniforms.iter().filter_map(|&link| {
            match self.graph.get_link(link)?.source {
                LinkSource::Uniform(value) => Some((self.uniform_name(link), value)),
                _ => None,
            }
        }));
        if layout.is_empty() {
            return;
        }

        self.output.uniforms = layout.declaration(self.options.uniform_buffer_slot);
        self.output.uniform_buffers.push(UniformBufferBinding {
            name: "NodeTree".to_owned(),
            slot: self.options.uniform_buffer_slot,
            size: layout.size,
        });
        self.output.uniform_layout = layout;
    }

    /// `var_attrs` members and vertex inputs, one per attribute.
    pub fn generate_attribs(&mut self) {
        for attr in self.graph.attributes() {
            let name = format!("{}{}", attr.key.ty.prefix(), attr.id);
            let _ = writeln!(self.output.attribs, "  vec4 {name};");
            self.output.vertex_inputs.push(VertexInput {
                name,
                location: attr.id,
                ty: DataType::Vec4,
                attribute_type: attr.key.ty,
                attribute_name: attr.key.name.clone(),
            });
        }
    }

    /// Samplers after the engine's reserved units (color bands first), then
    /// the uniform-attribute block.
    pub fn generate_resources(&mut self) {
        let mut textures: SmallVec<[_; 8]> = self.graph.textures().iter().collect();
        textures.sort_by_key(|t| t.index);

        for tex in textures {
            let slot = self.options.reserved_texture_slots + tex.index;
            let ty = if tex.key.is_color_band() {
                DataType::Sampler1DArray
            } else {
                DataType::Sampler2D
            };
            let name = tex.sampler_name();
            let _ = writeln!(
                self.output.resources,
                "layout(binding = {slot}) uniform {} {name};",
                ty.glsl_name()
            );
            self.output.samplers.push(SamplerBinding { name, slot, ty });
        }

        let count = self.graph.uniform_attributes().len();
        if count > 0 {
            let slot = self.options.uniform_attribute_slot;
            let _ = write!(
                self.output.resources,
                "layout(std140, binding = {slot}) uniform UniformAttrs\n{{\n  vec4 unf_attr[{count}];\n}};\n"
            );
            self.output.uniform_buffers.push(UniformBufferBinding {
                name: "UniformAttrs".to_owned(),
                slot,
                size: count * 16,
            });
        }
    }

    /// xxh3-128 over the variant uuid, the material flags, every generated
    /// string and the binding layout.
    #[must_use]
    pub fn hash_get(&self) -> u128 {
        let out = &self.output;
        let mut hasher = Xxh3::new();
        hasher.update(self.material_uuid.as_bytes());
        hasher.update(&self.graph.flags().bits().to_le_bytes());

        let mut field = |bytes: &[u8]| {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        field(out.uniforms.as_bytes());
        field(out.attribs.as_bytes());
        field(out.resources.as_bytes());
        for fragment in [
            &out.surface,
            &out.volume,
            &out.displacement,
            &out.thickness,
            &out.aovs,
            &out.functions,
            &out.composites,
        ] {
            match fragment {
                Some(src) => field(src.as_bytes()),
                None => field(b"\0"),
            }
        }
        for input in &out.vertex_inputs {
            field(input.attribute_type.prefix().as_bytes());
            field(input.attribute_name.as_bytes());
        }
        for ubo in &out.uniform_buffers {
            field(ubo.name.as_bytes());
            field(&(ubo.size as u64).to_le_bytes());
        }
        field(&[u8::from(self.optimized)]);

        hasher.digest128()
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn function(&self, ret_glsl: &str, name: &str, link: LinkId, ret: DataType) -> String {
        let mut src = format!("{ret_glsl} {name}()\n{{\n");
        for id in self.topological_order(link) {
            self.emit_node(&mut src, id);
        }
        let _ = writeln!(src, "  return {};", self.link_expr(link, ret));
        src.push_str("}\n\n");
        src
    }

    /// Nodes feeding `link`, producers before consumers.
    fn topological_order(&self, link: LinkId) -> Vec<NodeId> {
        let mut reachable: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack = vec![link];
        while let Some(link) = stack.pop() {
            if let Some(node_id) = self.producer(link)
                && reachable.insert(node_id)
                && let Some(node) = self.graph.node(node_id)
            {
                stack.extend(node.inputs.iter().map(|i| i.link));
            }
        }

        let mut in_degree: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut dependents: FxHashMap<NodeId, SmallVec<[NodeId; 4]>> = FxHashMap::default();
        for &id in &reachable {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let degree = in_degree.entry(id).or_insert(0);
            for input in &node.inputs {
                if let Some(producer) = self.producer(input.link) {
                    *degree += 1;
                    dependents.entry(producer).or_default().push(id);
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<(u64, NodeId)>> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .filter_map(|(&id, _)| self.graph.node(id).map(|n| Reverse((n.seq(), id))))
            .collect();

        let mut order = Vec::with_capacity(reachable.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id);
            for &dep in dependents.get(&id).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(&dep) {
                    *d -= 1;
                    if *d == 0
                        && let Some(n) = self.graph.node(dep)
                    {
                        ready.push(Reverse((n.seq(), dep)));
                    }
                }
            }
        }

        if order.len() != reachable.len() {
            debug_assert!(false, "node graph contains a cycle");
            log::error!(
                "Node graph contains a cycle; {} nodes left unscheduled",
                reachable.len() - order.len()
            );
        }
        order
    }

    fn emit_node(&self, src: &mut String, id: NodeId) {
        let Some(node) = self.graph.node(id) else {
            return;
        };
        let mut args: SmallVec<[String; 8]> = node
            .inputs
            .iter()
            .map(|input| self.link_expr(input.link, input.ty))
            .collect();
        for output in &node.outputs {
            let var = self.var_name(output.link);
            let _ = writeln!(src, "  {} {var};", output.ty.glsl_name());
            args.push(var);
        }
        let _ = writeln!(src, "  {}({});", node.name, args.join(", "));
    }

    /// Expression reading `link` as a value of type `want`.
    fn link_expr(&self, link: LinkId, want: DataType) -> String {
        let Some(l) = self.graph.get_link(link) else {
            debug_assert!(false, "dangling link {link:?}");
            return "0.0".to_owned();
        };

        let raw = match &l.source {
            LinkSource::NodeOutput { .. } => self.var_name(link),
            LinkSource::Constant(value) => value.glsl_literal(),
            LinkSource::Uniform(value) => {
                if self.optimized {
                    value.glsl_literal()
                } else {
                    self.uniform_name(link)
                }
            }
            LinkSource::Attribute(key) => self
                .graph
                .attributes()
                .iter()
                .find(|a| &a.key == key)
                .map(|a| format!("var_attrs.{}{}", a.key.ty.prefix(), a.id))
                .unwrap_or_default(),
            LinkSource::UniformAttribute(key) => self
                .graph
                .uniform_attributes()
                .iter()
                .find(|a| &a.key == key)
                .map(|a| format!("unf_attr[{}]", a.id))
                .unwrap_or_default(),
            LinkSource::LayerAttribute(name) => self
                .graph
                .layer_attributes()
                .iter()
                .find(|a| &a.name == name)
                .map(|a| format!("attr_load_layer({})", a.id))
                .unwrap_or_default(),
            LinkSource::Texture(key) => self
                .graph
                .textures()
                .iter()
                .find(|t| &t.key == key)
                .map(|t| t.sampler_name())
                .unwrap_or_default(),
        };
        debug_assert!(!raw.is_empty(), "link {link:?} reads a pruned resource");

        l.ty.convert_expr(want, &raw).unwrap_or_else(|| {
            debug_assert!(false, "cannot convert {:?} to {want:?}", l.ty);
            raw
        })
    }

    fn producer(&self, link: LinkId) -> Option<NodeId> {
        match self.graph.get_link(link)?.source {
            LinkSource::NodeOutput { node, .. } => Some(node),
            _ => None,
        }
    }

    fn var_name(&self, link: LinkId) -> String {
        match self.var_ids.get(&link) {
            Some(id) => format!("tmp{id}"),
            None => {
                debug_assert!(false, "output link {link:?} has no variable");
                "tmp_invalid".to_owned()
            }
        }
    }

    fn uniform_name(&self, link: LinkId) -> String {
        format!("u{}", self.uniform_ids.get(&link).copied().unwrap_or_default())
    }
}
