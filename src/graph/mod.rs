//! Material Node Graph
//!
//! The intermediate representation a material is compiled from. An external
//! construction callback populates the graph with [`Node`]s (calls into the
//! shader function library), [`Link`]s between them, resource requests and
//! registered outputs. The engine then:
//!
//! 1. prunes every node that does not feed a registered output
//!    ([`NodeGraph::prune_unused`]),
//! 2. assigns stable ids to uniform attributes
//!    ([`NodeGraph::finalize_uniform_attrs`]),
//! 3. serializes it through [`Codegen`](crate::codegen::Codegen),
//! 4. optionally promotes uniforms to constants for an optimized variant
//!    ([`NodeGraph::optimize`]) and serializes it again,
//! 5. discards the nodes and keeps the resource lists
//!    ([`NodeGraph::into_resources`]).
//!
//! # Ownership
//!
//! Nodes and links live in slot maps owned by the graph and are addressed
//! through [`NodeId`] / [`LinkId`]. Handles from another graph are a
//! programming error and trip debug assertions.

pub mod node;
pub mod resources;
pub mod types;

pub use node::{Input, InputSlot, Link, LinkId, LinkSource, Node, NodeId, Output, OutputSlot};
pub use resources::{
    Attribute, AttributeKey, AttributeType, GraphResources, ImageKey, LayerAttribute,
    SamplerState, TextureExtend, TextureFilter, TextureKey, TextureResource, UniformAttribute,
    UniformAttributeKey,
};
pub use types::{DataType, MaterialFlags, NodeTag, OutputKind, Value};

use glam::Vec4;
use slotmap::SlotMap;
use xxhash_rust::xxh3::Xxh3;

// ─── Outputs ─────────────────────────────────────────────────────────────────

/// Arbitrary output variable, addressed by the hash of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AovOutput {
    pub hash: u32,
    pub link: LinkId,
}

/// Auxiliary function evaluated by the engine (e.g. light or world functions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionOutput {
    pub name: String,
    pub link: LinkId,
}

/// Links registered as graph outputs, per category.
#[derive(Debug, Clone, Default)]
pub struct GraphOutputs {
    pub surface: Option<LinkId>,
    pub volume: Option<LinkId>,
    pub displacement: Option<LinkId>,
    pub thickness: Option<LinkId>,
    pub aovs: Vec<AovOutput>,
    pub functions: Vec<FunctionOutput>,
    pub composites: Vec<LinkId>,
}

impl GraphOutputs {
    #[must_use]
    pub fn main(&self, kind: OutputKind) -> Option<LinkId> {
        match kind {
            OutputKind::Surface => self.surface,
            OutputKind::Volume => self.volume,
            OutputKind::Displacement => self.displacement,
            OutputKind::Thickness => self.thickness,
        }
    }

    fn main_mut(&mut self, kind: OutputKind) -> &mut Option<LinkId> {
        match kind {
            OutputKind::Surface => &mut self.surface,
            OutputKind::Volume => &mut self.volume,
            OutputKind::Displacement => &mut self.displacement,
            OutputKind::Thickness => &mut self.thickness,
        }
    }

    /// Every registered output link together with the tag it propagates.
    #[must_use]
    pub fn tagged_links(&self) -> Vec<(NodeTag, LinkId)> {
        let mut links = Vec::with_capacity(4 + self.aovs.len() + self.functions.len());
        for kind in OutputKind::ALL {
            if let Some(link) = self.main(kind) {
                links.push((kind.tag(), link));
            }
        }
        links.extend(self.aovs.iter().map(|aov| (NodeTag::AOV, aov.link)));
        links.extend(self.functions.iter().map(|f| (NodeTag::FUNCTION, f.link)));
        links.extend(self.composites.iter().map(|&l| (NodeTag::COMPOSITOR, l)));
        links
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        OutputKind::ALL.iter().all(|&k| self.main(k).is_none())
            && self.aovs.is_empty()
            && self.functions.is_empty()
            && self.composites.is_empty()
    }
}

// ─── NodeGraph ───────────────────────────────────────────────────────────────

/// Intermediate graph of one material's shading computation.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    nodes: SlotMap<NodeId, Node>,
    /// Node ids in insertion order.
    order: Vec<NodeId>,
    next_seq: u64,
    links: SlotMap<LinkId, Link>,
    outputs: GraphOutputs,

    attributes: Vec<Attribute>,
    textures: Vec<TextureResource>,
    next_color_band: u32,
    uniform_attributes: Vec<UniformAttribute>,
    uniform_attributes_hash: u64,
    layer_attributes: Vec<LayerAttribute>,

    flags: MaterialFlags,
}

impl NodeGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Nodes ────────────────────────────────────────────────────────────────

    /// Appends a node calling the library function `name`.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = self.nodes.insert(Node::new(name, seq));
        self.order.push(id);
        id
    }

    /// Appends an input of type `ty` reading `link`.
    pub fn add_input(&mut self, node: NodeId, ty: DataType, link: LinkId) -> InputSlot {
        debug_assert!(
            self.links.contains_key(link),
            "input link does not belong to this graph"
        );
        if let Some(l) = self.links.get_mut(link) {
            l.users += 1;
        }
        let n = &mut self.nodes[node];
        n.inputs.push(Input { ty, link });
        InputSlot {
            node,
            index: n.inputs.len() - 1,
        }
    }

    /// Appends an output of type `ty` and returns the link carrying it.
    pub fn add_output(&mut self, node: NodeId, ty: DataType) -> LinkId {
        let slot = self.nodes[node].outputs.len();
        let link = self.new_link(LinkSource::NodeOutput { node, slot }, ty);
        self.nodes[node].outputs.push(Output { ty, link });
        link
    }

    /// One-output node whose inputs take the types of the given links.
    pub fn call(&mut self, name: &str, inputs: &[LinkId], output: DataType) -> LinkId {
        let node = self.add_node(name);
        for &link in inputs {
            let ty = self.link_type(link);
            self.add_input(node, ty, link);
        }
        self.add_output(node, output)
    }

    /// Re-points `input` at the link produced by `output`.
    ///
    /// Returns `false` and leaves the graph untouched when the output type
    /// cannot be converted to the input type. Callers are expected to have
    /// validated types beforehand.
    pub fn link(&mut self, output: OutputSlot, input: InputSlot) -> bool {
        let out = self
            .nodes
            .get(output.node)
            .and_then(|n| n.outputs.get(output.index))
            .copied();
        let inp = self
            .nodes
            .get(input.node)
            .and_then(|n| n.inputs.get(input.index))
            .copied();
        let (Some(out), Some(inp)) = (out, inp) else {
            debug_assert!(false, "link endpoints do not belong to this graph");
            return false;
        };

        if !out.ty.can_convert_to(inp.ty) {
            return false;
        }
        if inp.link == out.link {
            return true;
        }

        if let Some(old) = self.links.get_mut(inp.link) {
            old.users = old.users.saturating_sub(1);
        }
        self.links[out.link].users += 1;
        self.nodes[input.node].inputs[input.index].link = out.link;
        true
    }

    // ── Link Sources ─────────────────────────────────────────────────────────

    /// Literal value baked into the generated source.
    pub fn constant(&mut self, value: impl Into<Value>) -> LinkId {
        let value = value.into();
        self.new_link(LinkSource::Constant(value), value.data_type())
    }

    /// Value stored in the material uniform block.
    pub fn uniform(&mut self, value: impl Into<Value>) -> LinkId {
        let value = value.into();
        self.new_link(LinkSource::Uniform(value), value.data_type())
    }

    /// Per-vertex attribute, deduplicated by type and name.
    pub fn attribute(&mut self, ty: AttributeType, name: &str) -> LinkId {
        let key = AttributeKey {
            ty,
            name: name.to_owned(),
        };
        if let Some(attr) = self.attributes.iter_mut().find(|a| a.key == key) {
            attr.users += 1;
        } else {
            let id = self.attributes.len() as u32;
            self.attributes.push(Attribute {
                key: key.clone(),
                id,
                users: 1,
            });
        }
        self.new_link(LinkSource::Attribute(key), DataType::Vec4)
    }

    /// Per-object attribute delivered through the uniform-attribute block.
    pub fn uniform_attribute(&mut self, name: &str, use_dupli: bool) -> LinkId {
        let key = UniformAttributeKey {
            name: name.to_owned(),
            use_dupli,
        };
        if let Some(attr) = self.uniform_attributes.iter_mut().find(|a| a.key == key) {
            attr.users += 1;
        } else {
            let id = self.uniform_attributes.len() as u32;
            self.uniform_attributes.push(UniformAttribute {
                key: key.clone(),
                id,
                users: 1,
            });
        }
        self.new_link(LinkSource::UniformAttribute(key), DataType::Vec4)
    }

    /// View-layer attribute.
    pub fn layer_attribute(&mut self, name: &str) -> LinkId {
        if let Some(attr) = self.layer_attributes.iter_mut().find(|a| a.name == name) {
            attr.users += 1;
        } else {
            let id = self.layer_attributes.len() as u32;
            self.layer_attributes.push(LayerAttribute {
                name: name.to_owned(),
                id,
                users: 1,
            });
        }
        self.new_link(LinkSource::LayerAttribute(name.to_owned()), DataType::Vec4)
    }

    /// Image sampler, deduplicated by image and sampler state.
    pub fn image_texture(&mut self, image: ImageKey, sampler: SamplerState) -> LinkId {
        let key = TextureKey::Image { image, sampler };
        if let Some(tex) = self.textures.iter_mut().find(|t| t.key == key) {
            tex.users += 1;
        } else {
            self.textures.push(TextureResource {
                key,
                color_band: None,
                index: 0,
                users: 1,
            });
            self.reindex_textures();
        }
        self.new_link(LinkSource::Texture(key), DataType::Sampler2D)
    }

    /// Color ramp baked into a row of the color-band texture.
    pub fn color_band(&mut self, pixels: &[Vec4]) -> LinkId {
        let key = TextureKey::ColorBand(self.next_color_band);
        self.next_color_band += 1;
        self.textures.push(TextureResource {
            key,
            color_band: Some(pixels.to_vec()),
            index: 0,
            users: 1,
        });
        self.reindex_textures();
        self.new_link(LinkSource::Texture(key), DataType::Sampler1DArray)
    }

    // ── Outputs ──────────────────────────────────────────────────────────────

    /// Registers `link` as the main output of `kind`, replacing any previous one.
    pub fn set_output(&mut self, kind: OutputKind, link: LinkId) {
        self.retain_link(link);
        if let Some(old) = self.outputs.main_mut(kind).replace(link) {
            self.release_link(old);
        }
    }

    pub fn add_aov(&mut self, hash: u32, link: LinkId) {
        self.retain_link(link);
        self.outputs.aovs.push(AovOutput { hash, link });
    }

    /// Registers an auxiliary function; returns its index.
    pub fn add_function_output(&mut self, name: &str, link: LinkId) -> usize {
        self.retain_link(link);
        self.outputs.functions.push(FunctionOutput {
            name: name.to_owned(),
            link,
        });
        self.outputs.functions.len() - 1
    }

    /// Registers a compositor output; returns its index.
    pub fn add_composite_output(&mut self, link: LinkId) -> usize {
        self.retain_link(link);
        self.outputs.composites.push(link);
        self.outputs.composites.len() - 1
    }

    // ── Graph Algorithms ─────────────────────────────────────────────────────

    /// Adds `tag` to every node reachable backward from `start_links`.
    pub fn tag_reachable(&mut self, start_links: &[LinkId], tag: NodeTag) {
        let mut stack: Vec<LinkId> = start_links.to_vec();
        while let Some(link) = stack.pop() {
            let Some(l) = self.links.get(link) else {
                debug_assert!(false, "dangling link {link:?}");
                continue;
            };
            let LinkSource::NodeOutput { node, .. } = l.source else {
                continue;
            };
            let Some(n) = self.nodes.get_mut(node) else {
                debug_assert!(false, "link {link:?} points outside the graph");
                continue;
            };
            if n.tag.contains(tag) {
                continue;
            }
            n.tag |= tag;
            stack.extend(n.inputs.iter().map(|i| i.link));
        }
    }

    /// Removes every node that feeds no registered output, then every link
    /// and resource only those nodes used. Idempotent.
    pub fn prune_unused(&mut self) {
        for node in self.nodes.values_mut() {
            node.tag = NodeTag::empty();
        }
        for (tag, link) in self.outputs.tagged_links() {
            self.tag_reachable(&[link], tag);
        }

        let before = self.nodes.len();
        self.nodes.retain(|_, node| !node.tag.is_empty());
        let nodes = &self.nodes;
        self.order.retain(|id| nodes.contains_key(*id));

        self.recount_link_users();
        let nodes = &self.nodes;
        self.links.retain(|_, link| {
            link.users > 0
                || matches!(link.source, LinkSource::NodeOutput { node, .. } if nodes.contains_key(node))
        });

        self.prune_resources();
        self.update_flags();

        log::trace!(
            "Pruned {} of {before} nodes, {} links remain",
            before - self.nodes.len(),
            self.links.len()
        );
    }

    /// Rewrites uniform-sourced links into literal constants.
    ///
    /// Uniform attributes vary per object and are left alone. Only the
    /// optimized variant runs this; base passes stay uniform-driven so that
    /// parameter edits never require a recompile. Returns the number of
    /// promoted links.
    pub fn optimize(&mut self) -> usize {
        let mut promoted = 0;
        for link in self.links.values_mut() {
            if let LinkSource::Uniform(value) = link.source {
                link.source = LinkSource::Constant(value);
                promoted += 1;
            }
        }
        if promoted > 0 {
            log::debug!("Promoted {promoted} uniform links to constants");
        }
        promoted
    }

    /// Sorts uniform attributes by (name, dupli) and assigns ids `0..n`.
    ///
    /// Returns the hash of the finalized list; equal request sets hash
    /// equally regardless of request order.
    pub fn finalize_uniform_attrs(&mut self) -> u64 {
        self.uniform_attributes.sort_by(|a, b| a.key.cmp(&b.key));
        self.uniform_attributes.dedup_by(|later, kept| {
            if later.key == kept.key {
                kept.users += later.users;
                true
            } else {
                false
            }
        });

        let mut hasher = Xxh3::new();
        for (id, attr) in self.uniform_attributes.iter_mut().enumerate() {
            attr.id = id as u32;
            hasher.update(attr.key.name.as_bytes());
            hasher.update(&[0, u8::from(attr.key.use_dupli)]);
        }
        self.uniform_attributes_hash = if self.uniform_attributes.is_empty() {
            0
        } else {
            hasher.digest()
        };
        self.update_flags();
        self.uniform_attributes_hash
    }

    /// Discards nodes and links, keeping the resource lists for runtime binding.
    #[must_use]
    pub fn into_resources(self) -> GraphResources {
        GraphResources {
            attributes: self.attributes,
            textures: self.textures,
            uniform_attributes: self.uniform_attributes,
            uniform_attributes_hash: self.uniform_attributes_hash,
            layer_attributes: self.layer_attributes,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn get_link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    /// Type of `link`. **Panics** if the link is not part of this graph.
    #[must_use]
    pub fn link_type(&self, link: LinkId) -> DataType {
        self.links[link].ty
    }

    /// Nodes in insertion order.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.order.iter().map(|&id| (id, &self.nodes[id]))
    }

    #[must_use]
    pub fn outputs(&self) -> &GraphOutputs {
        &self.outputs
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn textures(&self) -> &[TextureResource] {
        &self.textures
    }

    #[must_use]
    pub fn uniform_attributes(&self) -> &[UniformAttribute] {
        &self.uniform_attributes
    }

    #[must_use]
    pub fn uniform_attributes_hash(&self) -> u64 {
        self.uniform_attributes_hash
    }

    #[must_use]
    pub fn layer_attributes(&self) -> &[LayerAttribute] {
        &self.layer_attributes
    }

    #[must_use]
    pub fn flags(&self) -> MaterialFlags {
        self.flags
    }

    /// Material flags the construction callback sets (transparency, ...).
    pub fn flags_mut(&mut self) -> &mut MaterialFlags {
        &mut self.flags
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn new_link(&mut self, source: LinkSource, ty: DataType) -> LinkId {
        self.links.insert(Link {
            source,
            ty,
            users: 0,
        })
    }

    fn retain_link(&mut self, link: LinkId) {
        debug_assert!(
            self.links.contains_key(link),
            "output link does not belong to this graph"
        );
        if let Some(l) = self.links.get_mut(link) {
            l.users += 1;
        }
    }

    fn release_link(&mut self, link: LinkId) {
        if let Some(l) = self.links.get_mut(link) {
            l.users = l.users.saturating_sub(1);
        }
    }

    fn recount_link_users(&mut self) {
        for link in self.links.values_mut() {
            link.users = 0;
        }
        for node in self.nodes.values() {
            for input in &node.inputs {
                if let Some(l) = self.links.get_mut(input.link) {
                    l.users += 1;
                } else {
                    debug_assert!(false, "input reads a link outside the graph");
                }
            }
        }
        for (_, link) in self.outputs.tagged_links() {
            if let Some(l) = self.links.get_mut(link) {
                l.users += 1;
            }
        }
    }

    fn prune_resources(&mut self) {
        for a in &mut self.attributes {
            a.users = 0;
        }
        for t in &mut self.textures {
            t.users = 0;
        }
        for a in &mut self.uniform_attributes {
            a.users = 0;
        }
        for a in &mut self.layer_attributes {
            a.users = 0;
        }

        for link in self.links.values() {
            if link.users == 0 {
                continue;
            }
            match &link.source {
                LinkSource::Attribute(key) => {
                    if let Some(a) = self.attributes.iter_mut().find(|a| &a.key == key) {
                        a.users += link.users;
                    }
                }
                LinkSource::Texture(key) => {
                    if let Some(t) = self.textures.iter_mut().find(|t| &t.key == key) {
                        t.users += link.users;
                    }
                }
                LinkSource::UniformAttribute(key) => {
                    if let Some(a) = self.uniform_attributes.iter_mut().find(|a| &a.key == key) {
                        a.users += link.users;
                    }
                }
                LinkSource::LayerAttribute(name) => {
                    if let Some(a) = self.layer_attributes.iter_mut().find(|a| &a.name == name) {
                        a.users += link.users;
                    }
                }
                LinkSource::NodeOutput { .. } | LinkSource::Constant(_) | LinkSource::Uniform(_) => {}
            }
        }

        self.attributes.retain(|a| a.users > 0);
        self.textures.retain(|t| t.users > 0);
        self.uniform_attributes.retain(|a| a.users > 0);
        self.layer_attributes.retain(|a| a.users > 0);

        for (id, a) in self.attributes.iter_mut().enumerate() {
            a.id = id as u32;
        }
        for (id, a) in self.uniform_attributes.iter_mut().enumerate() {
            a.id = id as u32;
        }
        for (id, a) in self.layer_attributes.iter_mut().enumerate() {
            a.id = id as u32;
        }
        self.reindex_textures();
    }

    /// Color bands take the low binding indices, images follow.
    fn reindex_textures(&mut self) {
        let mut index = 0;
        for tex in self.textures.iter_mut().filter(|t| t.key.is_color_band()) {
            tex.index = index;
            index += 1;
        }
        for tex in self.textures.iter_mut().filter(|t| !t.key.is_color_band()) {
            tex.index = index;
            index += 1;
        }
    }

    fn update_flags(&mut self) {
        let derived = MaterialFlags::HAS_SURFACE
            | MaterialFlags::HAS_VOLUME
            | MaterialFlags::HAS_DISPLACEMENT
            | MaterialFlags::HAS_THICKNESS
            | MaterialFlags::HAS_AOV
            | MaterialFlags::HAS_FUNCTIONS
            | MaterialFlags::HAS_COMPOSITE
            | MaterialFlags::UNIFORM_ATTRIBUTES
            | MaterialFlags::LAYER_ATTRIBUTES;

        let mut flags = self.flags.difference(derived);
        for kind in OutputKind::ALL {
            if self.outputs.main(kind).is_some() {
                flags |= kind.flag();
            }
        }
        flags.set(MaterialFlags::HAS_AOV, !self.outputs.aovs.is_empty());
        flags.set(MaterialFlags::HAS_FUNCTIONS, !self.outputs.functions.is_empty());
        flags.set(MaterialFlags::HAS_COMPOSITE, !self.outputs.composites.is_empty());
        flags.set(
            MaterialFlags::UNIFORM_ATTRIBUTES,
            !self.uniform_attributes.is_empty(),
        );
        flags.set(
            MaterialFlags::LAYER_ATTRIBUTES,
            !self.layer_attributes.is_empty(),
        );
        self.flags = flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    /// A -> B -> C feeding the surface, plus a disconnected D.
    fn chain_graph() -> (NodeGraph, [NodeId; 4]) {
        let mut g = NodeGraph::new();
        let color = g.uniform(Vec3::new(0.8, 0.2, 0.1));

        let a = g.add_node("node_rgb");
        g.add_input(a, DataType::Vec3, color);
        let a_out = g.add_output(a, DataType::Vec3);

        let b = g.add_node("node_gamma");
        g.add_input(b, DataType::Vec3, a_out);
        let b_out = g.add_output(b, DataType::Vec3);

        let c = g.add_node("node_emission");
        g.add_input(c, DataType::Vec3, b_out);
        let c_out = g.add_output(c, DataType::Closure);

        let d = g.add_node("node_unused");
        let uv = g.attribute(AttributeType::UvMap, "UVMap");
        g.add_input(d, DataType::Vec4, uv);
        g.add_output(d, DataType::Float);

        g.set_output(OutputKind::Surface, c_out);
        (g, [a, b, c, d])
    }

    #[test]
    fn prune_keeps_ancestors_and_drops_disconnected() {
        let (mut g, [a, b, c, d]) = chain_graph();
        g.prune_unused();

        assert!(g.contains_node(a));
        assert!(g.contains_node(b));
        assert!(g.contains_node(c));
        assert!(!g.contains_node(d));
        assert_eq!(g.node_count(), 3);
        // The only attribute was read by D.
        assert!(g.attributes().is_empty());
        assert!(g.flags().contains(MaterialFlags::HAS_SURFACE));
    }

    #[test]
    fn prune_is_idempotent() {
        let (mut once, _) = chain_graph();
        once.prune_unused();
        let mut twice = once.clone();
        twice.prune_unused();

        let ids_once: Vec<_> = once.nodes_in_order().map(|(id, _)| id).collect();
        let ids_twice: Vec<_> = twice.nodes_in_order().map(|(id, _)| id).collect();
        assert_eq!(ids_once, ids_twice);
        assert_eq!(once.link_count(), twice.link_count());
    }

    #[test]
    fn tag_reachable_marks_only_ancestors() {
        let (mut g, [a, b, c, d]) = chain_graph();
        let surface = g.outputs().surface.unwrap();
        g.tag_reachable(&[surface], NodeTag::SURFACE);

        for id in [a, b, c] {
            assert!(g.node(id).unwrap().tag.contains(NodeTag::SURFACE));
        }
        assert!(g.node(d).unwrap().tag.is_empty());
    }

    #[test]
    fn link_rejects_incompatible_types() {
        let mut g = NodeGraph::new();
        let m = g.add_node("node_matrix");
        let m_out = g.add_output(m, DataType::Mat4);
        let v = g.add_node("node_vector");
        let zero = g.constant(0.0);
        let input = g.add_input(v, DataType::Vec3, zero);

        let linked = g.link(OutputSlot { node: m, index: 0 }, input);
        assert!(!linked);
        assert_eq!(g.node(v).unwrap().inputs[0].link, zero);
        assert_eq!(g.get_link(m_out).unwrap().users, 0);
    }

    #[test]
    fn link_moves_users_to_new_source() {
        let mut g = NodeGraph::new();
        let src = g.add_node("node_value");
        let src_out = g.add_output(src, DataType::Float);
        let dst = g.add_node("node_math");
        let zero = g.constant(0.0);
        let input = g.add_input(dst, DataType::Vec3, zero);

        assert!(g.link(OutputSlot { node: src, index: 0 }, input));
        assert_eq!(g.get_link(src_out).unwrap().users, 1);
        assert_eq!(g.get_link(zero).unwrap().users, 0);
    }

    #[test]
    fn optimize_promotes_uniforms_only() {
        let mut g = NodeGraph::new();
        let u = g.uniform(0.5);
        let ua = g.uniform_attribute("color", false);
        let out = g.call("node_mix", &[u, ua], DataType::Vec4);
        g.set_output(OutputKind::Surface, out);

        assert_eq!(g.optimize(), 1);
        assert_eq!(
            g.get_link(u).unwrap().source,
            LinkSource::Constant(Value::Float(0.5))
        );
        assert!(matches!(
            g.get_link(ua).unwrap().source,
            LinkSource::UniformAttribute(_)
        ));
        assert_eq!(g.optimize(), 0);
    }

    #[test]
    fn uniform_attribute_ids_are_sorted_and_stable() {
        let build = |names: &[&str]| {
            let mut g = NodeGraph::new();
            let links: Vec<_> = names.iter().map(|n| g.uniform_attribute(n, false)).collect();
            let out = g.call("node_sum", &links, DataType::Vec4);
            g.set_output(OutputKind::Surface, out);
            g.prune_unused();
            let hash = g.finalize_uniform_attrs();
            (g, hash)
        };

        let (g1, h1) = build(&["zeta", "alpha", "mid"]);
        let (g2, h2) = build(&["mid", "zeta", "alpha", "alpha"]);
        assert_eq!(h1, h2);

        let names: Vec<_> = g1
            .uniform_attributes()
            .iter()
            .map(|a| (a.key.name.as_str(), a.id))
            .collect();
        assert_eq!(names, vec![("alpha", 0), ("mid", 1), ("zeta", 2)]);
        assert_eq!(g2.uniform_attributes().len(), 3);
    }

    #[test]
    fn color_bands_take_low_texture_indices() {
        let mut g = NodeGraph::new();
        let img = g.image_texture(ImageKey(7), SamplerState::default());
        let band = g.color_band(&[Vec4::ZERO, Vec4::ONE]);
        let out = g.call("node_tex", &[img, band], DataType::Vec4);
        g.set_output(OutputKind::Surface, out);
        g.prune_unused();

        let band_tex = g.textures().iter().find(|t| t.key.is_color_band()).unwrap();
        let img_tex = g.textures().iter().find(|t| !t.key.is_color_band()).unwrap();
        assert_eq!(band_tex.index, 0);
        assert_eq!(img_tex.index, 1);
    }

    #[test]
    fn duplicate_requests_share_one_resource() {
        let mut g = NodeGraph::new();
        let s = SamplerState::default();
        let t1 = g.image_texture(ImageKey(1), s);
        let t2 = g.image_texture(ImageKey(1), s);
        let a1 = g.attribute(AttributeType::Color, "Col");
        let a2 = g.attribute(AttributeType::Color, "Col");
        let out = g.call("node_mix", &[t1, t2, a1, a2], DataType::Vec4);
        g.set_output(OutputKind::Surface, out);
        g.prune_unused();

        assert_eq!(g.textures().len(), 1);
        assert_eq!(g.textures()[0].users, 2);
        assert_eq!(g.attributes().len(), 1);
        assert_eq!(g.attributes()[0].users, 2);
    }
}
