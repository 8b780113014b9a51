//! Nodes, slots and links.
//!
//! A [`Link`] is the value produced by one source: a node output, an inline
//! constant, a uniform, an attribute or a texture. Inputs refer to links by
//! [`LinkId`]; the same link may feed any number of inputs. Links never own
//! the node that produces them.

use slotmap::new_key_type;
use smallvec::SmallVec;

use super::resources::{AttributeKey, TextureKey, UniformAttributeKey};
use super::types::{DataType, NodeTag, Value};

new_key_type! {
    /// Handle to a node inside one [`NodeGraph`](super::NodeGraph).
    pub struct NodeId;
    /// Handle to a link inside one [`NodeGraph`](super::NodeGraph).
    pub struct LinkId;
}

/// Where a link's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkSource {
    /// Output `slot` of `node`.
    NodeOutput { node: NodeId, slot: usize },
    /// Literal baked into the generated source.
    Constant(Value),
    /// Member of the material uniform block; editable without recompiling.
    Uniform(Value),
    Attribute(AttributeKey),
    UniformAttribute(UniformAttributeKey),
    LayerAttribute(String),
    Texture(TextureKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub source: LinkSource,
    pub ty: DataType,
    /// Inputs and registered outputs reading this link.
    pub users: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    pub ty: DataType,
    pub link: LinkId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub ty: DataType,
    pub link: LinkId,
}

/// Addresses input `index` of `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputSlot {
    pub node: NodeId,
    pub index: usize,
}

/// Addresses output `index` of `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSlot {
    pub node: NodeId,
    pub index: usize,
}

/// A call to a library shader function.
///
/// Generated as `name(inputs..., out outputs...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub tag: NodeTag,
    /// Insertion sequence number; breaks ordering ties during codegen.
    pub(crate) seq: u64,
    pub inputs: SmallVec<[Input; 4]>,
    pub outputs: SmallVec<[Output; 2]>,
}

impl Node {
    pub(crate) fn new(name: &str, seq: u64) -> Self {
        Self {
            name: name.to_owned(),
            tag: NodeTag::empty(),
            seq,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}
