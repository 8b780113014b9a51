//! Resources requested by a node graph.
//!
//! Requests are deduplicated by identity (type + name for attributes, image +
//! sampler state for textures). After pruning, the lists only contain what the
//! surviving nodes reference, and each entry carries the id the generated
//! source uses to address it.

use glam::Vec4;
use serde::Serialize;

// ─── Attributes ──────────────────────────────────────────────────────────────

/// Semantic category of a per-vertex attribute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AttributeType {
    /// Arbitrary named mesh attribute.
    Generic,
    UvMap,
    Tangent,
    Color,
    /// Original (undeformed) coordinates.
    Orco,
}

impl AttributeType {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Generic => "a",
            Self::UvMap => "u",
            Self::Tangent => "t",
            Self::Color => "c",
            Self::Orco => "orco",
        }
    }
}

/// Identity of an attribute request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttributeKey {
    pub ty: AttributeType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub key: AttributeKey,
    /// Vertex input location, sequential in request order.
    pub id: u32,
    /// Number of links reading this attribute.
    pub users: u32,
}

// ─── Uniform / Layer Attributes ──────────────────────────────────────────────

/// Identity of a per-object uniform attribute request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UniformAttributeKey {
    pub name: String,
    /// Read from the instancing parent instead of the object itself.
    pub use_dupli: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniformAttribute {
    pub key: UniformAttributeKey,
    /// Slot in the uniform-attribute block. Stable once
    /// [`NodeGraph::finalize_uniform_attrs`](super::NodeGraph::finalize_uniform_attrs) ran.
    pub id: u32,
    pub users: u32,
}

/// View-layer attribute read through the engine's layer attribute buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerAttribute {
    pub name: String,
    pub id: u32,
    pub users: u32,
}

// ─── Textures ────────────────────────────────────────────────────────────────

/// Opaque identity of an image supplied by the caller (image + image user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImageKey(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
    Cubic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TextureExtend {
    #[default]
    Repeat,
    Clamp,
    Mirror,
    ClipToBorder,
}

/// Sampler state; part of a texture request's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SamplerState {
    pub filter: TextureFilter,
    pub extend: TextureExtend,
    pub mipmap: bool,
    pub anisotropic: bool,
}

/// Identity of a texture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TextureKey {
    Image { image: ImageKey, sampler: SamplerState },
    /// Color bands are never shared; the serial distinguishes them.
    ColorBand(u32),
}

impl TextureKey {
    #[inline]
    #[must_use]
    pub fn is_color_band(&self) -> bool {
        matches!(self, Self::ColorBand(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureResource {
    pub key: TextureKey,
    /// Pixel row uploaded by the material for color bands.
    #[serde(skip)]
    pub color_band: Option<Vec<Vec4>>,
    /// Position in binding order: color bands first, then images, each in
    /// request order. Codegen adds the engine's reserved slot count.
    pub index: u32,
    pub users: u32,
}

impl TextureResource {
    /// Name of the sampler in generated source.
    #[must_use]
    pub fn sampler_name(&self) -> String {
        format!("samp{}", self.index)
    }
}

// ─── Surviving Resources ─────────────────────────────────────────────────────

/// What remains of a node graph once its nodes have been discarded.
///
/// Owned by the [`Material`](crate::material::Material) for runtime binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphResources {
    pub attributes: Vec<Attribute>,
    pub textures: Vec<TextureResource>,
    pub uniform_attributes: Vec<UniformAttribute>,
    /// Hash of the finalized uniform-attribute list, shared by every material
    /// requesting the same set.
    pub uniform_attributes_hash: u64,
    pub layer_attributes: Vec<LayerAttribute>,
}
