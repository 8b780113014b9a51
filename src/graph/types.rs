//! Value types flowing through the material node graph.

use bitflags::bitflags;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::Serialize;
use smallvec::SmallVec;

// ─── Data Types ──────────────────────────────────────────────────────────────

/// Type of a value carried by a link or declared by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DataType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    /// Opaque BSDF/volume closure.
    Closure,
    /// Sampled 2D image.
    Sampler2D,
    /// Row of the shared color-band texture array.
    Sampler1DArray,
}

impl DataType {
    #[must_use]
    pub fn glsl_name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
            Self::Closure => "Closure",
            Self::Sampler2D => "sampler2D",
            Self::Sampler1DArray => "sampler1DArray",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D | Self::Sampler1DArray)
    }

    /// Byte size under std140 rules. Zero for non-uniform types.
    #[must_use]
    pub fn std140_size(self) -> usize {
        match self {
            Self::Float => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            // Each mat3 column is padded to a vec4.
            Self::Mat3 => 48,
            Self::Mat4 => 64,
            Self::Closure | Self::Sampler2D | Self::Sampler1DArray => 0,
        }
    }

    /// Base alignment under std140 rules.
    #[must_use]
    pub fn std140_align(self) -> usize {
        match self {
            Self::Float => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 | Self::Mat3 | Self::Mat4 => 16,
            Self::Closure | Self::Sampler2D | Self::Sampler1DArray => 1,
        }
    }

    /// Whether a value of type `self` can feed an input of type `to`.
    #[must_use]
    pub fn can_convert_to(self, to: DataType) -> bool {
        self.convert_expr(to, "x").is_some()
    }

    /// Wraps `expr` (of type `self`) so it yields a value of type `to`.
    ///
    /// Returns `None` for incompatible pairs.
    #[must_use]
    pub fn convert_expr(self, to: DataType, expr: &str) -> Option<String> {
        use DataType::{Closure, Float, Mat3, Mat4, Vec2, Vec3, Vec4};

        if self == to {
            return Some(expr.to_owned());
        }
        let converted = match (self, to) {
            (Float, Vec2 | Vec3 | Vec4) => format!("{}({expr})", to.glsl_name()),
            (Vec2, Float) => format!("{expr}.x"),
            (Vec3 | Vec4, Float) => format!("dot({expr}.rgb, vec3(0.2126, 0.7152, 0.0722))"),
            (Vec2, Vec3) => format!("vec3({expr}, 0.0)"),
            (Vec2, Vec4) => format!("vec4({expr}, 0.0, 1.0)"),
            (Vec3, Vec2) | (Vec4, Vec2) => format!("{expr}.xy"),
            (Vec3, Vec4) => format!("vec4({expr}, 1.0)"),
            (Vec4, Vec3) => format!("{expr}.rgb"),
            (Float, Closure) => format!("closure_from_color(vec3({expr}))"),
            (Vec3, Closure) => format!("closure_from_color({expr})"),
            (Vec4, Closure) => format!("closure_from_color({expr}.rgb)"),
            (Mat3, Mat4) => format!("mat4({expr})"),
            (Mat4, Mat3) => format!("mat3({expr})"),
            _ => return None,
        };
        Some(converted)
    }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// Inline value of a constant or uniform link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl Value {
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Vec2(_) => DataType::Vec2,
            Self::Vec3(_) => DataType::Vec3,
            Self::Vec4(_) => DataType::Vec4,
            Self::Mat3(_) => DataType::Mat3,
            Self::Mat4(_) => DataType::Mat4,
        }
    }

    /// Components in column-major order.
    #[must_use]
    pub fn components(&self) -> SmallVec<[f32; 16]> {
        match self {
            Self::Float(v) => SmallVec::from_slice(&[*v]),
            Self::Vec2(v) => SmallVec::from_slice(&v.to_array()),
            Self::Vec3(v) => SmallVec::from_slice(&v.to_array()),
            Self::Vec4(v) => SmallVec::from_slice(&v.to_array()),
            Self::Mat3(m) => SmallVec::from_slice(&m.to_cols_array()),
            Self::Mat4(m) => SmallVec::from_slice(&m.to_cols_array()),
        }
    }

    /// GLSL literal spelling the exact bit pattern of every component.
    #[must_use]
    pub fn glsl_literal(&self) -> String {
        let parts: SmallVec<[String; 16]> =
            self.components().iter().map(|c| float_literal(*c)).collect();
        match self {
            Self::Float(_) => parts[0].clone(),
            _ => format!("{}({})", self.data_type().glsl_name(), parts.join(", ")),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec2> for Value {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec3> for Value {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for Value {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat3> for Value {
    fn from(v: Mat3) -> Self {
        Self::Mat3(v)
    }
}

impl From<Mat4> for Value {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

/// Shortest round-trip spelling; non-finite values go through their bits.
fn float_literal(v: f32) -> String {
    if v.is_finite() {
        let s = format!("{v:?}");
        if s.contains(['.', 'e']) { s } else { format!("{s}.0") }
    } else {
        format!("uintBitsToFloat({}u)", v.to_bits())
    }
}

// ─── Tags & Flags ────────────────────────────────────────────────────────────

bitflags! {
    /// Output categories a node contributes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeTag: u32 {
        const SURFACE      = 1 << 0;
        const VOLUME       = 1 << 1;
        const DISPLACEMENT = 1 << 2;
        const THICKNESS    = 1 << 3;
        const AOV          = 1 << 4;
        const FUNCTION     = 1 << 5;
        const COMPOSITOR   = 1 << 6;
    }
}

bitflags! {
    /// Material-level feature flags.
    ///
    /// The `HAS_*` output flags are derived from the registered outputs; the
    /// remaining flags are set by the graph construction callback.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        const HAS_SURFACE        = 1 << 0;
        const HAS_VOLUME         = 1 << 1;
        const HAS_DISPLACEMENT   = 1 << 2;
        const HAS_THICKNESS      = 1 << 3;
        const HAS_AOV            = 1 << 4;
        const HAS_FUNCTIONS      = 1 << 5;
        const HAS_COMPOSITE      = 1 << 6;
        const UNIFORM_ATTRIBUTES = 1 << 7;
        const LAYER_ATTRIBUTES   = 1 << 8;

        const TRANSPARENT        = 1 << 16;
        const BARYCENTRIC        = 1 << 17;
        const OBJECT_INFO        = 1 << 18;
    }
}

/// Single-link output categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutputKind {
    Surface,
    Volume,
    Displacement,
    Thickness,
}

impl OutputKind {
    pub const ALL: [OutputKind; 4] = [
        OutputKind::Surface,
        OutputKind::Volume,
        OutputKind::Displacement,
        OutputKind::Thickness,
    ];

    #[must_use]
    pub fn tag(self) -> NodeTag {
        match self {
            Self::Surface => NodeTag::SURFACE,
            Self::Volume => NodeTag::VOLUME,
            Self::Displacement => NodeTag::DISPLACEMENT,
            Self::Thickness => NodeTag::THICKNESS,
        }
    }

    #[must_use]
    pub fn flag(self) -> MaterialFlags {
        match self {
            Self::Surface => MaterialFlags::HAS_SURFACE,
            Self::Volume => MaterialFlags::HAS_VOLUME,
            Self::Displacement => MaterialFlags::HAS_DISPLACEMENT,
            Self::Thickness => MaterialFlags::HAS_THICKNESS,
        }
    }

    /// Type the generated entry function returns.
    #[must_use]
    pub fn result_type(self) -> DataType {
        match self {
            Self::Surface | Self::Volume => DataType::Closure,
            Self::Displacement => DataType::Vec3,
            Self::Thickness => DataType::Float,
        }
    }

    #[must_use]
    pub fn function_name(self) -> &'static str {
        match self {
            Self::Surface => "nodetree_surface",
            Self::Volume => "nodetree_volume",
            Self::Displacement => "nodetree_displacement",
            Self::Thickness => "nodetree_thickness",
        }
    }
}
