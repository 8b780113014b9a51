//! Backend-facing compilation request.
//!
//! A [`CreateInfo`] is immutable pure data once assembled: everything the
//! backend needs to build one program and nothing tied to the node graph it
//! came from. Passes share it through an `Arc`.

use serde::Serialize;

use super::defines::ShaderDefines;
use crate::graph::{AttributeType, DataType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VertexInput {
    /// Member name inside the `var_attrs` interface block.
    pub name: String,
    pub location: u32,
    pub ty: DataType,
    pub attribute_type: AttributeType,
    /// Mesh-side attribute name the engine binds.
    pub attribute_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SamplerBinding {
    pub name: String,
    pub slot: u32,
    pub ty: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniformBufferBinding {
    pub name: String,
    pub slot: u32,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }
}

/// Everything needed to compile one shader program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateInfo {
    /// Debug label.
    pub name: String,
    pub vertex_inputs: Vec<VertexInput>,
    pub samplers: Vec<SamplerBinding>,
    pub uniform_buffers: Vec<UniformBufferBinding>,
    pub defines: ShaderDefines,
    pub vertex_source: Option<String>,
    pub fragment_source: Option<String>,
    pub compute_source: Option<String>,
}

impl CreateInfo {
    #[must_use]
    pub fn stage_source(&self, stage: ShaderStage) -> Option<&str> {
        match stage {
            ShaderStage::Vertex => self.vertex_source.as_deref(),
            ShaderStage::Fragment => self.fragment_source.as_deref(),
            ShaderStage::Compute => self.compute_source.as_deref(),
        }
    }

    /// Stages present, in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, &str)> + '_ {
        [ShaderStage::Vertex, ShaderStage::Fragment, ShaderStage::Compute]
            .into_iter()
            .filter_map(|stage| self.stage_source(stage).map(|src| (stage, src)))
    }
}
