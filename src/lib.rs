#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod codegen;
pub mod compiler;
pub mod errors;
pub mod graph;
pub mod material;
pub mod pass;
pub mod settings;
pub mod utils;

pub use codegen::{Codegen, CodegenOutput, CreateInfo, ShaderAssembler, ShaderDefines};
pub use compiler::{BatchHandle, CompilePriority, ResourceLimits, ShaderCompiler, ShaderHandle};
#[cfg(not(target_arch = "wasm32"))]
pub use compiler::ThreadedCompiler;
pub use errors::{Result, ShaderGraphError};
pub use graph::{DataType, LinkId, MaterialFlags, NodeGraph, NodeId, OutputKind, Value};
pub use material::{
    ConstructGraph, FinalizeCodegen, Material, MaterialInfo, MaterialSet, MaterialStatus,
    OptimizationStatus,
};
pub use pass::{EngineId, PassCache, PassRef, PassStatus};
pub use settings::{CodegenOptions, MaterialOptions, OptimizationHeuristic, PassCacheSettings};
