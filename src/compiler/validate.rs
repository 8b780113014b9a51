//! Resource-limit diagnostics.
//!
//! Run after a compile failed, to turn an opaque backend log into a precise
//! "too many samplers" style message.

use serde::{Deserialize, Serialize};

use crate::codegen::CreateInfo;
use crate::errors::{Result, ShaderGraphError};

/// Per-program backend limits.
///
/// | Field                  | Default |
/// |------------------------|---------|
/// | `max_samplers`         | 16      |
/// | `max_vertex_attribs`   | 16      |
/// | `max_uniform_buffers`  | 12      |
/// | `max_uniform_block_size` | 16 KiB |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_samplers: usize,
    pub max_vertex_attribs: usize,
    pub max_uniform_buffers: usize,
    pub max_uniform_block_size: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samplers: 16,
            max_vertex_attribs: 16,
            max_uniform_buffers: 12,
            max_uniform_block_size: 16 * 1024,
        }
    }
}

/// First limit `info` exceeds, if any.
pub fn validate_resources(info: &CreateInfo, limits: &ResourceLimits) -> Result<()> {
    let check = |resource: &'static str, count: usize, limit: usize| {
        if count > limit {
            Err(ShaderGraphError::ResourceLimit {
                resource,
                count,
                limit,
            })
        } else {
            Ok(())
        }
    };

    check("samplers", info.samplers.len(), limits.max_samplers)?;
    check(
        "vertex attributes",
        info.vertex_inputs.len(),
        limits.max_vertex_attribs,
    )?;
    check(
        "uniform buffers",
        info.uniform_buffers.len(),
        limits.max_uniform_buffers,
    )?;
    let largest = info
        .uniform_buffers
        .iter()
        .map(|ubo| ubo.size)
        .max()
        .unwrap_or(0);
    check(
        "uniform block bytes",
        largest,
        limits.max_uniform_block_size,
    )
}
