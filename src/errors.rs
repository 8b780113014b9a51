//! Error Types
//!
//! This module defines the error types used throughout the shader graph engine.
//!
//! # Overview
//!
//! The main error type [`ShaderGraphError`] covers the recoverable failure modes:
//! - Stage template rendering failures
//! - Backend compilation failures
//! - Resource-limit violations found while diagnosing a failed compile
//! - Requests against a cache that has been shut down
//!
//! Graph construction defects (dangling links, cross-graph links) are not
//! represented here: they are programming errors and trip `debug_assert!`s.
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_shadergraph::errors::{ShaderGraphError, Result};
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the shader graph engine.
#[derive(Error, Debug)]
pub enum ShaderGraphError {
    // ========================================================================
    // Code Generation Errors
    // ========================================================================
    /// A stage template failed to load or render.
    #[error("Shader template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The finalize callback selected a template that does not exist.
    #[error("Unknown shader template: {0}")]
    UnknownTemplate(String),

    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// The backend rejected the generated source.
    #[error("Failed to compile shader '{name}': {log}")]
    Compile {
        /// Name of the create info that failed
        name: String,
        /// Backend diagnostic output
        log: String,
    },

    /// The generated shader exceeds a backend resource limit.
    #[error("Shader uses {count} {resource}, backend limit is {limit}")]
    ResourceLimit {
        /// Resource kind (samplers, vertex attributes, ...)
        resource: &'static str,
        /// Number requested by the shader
        count: usize,
        /// Backend maximum
        limit: usize,
    },

    /// The batch job was cancelled before it produced a result.
    #[error("Compilation job was cancelled")]
    Cancelled,

    /// The compiler backend stopped before answering.
    #[error("Compiler backend disconnected")]
    BackendDisconnected,

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// The pass cache was shut down.
    #[error("Pass cache has been shut down")]
    CacheShutdown,
}

impl ShaderGraphError {
    /// Convenience constructor for backend compile failures.
    pub fn compile(name: impl Into<String>, log: impl Into<String>) -> Self {
        Self::Compile {
            name: name.into(),
            log: log.into(),
        }
    }
}

/// Alias for `Result<T, ShaderGraphError>`.
pub type Result<T> = std::result::Result<T, ShaderGraphError>;
