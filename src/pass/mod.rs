//! Shader passes and the cache that owns them.

pub mod cache;
pub mod handle;

pub use cache::{CompileRequest, PassCache, PassCacheStats};
pub use handle::{EngineId, Pass, PassDescriptor, PassKey, PassRef, PassStatus};
