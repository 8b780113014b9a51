//! Pass Cache
//!
//! Content-addressed owner of every [`Pass`]. Materials whose graphs
//! generate the same source for the same engine share one pass and one
//! compiled program.
//!
//! # Lifecycle
//!
//! ```text
//!            get_or_create (miss)
//!                  │
//!      ┌───────────┼──────────────────────┐
//!      ▼           ▼                      ▼
//!  compile_sync  compile_batch_begin   awaiting submission
//!      │           │                  (optimized variants)
//!      │           │ update(): poll/finalize   │ update(): delay elapsed
//!      ▼           ▼                          ▼
//!   Success | Failed  ◄──────────────── compile_batch_begin(Low)
//!      │
//!      │ refcount == 0 for gc_threshold
//!      ▼
//!   evicted (destroy_shader)
//! ```
//!
//! All bookkeeping happens under one `parking_lot::Mutex`, so two concurrent
//! misses on the same key can never create two passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::handle::{EngineId, Pass, PassDescriptor, PassKey, PassRef, PassStatus};
use crate::codegen::CreateInfo;
use crate::compiler::{BatchHandle, CompilePriority, ShaderCompiler, ShaderHandle, validate_resources};
use crate::errors::{Result, ShaderGraphError};
use crate::settings::{MaterialOptions, PassCacheSettings};
use crate::utils::{Instant, time::elapsed_between};

/// How a cache miss should be compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileRequest {
    /// Submit to the batch queue instead of compiling inline.
    pub deferred: bool,
    pub priority: CompilePriority,
}

impl Default for CompileRequest {
    fn default() -> Self {
        Self {
            deferred: true,
            priority: CompilePriority::Medium,
        }
    }
}

impl From<&MaterialOptions> for CompileRequest {
    fn from(options: &MaterialOptions) -> Self {
        Self {
            deferred: options.deferred,
            priority: options.priority,
        }
    }
}

/// Snapshot of the cache contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCacheStats {
    pub base_passes: usize,
    pub optimization_passes: usize,
    pub queued: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Passes with a batch job in flight.
    pub compiling: usize,
    /// Optimized passes waiting for their activation delay.
    pub awaiting_submission: usize,
}

struct CacheEntry {
    pass: Arc<Pass>,
    job: Option<BatchHandle>,
    awaiting_submission: bool,
    /// Last update at which the pass was referenced.
    gc_timestamp: Instant,
    /// Acquired since the last update.
    touched: bool,
}

pub struct PassCache {
    compiler: Arc<dyn ShaderCompiler>,
    settings: PassCacheSettings,
    entries: Mutex<FxHashMap<PassKey, CacheEntry>>,
    shut_down: AtomicBool,
}

impl PassCache {
    #[must_use]
    pub fn init(compiler: Arc<dyn ShaderCompiler>, settings: PassCacheSettings) -> Arc<Self> {
        log::debug!("Pass cache initialized: {settings:?}");
        Arc::new(Self {
            compiler,
            settings,
            entries: Mutex::new(FxHashMap::default()),
            shut_down: AtomicBool::new(false),
        })
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &PassCacheSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn compiler(&self) -> &Arc<dyn ShaderCompiler> {
        &self.compiler
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Returns the pass for `(engine, is_optimization_pass, hash)`, creating
    /// it with `build` on a miss.
    ///
    /// `build` runs under the cache lock and only on a miss. If it fails the
    /// pass is still inserted, already `Failed`, so the failure is cached like
    /// any other outcome. Optimized passes always wait for
    /// [`PassCacheSettings::optimization_delay`] before being submitted, at
    /// low priority.
    pub fn get_or_create<F>(
        &self,
        engine: EngineId,
        hash: u128,
        is_optimization_pass: bool,
        request: CompileRequest,
        build: F,
    ) -> Result<PassRef>
    where
        F: FnOnce() -> Result<PassDescriptor>,
    {
        if self.is_shut_down() {
            log::warn!("Pass requested from a cache that has been shut down");
            return Err(ShaderGraphError::CacheShutdown);
        }

        let key = PassKey {
            engine,
            is_optimization_pass,
            hash,
        };
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&key) {
            log::debug!("Pass cache hit: {key:?}");
            entry.touched = true;
            return Ok(PassRef::new(&entry.pass));
        }

        let now = Instant::now();
        let (descriptor, build_error) = match build() {
            Ok(descriptor) => (descriptor, None),
            Err(e) => (
                PassDescriptor {
                    create_info: CreateInfo::default(),
                    should_optimize: false,
                },
                Some(e),
            ),
        };

        let pass = Arc::new(Pass::new(
            key,
            Arc::new(descriptor.create_info),
            descriptor.should_optimize,
            now,
        ));
        let pass_ref = PassRef::new(&pass);
        let mut entry = CacheEntry {
            pass,
            job: None,
            awaiting_submission: false,
            gc_timestamp: now,
            touched: false,
        };

        if let Some(e) = build_error {
            log::error!("Failed to generate pass {key:?}: {e}");
            entry.pass.fail();
        } else if is_optimization_pass {
            log::debug!("Pass cache miss: {key:?}, optimization deferred");
            entry.awaiting_submission = true;
        } else if request.deferred {
            log::debug!("Pass cache miss: {key:?}, submitted at {:?}", request.priority);
            entry.job = Some(
                self.compiler
                    .compile_batch_begin(Arc::clone(entry.pass.create_info()), request.priority),
            );
        } else {
            log::debug!("Pass cache miss: {key:?}, compiling inline");
            let result = self.compiler.compile_sync(entry.pass.create_info());
            self.finish(&entry.pass, result);
        }

        entries.insert(key, entry);
        Ok(pass_ref)
    }

    /// Takes another reference to `pass`.
    #[must_use]
    pub fn acquire(&self, pass: &PassRef) -> PassRef {
        if let Some(entry) = self.entries.lock().get_mut(&pass.key()) {
            entry.touched = true;
        }
        pass.clone()
    }

    /// Gives up a reference. The pass stays cached until GC evicts it.
    pub fn release(&self, pass: PassRef) {
        drop(pass);
    }

    // ── Per-frame maintenance ────────────────────────────────────────────────

    /// Advances asynchronous work and collects garbage.
    ///
    /// For every entry, in order:
    /// 1. a finished batch job is finalized;
    /// 2. an optimized pass that is referenced and older than the
    ///    optimization delay is submitted at low priority;
    /// 3. a pass that is referenced, or was acquired since the last update,
    ///    has its GC timestamp refreshed to `now`;
    /// 4. an unreferenced pass with no job in flight, idle for longer than
    ///    its variant's GC threshold, is evicted.
    pub fn update(&self, now: Instant) {
        let mut entries = self.entries.lock();

        for entry in entries.values_mut() {
            if entry
                .job
                .as_ref()
                .is_some_and(|job| self.compiler.compile_batch_poll(job))
                && let Some(job) = entry.job.take()
            {
                let result = self.compiler.compile_batch_finalize(job);
                self.finish(&entry.pass, result);
            }

            if entry.awaiting_submission
                && entry.pass.refcount() > 0
                && elapsed_between(entry.pass.created_at(), now) >= self.settings.optimization_delay
            {
                log::debug!("Submitting optimized pass {:?}", entry.pass.key());
                entry.awaiting_submission = false;
                entry.job = Some(self.compiler.compile_batch_begin(
                    Arc::clone(entry.pass.create_info()),
                    CompilePriority::Low,
                ));
            }

            if std::mem::take(&mut entry.touched) || entry.pass.refcount() > 0 {
                entry.gc_timestamp = now;
            }
        }

        let before = entries.len();
        entries.retain(|key, entry| {
            let threshold = self.settings.gc_threshold(key.is_optimization_pass);
            let evict = entry.pass.refcount() == 0
                && entry.job.is_none()
                && elapsed_between(entry.gc_timestamp, now) >= threshold;
            if evict {
                log::debug!("Evicting idle pass {key:?}");
                if let Some(shader) = entry.pass.shader_unchecked() {
                    self.compiler.destroy_shader(shader);
                }
            }
            !evict
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            log::debug!("Pass cache GC evicted {evicted} passes, {} remain", entries.len());
        }
    }

    /// Blocks until `pass` is `Success` or `Failed`.
    ///
    /// An optimized pass still waiting for its activation delay is compiled
    /// right away.
    pub fn ensure_ready(&self, pass: &PassRef) {
        if pass.status() != PassStatus::Queued {
            return;
        }
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&pass.key()) else {
            return;
        };

        if entry.awaiting_submission {
            entry.awaiting_submission = false;
            let result = self.compiler.compile_sync(entry.pass.create_info());
            self.finish(&entry.pass, result);
        } else if let Some(job) = entry.job.take() {
            let result = self.compiler.compile_batch_finalize(job);
            self.finish(&entry.pass, result);
        }
    }

    /// Cancels every in-flight job and releases every program. Later
    /// requests fail with [`ShaderGraphError::CacheShutdown`]. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<_> = self.entries.lock().drain().collect();
        let released = drained.len();
        let mut cancelled = 0;
        for (_, entry) in drained {
            if let Some(job) = entry.job {
                self.compiler.compile_batch_cancel(job);
                cancelled += 1;
            }
            if let Some(shader) = entry.pass.shader_unchecked() {
                self.compiler.destroy_shader(shader);
            }
        }
        if cancelled > 0 {
            log::warn!("Cancelled {cancelled} in-flight shader compilations at shutdown");
        }
        log::info!("Pass cache shut down, released {released} passes");
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &PassKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    #[must_use]
    pub fn stats(&self) -> PassCacheStats {
        let entries = self.entries.lock();
        let mut stats = PassCacheStats::default();
        for entry in entries.values() {
            if entry.pass.is_optimization_pass() {
                stats.optimization_passes += 1;
            } else {
                stats.base_passes += 1;
            }
            match entry.pass.status() {
                PassStatus::Queued => stats.queued += 1,
                PassStatus::Success => stats.succeeded += 1,
                PassStatus::Failed => stats.failed += 1,
            }
            stats.compiling += usize::from(entry.job.is_some());
            stats.awaiting_submission += usize::from(entry.awaiting_submission);
        }
        stats
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn finish(&self, pass: &Pass, result: Result<ShaderHandle>) {
        match result {
            Ok(shader) => {
                log::debug!("Pass {:?} compiled", pass.key());
                pass.complete(shader);
            }
            Err(e) => {
                pass.fail();
                let info = pass.create_info();
                match validate_resources(info, &self.compiler.limits()) {
                    Err(limit) => {
                        log::error!("Shader '{}' failed to compile: {e} ({limit})", info.name);
                    }
                    Ok(()) => log::error!("Shader '{}' failed to compile: {e}", info.name),
                }
            }
        }
    }
}

impl Drop for PassCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
