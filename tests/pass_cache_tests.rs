//! Pass Cache Tests
//!
//! Tests for:
//! - Cache identity: one pass per (engine, variant, hash), shared refcounts
//! - Inline vs deferred compilation and status monotonicity
//! - Garbage collection: thresholds, referenced and compiling passes survive
//! - Optimization passes: activation delay, low priority, early eviction
//! - Shutdown: in-flight jobs cancelled exactly once, never finalized

mod common;

use std::cell::Cell;
use std::time::Duration;

use common::{CountingCompiler, cache_with};
use myth_shadergraph::compiler::CompilePriority;
use myth_shadergraph::pass::{CompileRequest, EngineId, PassDescriptor, PassKey, PassRef, PassStatus};
use myth_shadergraph::utils::Instant;
use myth_shadergraph::{CreateInfo, PassCache, Result, ShaderGraphError};

const ENGINE: EngineId = EngineId(0);

const INLINE: CompileRequest = CompileRequest {
    deferred: false,
    priority: CompilePriority::Medium,
};

const DEFERRED: CompileRequest = CompileRequest {
    deferred: true,
    priority: CompilePriority::Medium,
};

fn descriptor(name: &str) -> Result<PassDescriptor> {
    Ok(PassDescriptor {
        create_info: CreateInfo {
            name: name.to_owned(),
            fragment_source: Some("void main() {}".to_owned()),
            ..Default::default()
        },
        should_optimize: false,
    })
}

fn request(cache: &PassCache, hash: u128, is_opt: bool, req: CompileRequest) -> PassRef {
    cache
        .get_or_create(ENGINE, hash, is_opt, req, || descriptor("test"))
        .unwrap()
}

// ============================================================================
// Cache identity
// ============================================================================

#[test]
fn same_key_returns_same_pass() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);
    let builds = Cell::new(0);

    let get = || {
        cache
            .get_or_create(ENGINE, 0xabc, false, INLINE, || {
                builds.set(builds.get() + 1);
                descriptor("shared")
            })
            .unwrap()
    };
    let a = get();
    let b = get();

    assert!(PassRef::ptr_eq(&a, &b));
    assert_eq!(a.refcount(), 2);
    assert_eq!(builds.get(), 1);
    assert_eq!(compiler.compiles(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn engine_and_variant_are_part_of_the_key() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);

    let base = request(&cache, 1, false, INLINE);
    let other_engine = cache
        .get_or_create(EngineId(1), 1, false, INLINE, || descriptor("other"))
        .unwrap();
    let optimized = request(&cache, 1, true, DEFERRED);

    assert!(!PassRef::ptr_eq(&base, &other_engine));
    assert!(!PassRef::ptr_eq(&base, &optimized));
    assert_eq!(cache.len(), 3);
    assert!(cache.contains(&PassKey {
        engine: EngineId(1),
        is_optimization_pass: false,
        hash: 1
    }));
}

#[test]
fn acquire_and_release_adjust_refcount() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);

    let first = request(&cache, 7, false, INLINE);
    let second = cache.acquire(&first);
    assert_eq!(first.refcount(), 2);

    cache.release(second);
    assert_eq!(first.refcount(), 1);
    assert!(cache.contains(&first.key()));
}

// ============================================================================
// Compilation paths
// ============================================================================

#[test]
fn inline_request_compiles_before_returning() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);

    let pass = request(&cache, 1, false, INLINE);
    assert_eq!(pass.status(), PassStatus::Success);
    assert!(pass.shader().is_some());
    assert_eq!(CountingCompiler::count(&compiler.sync_compiles), 1);
    assert_eq!(CountingCompiler::count(&compiler.batch_begins), 0);
}

#[test]
fn deferred_status_only_moves_forward() {
    let compiler = CountingCompiler::new();
    compiler.set_ready(false);
    let cache = cache_with(&compiler);
    let t0 = Instant::now();

    let pass = request(&cache, 2, false, DEFERRED);
    assert_eq!(pass.status(), PassStatus::Queued);
    assert_eq!(compiler.priorities.lock().as_slice(), &[CompilePriority::Medium]);

    cache.update(t0);
    assert_eq!(pass.status(), PassStatus::Queued);
    assert_eq!(CountingCompiler::count(&compiler.finalizes), 0);

    compiler.set_ready(true);
    cache.update(t0 + Duration::from_millis(16));
    assert_eq!(pass.status(), PassStatus::Success);

    let shader = pass.shader();
    for frame in 2..10 {
        cache.update(t0 + Duration::from_millis(16 * frame));
        assert_eq!(pass.status(), PassStatus::Success);
        assert_eq!(pass.shader(), shader);
    }
    assert_eq!(CountingCompiler::count(&compiler.finalizes), 1);
}

#[test]
fn failed_pass_is_never_retried() {
    let compiler = CountingCompiler::new();
    compiler.set_failing(true);
    let cache = cache_with(&compiler);
    let t0 = Instant::now();

    let pass = request(&cache, 3, false, DEFERRED);
    cache.update(t0);
    assert_eq!(pass.status(), PassStatus::Failed);

    compiler.set_failing(false);
    cache.update(t0 + Duration::from_secs(1));
    let again = request(&cache, 3, false, DEFERRED);
    assert_eq!(again.status(), PassStatus::Failed);
    assert_eq!(compiler.compiles(), 1);
    assert_eq!(CountingCompiler::count(&compiler.finalizes), 1);
}

#[test]
fn build_error_caches_a_failed_pass() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);

    let pass = cache
        .get_or_create(ENGINE, 4, false, INLINE, || {
            Err(ShaderGraphError::UnknownTemplate("missing".to_owned()))
        })
        .unwrap();
    assert_eq!(pass.status(), PassStatus::Failed);
    assert_eq!(compiler.compiles(), 0);
}

#[test]
fn ensure_ready_blocks_until_finished() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);

    let pass = request(&cache, 5, false, DEFERRED);
    assert_eq!(pass.status(), PassStatus::Queued);
    cache.ensure_ready(&pass);
    assert_eq!(pass.status(), PassStatus::Success);

    let optimized = request(&cache, 5, true, DEFERRED);
    cache.ensure_ready(&optimized);
    assert_eq!(optimized.status(), PassStatus::Success);
}

// ============================================================================
// Garbage collection
// ============================================================================

#[test]
fn unreferenced_base_pass_evicted_after_threshold() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);
    let t0 = Instant::now();

    let pass = request(&cache, 10, false, INLINE);
    let key = pass.key();
    cache.update(t0);
    drop(pass);

    cache.update(t0 + Duration::from_secs(59));
    assert!(cache.contains(&key));

    cache.update(t0 + Duration::from_secs(61));
    assert!(!cache.contains(&key));
    assert_eq!(CountingCompiler::count(&compiler.destroyed), 1);
}

#[test]
fn hit_between_updates_restarts_the_idle_clock() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);
    let t0 = Instant::now();

    let key = request(&cache, 13, false, INLINE).key();
    cache.update(t0);

    // Acquired and released again before the next update.
    drop(request(&cache, 13, false, INLINE));
    cache.update(t0 + Duration::from_secs(50));

    cache.update(t0 + Duration::from_secs(61));
    assert!(cache.contains(&key));

    cache.update(t0 + Duration::from_secs(111));
    assert!(!cache.contains(&key));
}

#[test]
fn referenced_pass_is_never_evicted() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);
    let t0 = Instant::now();

    let pass = request(&cache, 11, false, INLINE);
    for hour in 1..4 {
        cache.update(t0 + Duration::from_secs(3600 * hour));
        assert!(cache.contains(&pass.key()));
    }
}

#[test]
fn compiling_pass_is_never_evicted() {
    let compiler = CountingCompiler::new();
    compiler.set_ready(false);
    let cache = cache_with(&compiler);
    let t0 = Instant::now();

    let key = request(&cache, 12, false, DEFERRED).key();
    cache.update(t0 + Duration::from_secs(3600));
    assert!(cache.contains(&key));
    assert_eq!(cache.stats().compiling, 1);
}

// ============================================================================
// Optimization passes
// ============================================================================

#[test]
fn optimization_pass_waits_for_delay() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);
    let t0 = Instant::now();

    let pass = request(&cache, 20, true, DEFERRED);
    assert_eq!(cache.stats().awaiting_submission, 1);

    cache.update(t0 + Duration::from_secs(5));
    assert_eq!(CountingCompiler::count(&compiler.batch_begins), 0);
    assert_eq!(pass.status(), PassStatus::Queued);

    cache.update(t0 + Duration::from_secs(11));
    assert_eq!(CountingCompiler::count(&compiler.batch_begins), 1);
    assert_eq!(compiler.priorities.lock().as_slice(), &[CompilePriority::Low]);

    cache.update(t0 + Duration::from_secs(12));
    assert_eq!(pass.status(), PassStatus::Success);
}

#[test]
fn unreferenced_optimization_pass_is_dropped_unsubmitted() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);
    let t0 = Instant::now();

    let key = request(&cache, 21, true, DEFERRED).key();
    cache.update(t0 + Duration::from_secs(11));

    assert!(!cache.contains(&key));
    assert_eq!(CountingCompiler::count(&compiler.batch_begins), 0);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn shutdown_cancels_in_flight_jobs_exactly_once() {
    let compiler = CountingCompiler::new();
    compiler.set_ready(false);
    let cache = cache_with(&compiler);

    let pass = request(&cache, 30, false, DEFERRED);
    cache.shutdown();
    cache.shutdown();

    assert_eq!(CountingCompiler::count(&compiler.cancels), 1);
    assert_eq!(CountingCompiler::count(&compiler.finalizes), 0);
    assert!(cache.is_empty());
    assert_eq!(pass.status(), PassStatus::Queued);

    let err = cache
        .get_or_create(ENGINE, 31, false, INLINE, || descriptor("late"))
        .unwrap_err();
    assert!(matches!(err, ShaderGraphError::CacheShutdown));

    drop(cache);
    assert_eq!(CountingCompiler::count(&compiler.cancels), 1);
}

#[test]
fn dropping_the_cache_shuts_it_down() {
    let compiler = CountingCompiler::new();
    compiler.set_ready(false);
    let cache = cache_with(&compiler);

    drop(request(&cache, 40, false, DEFERRED));
    drop(cache);
    assert_eq!(CountingCompiler::count(&compiler.cancels), 1);
}

#[test]
fn stats_count_variants_and_states() {
    let compiler = CountingCompiler::new();
    let cache = cache_with(&compiler);

    let _a = request(&cache, 50, false, INLINE);
    let _b = request(&cache, 51, false, DEFERRED);
    let _c = request(&cache, 50, true, DEFERRED);

    let stats = cache.stats();
    assert_eq!(stats.base_passes, 2);
    assert_eq!(stats.optimization_passes, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.queued, 2);
    assert_eq!(stats.compiling, 1);
    assert_eq!(stats.awaiting_submission, 1);
}
