//! Reference batch backend.
//!
//! A fixed pool of worker threads fed by one flume channel per
//! [`CompilePriority`]. Every submission also rings a shared doorbell
//! channel; a worker woken by the doorbell takes the most urgent job
//! available, so High always drains before Medium and Medium before Low.
//!
//! Each job answers through its own bounded(1) channel, which is what
//! [`compile_batch_poll`](ShaderCompiler::compile_batch_poll) peeks at.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use flume::{Receiver, RecvError, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{
    BatchHandle, CompilePriority, ResourceLimits, ShaderCompiler, ShaderHandle,
    validate_resources,
};
use crate::codegen::{CreateInfo, ShaderStage};
use crate::errors::{Result, ShaderGraphError};

// ─── Program builders ────────────────────────────────────────────────────────

/// The step that actually turns sources into a program.
pub trait ProgramBuilder: Send + Sync + 'static {
    fn build(&self, info: &CreateInfo) -> Result<()>;
}

/// Structural checks standing in for a driver compiler.
///
/// Rejects create infos with no stages, a vertex stage without a fragment
/// stage (or vice versa), stages without a `main` entry point, unbalanced
/// delimiters, and resource counts beyond `limits`.
#[derive(Debug, Clone, Default)]
pub struct SourceValidator {
    pub limits: ResourceLimits,
}

impl ProgramBuilder for SourceValidator {
    fn build(&self, info: &CreateInfo) -> Result<()> {
        let has = |stage| info.stage_source(stage).is_some();
        if !has(ShaderStage::Vertex) && !has(ShaderStage::Fragment) && !has(ShaderStage::Compute) {
            return Err(ShaderGraphError::compile(&info.name, "no shader stages"));
        }
        if has(ShaderStage::Vertex) != has(ShaderStage::Fragment) {
            return Err(ShaderGraphError::compile(
                &info.name,
                "vertex and fragment stages must be provided together",
            ));
        }

        for (stage, source) in info.stages() {
            if !source.contains("void main()") {
                return Err(ShaderGraphError::compile(
                    &info.name,
                    format!("{} stage has no main()", stage.label()),
                ));
            }
            check_balanced(source).map_err(|log| {
                ShaderGraphError::compile(&info.name, format!("{} stage: {log}", stage.label()))
            })?;
        }

        validate_resources(info, &self.limits)
    }
}

fn check_balanced(source: &str) -> std::result::Result<(), String> {
    let mut stack = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        let code = line.split("//").next().unwrap_or_default();
        for c in code.chars() {
            match c {
                '(' | '{' | '[' => stack.push(c),
                ')' | '}' | ']' => {
                    let open = match c {
                        ')' => '(',
                        '}' => '{',
                        _ => '[',
                    };
                    if stack.pop() != Some(open) {
                        return Err(format!("unexpected '{c}' on line {}", line_no + 1));
                    }
                }
                _ => {}
            }
        }
    }
    match stack.last() {
        Some(c) => Err(format!("unclosed '{c}'")),
        None => Ok(()),
    }
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

struct Job {
    info: Arc<CreateInfo>,
    cancelled: Arc<AtomicBool>,
    result: Sender<Result<ShaderHandle>>,
}

struct PendingJob {
    result: Receiver<Result<ShaderHandle>>,
    cancelled: Arc<AtomicBool>,
}

struct Queues {
    high: Sender<Job>,
    medium: Sender<Job>,
    low: Sender<Job>,
    doorbell: Sender<()>,
}

struct WorkerQueues {
    high: Receiver<Job>,
    medium: Receiver<Job>,
    low: Receiver<Job>,
    doorbell: Receiver<()>,
}

impl WorkerQueues {
    fn next_job(&self) -> Option<Job> {
        self.high
            .try_recv()
            .or_else(|_| self.medium.try_recv())
            .or_else(|_| self.low.try_recv())
            .ok()
    }
}

// ─── ThreadedCompiler ────────────────────────────────────────────────────────

pub struct ThreadedCompiler {
    queues: Option<Queues>,
    pending: Mutex<FxHashMap<u64, PendingJob>>,
    next_job: AtomicU64,
    next_shader: Arc<AtomicU64>,
    builder: Arc<dyn ProgramBuilder>,
    limits: ResourceLimits,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadedCompiler {
    /// Pool of `workers` threads validating sources with [`SourceValidator`].
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let limits = ResourceLimits::default();
        Self::with_builder(workers, SourceValidator { limits }, limits)
    }

    #[must_use]
    pub fn with_builder(
        workers: usize,
        builder: impl ProgramBuilder,
        limits: ResourceLimits,
    ) -> Self {
        let (high_tx, high_rx) = flume::unbounded();
        let (medium_tx, medium_rx) = flume::unbounded();
        let (low_tx, low_rx) = flume::unbounded();
        let (bell_tx, bell_rx) = flume::unbounded();

        let builder: Arc<dyn ProgramBuilder> = Arc::new(builder);
        let next_shader = Arc::new(AtomicU64::new(1));

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let queues = WorkerQueues {
                high: high_rx.clone(),
                medium: medium_rx.clone(),
                low: low_rx.clone(),
                doorbell: bell_rx.clone(),
            };
            let builder = Arc::clone(&builder);
            let next_shader = Arc::clone(&next_shader);

            let spawned = std::thread::Builder::new()
                .name(format!("shader-compiler-{index}"))
                .spawn(move || worker_loop(&queues, builder.as_ref(), &next_shader));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::error!("Failed to spawn shader compiler worker {index}: {e}"),
            }
        }
        if handles.is_empty() {
            log::warn!("No shader compiler workers available, batches compile inline");
        } else {
            log::info!("Shader compiler started with {} workers", handles.len());
        }

        Self {
            queues: Some(Queues {
                high: high_tx,
                medium: medium_tx,
                low: low_tx,
                doorbell: bell_tx,
            }),
            pending: Mutex::new(FxHashMap::default()),
            next_job: AtomicU64::new(1),
            next_shader,
            builder,
            limits,
            workers: handles,
        }
    }

    /// Jobs submitted and not yet finalized or cancelled.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.pending.lock().len()
    }

    fn build_now(&self, info: &CreateInfo) -> Result<ShaderHandle> {
        self.builder.build(info)?;
        Ok(ShaderHandle(self.next_shader.fetch_add(1, Ordering::Relaxed)))
    }
}

fn worker_loop(queues: &WorkerQueues, builder: &dyn ProgramBuilder, next_shader: &AtomicU64) {
    // The doorbell disconnects once the compiler is dropped and drained.
    while queues.doorbell.recv().is_ok() {
        let Some(job) = queues.next_job() else {
            continue;
        };
        if job.cancelled.load(Ordering::Acquire) {
            continue;
        }
        let result = builder
            .build(&job.info)
            .map(|()| ShaderHandle(next_shader.fetch_add(1, Ordering::Relaxed)));
        if let Err(e) = &result {
            log::debug!("Batch compile of '{}' failed: {e}", job.info.name);
        }
        // The receiver is gone if the job was cancelled meanwhile.
        let _ = job.result.send(result);
    }
}

impl ShaderCompiler for ThreadedCompiler {
    fn compile_sync(&self, info: &CreateInfo) -> Result<ShaderHandle> {
        self.build_now(info)
    }

    fn compile_batch_begin(
        &self,
        info: Arc<CreateInfo>,
        priority: CompilePriority,
    ) -> BatchHandle {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = flume::bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        self.pending.lock().insert(
            id,
            PendingJob {
                result: result_rx,
                cancelled: Arc::clone(&cancelled),
            },
        );

        match &self.queues {
            Some(queues) if !self.workers.is_empty() => {
                let queue = match priority {
                    CompilePriority::High => &queues.high,
                    CompilePriority::Medium => &queues.medium,
                    CompilePriority::Low => &queues.low,
                };
                let job = Job {
                    info,
                    cancelled,
                    result: result_tx,
                };
                if queue.send(job).is_err() || queues.doorbell.send(()).is_err() {
                    log::error!("Shader compiler queue closed, job {id} dropped");
                }
            }
            _ => {
                let _ = result_tx.send(self.build_now(&info));
            }
        }

        BatchHandle::new(id)
    }

    fn compile_batch_poll(&self, handle: &BatchHandle) -> bool {
        self.pending
            .lock()
            .get(&handle.id())
            .is_none_or(|job| !job.result.is_empty() || job.result.is_disconnected())
    }

    fn compile_batch_finalize(&self, handle: BatchHandle) -> Result<ShaderHandle> {
        let Some(job) = self.pending.lock().remove(&handle.id()) else {
            log::warn!("Finalize of unknown batch job {}", handle.id());
            return Err(ShaderGraphError::BackendDisconnected);
        };
        // Lock released: recv may block until a worker answers.
        match job.result.recv() {
            Ok(result) => result,
            Err(RecvError::Disconnected) => {
                if job.cancelled.load(Ordering::Acquire) {
                    Err(ShaderGraphError::Cancelled)
                } else {
                    Err(ShaderGraphError::BackendDisconnected)
                }
            }
        }
    }

    fn compile_batch_cancel(&self, handle: BatchHandle) {
        if let Some(job) = self.pending.lock().remove(&handle.id()) {
            job.cancelled.store(true, Ordering::Release);
            log::debug!("Cancelled batch job {}", handle.id());
        }
    }

    fn destroy_shader(&self, shader: ShaderHandle) {
        log::trace!("Destroyed shader program {}", shader.0);
    }

    fn limits(&self) -> ResourceLimits {
        self.limits
    }
}

impl Drop for ThreadedCompiler {
    fn drop(&mut self) {
        for job in self.pending.lock().values() {
            job.cancelled.store(true, Ordering::Release);
        }
        // Closing the queues lets idle workers exit.
        self.queues = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Shader compiler worker panicked");
            }
        }
    }
}
