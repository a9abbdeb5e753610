//! Background executors for scaling jobs.
//!
//! An [`Executor`] only runs jobs; it never delivers completions. Every job
//! submitted by the event loop reports back through the loop's own
//! completion queue, so any executor can be plugged in.

use std::io;

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs off the caller-facing thread.
pub trait Executor: Send + Sync {
    fn submit(&self, job: Job);
}

/// Options for configuring a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of runtime worker threads.
    pub worker_threads: usize,
    /// Upper bound on threads running scaling jobs concurrently.
    pub max_blocking_threads: usize,
    pub thread_name: String,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            max_blocking_threads: 4,
            thread_name: "multiply-worker".to_string(),
        }
    }
}

impl PoolOptions {
    pub fn with_max_blocking_threads(mut self, n: usize) -> Self {
        self.max_blocking_threads = n.max(1);
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// A dedicated tokio runtime whose blocking pool runs scaling jobs.
///
/// Dropping the pool waits for running jobs to finish, so it must not be
/// dropped from inside an async context.
pub struct WorkerPool {
    runtime: tokio::runtime::Runtime,
}

impl WorkerPool {
    pub fn new(opts: &PoolOptions) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(opts.worker_threads.max(1))
            .max_blocking_threads(opts.max_blocking_threads.max(1))
            .thread_name(opts.thread_name.clone())
            .build()?;
        tracing::debug!(
            max_blocking_threads = opts.max_blocking_threads,
            "multiply: worker pool started"
        );
        Ok(Self { runtime })
    }

    /// Returns a handle to the pool's runtime.
    pub fn handle(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").finish_non_exhaustive()
    }
}

impl Executor for WorkerPool {
    fn submit(&self, job: Job) {
        self.runtime.handle().submit(job);
    }
}

/// Runs jobs on the blocking pool of an existing tokio runtime.
impl Executor for tokio::runtime::Handle {
    fn submit(&self, job: Job) {
        // Detached: the job reports through the completion queue.
        drop(self.spawn_blocking(job));
    }
}

/// Runs each job on the submitting thread before `submit` returns.
///
/// Completions are still queued, so callbacks only fire when the event loop
/// runs. Useful for deterministic tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn submit(&self, job: Job) {
        job();
    }
}
