//! Bounded worker pool for long-running sampling jobs.
//!
//! Jobs run on a dedicated [`rayon::ThreadPool`], so parallel distance updates
//! inside a job stay on the pool's threads instead of the global one.

use std::sync::mpsc;

use codex_config::SamplingConfig;
use tracing::{debug, error};

use crate::error::SamplingError;

/// A fixed-size pool that runs jobs off the caller's thread.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Creates a pool with `threads` workers; `0` picks one per core.
    pub fn new(threads: usize) -> Result<Self, SamplingError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("codex-sampling-{idx}"))
            .panic_handler(|_| error!("sampling job panicked"))
            .build()
            .map_err(|e| SamplingError::invalid(format!("cannot build worker pool: {e}")))?;
        debug!(threads = pool.current_num_threads(), "worker pool started");
        Ok(Self { pool })
    }

    /// Creates a pool sized by `worker_threads` in the `[sampling]` section.
    pub fn from_config(config: &SamplingConfig) -> Result<Self, SamplingError> {
        Self::new(config.worker_threads)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queues `job` and returns a handle to its result.
    pub fn spawn<T, F>(&self, job: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.pool.spawn(move || {
            // The receiver may have been dropped; the result is then unwanted.
            let _ = tx.send(job());
        });
        JobHandle { rx }
    }

    /// Runs `op` on the pool and waits for it.
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }
}

/// The pending result of a job queued with [`WorkerPool::spawn`].
pub struct JobHandle<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> JobHandle<T> {
    /// Blocks until the job finishes.
    ///
    /// Fails if the job panicked before producing a value.
    pub fn join(self) -> Result<T, SamplingError> {
        self.rx.recv().map_err(|_| SamplingError::JobFailed {
            reason: "job ended without a result".to_string(),
        })
    }
}
