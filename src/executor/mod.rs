//! Fixed worker pool executing reactor-submitted tasks.
//!
//! The pool abstracts "run this unit of work somewhere, eventually, without
//! blocking the caller for long". Internally it is a set of named threads
//! popping from the bounded handoff queue; the queue's capacity is the only
//! backpressure mechanism between the reactor and the workers.

mod worker;

use crate::config::PoolConfig;
use crate::queue::{HandoffQueue, PushError, TryPushError};
use crate::task::Task;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use worker::Worker;

/// Error from a blocking [`EventExecutor::execute`].
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// The pool is shut down; the task is handed back.
    #[error("executor is shut down")]
    Shutdown(Task),
}

/// Error from a non-blocking [`EventExecutor::try_execute`].
#[derive(Debug, thiserror::Error)]
pub enum TryExecuteError {
    /// The handoff queue is full; the task is handed back.
    #[error("executor is saturated")]
    Saturated(Task),
    /// The pool is shut down; the task is handed back.
    #[error("executor is shut down")]
    Shutdown(Task),
}

/// Hands tasks to worker threads for eventual, asynchronous execution.
///
/// Every submitted task is executed exactly once by exactly one worker
/// (assuming the pool is not permanently saturated). No ordering is
/// guaranteed beyond queue arrival order; per-connection-per-direction
/// ordering comes from the reactor's disarm/re-arm discipline, not from the
/// pool.
pub trait EventExecutor: Send + Sync {
    /// Submit a task, blocking while the handoff queue is full.
    fn execute(&self, task: Task) -> Result<(), ExecuteError>;

    /// Submit a task only if a queue slot is immediately free.
    fn try_execute(&self, task: Task) -> Result<(), TryExecuteError>;
}

/// Fixed-size thread pool backed by the bounded handoff queue.
pub struct StaticPoolExecutor {
    queue: Arc<HandoffQueue<Task>>,
    workers: Mutex<Vec<Worker>>,
    config: PoolConfig,
    started: AtomicBool,
}

impl StaticPoolExecutor {
    /// Create the pool (not yet started).
    pub fn new(config: PoolConfig) -> Self {
        let queue = Arc::new(HandoffQueue::with_metrics(
            config.queue_capacity,
            config.metrics.clone(),
        ));
        Self {
            queue,
            workers: Mutex::new(Vec::new()),
            config,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the worker threads. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let count = self.config.worker_count();
        let mut workers = self.workers.lock();
        for id in 0..count {
            let mut worker = Worker::new(id, self.queue.clone(), self.config.keep_alive);
            worker.start();
            workers.push(worker);
        }
        tracing::info!(workers = count, "worker pool started");
    }

    /// Shut the pool down: stop admitting tasks, let workers drain what is
    /// already queued, then join them. Idempotent.
    pub fn shutdown(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }

        self.queue.close();
        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            worker.stop();
        }
        workers.clear();
        tracing::info!("worker pool stopped");
    }

    /// Number of tasks currently waiting in the handoff queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Configured queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Whether the pool threads are running.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl EventExecutor for StaticPoolExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecuteError> {
        match self.queue.push(task) {
            Ok(()) => {
                self.config.metrics.task_submitted();
                Ok(())
            }
            Err(PushError::Closed(task)) => Err(ExecuteError::Shutdown(task)),
        }
    }

    fn try_execute(&self, task: Task) -> Result<(), TryExecuteError> {
        match self.queue.try_push(task) {
            Ok(()) => {
                self.config.metrics.task_submitted();
                Ok(())
            }
            Err(TryPushError::Full(task)) => {
                self.config.metrics.task_rejected();
                Err(TryExecuteError::Saturated(task))
            }
            Err(TryPushError::Closed(task)) => Err(TryExecuteError::Shutdown(task)),
        }
    }
}

impl Drop for StaticPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
