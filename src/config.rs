//! Construction-time configuration for the core components.

use crate::metrics::{Metrics, NoopMetrics};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the worker pool and its handoff queue.
#[derive(Clone)]
pub struct PoolConfig {
    /// Number of worker threads. `0` means one per CPU core.
    pub workers: usize,

    /// Capacity of the bounded handoff queue.
    pub queue_capacity: usize,

    /// How long an idle worker waits for work before re-checking the
    /// shutdown flag.
    pub keep_alive: Duration,

    /// Observer for pool and queue events.
    pub metrics: Arc<dyn Metrics>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: 1024,
            keep_alive: Duration::from_millis(300),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

impl PoolConfig {
    /// Resolved worker count (`0` becomes the CPU count).
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Configuration for the reactor loop.
#[derive(Clone)]
pub struct ReactorConfig {
    /// Capacity of the readiness event buffer per poll call.
    pub events_capacity: usize,

    /// Observer for reactor events.
    pub metrics: Arc<dyn Metrics>,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            events_capacity: 1024,
            metrics: Arc::new(NoopMetrics),
        }
    }
}

/// Bundled configuration for [`crate::IoCore`].
#[derive(Clone, Default)]
pub struct CoreConfig {
    /// Reactor settings.
    pub reactor: ReactorConfig,
    /// Worker pool settings.
    pub pool: PoolConfig,
}
