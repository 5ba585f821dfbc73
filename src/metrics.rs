//! Injected diagnostic observer.
//!
//! The core never keeps process-wide counters; anything worth counting is
//! reported to a [`Metrics`] sink injected at construction. The default sink
//! is [`NoopMetrics`], so instrumentation costs nothing unless wired up.

use std::sync::Arc;

/// Observer for core-internal events.
///
/// All methods have empty default bodies; implement only what you care about.
/// Implementations must be cheap — several hooks fire on the reactor hot path.
pub trait Metrics: Send + Sync {
    /// A slot-index CAS claim in the handoff queue lost a race and retried.
    fn queue_claim_retry(&self) {}

    /// A task was handed to the worker pool.
    fn task_submitted(&self) {}

    /// A non-blocking submission was rejected because the queue was full.
    fn task_rejected(&self) {}

    /// The readiness wait returned with no ready channels.
    fn idle_tick(&self) {}

    /// A per-channel handler failed; the error was logged and isolated.
    fn channel_error(&self) {}
}

/// Metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}

/// Shorthand for the default sink.
pub fn noop() -> Arc<dyn Metrics> {
    Arc::new(NoopMetrics)
}
