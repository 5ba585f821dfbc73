//! Bundled reactor + worker pool.

use crate::config::CoreConfig;
use crate::dispatch::DispatchTarget;
use crate::error::ReactorError;
use crate::executor::StaticPoolExecutor;
use crate::reactor::{Reactor, ReactorHandle};
use mio::event::Source;
use mio::{Interest, Token};
use std::sync::Arc;

/// An event loop and the fixed pool its connection work runs on, wired
/// together with one call.
///
/// `run` blocks the calling thread in the readiness loop; use a clone of
/// [`IoCore::handle`] from another thread to register channels and to stop.
pub struct IoCore {
    reactor: Reactor,
    pool: Arc<StaticPoolExecutor>,
}

impl IoCore {
    /// Build a core with default configuration.
    pub fn new() -> Result<Self, ReactorError> {
        Self::with_config(CoreConfig::default())
    }

    /// Build a core with explicit configuration.
    pub fn with_config(config: CoreConfig) -> Result<Self, ReactorError> {
        let pool = Arc::new(StaticPoolExecutor::new(config.pool));
        let reactor = Reactor::with_config(config.reactor, pool.clone())?;
        Ok(Self { reactor, pool })
    }

    /// A cloneable handle for registration, wakeup, and stop requests.
    pub fn handle(&self) -> ReactorHandle {
        self.reactor.handle()
    }

    /// The worker pool shared with the reactor.
    pub fn pool(&self) -> &Arc<StaticPoolExecutor> {
        &self.pool
    }

    /// Register a channel; applied on the loop's next iteration.
    pub fn register(
        &self,
        source: Box<dyn Source + Send>,
        interest: Interest,
        target: DispatchTarget,
    ) -> Result<Token, ReactorError> {
        self.reactor.register(source, interest, target)
    }

    /// Start the workers and run the readiness loop on the calling thread
    /// until stopped. The pool stays up across a clean stop so the core can
    /// be run again.
    pub fn run(&mut self) -> Result<(), ReactorError> {
        self.pool.start();
        self.reactor.start()
    }

    /// Request loop termination and shut the pool down, letting queued tasks
    /// drain first.
    pub fn shutdown(&self) -> Result<(), ReactorError> {
        let result = self.handle().stop();
        self.pool.shutdown();
        result
    }
}
