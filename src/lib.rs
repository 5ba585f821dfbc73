//! Minimal scalable I/O core: a single-threaded readiness reactor, a fixed
//! worker pool, and the bounded handoff queue between them.
//!
//! The reactor owns an OS readiness multiplexer and every channel
//! registration. Accept and connect-completion readiness dispatch inline on
//! the loop thread; connection read/write readiness is converted into tasks
//! and handed to the pool through [`queue::HandoffQueue`], with at most one
//! in-flight task per connection per direction.
//!
//! ```no_run
//! use spool::{CoreConfig, IoCore};
//!
//! let mut core = IoCore::with_config(CoreConfig::default())?;
//! let handle = core.handle();
//! std::thread::spawn(move || {
//!     // register channels and eventually stop through `handle`
//!     let _ = handle;
//! });
//! core.run()?;
//! # Ok::<(), spool::ReactorError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod config;
mod core;
pub mod dispatch;
mod error;
pub mod executor;
mod metrics;
pub mod queue;
pub mod reactor;
mod task;

pub use config::{CoreConfig, PoolConfig, ReactorConfig};
pub use crate::core::IoCore;
pub use dispatch::{Acceptor, Connection, Connector, Direction, DispatchTarget, InterestGate};
pub use error::ReactorError;
pub use executor::{EventExecutor, StaticPoolExecutor};
pub use metrics::{noop, Metrics, NoopMetrics};
pub use queue::HandoffQueue;
pub use reactor::{Reactor, ReactorHandle, SharedSource};
pub use task::Task;

pub use mio::{Interest, Token};
