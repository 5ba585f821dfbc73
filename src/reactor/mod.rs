//! Readiness multiplexing.
//!
//! Hosts the single-threaded event loop ([`Reactor`]), the cloneable
//! cross-thread control surface ([`ReactorHandle`]), and the shared-source
//! adapter that lets a collaborator keep I/O access to a socket whose
//! registration is owned by the loop.

#[allow(clippy::module_inception)]
mod reactor;

mod channel;
mod handle;

pub use channel::SharedSource;
pub use handle::ReactorHandle;
pub use reactor::Reactor;
