//! Dispatch contract between the reactor and its collaborators.
//!
//! Each registered channel carries a [`DispatchTarget`]: an explicit tagged
//! variant telling the reactor which operations apply when the channel turns
//! ready. Accept and connect completion are handled inline on the reactor
//! thread; connection read/write readiness turns into [`Task`]s for the
//! worker pool, gated by the per-direction armed flags.

use crate::task::Task;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One side of a connection's readiness interest.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Read readiness.
    Read,
    /// Write readiness.
    Write,
}

/// Capability of a listening channel: readiness means a peer is waiting to
/// be accepted.
///
/// `on_accept` runs inline on the reactor thread; keep it short. Newly
/// accepted sockets are registered through the reactor handle's thread-safe
/// request path.
pub trait Acceptor: Send + Sync {
    /// Accept pending peers. Errors are logged and isolated to this channel.
    fn on_accept(&self) -> io::Result<()>;

    /// Called once during reactor teardown; close the listening socket here.
    fn on_close(&self) {}
}

/// Capability of an outbound channel whose connect is in flight: writability
/// means the connect has completed (or failed).
pub trait Connector: Send + Sync {
    /// Finish the connect. Errors are logged and isolated to this channel.
    fn on_connect_complete(&self) -> io::Result<()>;

    /// Called once during reactor teardown; close the socket here.
    fn on_close(&self) {}
}

/// Capability of an established connection.
///
/// The reactor submits at most one task per direction at a time: readiness
/// only produces a task when `disarm_*` reports that this call made the
/// Armed→Submitted transition, and the direction is re-armed (`arm_*`) only
/// after that task has completed.
pub trait Connection: Send + Sync {
    /// The unit of work to run when the channel is readable.
    fn read_task(&self) -> Task;

    /// The unit of work to run when the channel is writable.
    fn write_task(&self) -> Task;

    /// Atomically move read interest from Armed to Submitted. Returns true
    /// iff this call performed the transition.
    fn disarm_read(&self) -> bool;

    /// Atomically move write interest from Armed to Submitted. Returns true
    /// iff this call performed the transition.
    fn disarm_write(&self) -> bool;

    /// Re-arm read interest after a read task completed.
    fn arm_read(&self);

    /// Re-arm write interest after a write task completed.
    fn arm_write(&self);

    /// Called once during reactor teardown; close the socket here.
    fn on_close(&self) {}
}

/// The tagged-variant attachment on a registered channel.
///
/// Dispatch is a pattern match on this enum, never a downcast.
#[derive(Clone)]
pub enum DispatchTarget {
    /// Listening socket; readiness handled inline via [`Acceptor`].
    Acceptor(Arc<dyn Acceptor>),
    /// Outbound connect in flight; completion handled inline via
    /// [`Connector`].
    Connector(Arc<dyn Connector>),
    /// Established connection; readiness becomes pool work via
    /// [`Connection`].
    Connection(Arc<dyn Connection>),
}

impl DispatchTarget {
    /// Teardown notification, routed to whichever capability is attached.
    pub(crate) fn on_close(&self) {
        match self {
            DispatchTarget::Acceptor(a) => a.on_close(),
            DispatchTarget::Connector(c) => c.on_close(),
            DispatchTarget::Connection(c) => c.on_close(),
        }
    }
}

impl std::fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            DispatchTarget::Acceptor(_) => "Acceptor",
            DispatchTarget::Connector(_) => "Connector",
            DispatchTarget::Connection(_) => "Connection",
        };
        f.write_str(kind)
    }
}

/// Per-direction armed flag with a single-winner disarm.
///
/// `disarm` is an atomic swap, so when several readiness notifications race
/// for the same direction exactly one caller observes the Armed→Submitted
/// transition. Connections embed one gate per direction.
#[derive(Debug)]
pub struct InterestGate {
    armed: AtomicBool,
}

impl InterestGate {
    /// Create a gate, initially armed or not.
    pub fn new(armed: bool) -> Self {
        Self {
            armed: AtomicBool::new(armed),
        }
    }

    /// Take the armed flag. Returns true iff this call cleared it.
    pub fn disarm(&self) -> bool {
        self.armed.swap(false, Ordering::AcqRel)
    }

    /// Set the armed flag.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    /// Whether the gate is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

impl Default for InterestGate {
    fn default() -> Self {
        Self::new(true)
    }
}
