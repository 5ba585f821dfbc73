//! Thread-safe request path into the reactor.
//!
//! No thread other than the reactor's may touch registration state, so every
//! cross-thread operation is a command enqueued here followed by a wakeup;
//! the reactor applies pending commands at the top of its next iteration.

use crate::dispatch::{Direction, DispatchTarget};
use crate::error::ReactorError;
use crossbeam::channel::Sender;
use mio::event::Source;
use mio::{Interest, Token, Waker};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Reactor lifecycle states.
pub(crate) const STOPPED: u8 = 0;
pub(crate) const RUNNING: u8 = 1;
pub(crate) const STOPPING: u8 = 2;

/// A pending mutation of reactor-owned registration state.
pub(crate) enum Command {
    /// Register a new channel under a pre-allocated token.
    Register {
        token: Token,
        source: Box<dyn Source + Send>,
        interest: Interest,
        target: DispatchTarget,
    },
    /// Remove a channel; its target is notified via `on_close`.
    Deregister { token: Token },
    /// A submitted task completed; re-arm its direction.
    Rearm { token: Token, direction: Direction },
}

/// Cloneable handle for talking to a running (or about-to-run) reactor from
/// any thread.
#[derive(Clone)]
pub struct ReactorHandle {
    commands: Sender<Command>,
    waker: Arc<Waker>,
    state: Arc<AtomicU8>,
    next_token: Arc<AtomicUsize>,
}

impl ReactorHandle {
    pub(crate) fn new(
        commands: Sender<Command>,
        waker: Arc<Waker>,
        state: Arc<AtomicU8>,
        next_token: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            commands,
            waker,
            state,
            next_token,
        }
    }

    /// Register a channel with an initial interest set and dispatch target.
    ///
    /// Returns the token identifying the registration. The registration is
    /// applied by the reactor thread on its next iteration; commands sent
    /// before `start()` are applied when the loop first runs.
    pub fn register(
        &self,
        source: Box<dyn Source + Send>,
        interest: Interest,
        target: DispatchTarget,
    ) -> Result<Token, ReactorError> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.commands
            .send(Command::Register {
                token,
                source,
                interest,
                target,
            })
            .map_err(|_| ReactorError::Disconnected)?;
        self.wakeup()?;
        Ok(token)
    }

    /// Remove a registration. The target's `on_close` runs on the reactor
    /// thread once the command is applied.
    pub fn deregister(&self, token: Token) -> Result<(), ReactorError> {
        self.commands
            .send(Command::Deregister { token })
            .map_err(|_| ReactorError::Disconnected)?;
        self.wakeup()
    }

    /// Re-arm one direction of a connection after its task completed.
    pub(crate) fn rearm(&self, token: Token, direction: Direction) -> Result<(), ReactorError> {
        self.commands
            .send(Command::Rearm { token, direction })
            .map_err(|_| ReactorError::Disconnected)?;
        self.wakeup()
    }

    /// Force the blocked readiness wait to return with no events.
    ///
    /// The only operation that is safe to call into the reactor from any
    /// thread at any time; used for shutdown and for making the loop observe
    /// freshly enqueued commands.
    pub fn wakeup(&self) -> Result<(), ReactorError> {
        self.waker.wake()?;
        Ok(())
    }

    /// Request cooperative termination: Running→Stopping plus a wakeup.
    ///
    /// The loop finishes its current readiness batch and exits; queued and
    /// executing tasks run to completion. Calling `stop` on a reactor that
    /// is not running is a no-op.
    pub fn stop(&self) -> Result<(), ReactorError> {
        let _ = self
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire);
        self.wakeup()
    }

    /// Whether the loop is currently running.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }
}
