//! Reactor-owned registration state for one channel.

use crate::dispatch::{Direction, DispatchTarget};
use mio::event::Source;
use mio::{Interest, Registry, Token};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// `mio::event::Source` adapter over a shared socket.
///
/// The reactor owns every registration, but the collaborator still needs the
/// socket to do actual I/O from its handlers and tasks. Wrapping the socket
/// in `Arc<Mutex<S>>` lets the collaborator keep a clone for I/O while the
/// reactor holds a `SharedSource` for registration bookkeeping. Lock
/// contention is negligible: the single-flight discipline means at most one
/// task per direction touches the socket at a time.
pub struct SharedSource<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> SharedSource<S> {
    /// Wrap a shared socket for registration.
    pub fn new(inner: Arc<Mutex<S>>) -> Self {
        Self { inner }
    }
}

impl<S: Source> Source for SharedSource<S> {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.inner.lock().register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.lock().reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.lock().deregister(registry)
    }
}

fn interest_of(direction: Direction) -> Interest {
    match direction {
        Direction::Read => Interest::READABLE,
        Direction::Write => Interest::WRITABLE,
    }
}

/// A registered channel: the source handle, its dispatch target, and the
/// interest set currently installed in the multiplexer.
///
/// Owned exclusively by the reactor thread; created on registration,
/// destroyed on deregistration or teardown.
pub(crate) struct RegisteredChannel {
    source: Box<dyn Source + Send>,
    target: DispatchTarget,
    /// Interest currently installed; `None` means the source is parked
    /// (deregistered while every direction is submitted).
    installed: Option<Interest>,
}

impl RegisteredChannel {
    pub(crate) fn new(
        source: Box<dyn Source + Send>,
        target: DispatchTarget,
        interest: Interest,
    ) -> Self {
        Self {
            source,
            target,
            installed: Some(interest),
        }
    }

    pub(crate) fn target(&self) -> &DispatchTarget {
        &self.target
    }

    /// Remove one direction from the installed interest while its task is in
    /// flight, parking the source entirely if nothing remains. Keeps
    /// level-triggered readiness from re-firing for a submitted direction.
    pub(crate) fn suspend(
        &mut self,
        registry: &Registry,
        token: Token,
        direction: Direction,
    ) -> io::Result<()> {
        let remaining = self
            .installed
            .and_then(|installed| installed.remove(interest_of(direction)));
        match remaining {
            Some(interest) => registry.reregister(&mut self.source, token, interest)?,
            None => {
                if self.installed.is_some() {
                    registry.deregister(&mut self.source)?;
                }
            }
        }
        self.installed = remaining;
        Ok(())
    }

    /// Add one direction back after its task completed, re-registering a
    /// parked source.
    pub(crate) fn resume(
        &mut self,
        registry: &Registry,
        token: Token,
        direction: Direction,
    ) -> io::Result<()> {
        let want = match self.installed {
            Some(installed) => installed | interest_of(direction),
            None => interest_of(direction),
        };
        match self.installed {
            Some(_) => registry.reregister(&mut self.source, token, want)?,
            None => registry.register(&mut self.source, token, want)?,
        }
        self.installed = Some(want);
        Ok(())
    }

    /// Tear the registration down: best-effort deregistration, then notify
    /// the collaborator exactly once.
    pub(crate) fn close(mut self, registry: &Registry) {
        if self.installed.is_some() {
            let _ = registry.deregister(&mut self.source);
        }
        self.target.on_close();
    }
}
