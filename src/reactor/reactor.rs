//! The event-multiplexing loop.
//!
//! One dedicated thread owns the `mio::Poll` multiplexer and every channel
//! registration. Per iteration it applies pending commands, blocks in the
//! readiness wait, then classifies each ready channel by its dispatch
//! target: accept and connect completion run inline; connection read/write
//! readiness is disarmed and handed to the worker pool, and re-armed only
//! once the task completes.

use crate::config::ReactorConfig;
use crate::dispatch::{Connection, Direction, DispatchTarget};
use crate::error::ReactorError;
use crate::executor::{EventExecutor, TryExecuteError};
use crate::metrics::Metrics;
use crate::reactor::channel::RegisteredChannel;
use crate::reactor::handle::{Command, ReactorHandle, RUNNING, STOPPED};
use crate::task::Task;
use crossbeam::channel::{self, Receiver};
use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Token reserved for the wakeup channel; registrations start above it.
const WAKER_TOKEN: Token = Token(0);

/// Single-threaded readiness loop over many registered channels.
///
/// `start()` runs the loop on the calling thread until `stop()` is requested
/// through a [`ReactorHandle`]. All registration state is owned here; other
/// threads interact only through the handle's command queue plus wakeup.
pub struct Reactor {
    /// The multiplexer. Taken while the loop runs; `None` after a fatal
    /// teardown has closed it.
    poll: Option<Poll>,
    events_capacity: usize,
    channels: FxHashMap<Token, RegisteredChannel>,
    commands: Receiver<Command>,
    handle: ReactorHandle,
    state: Arc<AtomicU8>,
    executor: Arc<dyn EventExecutor>,
    metrics: Arc<dyn Metrics>,
}

impl Reactor {
    /// Create a reactor with default configuration.
    pub fn new(executor: Arc<dyn EventExecutor>) -> Result<Self, ReactorError> {
        Self::with_config(ReactorConfig::default(), executor)
    }

    /// Create a reactor with explicit configuration.
    pub fn with_config(
        config: ReactorConfig,
        executor: Arc<dyn EventExecutor>,
    ) -> Result<Self, ReactorError> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let (command_tx, command_rx) = channel::unbounded();
        let state = Arc::new(AtomicU8::new(STOPPED));
        let next_token = Arc::new(AtomicUsize::new(WAKER_TOKEN.0 + 1));
        let handle = ReactorHandle::new(command_tx, waker, state.clone(), next_token);

        Ok(Self {
            poll: Some(poll),
            events_capacity: config.events_capacity,
            channels: FxHashMap::default(),
            commands: command_rx,
            handle,
            state,
            executor,
            metrics: config.metrics,
        })
    }

    /// A cloneable handle for stop, wakeup, and registration requests.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// Register a channel. Convenience for [`ReactorHandle::register`]; the
    /// registration is applied on the loop's next iteration.
    pub fn register(
        &self,
        source: Box<dyn Source + Send>,
        interest: Interest,
        target: DispatchTarget,
    ) -> Result<Token, ReactorError> {
        self.handle.register(source, interest, target)
    }

    /// Run the loop on the calling thread until stopped.
    ///
    /// Transitions Stopped→Running; fails fast with
    /// [`ReactorError::AlreadyRunning`] if the loop is not stopped. Returns
    /// `Ok(())` after a cooperative stop (registrations survive and the
    /// reactor may be started again), or [`ReactorError::Fatal`] after an
    /// unrecoverable failure, in which case every registered channel has
    /// been closed and the multiplexer dropped.
    pub fn start(&mut self) -> Result<(), ReactorError> {
        if self
            .state
            .compare_exchange(STOPPED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReactorError::AlreadyRunning);
        }

        let mut poll = match self.poll.take() {
            Some(poll) => poll,
            None => {
                self.state.store(STOPPED, Ordering::Release);
                return Err(ReactorError::Fatal(
                    "multiplexer was closed by an earlier failure".to_string(),
                ));
            }
        };

        tracing::info!("reactor running");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_loop(&mut poll)));
        let result = match outcome {
            Ok(()) => {
                self.poll = Some(poll);
                tracing::info!("reactor stopped");
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(error = %message, "fatal error escaped reactor loop");
                self.teardown(poll.registry());
                drop(poll);
                Err(ReactorError::Fatal(message))
            }
        };
        self.state.store(STOPPED, Ordering::Release);
        result
    }

    fn run_loop(&mut self, poll: &mut Poll) {
        let mut events = Events::with_capacity(self.events_capacity);

        while self.state.load(Ordering::Acquire) == RUNNING {
            // Commands first, so registrations enqueued before start() are
            // installed before the first wait.
            self.drain_commands(poll.registry());

            if let Err(e) = poll.poll(&mut events, None) {
                if e.kind() != io::ErrorKind::Interrupted {
                    tracing::warn!(error = %e, "readiness wait failed; retrying");
                }
                continue;
            }

            if events.is_empty() {
                // Idle tick; the hook is where idle-connection sweeps go.
                self.metrics.idle_tick();
                continue;
            }

            for event in events.iter() {
                if event.token() == WAKER_TOKEN {
                    continue;
                }
                if let Err(e) = self.dispatch_ready(
                    poll.registry(),
                    event.token(),
                    event.is_readable(),
                    event.is_writable(),
                ) {
                    // Isolated to this channel; it stays registered unless
                    // the collaborator closes it.
                    self.metrics.channel_error();
                    tracing::warn!(token = event.token().0, error = %e, "channel processing failed");
                }
            }
        }

        // Apply trailing commands so re-arms racing the stop are not lost
        // across a restart.
        self.drain_commands(poll.registry());
    }

    fn drain_commands(&mut self, registry: &Registry) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Register {
                    token,
                    mut source,
                    interest,
                    target,
                } => match registry.register(&mut source, token, interest) {
                    Ok(()) => {
                        tracing::debug!(token = token.0, target = ?target, "channel registered");
                        self.channels
                            .insert(token, RegisteredChannel::new(source, target, interest));
                    }
                    Err(e) => {
                        tracing::warn!(token = token.0, error = %e, "registration failed");
                        target.on_close();
                    }
                },
                Command::Deregister { token } => {
                    if let Some(channel) = self.channels.remove(&token) {
                        channel.close(registry);
                        tracing::debug!(token = token.0, "channel deregistered");
                    }
                }
                Command::Rearm { token, direction } => {
                    let Some(channel) = self.channels.get_mut(&token) else {
                        continue;
                    };
                    let DispatchTarget::Connection(conn) = channel.target() else {
                        continue;
                    };
                    let conn = conn.clone();
                    // Arm the gate before restoring interest so readiness
                    // arriving immediately afterwards can be claimed.
                    match direction {
                        Direction::Read => conn.arm_read(),
                        Direction::Write => conn.arm_write(),
                    }
                    if let Err(e) = channel.resume(registry, token, direction) {
                        tracing::warn!(token = token.0, error = %e, "failed to restore interest");
                    }
                }
            }
        }
    }

    fn dispatch_ready(
        &mut self,
        registry: &Registry,
        token: Token,
        readable: bool,
        writable: bool,
    ) -> io::Result<()> {
        // Raced with a deregistration in the same batch; stale readiness.
        let Some(channel) = self.channels.get(&token) else {
            return Ok(());
        };

        match channel.target().clone() {
            DispatchTarget::Acceptor(acceptor) => acceptor.on_accept(),
            DispatchTarget::Connector(connector) => connector.on_connect_complete(),
            DispatchTarget::Connection(conn) => {
                if readable && conn.disarm_read() {
                    self.submit(registry, token, Direction::Read, &conn);
                }
                if writable && conn.disarm_write() {
                    self.submit(registry, token, Direction::Write, &conn);
                }
                Ok(())
            }
        }
    }

    /// Hand one direction's task to the pool and park its interest.
    ///
    /// The caller has just won the Armed→Submitted transition. Submission is
    /// non-blocking: on a saturated pool the direction is re-armed and
    /// level-triggered readiness retries on a later tick, so a slow consumer
    /// class can never stall readiness processing for every other channel.
    fn submit(
        &mut self,
        registry: &Registry,
        token: Token,
        direction: Direction,
        conn: &Arc<dyn Connection>,
    ) {
        let task = match direction {
            Direction::Read => conn.read_task(),
            Direction::Write => conn.write_task(),
        };
        let handle = self.handle.clone();
        let wrapped = Task::new(move || {
            task.run();
            // Completed: re-arm through the request path. If the reactor is
            // gone the direction simply stays parked.
            let _ = handle.rearm(token, direction);
        });

        match self.executor.try_execute(wrapped) {
            Ok(()) => {
                if let Some(channel) = self.channels.get_mut(&token) {
                    if let Err(e) = channel.suspend(registry, token, direction) {
                        tracing::warn!(token = token.0, error = %e, "failed to park interest");
                    }
                }
            }
            Err(TryExecuteError::Saturated(_)) => {
                rearm_gate(conn, direction);
                tracing::warn!(token = token.0, ?direction, "pool saturated; readiness deferred");
            }
            Err(TryExecuteError::Shutdown(_)) => {
                rearm_gate(conn, direction);
                tracing::warn!(token = token.0, ?direction, "pool shut down; readiness dropped");
            }
        }
    }

    /// Full teardown after a fatal failure: close every registered channel
    /// best-effort, notifying each collaborator exactly once.
    fn teardown(&mut self, registry: &Registry) {
        let count = self.channels.len();
        for (_, channel) in self.channels.drain() {
            channel.close(registry);
        }
        tracing::error!(channels = count, "reactor teardown complete");
    }
}

fn rearm_gate(conn: &Arc<dyn Connection>, direction: Direction) {
    match direction {
        Direction::Read => conn.arm_read(),
        Direction::Write => conn.arm_write(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
