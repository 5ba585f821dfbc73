//! Reactor error types.

/// Errors surfaced by the reactor lifecycle and registration paths.
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    /// `start()` was called while the loop is already running.
    #[error("reactor is already running")]
    AlreadyRunning,

    /// The reactor side of the command queue is gone.
    #[error("reactor command queue is disconnected")]
    Disconnected,

    /// I/O failure from the multiplexer or its waker.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// An unrecoverable error escaped the loop body; every registered
    /// channel was closed and the multiplexer dropped.
    #[error("fatal error in reactor loop: {0}")]
    Fatal(String),
}
