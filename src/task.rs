//! Opaque unit of work handed from the reactor to the worker pool.

use std::fmt;

/// A unit of work captured at submission time.
///
/// A task is immutable once created and consumed exactly once by [`run`].
/// The reactor builds one per ready connection-direction (wrapping the
/// collaborator's read or write handler plus the re-arm step) and pushes it
/// through the handoff queue to a worker.
///
/// [`run`]: Task::run
pub struct Task {
    work: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    /// Capture a closure as a task.
    pub fn new(work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            work: Box::new(work),
        }
    }

    /// Execute the task, consuming it.
    pub fn run(self) {
        (self.work)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_task_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = Task::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        task.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_task_debug() {
        let task = Task::new(|| {});
        assert_eq!(format!("{:?}", task), "Task");
    }
}
