//! Cancellable counting permits.
//!
//! A small semaphore used by the handoff queue for its "free slots" and
//! "filled slots" counts. Unlike an OS semaphore there is no interruption to
//! swallow: a wait returns an explicit result, and closing the permit set
//! wakes every waiter.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Outcome of a permit acquisition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquireResult {
    /// One permit was taken.
    Acquired,
    /// The permit set is closed and no permits remain.
    Cancelled,
    /// The timeout elapsed before a permit became available.
    TimedOut,
}

/// A counting permit set with explicit cancellation.
///
/// Closing does not discard outstanding permits: acquirers keep draining
/// whatever is available and only observe [`AcquireResult::Cancelled`] once
/// the count reaches zero. That is what lets the queue finish handing out
/// already-buffered items after shutdown begins.
pub struct Permits {
    count: Mutex<usize>,
    closed: Mutex<bool>,
    available: Condvar,
}

impl Permits {
    /// Create a permit set holding `count` permits.
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            closed: Mutex::new(false),
            available: Condvar::new(),
        }
    }

    /// Block until a permit is taken or the set is closed and empty.
    pub fn acquire(&self) -> AcquireResult {
        let mut count = self.count.lock();
        loop {
            if *count > 0 {
                *count -= 1;
                return AcquireResult::Acquired;
            }
            if self.is_closed() {
                return AcquireResult::Cancelled;
            }
            self.available.wait(&mut count);
        }
    }

    /// Like [`acquire`], but gives up after `timeout`.
    ///
    /// [`acquire`]: Permits::acquire
    pub fn acquire_timeout(&self, timeout: Duration) -> AcquireResult {
        let deadline = std::time::Instant::now() + timeout;
        let mut count = self.count.lock();
        loop {
            if *count > 0 {
                *count -= 1;
                return AcquireResult::Acquired;
            }
            if self.is_closed() {
                return AcquireResult::Cancelled;
            }
            if self.available.wait_until(&mut count, deadline).timed_out() {
                // Re-check once: a release may have slipped in with the timeout.
                if *count > 0 {
                    *count -= 1;
                    return AcquireResult::Acquired;
                }
                return AcquireResult::TimedOut;
            }
        }
    }

    /// Take a permit without blocking. Returns false if none are available.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Return one permit and wake one waiter.
    pub fn release(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.available.notify_one();
    }

    /// Close the set: wake every waiter; acquisition drains remaining permits
    /// and then reports [`AcquireResult::Cancelled`].
    pub fn close(&self) {
        // Take the count lock too so a waiter between its count check and its
        // condvar wait cannot miss the notification.
        let _count = self.count.lock();
        *self.closed.lock() = true;
        self.available.notify_all();
    }

    /// Whether [`close`] has been called.
    ///
    /// [`close`]: Permits::close
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Current number of available permits.
    pub fn available(&self) -> usize {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_release() {
        let permits = Permits::new(2);
        assert_eq!(permits.available(), 2);

        assert_eq!(permits.acquire(), AcquireResult::Acquired);
        assert_eq!(permits.acquire(), AcquireResult::Acquired);
        assert_eq!(permits.available(), 0);
        assert!(!permits.try_acquire());

        permits.release();
        assert_eq!(permits.available(), 1);
        assert!(permits.try_acquire());
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let permits = Arc::new(Permits::new(0));
        let p = permits.clone();

        let handle = thread::spawn(move || p.acquire());

        // Give the thread time to block.
        thread::sleep(Duration::from_millis(50));
        permits.release();

        assert_eq!(handle.join().unwrap(), AcquireResult::Acquired);
    }

    #[test]
    fn test_close_wakes_blocked_waiter() {
        let permits = Arc::new(Permits::new(0));
        let p = permits.clone();

        let handle = thread::spawn(move || p.acquire());

        thread::sleep(Duration::from_millis(50));
        permits.close();

        assert_eq!(handle.join().unwrap(), AcquireResult::Cancelled);
    }

    #[test]
    fn test_close_drains_remaining_permits() {
        let permits = Permits::new(2);
        permits.close();

        // Remaining permits are still handed out after close.
        assert_eq!(permits.acquire(), AcquireResult::Acquired);
        assert_eq!(permits.acquire(), AcquireResult::Acquired);
        assert_eq!(permits.acquire(), AcquireResult::Cancelled);
    }

    #[test]
    fn test_acquire_timeout_times_out() {
        let permits = Permits::new(0);
        let result = permits.acquire_timeout(Duration::from_millis(20));
        assert_eq!(result, AcquireResult::TimedOut);
    }

    #[test]
    fn test_acquire_timeout_succeeds_on_release() {
        let permits = Arc::new(Permits::new(0));
        let p = permits.clone();

        let handle = thread::spawn(move || p.acquire_timeout(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(50));
        permits.release();

        assert_eq!(handle.join().unwrap(), AcquireResult::Acquired);
    }

    #[test]
    fn test_release_wakes_exactly_one_waiter() {
        let permits = Arc::new(Permits::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let p = permits.clone();
                thread::spawn(move || p.acquire_timeout(Duration::from_millis(300)))
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        permits.release();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let acquired = results
            .iter()
            .filter(|r| **r == AcquireResult::Acquired)
            .count();
        let timed_out = results
            .iter()
            .filter(|r| **r == AcquireResult::TimedOut)
            .count();
        assert_eq!(acquired, 1);
        assert_eq!(timed_out, 2);
    }
}
