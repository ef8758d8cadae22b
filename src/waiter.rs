// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::status::{Result, Status};

/// When a blocking call should give up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deadline {
    /// Return immediately; a pure poll.
    Poll,
    /// Block until the given instant.
    Until(Instant),
    /// Block until woken.
    Indefinite,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Deadline {
        Deadline::Until(Instant::now() + timeout)
    }
}

/// A type that can put a thread to sleep waiting for a condition.
///
/// One `Waiter` represents one blocking call: the waiting thread registers
/// the waiter with the dispatchers it is watching, parks in `wait`, and
/// unregisters afterward. Objects being waited on hold only a non-owning
/// reference while the waiter is registered.
///
/// The waiter's lock is leaf-level: `awake` is called with other locks held,
/// so nothing here may call back out.
pub struct Waiter {
    inner: Mutex<State>,
    cond: Condvar,
}

struct State {
    /// The first wake wins; later wakes are dropped.
    awoken: Option<Result<u64>>,
}

impl Waiter {
    pub fn new() -> Arc<Waiter> {
        Arc::new(Waiter { inner: Mutex::new(State { awoken: None }), cond: Condvar::new() })
    }

    /// Rearms the waiter for another wait. Must not be called while the
    /// waiter is registered anywhere.
    pub fn init(&self) {
        self.inner.lock().awoken = None;
    }

    /// Wakes the waiter with the given result. Returns whether this call
    /// was the one that woke it; a waiter already awoken keeps its first
    /// result.
    pub fn awake(&self, result: Result<u64>) -> bool {
        let mut state = self.inner.lock();
        if state.awoken.is_some() {
            return false;
        }
        state.awoken = Some(result);
        self.cond.notify_one();
        true
    }

    /// Blocks until awoken or the deadline passes. Returns the context
    /// value passed to `awake`, the status it carried, or
    /// `DeadlineExceeded`.
    pub fn wait(&self, deadline: Deadline) -> Result<u64> {
        let mut state = self.inner.lock();
        loop {
            if let Some(result) = state.awoken {
                return result;
            }
            match deadline {
                Deadline::Poll => return Err(Status::DeadlineExceeded),
                Deadline::Indefinite => self.cond.wait(&mut state),
                Deadline::Until(when) => {
                    if self.cond.wait_until(&mut state, when).timed_out() {
                        // A wake may have slipped in just before the timeout.
                        return state.awoken.unwrap_or(Err(Status::DeadlineExceeded));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_awake_before_wait() {
        let waiter = Waiter::new();
        assert!(waiter.awake(Ok(7)));
        assert_eq!(waiter.wait(Deadline::Indefinite), Ok(7));
    }

    #[test]
    fn test_first_awake_wins() {
        let waiter = Waiter::new();
        assert!(waiter.awake(Err(Status::FailedPrecondition)));
        assert!(!waiter.awake(Ok(3)));
        assert_eq!(waiter.wait(Deadline::Poll), Err(Status::FailedPrecondition));
    }

    #[test]
    fn test_poll_times_out() {
        let waiter = Waiter::new();
        assert_eq!(waiter.wait(Deadline::Poll), Err(Status::DeadlineExceeded));
    }

    #[test]
    fn test_deadline_times_out() {
        let waiter = Waiter::new();
        let deadline = Deadline::after(Duration::from_millis(10));
        assert_eq!(waiter.wait(deadline), Err(Status::DeadlineExceeded));
    }

    #[test]
    fn test_cross_thread_wake() {
        let waiter = Waiter::new();
        let clone = Arc::clone(&waiter);
        let thread = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            clone.awake(Ok(42));
        });
        assert_eq!(waiter.wait(Deadline::Indefinite), Ok(42));
        thread.join().unwrap();
    }

    #[test]
    fn test_init_rearms() {
        let waiter = Waiter::new();
        waiter.awake(Ok(1));
        assert_eq!(waiter.wait(Deadline::Poll), Ok(1));
        waiter.init();
        assert_eq!(waiter.wait(Deadline::Poll), Err(Status::DeadlineExceeded));
        waiter.awake(Ok(2));
        assert_eq!(waiter.wait(Deadline::Poll), Ok(2));
    }
}
