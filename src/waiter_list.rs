// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use crate::signals::{HandleSignalsState, Signals};
use crate::status::Status;
use crate::waiter::Waiter;

struct WaitEntry {
    waiter: Arc<Waiter>,
    signals: Signals,
    context: u64,
}

/// The set of waiters registered on one end of a pipe.
///
/// Lives behind the owning object's lock; expected counts are small, so a
/// plain vector with swap-remove is enough. Entries stay in the list until
/// the waiting thread removes them, even after they have been woken.
#[derive(Default)]
pub struct WaiterList {
    waiters: Vec<WaitEntry>,
}

impl WaiterList {
    pub fn add(&mut self, waiter: &Arc<Waiter>, signals: Signals, context: u64) {
        self.waiters.push(WaitEntry { waiter: Arc::clone(waiter), signals, context });
    }

    pub fn remove(&mut self, waiter: &Arc<Waiter>) {
        if let Some(index) = self.waiters.iter().position(|e| Arc::ptr_eq(&e.waiter, waiter)) {
            self.waiters.swap_remove(index);
        }
    }

    /// Wakes every waiter whose requested signals the new state satisfies,
    /// and every waiter whose requested signals it can never satisfy again.
    pub fn awake_for_state(&mut self, state: &HandleSignalsState) {
        for entry in &self.waiters {
            if state.satisfies(entry.signals) {
                entry.waiter.awake(Ok(entry.context));
            } else if !state.can_satisfy(entry.signals) {
                entry.waiter.awake(Err(Status::FailedPrecondition));
            }
        }
    }

    /// Wakes everything with `Cancelled`. Used when the handle itself is
    /// closed out from under its waiters.
    pub fn cancel_all(&mut self) {
        for entry in self.waiters.drain(..) {
            entry.waiter.awake(Err(Status::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waiter::Deadline;

    fn state(satisfied: Signals, satisfiable: Signals) -> HandleSignalsState {
        HandleSignalsState { satisfied, satisfiable }
    }

    #[test]
    fn test_awake_on_satisfied() {
        let mut list = WaiterList::default();
        let waiter = Waiter::new();
        list.add(&waiter, Signals::READABLE, 5);

        // Writable-only state leaves the reader parked.
        list.awake_for_state(&state(Signals::WRITABLE, Signals::READABLE | Signals::WRITABLE));
        assert_eq!(waiter.wait(Deadline::Poll), Err(Status::DeadlineExceeded));

        list.awake_for_state(&state(Signals::READABLE, Signals::READABLE));
        assert_eq!(waiter.wait(Deadline::Poll), Ok(5));
    }

    #[test]
    fn test_awake_on_never_satisfiable() {
        let mut list = WaiterList::default();
        let waiter = Waiter::new();
        list.add(&waiter, Signals::READABLE, 0);

        list.awake_for_state(&state(Signals::empty(), Signals::empty()));
        assert_eq!(waiter.wait(Deadline::Poll), Err(Status::FailedPrecondition));
    }

    #[test]
    fn test_cancel_all() {
        let mut list = WaiterList::default();
        let w0 = Waiter::new();
        let w1 = Waiter::new();
        list.add(&w0, Signals::READABLE, 0);
        list.add(&w1, Signals::WRITABLE, 1);

        list.cancel_all();
        assert_eq!(w0.wait(Deadline::Poll), Err(Status::Cancelled));
        assert_eq!(w1.wait(Deadline::Poll), Err(Status::Cancelled));
    }

    #[test]
    fn test_remove_prevents_wake() {
        let mut list = WaiterList::default();
        let waiter = Waiter::new();
        list.add(&waiter, Signals::READABLE, 0);
        list.remove(&waiter);

        list.awake_for_state(&state(Signals::READABLE, Signals::READABLE));
        assert_eq!(waiter.wait(Deadline::Poll), Err(Status::DeadlineExceeded));
    }
}
