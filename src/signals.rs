// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use bitflags::bitflags;

bitflags! {
    /// Signals that can be waited upon.
    pub struct Signals: u32 {
        /// The handle has something to read: a queued message, or buffered
        /// data-pipe bytes.
        const READABLE = 1 << 0;
        /// The handle can accept a write without discarding or failing.
        const WRITABLE = 1 << 1;
    }
}

/// The signal state of one handle: which signals are satisfied right now,
/// and which could still become satisfied in the future.
///
/// A signal outside `satisfiable` is permanently out of reach (the peer
/// closed with nothing left to drain); this is what lets a wait fail with
/// `FailedPrecondition` instead of blocking forever.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleSignalsState {
    pub satisfied: Signals,
    pub satisfiable: Signals,
}

impl HandleSignalsState {
    pub fn empty() -> HandleSignalsState {
        HandleSignalsState { satisfied: Signals::empty(), satisfiable: Signals::empty() }
    }

    /// Whether any of the requested signals is satisfied now.
    pub fn satisfies(&self, signals: Signals) -> bool {
        self.satisfied.intersects(signals)
    }

    /// Whether any of the requested signals could ever become satisfied.
    pub fn can_satisfy(&self, signals: Signals) -> bool {
        self.satisfiable.intersects(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies_any() {
        let state = HandleSignalsState {
            satisfied: Signals::READABLE,
            satisfiable: Signals::READABLE | Signals::WRITABLE,
        };
        assert!(state.satisfies(Signals::READABLE));
        assert!(state.satisfies(Signals::READABLE | Signals::WRITABLE));
        assert!(!state.satisfies(Signals::WRITABLE));
        assert!(state.can_satisfy(Signals::WRITABLE));
    }

    #[test]
    fn test_empty_satisfies_nothing() {
        let state = HandleSignalsState::empty();
        assert!(!state.satisfies(Signals::READABLE));
        assert!(!state.can_satisfy(Signals::READABLE | Signals::WRITABLE));
    }
}
