// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::dispatcher::Message;
use crate::signals::{HandleSignalsState, Signals};
use crate::status::{Result, Status};
use crate::waiter::Waiter;
use crate::waiter_list::WaiterList;

/// Maximum payload size of a single message.
pub const MAX_MESSAGE_NUM_BYTES: usize = 4 * 1024 * 1024;

/// Maximum number of handles transferred in a single message.
pub const MAX_MESSAGE_NUM_HANDLES: usize = 10_000;

struct Port {
    open: bool,
    /// Messages waiting to be read from this port.
    queue: VecDeque<Message>,
    waiters: WaiterList,
}

impl Port {
    fn new() -> Port {
        Port { open: true, queue: VecDeque::new(), waiters: WaiterList::default() }
    }
}

/// The secondary object shared by the two ends of a message pipe. Knows
/// nothing about handles or dispatchers; addressed by port number (0 or 1).
///
/// A message written to one port is queued on the other. Queues are
/// unbounded; backpressure is the caller's concern.
pub struct MessagePipe {
    inner: Mutex<Inner>,
}

struct Inner {
    ports: [Port; 2],
}

impl MessagePipe {
    pub fn new() -> Arc<MessagePipe> {
        Arc::new(MessagePipe { inner: Mutex::new(Inner { ports: [Port::new(), Port::new()] }) })
    }

    fn port_state(inner: &Inner, port: usize) -> HandleSignalsState {
        let mut satisfied = Signals::empty();
        let mut satisfiable = Signals::empty();
        if !inner.ports[port].queue.is_empty() {
            satisfied |= Signals::READABLE;
            satisfiable |= Signals::READABLE;
        }
        if inner.ports[1 - port].open {
            satisfied |= Signals::WRITABLE;
            satisfiable |= Signals::READABLE | Signals::WRITABLE;
        }
        HandleSignalsState { satisfied, satisfiable }
    }

    pub fn write_message(
        &self,
        port: usize,
        bytes: &[u8],
        dispatchers: Vec<Arc<dyn crate::dispatcher::Dispatcher>>,
    ) -> Result<()> {
        if bytes.len() > MAX_MESSAGE_NUM_BYTES || dispatchers.len() > MAX_MESSAGE_NUM_HANDLES {
            return Err(Status::ResourceExhausted);
        }
        let inner = &mut *self.inner.lock();
        // A racing close can land between the dispatcher handing out this
        // pipe and the call arriving here.
        if !inner.ports[port].open {
            return Err(Status::InvalidArgument);
        }
        if !inner.ports[1 - port].open {
            return Err(Status::FailedPrecondition);
        }
        inner.ports[1 - port].queue.push_back(Message { bytes: bytes.to_vec(), dispatchers });
        let state = Self::port_state(inner, 1 - port);
        inner.ports[1 - port].waiters.awake_for_state(&state);
        Ok(())
    }

    pub fn read_message(&self, port: usize) -> Result<Message> {
        let inner = &mut *self.inner.lock();
        if !inner.ports[port].open {
            return Err(Status::InvalidArgument);
        }
        match inner.ports[port].queue.pop_front() {
            Some(message) => Ok(message),
            None if inner.ports[1 - port].open => Err(Status::ShouldWait),
            None => Err(Status::FailedPrecondition),
        }
    }

    pub fn add_waiter(
        &self,
        port: usize,
        waiter: &Arc<Waiter>,
        signals: Signals,
        context: u64,
    ) -> Result<()> {
        let inner = &mut *self.inner.lock();
        if !inner.ports[port].open {
            return Err(Status::InvalidArgument);
        }
        let state = Self::port_state(inner, port);
        if state.satisfies(signals) {
            return Err(Status::AlreadyExists);
        }
        if !state.can_satisfy(signals) {
            return Err(Status::FailedPrecondition);
        }
        inner.ports[port].waiters.add(waiter, signals, context);
        Ok(())
    }

    pub fn remove_waiter(&self, port: usize, waiter: &Arc<Waiter>) {
        self.inner.lock().ports[port].waiters.remove(waiter);
    }

    pub fn signals_state(&self, port: usize) -> HandleSignalsState {
        let inner = &*self.inner.lock();
        if !inner.ports[port].open {
            return HandleSignalsState::empty();
        }
        Self::port_state(inner, port)
    }

    /// Closes one port. Cancels that port's waiters, wakes the peer for
    /// the state change, and returns the unread messages so the caller can
    /// dispose of any dispatchers they carry outside this pipe's lock.
    pub fn close(&self, port: usize) -> Vec<Message> {
        let inner = &mut *self.inner.lock();
        debug_assert!(inner.ports[port].open);
        inner.ports[port].open = false;
        inner.ports[port].waiters.cancel_all();
        let orphans: Vec<Message> = inner.ports[port].queue.drain(..).collect();
        let peer_state = Self::port_state(inner, 1 - port);
        inner.ports[1 - port].waiters.awake_for_state(&peer_state);
        orphans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waiter::Deadline;

    #[test]
    fn test_basic_write_read() {
        let pipe = MessagePipe::new();
        pipe.write_message(0, b"hello", Vec::new()).unwrap();
        let message = pipe.read_message(1).unwrap();
        assert_eq!(message.bytes, b"hello");
        assert!(message.dispatchers.is_empty());
    }

    #[test]
    fn test_read_empty_should_wait() {
        let pipe = MessagePipe::new();
        assert_eq!(pipe.read_message(0).err(), Some(Status::ShouldWait));
    }

    #[test]
    fn test_messages_are_ordered() {
        let pipe = MessagePipe::new();
        pipe.write_message(0, b"first", Vec::new()).unwrap();
        pipe.write_message(0, b"second", Vec::new()).unwrap();
        assert_eq!(pipe.read_message(1).unwrap().bytes, b"first");
        assert_eq!(pipe.read_message(1).unwrap().bytes, b"second");
    }

    #[test]
    fn test_peer_close_semantics() {
        let pipe = MessagePipe::new();
        pipe.write_message(0, b"last words", Vec::new()).unwrap();
        let orphans = pipe.close(0);
        assert!(orphans.is_empty());

        // The queued message can still be drained, then the condition is
        // permanent.
        assert_eq!(pipe.read_message(1).unwrap().bytes, b"last words");
        assert_eq!(pipe.read_message(1).err(), Some(Status::FailedPrecondition));
        assert_eq!(pipe.read_message(1).err(), Some(Status::FailedPrecondition));
        assert_eq!(
            pipe.write_message(1, b"into the void", Vec::new()).err(),
            Some(Status::FailedPrecondition)
        );
    }

    #[test]
    fn test_close_returns_unread_messages() {
        let pipe = MessagePipe::new();
        pipe.write_message(0, b"unread", Vec::new()).unwrap();
        let orphans = pipe.close(1);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].bytes, b"unread");
    }

    #[test]
    fn test_signals() {
        let pipe = MessagePipe::new();
        let state = pipe.signals_state(0);
        assert_eq!(state.satisfied, Signals::WRITABLE);
        assert_eq!(state.satisfiable, Signals::READABLE | Signals::WRITABLE);

        pipe.write_message(1, b"x", Vec::new()).unwrap();
        let state = pipe.signals_state(0);
        assert_eq!(state.satisfied, Signals::READABLE | Signals::WRITABLE);

        pipe.close(1);
        let state = pipe.signals_state(0);
        assert_eq!(state.satisfied, Signals::READABLE);
        assert_eq!(state.satisfiable, Signals::READABLE);

        pipe.read_message(0).unwrap();
        let state = pipe.signals_state(0);
        assert_eq!(state.satisfied, Signals::empty());
        assert_eq!(state.satisfiable, Signals::empty());
    }

    #[test]
    fn test_write_wakes_reader() {
        let pipe = MessagePipe::new();
        let waiter = Waiter::new();
        pipe.add_waiter(0, &waiter, Signals::READABLE, 17).unwrap();
        pipe.write_message(1, b"ping", Vec::new()).unwrap();
        assert_eq!(waiter.wait(Deadline::Poll), Ok(17));
        pipe.remove_waiter(0, &waiter);
    }

    #[test]
    fn test_add_waiter_already_satisfied() {
        let pipe = MessagePipe::new();
        let waiter = Waiter::new();
        assert_eq!(
            pipe.add_waiter(0, &waiter, Signals::WRITABLE, 0).err(),
            Some(Status::AlreadyExists)
        );
    }

    #[test]
    fn test_peer_close_wakes_reader_unsatisfiable() {
        let pipe = MessagePipe::new();
        let waiter = Waiter::new();
        pipe.add_waiter(0, &waiter, Signals::READABLE, 0).unwrap();
        pipe.close(1);
        assert_eq!(waiter.wait(Deadline::Poll), Err(Status::FailedPrecondition));
        pipe.remove_waiter(0, &waiter);
    }

    #[test]
    fn test_operations_on_closed_port_are_invalid() {
        let pipe = MessagePipe::new();
        pipe.close(0);
        assert_eq!(
            pipe.write_message(0, b"x", Vec::new()).err(),
            Some(Status::InvalidArgument)
        );
        assert_eq!(pipe.read_message(0).err(), Some(Status::InvalidArgument));
        let waiter = Waiter::new();
        assert_eq!(
            pipe.add_waiter(0, &waiter, Signals::READABLE, 0).err(),
            Some(Status::InvalidArgument)
        );
        assert_eq!(pipe.signals_state(0), HandleSignalsState::empty());
    }

    #[test]
    fn test_message_too_big() {
        let pipe = MessagePipe::new();
        let bytes = vec![0u8; MAX_MESSAGE_NUM_BYTES + 1];
        assert_eq!(
            pipe.write_message(0, &bytes, Vec::new()).err(),
            Some(Status::ResourceExhausted)
        );
    }
}
