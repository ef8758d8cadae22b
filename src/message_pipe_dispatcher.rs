// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::dispatcher::{Dispatcher, Message};
use crate::message_pipe::MessagePipe;
use crate::signals::{HandleSignalsState, Signals};
use crate::status::{Result, Status};
use crate::waiter::Waiter;

/// The dispatcher for one end of a message pipe.
///
/// The pipe reference lives under the dispatcher lock and is taken on
/// close; every operation clones the reference out and calls the pipe with
/// the dispatcher lock released, so the pipe lock nests strictly inside.
pub struct MessagePipeDispatcher {
    port: usize,
    inner: Mutex<Option<Arc<MessagePipe>>>,
}

impl MessagePipeDispatcher {
    /// Creates a message pipe and the dispatchers for both of its ends.
    pub fn new_pair() -> (Arc<MessagePipeDispatcher>, Arc<MessagePipeDispatcher>) {
        let pipe = MessagePipe::new();
        (
            Arc::new(MessagePipeDispatcher { port: 0, inner: Mutex::new(Some(Arc::clone(&pipe))) }),
            Arc::new(MessagePipeDispatcher { port: 1, inner: Mutex::new(Some(pipe)) }),
        )
    }

    fn pipe(&self) -> Result<Arc<MessagePipe>> {
        self.inner.lock().as_ref().cloned().ok_or(Status::InvalidArgument)
    }
}

impl Dispatcher for MessagePipeDispatcher {
    fn close(&self) {
        let pipe = self.inner.lock().take();
        if let Some(pipe) = pipe {
            // Unread messages may carry transferred handles; their
            // dispatchers are closed here, outside the pipe lock.
            for message in pipe.close(self.port) {
                for dispatcher in message.dispatchers {
                    dispatcher.close();
                }
            }
        }
    }

    fn write_message(&self, bytes: &[u8], dispatchers: Vec<Arc<dyn Dispatcher>>) -> Result<()> {
        self.pipe()?.write_message(self.port, bytes, dispatchers)
    }

    fn read_message(&self) -> Result<Message> {
        self.pipe()?.read_message(self.port)
    }

    fn add_waiter(&self, waiter: &Arc<Waiter>, signals: Signals, context: u64) -> Result<()> {
        self.pipe()?.add_waiter(self.port, waiter, signals, context)
    }

    fn remove_waiter(&self, waiter: &Arc<Waiter>) {
        if let Ok(pipe) = self.pipe() {
            pipe.remove_waiter(self.port, waiter);
        }
    }

    fn signals_state(&self) -> HandleSignalsState {
        match self.pipe() {
            Ok(pipe) => pipe.signals_state(self.port),
            Err(_) => HandleSignalsState::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_dispatchers() {
        let (d0, d1) = MessagePipeDispatcher::new_pair();
        d0.write_message(b"over the pipe", Vec::new()).unwrap();
        assert_eq!(d1.read_message().unwrap().bytes, b"over the pipe");
    }

    #[test]
    fn test_close_is_seen_by_peer() {
        let (d0, d1) = MessagePipeDispatcher::new_pair();
        d0.close();
        assert_eq!(d1.read_message().err(), Some(Status::FailedPrecondition));
        assert_eq!(d1.write_message(b"x", Vec::new()).err(), Some(Status::FailedPrecondition));
    }

    #[test]
    fn test_operations_after_close_are_invalid() {
        let (d0, _d1) = MessagePipeDispatcher::new_pair();
        d0.close();
        assert_eq!(d0.read_message().err(), Some(Status::InvalidArgument));
        assert_eq!(d0.signals_state(), HandleSignalsState::empty());
    }

    #[test]
    fn test_close_closes_queued_transferred_handles() {
        let (d0, d1) = MessagePipeDispatcher::new_pair();
        let (t0, t1) = MessagePipeDispatcher::new_pair();

        // Send t0's end through the pipe, then close the receiving end
        // without reading. The queued dispatcher must get closed, which t1
        // observes as peer-closed.
        d0.write_message(b"", vec![t0 as Arc<dyn Dispatcher>]).unwrap();
        d1.close();
        assert_eq!(t1.read_message().err(), Some(Status::FailedPrecondition));
    }
}
