// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::data_pipe::{self, DataPipeOptions};
use crate::data_pipe_dispatchers::new_data_pipe_pair;
use crate::dispatcher::Dispatcher as _;
use crate::handle_table::{Handle, HandleTable};
use crate::message_pipe_dispatcher::MessagePipeDispatcher;
use crate::signals::Signals;
use crate::status::{Result, Status};
use crate::waiter::{Deadline, Waiter};

/// Maximum number of handles in one `wait_many` call.
pub const MAX_WAIT_MANY_NUM_HANDLES: usize = 1 << 16;

/// The entry point for everything done through handles.
///
/// Holds the handle table behind the outermost lock of the hierarchy. The
/// table lock is only ever held for table bookkeeping; dispatcher and pipe
/// calls happen after it is released, so closing a dispatcher can never
/// deadlock against a concurrent table operation.
pub struct Core {
    handle_table: Mutex<HandleTable>,
}

impl Core {
    pub fn new() -> Core {
        Core { handle_table: Mutex::new(HandleTable::new()) }
    }

    /// Creates a message pipe and returns the handles of its two ends.
    /// Either end may write; messages appear on the other.
    pub fn create_message_pipe(&self) -> Result<(Handle, Handle)> {
        let (d0, d1) = MessagePipeDispatcher::new_pair();
        let pair = self
            .handle_table
            .lock()
            .add_dispatcher_pair(Arc::clone(&d0) as _, Arc::clone(&d1) as _);
        match pair {
            Some(handles) => Ok(handles),
            None => {
                d0.close();
                d1.close();
                Err(Status::ResourceExhausted)
            }
        }
    }

    /// Creates a data pipe and returns the (producer, consumer) handles.
    pub fn create_data_pipe(&self, options: &DataPipeOptions) -> Result<(Handle, Handle)> {
        let options = data_pipe::validate_options(options)?;
        let (producer, consumer) = new_data_pipe_pair(&options);
        let pair = self
            .handle_table
            .lock()
            .add_dispatcher_pair(Arc::clone(&producer) as _, Arc::clone(&consumer) as _);
        match pair {
            Some(handles) => Ok(handles),
            None => {
                producer.close();
                consumer.close();
                Err(Status::ResourceExhausted)
            }
        }
    }

    /// Closes a handle. The handle leaves the table under the table lock;
    /// the dispatcher is closed after it is released.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let dispatcher = self.handle_table.lock().get_and_remove_dispatcher(handle)?;
        dispatcher.close();
        Ok(())
    }

    /// Writes a message, transferring ownership of `handles` with it. The
    /// transferred handles leave this table when the write succeeds; on
    /// failure they stay usable. Writing a handle over itself, or a handle
    /// already in another transfer, fails with `Busy`.
    pub fn write_message(&self, handle: Handle, bytes: &[u8], handles: &[Handle]) -> Result<()> {
        let (dispatcher, dispatchers) = {
            let table = &mut *self.handle_table.lock();
            let dispatcher = table.get_dispatcher(handle)?;
            let dispatchers = table.start_transport(handle, handles)?;
            (dispatcher, dispatchers)
        };
        let result = dispatcher.write_message(bytes, dispatchers);
        if !handles.is_empty() {
            self.handle_table.lock().finish_transport(handles, result.is_ok());
        }
        result
    }

    /// Reads the next message. Any dispatchers it carries get fresh handles
    /// in this table; if the table cannot take them all, the message is
    /// consumed, its dispatchers are closed, and the read fails.
    pub fn read_message(&self, handle: Handle) -> Result<(Vec<u8>, Vec<Handle>)> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        let message = dispatcher.read_message()?;
        if message.dispatchers.is_empty() {
            return Ok((message.bytes, Vec::new()));
        }
        let handles = self.handle_table.lock().add_dispatcher_vector(&message.dispatchers);
        match handles {
            Some(handles) => Ok((message.bytes, handles)),
            None => {
                log::warn!("handle table full; dropping {} received handles", message.dispatchers.len());
                for dispatcher in message.dispatchers {
                    dispatcher.close();
                }
                Err(Status::ResourceExhausted)
            }
        }
    }

    pub fn write_data(&self, handle: Handle, elements: &[u8], all_or_none: bool) -> Result<usize> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        dispatcher.write_data(elements, all_or_none)
    }

    pub fn begin_write_data(&self, handle: Handle) -> Result<(*mut u8, usize)> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        dispatcher.begin_write_data()
    }

    pub fn end_write_data(&self, handle: Handle, num_bytes_written: usize) -> Result<()> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        dispatcher.end_write_data(num_bytes_written)
    }

    pub fn read_data(
        &self,
        handle: Handle,
        elements: &mut [u8],
        all_or_none: bool,
    ) -> Result<usize> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        dispatcher.read_data(elements, all_or_none)
    }

    pub fn discard_data(&self, handle: Handle, num_bytes: usize, all_or_none: bool) -> Result<usize> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        dispatcher.discard_data(num_bytes, all_or_none)
    }

    pub fn query_data(&self, handle: Handle) -> Result<usize> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        dispatcher.query_data()
    }

    pub fn begin_read_data(&self, handle: Handle) -> Result<(*const u8, usize)> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        dispatcher.begin_read_data()
    }

    pub fn end_read_data(&self, handle: Handle, num_bytes_read: usize) -> Result<()> {
        let dispatcher = self.handle_table.lock().get_dispatcher(handle)?;
        dispatcher.end_read_data(num_bytes_read)
    }

    /// Waits until any of `signals` is satisfied on `handle`. Returns
    /// immediately if one already is, with `FailedPrecondition` if none
    /// can ever be, or with `DeadlineExceeded` when the deadline passes.
    pub fn wait(&self, handle: Handle, signals: Signals, deadline: Deadline) -> Result<()> {
        self.wait_many(&[handle], &[signals], deadline).map(|_| ())
    }

    /// Waits until any of `signals[i]` is satisfied on `handles[i]` for
    /// some `i`, and returns that index. When several are satisfied
    /// up front, the lowest index wins. A handle that fails to resolve
    /// fails the whole call; a handle closed while the wait is parked
    /// wakes it with `Cancelled`.
    pub fn wait_many(
        &self,
        handles: &[Handle],
        signals: &[Signals],
        deadline: Deadline,
    ) -> Result<usize> {
        if handles.is_empty() || handles.len() != signals.len() {
            return Err(Status::InvalidArgument);
        }
        if handles.len() > MAX_WAIT_MANY_NUM_HANDLES {
            return Err(Status::ResourceExhausted);
        }
        let dispatchers = {
            let table = self.handle_table.lock();
            handles.iter().map(|&h| table.get_dispatcher(h)).collect::<Result<Vec<_>>>()?
        };

        let waiter = Waiter::new();
        waiter.init();
        let mut early_result = None;
        let mut num_added = 0;
        for (i, dispatcher) in dispatchers.iter().enumerate() {
            match dispatcher.add_waiter(&waiter, signals[i], i as u64) {
                Ok(()) => num_added += 1,
                // Satisfied already: this index wins without waiting.
                Err(Status::AlreadyExists) => {
                    early_result = Some(Ok(i));
                    break;
                }
                Err(status) => {
                    early_result = Some(Err(status));
                    break;
                }
            }
        }
        let result = match early_result {
            Some(result) => result,
            None => waiter.wait(deadline).map(|context| context as usize),
        };
        for dispatcher in &dispatchers[..num_added] {
            dispatcher.remove_waiter(&waiter);
        }
        result
    }
}

impl Default for Core {
    fn default() -> Self {
        Core::new()
    }
}
