// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::local_data_pipe::LocalDataPipe;
use crate::signals::{HandleSignalsState, Signals};
use crate::status::{Result, Status};
use crate::waiter::Waiter;
use crate::waiter_list::WaiterList;

/// Capacity used when the creation options leave it unspecified.
pub const DEFAULT_DATA_PIPE_CAPACITY_BYTES: usize = 1024 * 1024;

/// Hard upper bound on a data pipe's capacity.
pub const MAX_DATA_PIPE_CAPACITY_BYTES: usize = 256 * 1024 * 1024;

/// Creation options for a data pipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataPipeOptions {
    /// Size of one element. All transfer sizes are multiples of this.
    pub element_num_bytes: usize,
    /// Total buffer capacity. Zero means "pick a default".
    pub capacity_num_bytes: usize,
    /// When set, writes to a full pipe evict the oldest buffered elements
    /// instead of blocking.
    pub may_discard: bool,
}

impl Default for DataPipeOptions {
    fn default() -> Self {
        DataPipeOptions { element_num_bytes: 1, capacity_num_bytes: 0, may_discard: false }
    }
}

/// Checks creation options and fills in the default capacity. The returned
/// options always have a nonzero capacity that is a whole number of
/// elements.
pub fn validate_options(options: &DataPipeOptions) -> Result<DataPipeOptions> {
    if options.element_num_bytes == 0 {
        return Err(Status::InvalidArgument);
    }
    let capacity_num_bytes = if options.capacity_num_bytes == 0 {
        let rounded =
            DEFAULT_DATA_PIPE_CAPACITY_BYTES - DEFAULT_DATA_PIPE_CAPACITY_BYTES % options.element_num_bytes;
        if rounded == 0 {
            // A single element is bigger than the default buffer.
            options.element_num_bytes
        } else {
            rounded
        }
    } else {
        if options.capacity_num_bytes % options.element_num_bytes != 0 {
            return Err(Status::InvalidArgument);
        }
        options.capacity_num_bytes
    };
    if capacity_num_bytes > MAX_DATA_PIPE_CAPACITY_BYTES {
        return Err(Status::ResourceExhausted);
    }
    Ok(DataPipeOptions {
        element_num_bytes: options.element_num_bytes,
        capacity_num_bytes,
        may_discard: options.may_discard,
    })
}

/// Storage backing a data pipe.
///
/// Callers (the [`DataPipe`] layer) guarantee that element sizes are
/// already validated, that simple operations are never issued with an
/// empty span, and that no two-phase operation is in progress when a
/// conflicting call arrives. Implementations only move bytes.
pub trait DataPipeImpl: Send {
    fn write(&mut self, elements: &[u8], all_or_none: bool) -> Result<usize>;
    fn begin_write(&mut self) -> Result<(*mut u8, usize)>;
    fn end_write(&mut self, num_bytes_written: usize);
    fn read(&mut self, elements: &mut [u8], all_or_none: bool, producer_open: bool) -> Result<usize>;
    fn discard(&mut self, num_bytes: usize, all_or_none: bool, producer_open: bool) -> Result<usize>;
    fn query(&self) -> usize;
    fn begin_read(&mut self, producer_open: bool) -> Result<(*const u8, usize)>;
    fn end_read(&mut self, num_bytes_read: usize);
    fn drop_all_data(&mut self);
    /// Frees the backing storage. Only called when no data is buffered and
    /// no two-phase pointer is outstanding.
    fn release_buffer(&mut self);
    fn is_full(&self) -> bool;
}

struct Inner {
    producer_open: bool,
    consumer_open: bool,
    /// Limit handed out by an in-progress two-phase write, if any.
    producer_two_phase_max: Option<usize>,
    /// Limit handed out by an in-progress two-phase read, if any.
    consumer_two_phase_max: Option<usize>,
    producer_waiters: WaiterList,
    consumer_waiters: WaiterList,
    buffer: Box<dyn DataPipeImpl>,
}

/// The secondary object shared by the producer and consumer ends of a data
/// pipe. Knows nothing about handles or dispatchers.
///
/// Each end may have at most one two-phase operation in progress; while one
/// is, conflicting simple operations fail with `Busy` and the buffer is
/// kept alive so the handed-out pointer stays valid until the matching end
/// call, even across a peer close.
pub struct DataPipe {
    element_num_bytes: usize,
    may_discard: bool,
    inner: Mutex<Inner>,
}

impl DataPipe {
    /// Creates a data pipe from already validated options.
    pub fn new(options: &DataPipeOptions) -> Arc<DataPipe> {
        debug_assert!(validate_options(options).as_ref() == Ok(options));
        Arc::new(DataPipe {
            element_num_bytes: options.element_num_bytes,
            may_discard: options.may_discard,
            inner: Mutex::new(Inner {
                producer_open: true,
                consumer_open: true,
                producer_two_phase_max: None,
                consumer_two_phase_max: None,
                producer_waiters: WaiterList::default(),
                consumer_waiters: WaiterList::default(),
                buffer: Box::new(LocalDataPipe::new(
                    options.element_num_bytes,
                    options.capacity_num_bytes,
                    options.may_discard,
                )),
            }),
        })
    }

    fn producer_state(&self, inner: &Inner) -> HandleSignalsState {
        let mut state = HandleSignalsState::empty();
        if inner.consumer_open {
            state.satisfiable |= Signals::WRITABLE;
            if inner.producer_two_phase_max.is_none()
                && (self.may_discard || !inner.buffer.is_full())
            {
                state.satisfied |= Signals::WRITABLE;
            }
        }
        state
    }

    fn consumer_state(&self, inner: &Inner) -> HandleSignalsState {
        let mut state = HandleSignalsState::empty();
        let has_data = inner.buffer.query() > 0;
        if has_data || inner.producer_open {
            state.satisfiable |= Signals::READABLE;
        }
        if has_data && inner.consumer_two_phase_max.is_none() {
            state.satisfied |= Signals::READABLE;
        }
        state
    }

    fn wake_waiters(&self, inner: &mut Inner) {
        let producer_state = self.producer_state(inner);
        let consumer_state = self.consumer_state(inner);
        inner.producer_waiters.awake_for_state(&producer_state);
        inner.consumer_waiters.awake_for_state(&consumer_state);
    }

    pub fn producer_write_data(&self, elements: &[u8], all_or_none: bool) -> Result<usize> {
        let inner = &mut *self.inner.lock();
        // A racing close can land between the dispatcher handing out this
        // pipe and the call arriving here.
        if !inner.producer_open {
            return Err(Status::InvalidArgument);
        }
        if inner.producer_two_phase_max.is_some() {
            return Err(Status::Busy);
        }
        if !inner.consumer_open {
            return Err(Status::FailedPrecondition);
        }
        if elements.len() % self.element_num_bytes != 0 {
            return Err(Status::InvalidArgument);
        }
        if elements.is_empty() {
            return Ok(0);
        }
        let num_written = inner.buffer.write(elements, all_or_none)?;
        self.wake_waiters(inner);
        Ok(num_written)
    }

    pub fn producer_begin_write_data(&self) -> Result<(*mut u8, usize)> {
        let inner = &mut *self.inner.lock();
        if !inner.producer_open {
            return Err(Status::InvalidArgument);
        }
        if inner.producer_two_phase_max.is_some() {
            return Err(Status::Busy);
        }
        if !inner.consumer_open {
            return Err(Status::FailedPrecondition);
        }
        // Two-phase writes never evict, even on a discarding pipe; a caller
        // that needs eviction uses the simple write path.
        let (ptr, max_num_bytes) = inner.buffer.begin_write()?;
        inner.producer_two_phase_max = Some(max_num_bytes);
        Ok((ptr, max_num_bytes))
    }

    pub fn producer_end_write_data(&self, num_bytes_written: usize) -> Result<()> {
        let inner = &mut *self.inner.lock();
        if !inner.producer_open {
            return Err(Status::InvalidArgument);
        }
        let max_num_bytes = match inner.producer_two_phase_max.take() {
            Some(max) => max,
            None => return Err(Status::FailedPrecondition),
        };
        let result = if num_bytes_written > max_num_bytes
            || num_bytes_written % self.element_num_bytes != 0
        {
            // The two-phase write is aborted; nothing is committed.
            Err(Status::InvalidArgument)
        } else {
            inner.buffer.end_write(num_bytes_written);
            Ok(())
        };
        if inner.consumer_open {
            self.wake_waiters(inner);
        } else {
            // The consumer went away while the write was in progress; the
            // commit succeeds but the bytes have no reader.
            inner.buffer.drop_all_data();
            inner.buffer.release_buffer();
        }
        result
    }

    pub fn consumer_read_data(&self, elements: &mut [u8], all_or_none: bool) -> Result<usize> {
        let inner = &mut *self.inner.lock();
        if !inner.consumer_open {
            return Err(Status::InvalidArgument);
        }
        if inner.consumer_two_phase_max.is_some() {
            return Err(Status::Busy);
        }
        if elements.len() % self.element_num_bytes != 0 {
            return Err(Status::InvalidArgument);
        }
        if elements.is_empty() {
            return Ok(0);
        }
        let num_read = inner.buffer.read(elements, all_or_none, inner.producer_open)?;
        if inner.producer_open {
            self.wake_waiters(inner);
        } else if inner.buffer.query() == 0 {
            inner.buffer.release_buffer();
        }
        Ok(num_read)
    }

    pub fn consumer_discard_data(&self, num_bytes: usize, all_or_none: bool) -> Result<usize> {
        let inner = &mut *self.inner.lock();
        if !inner.consumer_open {
            return Err(Status::InvalidArgument);
        }
        if inner.consumer_two_phase_max.is_some() {
            return Err(Status::Busy);
        }
        if num_bytes % self.element_num_bytes != 0 {
            return Err(Status::InvalidArgument);
        }
        if num_bytes == 0 {
            return Ok(0);
        }
        let num_discarded = inner.buffer.discard(num_bytes, all_or_none, inner.producer_open)?;
        if inner.producer_open {
            self.wake_waiters(inner);
        } else if inner.buffer.query() == 0 {
            inner.buffer.release_buffer();
        }
        Ok(num_discarded)
    }

    pub fn consumer_query_data(&self) -> Result<usize> {
        let inner = &*self.inner.lock();
        if !inner.consumer_open {
            return Err(Status::InvalidArgument);
        }
        if inner.consumer_two_phase_max.is_some() {
            return Err(Status::Busy);
        }
        Ok(inner.buffer.query())
    }

    pub fn consumer_begin_read_data(&self) -> Result<(*const u8, usize)> {
        let inner = &mut *self.inner.lock();
        if !inner.consumer_open {
            return Err(Status::InvalidArgument);
        }
        if inner.consumer_two_phase_max.is_some() {
            return Err(Status::Busy);
        }
        let (ptr, max_num_bytes) = inner.buffer.begin_read(inner.producer_open)?;
        inner.consumer_two_phase_max = Some(max_num_bytes);
        Ok((ptr, max_num_bytes))
    }

    pub fn consumer_end_read_data(&self, num_bytes_read: usize) -> Result<()> {
        let inner = &mut *self.inner.lock();
        if !inner.consumer_open {
            return Err(Status::InvalidArgument);
        }
        let max_num_bytes = match inner.consumer_two_phase_max.take() {
            Some(max) => max,
            None => return Err(Status::FailedPrecondition),
        };
        let result = if num_bytes_read > max_num_bytes
            || num_bytes_read % self.element_num_bytes != 0
        {
            Err(Status::InvalidArgument)
        } else {
            inner.buffer.end_read(num_bytes_read);
            Ok(())
        };
        if inner.producer_open {
            self.wake_waiters(inner);
        } else {
            // With the producer gone this state is final; a waiter that
            // registered while the two-phase read masked the readable
            // signal must learn its fate now.
            let consumer_state = self.consumer_state(inner);
            inner.consumer_waiters.awake_for_state(&consumer_state);
            if inner.buffer.query() == 0 {
                inner.buffer.release_buffer();
            }
        }
        result
    }

    pub fn producer_add_waiter(
        &self,
        waiter: &Arc<Waiter>,
        signals: Signals,
        context: u64,
    ) -> Result<()> {
        let inner = &mut *self.inner.lock();
        if !inner.producer_open {
            return Err(Status::InvalidArgument);
        }
        let state = self.producer_state(inner);
        if state.satisfies(signals) {
            return Err(Status::AlreadyExists);
        }
        if !state.can_satisfy(signals) {
            return Err(Status::FailedPrecondition);
        }
        inner.producer_waiters.add(waiter, signals, context);
        Ok(())
    }

    pub fn producer_remove_waiter(&self, waiter: &Arc<Waiter>) {
        self.inner.lock().producer_waiters.remove(waiter);
    }

    pub fn producer_signals_state(&self) -> HandleSignalsState {
        let inner = &*self.inner.lock();
        if !inner.producer_open {
            return HandleSignalsState::empty();
        }
        self.producer_state(inner)
    }

    pub fn consumer_add_waiter(
        &self,
        waiter: &Arc<Waiter>,
        signals: Signals,
        context: u64,
    ) -> Result<()> {
        let inner = &mut *self.inner.lock();
        if !inner.consumer_open {
            return Err(Status::InvalidArgument);
        }
        let state = self.consumer_state(inner);
        if state.satisfies(signals) {
            return Err(Status::AlreadyExists);
        }
        if !state.can_satisfy(signals) {
            return Err(Status::FailedPrecondition);
        }
        inner.consumer_waiters.add(waiter, signals, context);
        Ok(())
    }

    pub fn consumer_remove_waiter(&self, waiter: &Arc<Waiter>) {
        self.inner.lock().consumer_waiters.remove(waiter);
    }

    pub fn consumer_signals_state(&self) -> HandleSignalsState {
        let inner = &*self.inner.lock();
        if !inner.consumer_open {
            return HandleSignalsState::empty();
        }
        self.consumer_state(inner)
    }

    /// Closes the producer end. An in-progress two-phase write is aborted.
    pub fn close_producer(&self) {
        let inner = &mut *self.inner.lock();
        debug_assert!(inner.producer_open);
        inner.producer_open = false;
        inner.producer_two_phase_max = None;
        inner.producer_waiters.cancel_all();
        let consumer_state = self.consumer_state(inner);
        inner.consumer_waiters.awake_for_state(&consumer_state);
        // Keep the buffer only if the consumer can still get at its
        // contents.
        if !inner.consumer_open
            || (inner.buffer.query() == 0 && inner.consumer_two_phase_max.is_none())
        {
            inner.buffer.drop_all_data();
            inner.buffer.release_buffer();
        }
    }

    /// Closes the consumer end. Buffered data is dropped; an in-progress
    /// two-phase read is aborted. A producer two-phase write keeps the
    /// buffer alive until its end call.
    pub fn close_consumer(&self) {
        let inner = &mut *self.inner.lock();
        debug_assert!(inner.consumer_open);
        inner.consumer_open = false;
        inner.consumer_two_phase_max = None;
        inner.consumer_waiters.cancel_all();
        inner.buffer.drop_all_data();
        let producer_state = self.producer_state(inner);
        inner.producer_waiters.awake_for_state(&producer_state);
        if inner.producer_two_phase_max.is_none() {
            inner.buffer.release_buffer();
        }
    }
}
