// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::data_pipe::{DataPipe, DataPipeOptions};
use crate::dispatcher::Dispatcher;
use crate::signals::{HandleSignalsState, Signals};
use crate::status::{Result, Status};
use crate::waiter::Waiter;

/// Creates a data pipe and the dispatchers for its two ends. Options must
/// already be validated.
pub fn new_data_pipe_pair(
    options: &DataPipeOptions,
) -> (Arc<DataPipeProducerDispatcher>, Arc<DataPipeConsumerDispatcher>) {
    let pipe = DataPipe::new(options);
    (
        Arc::new(DataPipeProducerDispatcher { inner: Mutex::new(Some(Arc::clone(&pipe))) }),
        Arc::new(DataPipeConsumerDispatcher { inner: Mutex::new(Some(pipe)) }),
    )
}

/// The dispatcher for the write end of a data pipe.
///
/// Same locking shape as the message pipe dispatcher: the pipe reference is
/// cloned out and called with the dispatcher lock released.
pub struct DataPipeProducerDispatcher {
    inner: Mutex<Option<Arc<DataPipe>>>,
}

impl DataPipeProducerDispatcher {
    fn pipe(&self) -> Result<Arc<DataPipe>> {
        self.inner.lock().as_ref().cloned().ok_or(Status::InvalidArgument)
    }
}

impl Dispatcher for DataPipeProducerDispatcher {
    fn close(&self) {
        let pipe = self.inner.lock().take();
        if let Some(pipe) = pipe {
            pipe.close_producer();
        }
    }

    fn write_data(&self, elements: &[u8], all_or_none: bool) -> Result<usize> {
        self.pipe()?.producer_write_data(elements, all_or_none)
    }

    fn begin_write_data(&self) -> Result<(*mut u8, usize)> {
        self.pipe()?.producer_begin_write_data()
    }

    fn end_write_data(&self, num_bytes_written: usize) -> Result<()> {
        self.pipe()?.producer_end_write_data(num_bytes_written)
    }

    fn add_waiter(&self, waiter: &Arc<Waiter>, signals: Signals, context: u64) -> Result<()> {
        self.pipe()?.producer_add_waiter(waiter, signals, context)
    }

    fn remove_waiter(&self, waiter: &Arc<Waiter>) {
        if let Ok(pipe) = self.pipe() {
            pipe.producer_remove_waiter(waiter);
        }
    }

    fn signals_state(&self) -> HandleSignalsState {
        match self.pipe() {
            Ok(pipe) => pipe.producer_signals_state(),
            Err(_) => HandleSignalsState::empty(),
        }
    }
}

/// The dispatcher for the read end of a data pipe.
pub struct DataPipeConsumerDispatcher {
    inner: Mutex<Option<Arc<DataPipe>>>,
}

impl DataPipeConsumerDispatcher {
    fn pipe(&self) -> Result<Arc<DataPipe>> {
        self.inner.lock().as_ref().cloned().ok_or(Status::InvalidArgument)
    }
}

impl Dispatcher for DataPipeConsumerDispatcher {
    fn close(&self) {
        let pipe = self.inner.lock().take();
        if let Some(pipe) = pipe {
            pipe.close_consumer();
        }
    }

    fn read_data(&self, elements: &mut [u8], all_or_none: bool) -> Result<usize> {
        self.pipe()?.consumer_read_data(elements, all_or_none)
    }

    fn discard_data(&self, num_bytes: usize, all_or_none: bool) -> Result<usize> {
        self.pipe()?.consumer_discard_data(num_bytes, all_or_none)
    }

    fn query_data(&self) -> Result<usize> {
        self.pipe()?.consumer_query_data()
    }

    fn begin_read_data(&self) -> Result<(*const u8, usize)> {
        self.pipe()?.consumer_begin_read_data()
    }

    fn end_read_data(&self, num_bytes_read: usize) -> Result<()> {
        self.pipe()?.consumer_end_read_data(num_bytes_read)
    }

    fn add_waiter(&self, waiter: &Arc<Waiter>, signals: Signals, context: u64) -> Result<()> {
        self.pipe()?.consumer_add_waiter(waiter, signals, context)
    }

    fn remove_waiter(&self, waiter: &Arc<Waiter>) {
        if let Ok(pipe) = self.pipe() {
            pipe.consumer_remove_waiter(waiter);
        }
    }

    fn signals_state(&self) -> HandleSignalsState {
        match self.pipe() {
            Ok(pipe) => pipe.consumer_signals_state(),
            Err(_) => HandleSignalsState::empty(),
        }
    }
}
