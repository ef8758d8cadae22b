// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use crate::signals::{HandleSignalsState, Signals};
use crate::status::{Result, Status};
use crate::waiter::Waiter;

/// One message queued on a message pipe: a byte payload plus the
/// dispatchers of any handles transferred inside it.
pub struct Message {
    pub bytes: Vec<u8>,
    pub dispatchers: Vec<Arc<dyn Dispatcher>>,
}

/// The object a handle indexes to: one end of a message pipe or data pipe.
///
/// The handle table stores `Arc<dyn Dispatcher>` and stays type-agnostic;
/// operations a concrete dispatcher does not support fall through to the
/// default `InvalidArgument` implementations, the same way an fd table
/// dispatches through a file-ops trait.
///
/// A dispatcher holds its own lock. It may call into its shared secondary
/// object while holding that lock, but never into another dispatcher.
pub trait Dispatcher: Send + Sync {
    /// Signals the underlying object that this end is gone and cancels any
    /// registered waiters. Called exactly once, after the handle has left
    /// the table.
    fn close(&self);

    fn write_message(&self, _bytes: &[u8], _dispatchers: Vec<Arc<dyn Dispatcher>>) -> Result<()> {
        Err(Status::InvalidArgument)
    }

    fn read_message(&self) -> Result<Message> {
        Err(Status::InvalidArgument)
    }

    fn write_data(&self, _elements: &[u8], _all_or_none: bool) -> Result<usize> {
        Err(Status::InvalidArgument)
    }

    fn begin_write_data(&self) -> Result<(*mut u8, usize)> {
        Err(Status::InvalidArgument)
    }

    fn end_write_data(&self, _num_bytes_written: usize) -> Result<()> {
        Err(Status::InvalidArgument)
    }

    fn read_data(&self, _elements: &mut [u8], _all_or_none: bool) -> Result<usize> {
        Err(Status::InvalidArgument)
    }

    fn discard_data(&self, _num_bytes: usize, _all_or_none: bool) -> Result<usize> {
        Err(Status::InvalidArgument)
    }

    fn query_data(&self) -> Result<usize> {
        Err(Status::InvalidArgument)
    }

    fn begin_read_data(&self) -> Result<(*const u8, usize)> {
        Err(Status::InvalidArgument)
    }

    fn end_read_data(&self, _num_bytes_read: usize) -> Result<()> {
        Err(Status::InvalidArgument)
    }

    /// Registers a waiter to be woken when any of `signals` becomes
    /// satisfied. Fails with `AlreadyExists` if one already is (nothing is
    /// registered), or `FailedPrecondition` if none can ever be.
    fn add_waiter(&self, waiter: &Arc<Waiter>, signals: Signals, context: u64) -> Result<()>;

    /// Removes a previously registered waiter. A no-op if the waiter is
    /// not registered (e.g. the dispatcher was closed in the meantime).
    fn remove_waiter(&self, waiter: &Arc<Waiter>);

    fn signals_state(&self) -> HandleSignalsState;
}
