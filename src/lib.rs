// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Core IPC primitives: a handle table, message pipes, and fixed-capacity
//! data pipes, with blocking and non-blocking I/O and multi-handle waits.
//!
//! Everything goes through a [`Core`]. A handle names a dispatcher in the
//! core's table; dispatchers forward to the secondary object (a
//! [`MessagePipe`] or [`DataPipe`]) shared by the two ends of a pipe.
//! Closing a handle closes its end; the peer observes that through its
//! signal state.
//!
//! [`MessagePipe`]: message_pipe::MessagePipe
//! [`DataPipe`]: data_pipe::DataPipe

pub mod core;
pub mod data_pipe;
pub mod data_pipe_dispatchers;
pub mod dispatcher;
pub mod handle_table;
pub mod local_data_pipe;
pub mod message_pipe;
pub mod message_pipe_dispatcher;
pub mod signals;
pub mod status;
pub mod waiter;
pub mod waiter_list;

pub use crate::core::{Core, MAX_WAIT_MANY_NUM_HANDLES};
pub use crate::data_pipe::{
    DataPipeOptions, DEFAULT_DATA_PIPE_CAPACITY_BYTES, MAX_DATA_PIPE_CAPACITY_BYTES,
};
pub use crate::dispatcher::{Dispatcher, Message};
pub use crate::handle_table::{Handle, MAX_HANDLE_TABLE_SIZE};
pub use crate::message_pipe::{MAX_MESSAGE_NUM_BYTES, MAX_MESSAGE_NUM_HANDLES};
pub use crate::signals::{HandleSignalsState, Signals};
pub use crate::status::{Result, Status};
pub use crate::waiter::{Deadline, Waiter};
