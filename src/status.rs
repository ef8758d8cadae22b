// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use thiserror::Error;

/// A status code returned from an IPC operation.
///
/// Every failure in this layer is a typed return value; there is no panic
/// path. Callers distinguish three broad families: argument errors
/// (`InvalidArgument`, `OutOfRange`), retryable backpressure (`ShouldWait`,
/// `Busy`), and terminal conditions (`FailedPrecondition`, `Cancelled`).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A handle was unknown, an option struct was malformed, or a size was
    /// not a multiple of the element size.
    #[error("invalid argument")]
    InvalidArgument,

    /// An all-or-none transfer could not be fully satisfied. The operation
    /// had no effect; the caller may retry with a smaller request.
    #[error("out of range")]
    OutOfRange,

    /// The handle table (or a message limit) is at capacity. Whatever the
    /// caller just tried to create was not inserted and must be closed by
    /// the caller.
    #[error("resource exhausted")]
    ResourceExhausted,

    /// No progress is possible right now, but waiting on the handle may
    /// make it possible later.
    #[error("should wait")]
    ShouldWait,

    /// The operation can never succeed; typically the peer end has closed.
    /// This state is permanent.
    #[error("failed precondition")]
    FailedPrecondition,

    /// Wait-specific: the requested signal is already satisfied, so no
    /// registration took place.
    #[error("already exists")]
    AlreadyExists,

    /// The deadline passed before any watched signal became satisfied.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The operation collided with an outstanding two-phase operation or a
    /// handle that is busy in an in-flight transfer.
    #[error("busy")]
    Busy,

    /// The handle was closed out from under a blocked waiter.
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Status>;
