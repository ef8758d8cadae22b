// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cmp;

use crate::data_pipe::DataPipeImpl;
use crate::status::{Result, Status};

/// Circular-buffer storage for a data pipe.
///
/// The buffer is allocated on first use and is exactly `capacity_num_bytes`
/// long. `start_index` is the read cursor (always `< capacity`);
/// `current_num_bytes` is how much is buffered (never above capacity).
/// Capacity is capped well below `usize::MAX / 2` at creation, so
/// `start_index + current_num_bytes` cannot overflow.
///
/// Simple reads and writes copy in up to two pieces across the physical end
/// of the buffer; two-phase operations expose only the contiguous run up to
/// that end, and the caller comes back for the rest.
pub struct LocalDataPipe {
    element_num_bytes: usize,
    capacity_num_bytes: usize,
    may_discard: bool,
    buffer: Option<Box<[u8]>>,
    start_index: usize,
    current_num_bytes: usize,
}

impl LocalDataPipe {
    pub fn new(element_num_bytes: usize, capacity_num_bytes: usize, may_discard: bool) -> Self {
        debug_assert!(element_num_bytes > 0);
        debug_assert_eq!(capacity_num_bytes % element_num_bytes, 0);
        LocalDataPipe {
            element_num_bytes,
            capacity_num_bytes,
            may_discard,
            buffer: None,
            start_index: 0,
            current_num_bytes: 0,
        }
    }

    fn write_index(&self) -> usize {
        (self.start_index + self.current_num_bytes) % self.capacity_num_bytes
    }

    /// The longest run writable without crossing the physical end of the
    /// buffer.
    fn max_contiguous_write(&self) -> usize {
        let free = self.capacity_num_bytes - self.current_num_bytes;
        cmp::min(free, self.capacity_num_bytes - self.write_index())
    }

    /// The longest run readable without crossing the physical end of the
    /// buffer.
    fn max_contiguous_read(&self) -> usize {
        cmp::min(self.current_num_bytes, self.capacity_num_bytes - self.start_index)
    }

    fn mark_data_as_consumed(&mut self, num_bytes: usize) {
        debug_assert!(num_bytes <= self.current_num_bytes);
        self.start_index = (self.start_index + num_bytes) % self.capacity_num_bytes;
        self.current_num_bytes -= num_bytes;
    }

    fn ensure_buffer(&mut self) -> &mut [u8] {
        let capacity = self.capacity_num_bytes;
        self.buffer.get_or_insert_with(|| vec![0u8; capacity].into_boxed_slice())
    }
}

impl DataPipeImpl for LocalDataPipe {
    fn write(&mut self, elements: &[u8], all_or_none: bool) -> Result<usize> {
        debug_assert_eq!(elements.len() % self.element_num_bytes, 0);
        debug_assert!(!elements.is_empty());

        let free = self.capacity_num_bytes - self.current_num_bytes;
        let num_bytes_to_write;
        if self.may_discard {
            // There is no way to ever fit more than a full buffer.
            if all_or_none && elements.len() > self.capacity_num_bytes {
                return Err(Status::OutOfRange);
            }
            num_bytes_to_write = cmp::min(elements.len(), self.capacity_num_bytes);
            if num_bytes_to_write > free {
                let evicted = num_bytes_to_write - free;
                log::trace!("data pipe overflow; discarding {} oldest bytes", evicted);
                self.mark_data_as_consumed(evicted);
            }
        } else {
            // Not "should wait": there is no way to wait for exactly N free
            // bytes, so a doomed all-or-none write fails immediately.
            if all_or_none && elements.len() > free {
                return Err(Status::OutOfRange);
            }
            num_bytes_to_write = cmp::min(elements.len(), free);
        }
        if num_bytes_to_write == 0 {
            return Err(Status::ShouldWait);
        }

        let write_index = self.write_index();
        let capacity = self.capacity_num_bytes;
        let buffer = self.ensure_buffer();
        let first = cmp::min(num_bytes_to_write, capacity - write_index);
        buffer[write_index..write_index + first].copy_from_slice(&elements[..first]);
        if first < num_bytes_to_write {
            buffer[..num_bytes_to_write - first].copy_from_slice(&elements[first..num_bytes_to_write]);
        }
        self.current_num_bytes += num_bytes_to_write;
        Ok(num_bytes_to_write)
    }

    fn begin_write(&mut self) -> Result<(*mut u8, usize)> {
        let max_num_bytes = self.max_contiguous_write();
        if max_num_bytes == 0 {
            return Err(Status::ShouldWait);
        }
        let write_index = self.write_index();
        let buffer = self.ensure_buffer();
        Ok((buffer[write_index..].as_mut_ptr(), max_num_bytes))
    }

    fn end_write(&mut self, num_bytes_written: usize) {
        debug_assert!(num_bytes_written <= self.max_contiguous_write());
        debug_assert_eq!(num_bytes_written % self.element_num_bytes, 0);
        self.current_num_bytes += num_bytes_written;
    }

    fn read(&mut self, elements: &mut [u8], all_or_none: bool, producer_open: bool) -> Result<usize> {
        debug_assert_eq!(elements.len() % self.element_num_bytes, 0);
        debug_assert!(!elements.is_empty());

        if all_or_none && elements.len() > self.current_num_bytes {
            return Err(if producer_open { Status::OutOfRange } else { Status::FailedPrecondition });
        }
        let num_bytes_to_read = cmp::min(elements.len(), self.current_num_bytes);
        if num_bytes_to_read == 0 {
            return Err(if producer_open { Status::ShouldWait } else { Status::FailedPrecondition });
        }

        let start = self.start_index;
        let capacity = self.capacity_num_bytes;
        let buffer = self.ensure_buffer();
        let first = cmp::min(num_bytes_to_read, capacity - start);
        elements[..first].copy_from_slice(&buffer[start..start + first]);
        if first < num_bytes_to_read {
            elements[first..num_bytes_to_read].copy_from_slice(&buffer[..num_bytes_to_read - first]);
        }
        self.mark_data_as_consumed(num_bytes_to_read);
        Ok(num_bytes_to_read)
    }

    fn discard(&mut self, num_bytes: usize, all_or_none: bool, producer_open: bool) -> Result<usize> {
        debug_assert_eq!(num_bytes % self.element_num_bytes, 0);
        debug_assert!(num_bytes > 0);

        if all_or_none && num_bytes > self.current_num_bytes {
            return Err(if producer_open { Status::OutOfRange } else { Status::FailedPrecondition });
        }
        let num_bytes_to_discard = cmp::min(num_bytes, self.current_num_bytes);
        if num_bytes_to_discard == 0 {
            return Err(if producer_open { Status::ShouldWait } else { Status::FailedPrecondition });
        }
        self.mark_data_as_consumed(num_bytes_to_discard);
        Ok(num_bytes_to_discard)
    }

    fn query(&self) -> usize {
        self.current_num_bytes
    }

    fn begin_read(&mut self, producer_open: bool) -> Result<(*const u8, usize)> {
        let max_num_bytes = self.max_contiguous_read();
        if max_num_bytes == 0 {
            return Err(if producer_open { Status::ShouldWait } else { Status::FailedPrecondition });
        }
        let start = self.start_index;
        let buffer = self.ensure_buffer();
        Ok((buffer[start..].as_ptr(), max_num_bytes))
    }

    fn end_read(&mut self, num_bytes_read: usize) {
        debug_assert!(num_bytes_read <= self.max_contiguous_read());
        debug_assert_eq!(num_bytes_read % self.element_num_bytes, 0);
        self.mark_data_as_consumed(num_bytes_read);
    }

    fn drop_all_data(&mut self) {
        self.start_index = 0;
        self.current_num_bytes = 0;
    }

    fn release_buffer(&mut self) {
        debug_assert_eq!(self.current_num_bytes, 0);
        self.buffer = None;
    }

    fn is_full(&self) -> bool {
        self.current_num_bytes == self.capacity_num_bytes
    }
}
