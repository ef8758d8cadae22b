// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::status::{Result, Status};

/// Maximum number of live handles in one table.
pub const MAX_HANDLE_TABLE_SIZE: usize = 1_000_000;

/// A handle: the caller-facing name of one dispatcher in a table.
///
/// Zero is reserved as the invalid handle and is never allocated. Values
/// are not reused while the original assignment is live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32);

impl Handle {
    pub const INVALID: Handle = Handle(0);

    pub fn is_valid(&self) -> bool {
        *self != Handle::INVALID
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct HandleTableEntry {
    dispatcher: Arc<dyn Dispatcher>,
    /// Set while the handle is being transferred inside a message write.
    busy: bool,
}

/// Maps handles to dispatchers. Lives behind the core's lock; this lock is
/// the outermost in the hierarchy, so nothing here calls into a
/// dispatcher.
pub struct HandleTable {
    entries: HashMap<Handle, HandleTableEntry>,
    /// Next value to try when allocating. Wraps around and skips zero and
    /// live values.
    next_handle_value: u32,
}

impl HandleTable {
    pub fn new() -> HandleTable {
        HandleTable { entries: HashMap::new(), next_handle_value: 1 }
    }

    fn next_handle(&mut self) -> Handle {
        loop {
            if self.next_handle_value == 0 {
                self.next_handle_value = 1;
            }
            let candidate = Handle(self.next_handle_value);
            self.next_handle_value = self.next_handle_value.wrapping_add(1);
            if !self.entries.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Assigns a new handle to `dispatcher`. Returns `Handle::INVALID` if
    /// the table is full.
    pub fn add_dispatcher(&mut self, dispatcher: Arc<dyn Dispatcher>) -> Handle {
        if self.entries.len() >= MAX_HANDLE_TABLE_SIZE {
            return Handle::INVALID;
        }
        let handle = self.next_handle();
        self.entries.insert(handle, HandleTableEntry { dispatcher, busy: false });
        handle
    }

    /// Assigns handles to both dispatchers of a freshly created pair, or
    /// neither.
    pub fn add_dispatcher_pair(
        &mut self,
        dispatcher0: Arc<dyn Dispatcher>,
        dispatcher1: Arc<dyn Dispatcher>,
    ) -> Option<(Handle, Handle)> {
        if self.entries.len() + 2 > MAX_HANDLE_TABLE_SIZE {
            return None;
        }
        let h0 = self.add_dispatcher(dispatcher0);
        let h1 = self.add_dispatcher(dispatcher1);
        debug_assert!(h0.is_valid() && h1.is_valid());
        Some((h0, h1))
    }

    /// Assigns handles to every dispatcher read out of a message, or to
    /// none of them.
    pub fn add_dispatcher_vector(
        &mut self,
        dispatchers: &[Arc<dyn Dispatcher>],
    ) -> Option<Vec<Handle>> {
        if self.entries.len() + dispatchers.len() > MAX_HANDLE_TABLE_SIZE {
            return None;
        }
        Some(dispatchers.iter().map(|d| self.add_dispatcher(Arc::clone(d))).collect())
    }

    pub fn get_dispatcher(&self, handle: Handle) -> Result<Arc<dyn Dispatcher>> {
        let entry = self.entries.get(&handle).ok_or(Status::InvalidArgument)?;
        if entry.busy {
            return Err(Status::Busy);
        }
        Ok(Arc::clone(&entry.dispatcher))
    }

    /// Removes a handle, returning its dispatcher so the caller can close
    /// it outside the table lock.
    pub fn get_and_remove_dispatcher(&mut self, handle: Handle) -> Result<Arc<dyn Dispatcher>> {
        match self.entries.entry(handle) {
            Entry::Occupied(entry) if entry.get().busy => Err(Status::Busy),
            Entry::Occupied(entry) => Ok(entry.remove().dispatcher),
            Entry::Vacant(_) => Err(Status::InvalidArgument),
        }
    }

    /// Marks `handles` busy for transfer and returns their dispatchers, in
    /// order. `disallowed` is the handle being written over; passing it as
    /// a payload handle fails with `Busy`, as does any handle already in a
    /// transfer. Duplicate handles in `handles` trip the busy flag set by
    /// the first occurrence. On any failure nothing stays marked.
    pub fn start_transport(
        &mut self,
        disallowed: Handle,
        handles: &[Handle],
    ) -> Result<Vec<Arc<dyn Dispatcher>>> {
        let mut dispatchers = Vec::with_capacity(handles.len());
        for (i, &handle) in handles.iter().enumerate() {
            let error = if handle == disallowed {
                Some(Status::Busy)
            } else {
                match self.entries.get_mut(&handle) {
                    None => Some(Status::InvalidArgument),
                    Some(entry) if entry.busy => Some(Status::Busy),
                    Some(entry) => {
                        entry.busy = true;
                        dispatchers.push(Arc::clone(&entry.dispatcher));
                        None
                    }
                }
            };
            if let Some(status) = error {
                for &marked in &handles[..i] {
                    if let Some(entry) = self.entries.get_mut(&marked) {
                        entry.busy = false;
                    }
                }
                return Err(status);
            }
        }
        Ok(dispatchers)
    }

    /// Completes a transfer started with [`start_transport`]. On success
    /// the handles leave the table (their dispatchers now travel in the
    /// message); on failure they become usable again.
    ///
    /// [`start_transport`]: HandleTable::start_transport
    pub fn finish_transport(&mut self, handles: &[Handle], success: bool) {
        for &handle in handles {
            if success {
                let removed = self.entries.remove(&handle);
                debug_assert!(removed.is_some());
            } else if let Some(entry) = self.entries.get_mut(&handle) {
                entry.busy = false;
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        HandleTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_pipe_dispatcher::MessagePipeDispatcher;

    fn dispatcher() -> Arc<dyn Dispatcher> {
        MessagePipeDispatcher::new_pair().0
    }

    #[test]
    fn test_add_and_get() {
        let mut table = HandleTable::new();
        let d = dispatcher();
        let handle = table.add_dispatcher(Arc::clone(&d));
        assert!(handle.is_valid());
        let got = table.get_dispatcher(handle).unwrap();
        assert!(Arc::ptr_eq(&got, &d));
    }

    #[test]
    fn test_unknown_handle_is_invalid_argument() {
        let table = HandleTable::new();
        assert_eq!(table.get_dispatcher(Handle::INVALID).err(), Some(Status::InvalidArgument));
        assert_eq!(table.get_dispatcher(Handle(12345)).err(), Some(Status::InvalidArgument));
    }

    #[test]
    fn test_handles_are_distinct_and_not_reused() {
        let mut table = HandleTable::new();
        let h0 = table.add_dispatcher(dispatcher());
        let h1 = table.add_dispatcher(dispatcher());
        assert_ne!(h0, h1);

        table.get_and_remove_dispatcher(h0).unwrap();
        let h2 = table.add_dispatcher(dispatcher());
        assert_ne!(h2, h0);
        assert_ne!(h2, h1);
    }

    #[test]
    fn test_remove() {
        let mut table = HandleTable::new();
        let handle = table.add_dispatcher(dispatcher());
        table.get_and_remove_dispatcher(handle).unwrap();
        assert_eq!(table.get_dispatcher(handle).err(), Some(Status::InvalidArgument));
        assert_eq!(
            table.get_and_remove_dispatcher(handle).err(),
            Some(Status::InvalidArgument)
        );
    }

    #[test]
    fn test_add_pair() {
        let mut table = HandleTable::new();
        let (d0, d1) = MessagePipeDispatcher::new_pair();
        let (h0, h1) = table.add_dispatcher_pair(d0, d1).unwrap();
        assert!(h0.is_valid() && h1.is_valid());
        assert_ne!(h0, h1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_transport_marks_busy() {
        let mut table = HandleTable::new();
        let over = table.add_dispatcher(dispatcher());
        let payload = table.add_dispatcher(dispatcher());

        let dispatchers = table.start_transport(over, &[payload]).unwrap();
        assert_eq!(dispatchers.len(), 1);

        // Busy handles cannot be used, removed, or transferred again.
        assert_eq!(table.get_dispatcher(payload).err(), Some(Status::Busy));
        assert_eq!(table.get_and_remove_dispatcher(payload).err(), Some(Status::Busy));
        assert_eq!(table.start_transport(over, &[payload]).err(), Some(Status::Busy));

        table.finish_transport(&[payload], true);
        assert_eq!(table.get_dispatcher(payload).err(), Some(Status::InvalidArgument));
    }

    #[test]
    fn test_transport_of_carrier_handle_is_busy() {
        let mut table = HandleTable::new();
        let over = table.add_dispatcher(dispatcher());
        assert_eq!(table.start_transport(over, &[over]).err(), Some(Status::Busy));
        // Nothing stays marked.
        assert!(table.get_dispatcher(over).is_ok());
    }

    #[test]
    fn test_transport_rollback_on_unknown_handle() {
        let mut table = HandleTable::new();
        let over = table.add_dispatcher(dispatcher());
        let good = table.add_dispatcher(dispatcher());

        assert_eq!(
            table.start_transport(over, &[good, Handle(9999)]).err(),
            Some(Status::InvalidArgument)
        );
        assert!(table.get_dispatcher(good).is_ok());
    }

    #[test]
    fn test_transport_duplicate_handle_is_busy() {
        let mut table = HandleTable::new();
        let over = table.add_dispatcher(dispatcher());
        let payload = table.add_dispatcher(dispatcher());

        assert_eq!(table.start_transport(over, &[payload, payload]).err(), Some(Status::Busy));
        assert!(table.get_dispatcher(payload).is_ok());
    }

    #[test]
    fn test_failed_transport_restores_handles() {
        let mut table = HandleTable::new();
        let over = table.add_dispatcher(dispatcher());
        let payload = table.add_dispatcher(dispatcher());

        table.start_transport(over, &[payload]).unwrap();
        table.finish_transport(&[payload], false);
        assert!(table.get_dispatcher(payload).is_ok());
    }

    #[test]
    fn test_add_vector_all_or_nothing() {
        let mut table = HandleTable::new();
        let dispatchers: Vec<Arc<dyn Dispatcher>> = (0..3).map(|_| dispatcher()).collect();
        let handles = table.add_dispatcher_vector(&dispatchers).unwrap();
        assert_eq!(handles.len(), 3);
        for handle in handles {
            assert!(table.get_dispatcher(handle).is_ok());
        }
    }
}
