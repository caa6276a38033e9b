//! Single-slot "latest value" mailbox shared between a producer thread and
//! any number of readers.
//!
//! The producer overwrites the slot; readers copy the value out. The lock is
//! held only for the swap or the clone, so readers never observe a partially
//! written value and never wait on the producer's work.

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    sequence: u64,
}

/// Mailbox holding only the most recently published value.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
}

impl<T: Clone> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                sequence: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        // A panicking producer must not take the readers down with it.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the current value. Returns the new sequence number.
    pub fn publish(&self, value: T) -> u64 {
        let mut slot = self.lock();
        slot.sequence += 1;
        slot.value = Some(value);
        slot.sequence
    }

    /// Snapshot of the latest value, if any has been published.
    pub fn latest(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Snapshot of the latest value only if it is newer than `seen`.
    ///
    /// Returns the value together with its sequence number so the caller can
    /// pass it back on the next poll.
    pub fn newer_than(&self, seen: u64) -> Option<(u64, T)> {
        let slot = self.lock();
        if slot.sequence > seen {
            slot.value.clone().map(|v| (slot.sequence, v))
        } else {
            None
        }
    }

    /// Number of values published so far.
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    /// Drop the current value (sequence numbers keep increasing).
    pub fn clear(&self) {
        self.lock().value = None;
    }
}

impl<T: Clone> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mailbox shared across threads.
pub type SharedMailbox<T> = Arc<Mailbox<T>>;

/// Create a new shared mailbox.
pub fn shared_mailbox<T: Clone>() -> SharedMailbox<T> {
    Arc::new(Mailbox::new())
}
