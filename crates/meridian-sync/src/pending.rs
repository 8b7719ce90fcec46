//! Bounded buffer for operations whose dependencies have not arrived yet.
//!
//! An operation naming dependencies that are missing from the log is parked
//! here instead of being dropped. After every successful apply the node asks
//! for the entries that became ready; releasing one can unblock another, so
//! the node drains repeatedly until nothing changes. Entries that exceed the
//! configured wait are evicted at the start of the next batch.

use std::time::{Duration, Instant};

use meridian_core::Operation;
use tracing::debug;

#[derive(Debug)]
struct PendingEntry {
    operation: Operation,
    buffered_at: Instant,
}

#[derive(Debug)]
pub struct PendingBuffer {
    entries: Vec<PendingEntry>,
    max_operations: usize,
    max_wait: Duration,
}

impl PendingBuffer {
    pub fn new(max_operations: usize, max_wait: Duration) -> Self {
        Self {
            entries: Vec::new(),
            max_operations,
            max_wait,
        }
    }

    /// Park `operation`. Hands it back if the buffer is full.
    pub fn push(&mut self, operation: Operation) -> Result<(), Operation> {
        if self.entries.len() >= self.max_operations {
            return Err(operation);
        }
        debug!(
            op_id = operation.id(),
            buffered = self.entries.len() + 1,
            "buffering operation until its dependencies arrive"
        );
        self.entries.push(PendingEntry {
            operation,
            buffered_at: Instant::now(),
        });
        Ok(())
    }

    pub fn contains(&self, op_id: &str) -> bool {
        self.entries.iter().any(|e| e.operation.id() == op_id)
    }

    /// Remove and return every entry whose dependencies are all present.
    pub fn take_ready<F>(&mut self, is_present: F) -> Vec<Operation>
    where
        F: Fn(&str) -> bool,
    {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.operation.dependencies().iter().all(|d| is_present(d)));
        self.entries = waiting;
        if !ready.is_empty() {
            debug!(
                count = ready.len(),
                remaining = self.entries.len(),
                "released buffered operations"
            );
        }
        ready.into_iter().map(|entry| entry.operation).collect()
    }

    /// Remove and return entries buffered for at least `max_wait` as of `now`.
    pub fn evict_expired(&mut self, now: Instant) -> Vec<Operation> {
        let max_wait = self.max_wait;
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| now.saturating_duration_since(entry.buffered_at) >= max_wait);
        self.entries = kept;
        expired.into_iter().map(|entry| entry.operation).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_operations
    }
}
