//! Sync-completion notifications, delivered outside the node's lock.
//!
//! The node queues one event per batch while it holds its write lock and
//! drains the queue after releasing it. Callbacks may therefore call back
//! into the node, including mutating calls, without deadlocking.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use meridian_core::Value;
use parking_lot::Mutex;
use tracing::{debug, warn};

pub type SyncCallback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
pub struct SyncNotifier {
    subscribers: Mutex<Vec<SyncCallback>>,
    queue: Mutex<VecDeque<Value>>,
}

impl SyncNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: SyncCallback) {
        self.subscribers.lock().push(callback);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn enqueue(&self, state: Value) {
        self.queue.lock().push_back(state);
    }

    /// Deliver queued events in order. No lock is held while a callback runs.
    /// A panicking callback is logged and does not stop delivery to the rest.
    pub fn drain(&self) {
        loop {
            let Some(state) = self.queue.lock().pop_front() else {
                break;
            };
            let subscribers = self.subscribers.lock().clone();
            debug!(subscribers = subscribers.len(), "delivering sync notification");
            for (index, callback) in subscribers.iter().enumerate() {
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| callback(&state)));
                if delivered.is_err() {
                    warn!(subscriber = index, "sync subscriber panicked");
                }
            }
        }
    }
}
