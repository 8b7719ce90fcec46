//! # meridian-sync
//!
//! The replica and its synchronization boundary.
//!
//! [`NodeState`] owns one copy of the shared document and is what the
//! transport layer talks to: it harvests local operations with
//! [`NodeState::get_pending_operations`] and delivers remote batches with
//! [`NodeState::receive_operations`]. Batches never fail as a whole; every
//! operation gets its own [`ApplyStatus`] in the returned [`BatchReport`].
//!
//! # Examples
//!
//! ```
//! use meridian_core::Value;
//! use meridian_sync::NodeState;
//!
//! let a = NodeState::new("node-a").unwrap();
//! let b = NodeState::new("node-b").unwrap();
//!
//! a.set("users.alice.status", "online").unwrap();
//! let report = b.receive_operations(a.get_pending_operations(true));
//! assert_eq!(report.results.len(), 1);
//! assert_eq!(b.get("users.alice.status", Value::Null), Value::from("online"));
//! ```

mod node;
mod notify;
mod pending;
mod report;
mod snapshot;

pub use node::{NodeState, TimeSource};
pub use notify::{SyncCallback, SyncNotifier};
pub use pending::PendingBuffer;
pub use report::{ApplyStatus, BatchReport, OperationResult, RejectReason};
pub use snapshot::{SnapshotManager, SyncSnapshot};
