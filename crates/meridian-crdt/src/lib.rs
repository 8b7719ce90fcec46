//! # meridian-crdt
//!
//! Causal and conflict primitives for the Meridian replicated state engine.
//!
//! - [`VectorClock`]: per-origin version counters (merge = component-wise max)
//! - [`OperationLog`]: append-only, id-deduplicated record of adjudicated
//!   operations and resolution records
//! - [`ConflictDetector`]: approximate (wall-clock window) concurrency test
//! - [`ConflictResolver`]: applies the policy bound to a path: last-write-wins,
//!   first-write-wins, merge, or a custom [`ConflictHandler`]
//! - [`conflict::settle`]: re-derivation of a contested path from its logged
//!   operations in write order, behind every built-in policy
//! - [`conflict::append::ordered_position`]: deterministic placement of
//!   concurrent appends

pub mod clock;
pub mod conflict;
pub mod log;

pub use clock::VectorClock;
pub use conflict::{
    ConflictDetector, ConflictHandler, ConflictPolicy, ConflictResolver, PolicyRegistry,
    Resolution, ResolutionOutcome, ResolutionRecord, ResolutionStrategy, Settlement,
};
pub use log::{LogEntry, OperationEntry, OperationLog};
