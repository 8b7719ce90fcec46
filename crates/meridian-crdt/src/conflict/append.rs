//! Deterministic placement of concurrent appends.
//!
//! The tail of a sequence made of appends logged since its last reset is kept
//! ordered by `(timestamp, origin, id)`. Every node that has seen the same
//! appends therefore holds the same sequence, whatever the delivery order.

use std::cmp::Ordering;

use meridian_core::Operation;

use crate::log::OperationLog;

/// Index at which `incoming` must be inserted into a sequence of `len` items
/// at its path. `incoming` must not be in the log yet.
pub fn ordered_position(log: &OperationLog, incoming: &Operation, len: usize) -> usize {
    let later = log
        .appends_since_reset(incoming.path())
        .filter(|prior| prior.cmp_write_order(incoming) == Ordering::Greater)
        .count();
    len.saturating_sub(later)
}
