//! Approximate concurrency detection.
//!
//! Two writes to the same path are treated as concurrent when they come from
//! different origins and their timestamps are within the conflict window.
//! This is a wall-clock heuristic, not a causality proof: skewed clocks can
//! hide real concurrency or invent it. It is independent from the
//! causal-readiness check, which only looks at explicit dependencies.
//!
//! Entries an ancestor write has superseded are not considered.

use meridian_core::{Operation, OperationKind};

use crate::log::OperationLog;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConflictDetector {
    window_secs: f64,
}

impl ConflictDetector {
    pub const fn new(window_secs: f64) -> Self {
        Self { window_secs }
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Prior operations on the incoming operation's path that need to be
    /// adjudicated by a policy. Appends against appends and increments
    /// against increments commute and are never returned.
    pub fn find_conflicts(&self, log: &OperationLog, incoming: &Operation) -> Vec<Operation> {
        self.concurrent_on_path(log, incoming)
            .filter(|prior| !commutes(prior.kind(), incoming.kind()))
            .collect()
    }

    /// Prior appends on the path that are concurrent with an incoming append.
    pub fn concurrent_appends(&self, log: &OperationLog, incoming: &Operation) -> Vec<Operation> {
        if incoming.kind() != OperationKind::Append {
            return Vec::new();
        }
        self.concurrent_on_path(log, incoming)
            .filter(|prior| prior.kind() == OperationKind::Append)
            .collect()
    }

    /// The heuristic test plus the explicit happens-before exclusion.
    pub fn is_concurrent(
        &self,
        log: &OperationLog,
        incoming: &Operation,
        prior: &Operation,
    ) -> bool {
        prior.id() != incoming.id()
            && prior.origin() != incoming.origin()
            && (prior.timestamp() - incoming.timestamp()).abs() <= self.window_secs
            && !known_before(log, incoming, prior)
    }

    /// Symmetric form of [`Self::is_concurrent`] for two operations that may
    /// both be logged already: neither may know about the other.
    pub fn are_concurrent(&self, log: &OperationLog, a: &Operation, b: &Operation) -> bool {
        self.is_concurrent(log, a, b) && !known_before(log, b, a)
    }

    fn concurrent_on_path<'a>(
        &'a self,
        log: &'a OperationLog,
        incoming: &'a Operation,
    ) -> impl Iterator<Item = Operation> + 'a {
        log.live_operations_on(incoming.path())
            .map(|entry| &entry.operation)
            .filter(move |prior| self.is_concurrent(log, incoming, prior))
            .cloned()
    }
}

pub(crate) fn commutes(a: OperationKind, b: OperationKind) -> bool {
    matches!(
        (a, b),
        (OperationKind::Increment, OperationKind::Increment)
            | (OperationKind::Append, OperationKind::Append)
    )
}

/// True if `incoming` names `prior` as a dependency, directly or through a
/// dependency on a later operation from the same origin.
fn known_before(log: &OperationLog, incoming: &Operation, prior: &Operation) -> bool {
    incoming.dependencies().iter().any(|dep_id| {
        dep_id == prior.id()
            || log.get(dep_id).is_some_and(|dep| {
                dep.operation.origin() == prior.origin()
                    && dep.operation.version() >= prior.version()
            })
    })
}
