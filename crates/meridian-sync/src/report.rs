//! Per-operation outcomes of a received batch.

use std::fmt;

use meridian_core::errors::{StoreError, SyncError};
use meridian_crdt::ResolutionRecord;

/// Why an operation was not integrated.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Sync(SyncError),
    Store(StoreError),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Sync(err) => err.fmt(f),
            RejectReason::Store(err) => err.fmt(f),
        }
    }
}

impl From<SyncError> for RejectReason {
    fn from(err: SyncError) -> Self {
        RejectReason::Sync(err)
    }
}

impl From<StoreError> for RejectReason {
    fn from(err: StoreError) -> Self {
        RejectReason::Store(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyStatus {
    /// Applied without any conflict.
    Applied,
    /// The id was already in the log; nothing happened.
    AlreadyApplied,
    /// Parked until the listed dependencies arrive.
    Buffered { missing: Vec<String> },
    /// Adjudicated by a policy. `applied` is false when the incoming
    /// operation lost and the store kept the prior effect.
    Resolved {
        record: ResolutionRecord,
        applied: bool,
    },
    Rejected { reason: RejectReason },
}

impl ApplyStatus {
    /// The operation is in the log after this call.
    pub fn is_logged(&self) -> bool {
        matches!(
            self,
            ApplyStatus::Applied | ApplyStatus::AlreadyApplied | ApplyStatus::Resolved { .. }
        )
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ApplyStatus::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub op_id: String,
    pub status: ApplyStatus,
}

impl OperationResult {
    pub fn new(op_id: impl Into<String>, status: ApplyStatus) -> Self {
        Self {
            op_id: op_id.into(),
            status,
        }
    }
}

/// Outcome of one `receive_operations` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// One entry per batch element, in batch order.
    pub results: Vec<OperationResult>,
    /// Previously buffered operations integrated during this call.
    pub released: Vec<OperationResult>,
    /// Buffered operations dropped for waiting too long.
    pub discarded: Vec<OperationResult>,
}

impl BatchReport {
    /// Latest status recorded for `op_id` in this report.
    pub fn status_of(&self, op_id: &str) -> Option<&ApplyStatus> {
        self.released
            .iter()
            .chain(&self.results)
            .chain(&self.discarded)
            .find(|r| r.op_id == op_id)
            .map(|r| &r.status)
    }

    pub fn rejected(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| r.status.is_rejected())
    }

    /// Operations from the batch or the buffer that reached the log.
    pub fn logged_count(&self) -> usize {
        self.results
            .iter()
            .chain(&self.released)
            .filter(|r| matches!(r.status, ApplyStatus::Applied | ApplyStatus::Resolved { .. }))
            .count()
    }
}
