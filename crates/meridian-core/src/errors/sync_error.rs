/// Replication and snapshot errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("snapshot checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid snapshot: {reason}")]
    InvalidSnapshot { reason: String },

    /// A causal prerequisite never arrived within the pending-buffer bounds.
    #[error("operation {op_id} discarded: dependencies not satisfied: {missing:?}")]
    DependencyNotSatisfied { op_id: String, missing: Vec<String> },

    /// A custom handler misbehaved; the engine fell back to last-write-wins.
    #[error("conflict resolution failed at {path}: {reason}")]
    ConflictResolutionFailure { path: String, reason: String },

    #[error("invalid operation {op_id}: {reason}")]
    InvalidOperation { op_id: String, reason: String },
}
