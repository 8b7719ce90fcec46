/// Structural errors raised by the hierarchical value store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// The value at (or above) `path` has the wrong shape for the requested write.
    #[error("path type error at {path}: expected {expected}, found {found}")]
    PathTypeError {
        path: String,
        expected: String,
        found: String,
    },

    #[error("cannot append at {path}: existing value is {found}, not a sequence")]
    AppendOnNonSequence { path: String, found: String },

    #[error("cannot increment at {path}: existing value is {found}, not a number")]
    IncrementOnNonNumeric { path: String, found: String },
}
