//! Error taxonomy for the Meridian engine.
//!
//! Subsystem errors convert into [`MeridianError`] via `#[from]`, so every
//! fallible API returns a single [`MeridianResult`].

mod config_error;
mod store_error;
mod sync_error;

pub use config_error::ConfigError;
pub use store_error::StoreError;
pub use sync_error::SyncError;

/// Top-level error type for all Meridian operations.
#[derive(Debug, thiserror::Error)]
pub enum MeridianError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used across the workspace.
pub type MeridianResult<T> = Result<T, MeridianError>;
