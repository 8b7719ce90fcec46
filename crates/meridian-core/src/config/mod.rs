//! Engine configuration.

pub mod defaults;
mod sync_config;

pub use sync_config::SyncConfig;
