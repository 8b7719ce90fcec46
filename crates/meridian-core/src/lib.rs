//! # meridian-core
//!
//! Foundation crate for the Meridian replicated state engine.
//! Defines the tagged value model, key paths, operations, errors, config,
//! and constants. Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod operation;
pub mod path;
pub mod policy;
pub mod time;
pub mod tracing_setup;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use config::SyncConfig;
pub use errors::{MeridianError, MeridianResult};
pub use operation::{Operation, OperationKind};
pub use path::KeyPath;
pub use policy::PolicyKind;
pub use value::Value;
