//! Conflict detection and resolution.

pub mod append;
mod detector;
mod handler;
mod policy;
mod record;
mod resolver;
pub mod settle;

pub use detector::ConflictDetector;
pub use handler::ConflictHandler;
pub use policy::{ConflictPolicy, PolicyRegistry};
pub use record::{ResolutionRecord, ResolutionStrategy};
pub use resolver::{ConflictResolver, Resolution, ResolutionOutcome};
pub use settle::Settlement;
