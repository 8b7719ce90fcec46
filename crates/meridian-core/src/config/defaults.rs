// Single source of truth for all default values.

use crate::policy::PolicyKind;

// --- Conflict detection ---
pub const DEFAULT_CONFLICT_WINDOW_SECS: f64 = 1.0;
pub const DEFAULT_POLICY: PolicyKind = PolicyKind::LastWriteWins;

// --- Causal readiness buffer ---
pub const DEFAULT_MAX_PENDING_OPERATIONS: usize = 1_024;
pub const DEFAULT_MAX_PENDING_WAIT_SECS: u64 = 30;
