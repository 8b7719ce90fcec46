use std::fmt;

use meridian_core::time::now_secs;
use meridian_core::{KeyPath, Operation, PolicyKind};
use serde::{Deserialize, Serialize};

/// How a resolution was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    LastWriteWins,
    FirstWriteWins,
    Merge,
    Custom,
    OrderedAppend,
}

impl From<PolicyKind> for ResolutionStrategy {
    fn from(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::LastWriteWins => ResolutionStrategy::LastWriteWins,
            PolicyKind::FirstWriteWins => ResolutionStrategy::FirstWriteWins,
            PolicyKind::Merge => ResolutionStrategy::Merge,
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionStrategy::LastWriteWins => "last_write_wins",
            ResolutionStrategy::FirstWriteWins => "first_write_wins",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Custom => "custom",
            ResolutionStrategy::OrderedAppend => "ordered_append",
        };
        f.write_str(name)
    }
}

/// Audit entry for one adjudication. Written to the operation log next to
/// the incoming operation it decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub path: KeyPath,
    /// The operation that triggered the resolution.
    pub incoming: String,
    /// Every adjudicated operation id, incoming included. Sorted, no duplicates.
    pub participants: Vec<String>,
    /// Id of the operation whose effect the store reflects afterwards.
    pub winner: String,
    pub strategy: ResolutionStrategy,
    /// Set when the configured policy could not be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    pub resolved_at: f64,
}

impl ResolutionRecord {
    pub fn new<'a, I>(
        incoming: &Operation,
        conflicts: I,
        winner: impl Into<String>,
        strategy: ResolutionStrategy,
    ) -> Self
    where
        I: IntoIterator<Item = &'a Operation>,
    {
        let mut participants: Vec<String> = conflicts
            .into_iter()
            .map(|op| op.id().to_string())
            .chain(std::iter::once(incoming.id().to_string()))
            .collect();
        participants.sort();
        participants.dedup();
        Self {
            path: incoming.path().clone(),
            incoming: incoming.id().to_string(),
            participants,
            winner: winner.into(),
            strategy,
            fallback: None,
            resolved_at: now_secs(),
        }
    }

    pub fn with_fallback(mut self, reason: impl Into<String>) -> Self {
        self.fallback = Some(reason.into());
        self
    }

    pub fn involves(&self, op_id: &str) -> bool {
        self.participants.iter().any(|p| p == op_id)
    }

    /// True when the incoming operation's own effect won.
    pub fn incoming_won(&self) -> bool {
        self.winner == self.incoming
    }
}
