use std::panic::{self, AssertUnwindSafe};

use meridian_core::errors::SyncError;
use meridian_core::{Operation, PolicyKind};
use tracing::{debug, warn};

use super::detector::ConflictDetector;
use super::handler::ConflictHandler;
use super::policy::{ConflictPolicy, PolicyRegistry};
use super::record::{ResolutionRecord, ResolutionStrategy};
use super::settle::{settle, Settlement};
use crate::log::OperationLog;

/// What the node should do with the incoming operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Store the re-derived value of the path and revise which logged
    /// operations are in effect.
    Settle(Settlement),
    /// Apply the incoming operation's own effect.
    ApplyIncoming,
    /// A prior operation wins. Its effect may need to be reinstated.
    KeepExisting { winner: String },
    /// Apply this operation's effect instead of the incoming one.
    Replace(Operation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    pub resolution: Resolution,
    pub record: ResolutionRecord,
    /// Present when a custom handler misbehaved and the fallback was used.
    pub failure: Option<SyncError>,
}

/// Applies the policy bound to an operation's path.
pub struct ConflictResolver<'a> {
    policies: &'a PolicyRegistry,
    detector: &'a ConflictDetector,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(policies: &'a PolicyRegistry, detector: &'a ConflictDetector) -> Self {
        Self { policies, detector }
    }

    /// Decide between `incoming`, not logged yet, and the prior operations
    /// it conflicts with.
    ///
    /// `check` dry-runs an operation against the store; custom results that
    /// fail it are rejected.
    pub fn resolve<F>(
        &self,
        log: &OperationLog,
        incoming: &Operation,
        conflicts: &[Operation],
        check: F,
    ) -> ResolutionOutcome
    where
        F: Fn(&Operation) -> Result<(), String>,
    {
        let outcome = match self.policies.policy_for(incoming.path()) {
            ConflictPolicy::Builtin(kind) => self.settled(kind, log, incoming, conflicts),
            ConflictPolicy::Custom(handler) => {
                self.custom(handler.as_ref(), log, incoming, conflicts, check)
            }
        };
        debug!(
            path = %incoming.path(),
            incoming = incoming.id(),
            winner = %outcome.record.winner,
            strategy = %outcome.record.strategy,
            participants = outcome.record.participants.len(),
            "conflict resolved"
        );
        outcome
    }

    /// A built-in policy, applied by replaying the path in write order.
    fn settled(
        &self,
        kind: PolicyKind,
        log: &OperationLog,
        incoming: &Operation,
        conflicts: &[Operation],
    ) -> ResolutionOutcome {
        let Some(settlement) = settle(kind, incoming, log, self.detector) else {
            // Only appends and increments race here; the store decides.
            return ResolutionOutcome {
                record: ResolutionRecord::new(incoming, conflicts, incoming.id(), kind.into()),
                resolution: Resolution::ApplyIncoming,
                failure: None,
            };
        };
        let participants = conflicts.iter().chain(&settlement.replayed);
        let record = if kind == PolicyKind::Merge && settlement.replaced_under_merge {
            ResolutionRecord::new(
                incoming,
                participants,
                settlement.winner.clone(),
                ResolutionStrategy::LastWriteWins,
            )
            .with_fallback("merge needs a mapping set over an existing mapping")
        } else {
            ResolutionRecord::new(incoming, participants, settlement.winner.clone(), kind.into())
        };
        ResolutionOutcome {
            record,
            resolution: Resolution::Settle(settlement),
            failure: None,
        }
    }

    fn custom<F>(
        &self,
        handler: &dyn ConflictHandler,
        log: &OperationLog,
        incoming: &Operation,
        conflicts: &[Operation],
        check: F,
    ) -> ResolutionOutcome
    where
        F: Fn(&Operation) -> Result<(), String>,
    {
        let decided =
            panic::catch_unwind(AssertUnwindSafe(|| handler.resolve(incoming, conflicts)))
                .unwrap_or_else(|payload| {
                    Err(format!(
                        "handler panicked: {}",
                        panic_message(payload.as_ref())
                    ))
                })
                .and_then(|chosen| validate_choice(incoming, &chosen, &check).map(|()| chosen));

        match decided {
            Ok(chosen) => {
                let resolution = if chosen == *incoming {
                    Resolution::ApplyIncoming
                } else if let Some(prior) = conflicts.iter().find(|op| op.id() == chosen.id()) {
                    Resolution::KeepExisting {
                        winner: prior.id().to_string(),
                    }
                } else {
                    Resolution::Replace(chosen.clone())
                };
                ResolutionOutcome {
                    record: ResolutionRecord::new(
                        incoming,
                        conflicts,
                        chosen.id(),
                        ResolutionStrategy::Custom,
                    ),
                    resolution,
                    failure: None,
                }
            }
            Err(reason) => {
                let failure = SyncError::ConflictResolutionFailure {
                    path: incoming.path().to_string(),
                    reason,
                };
                warn!(
                    path = %incoming.path(),
                    incoming = incoming.id(),
                    error = %failure,
                    "custom conflict handler failed, falling back to last_write_wins"
                );
                let mut outcome =
                    self.settled(PolicyKind::LastWriteWins, log, incoming, conflicts);
                outcome.record = outcome.record.with_fallback(failure.to_string());
                outcome.failure = Some(failure);
                outcome
            }
        }
    }
}

fn validate_choice<F>(incoming: &Operation, chosen: &Operation, check: &F) -> Result<(), String>
where
    F: Fn(&Operation) -> Result<(), String>,
{
    if chosen.path() != incoming.path() {
        return Err(format!(
            "handler returned an operation on {} for a conflict on {}",
            chosen.path(),
            incoming.path()
        ));
    }
    chosen.validate()?;
    check(chosen)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
