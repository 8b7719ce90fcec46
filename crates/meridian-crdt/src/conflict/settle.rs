//! Re-deriving a contested path from its logged history.
//!
//! Under a built-in policy a conflict is not decided pairwise against
//! whatever the store happens to hold. The incoming operation's conflict
//! component (every live operation on the path reachable through
//! concurrent pairs) fixes a starting point, its earliest overwrite. Every
//! live operation on the path from that point on is replayed in
//! `(timestamp, origin, id)` order:
//!
//! - `last_write_wins`: each set or delete replaces the value; appends and
//!   increments fold onto it. The latest overwrite therefore wins, together
//!   with the appends and increments written after it.
//! - `first_write_wins`: as above, except an operation is dropped when it
//!   races (is concurrent with, and does not commute with) one already kept.
//! - `merge`: as `last_write_wins`, except a mapping set over a mapping is
//!   shallow-merged. Colliding keys go to the later write.
//!
//! The replay starts at an overwrite, so the value before it never matters
//! and nodes holding the same operations derive the same value whatever
//! order they received them in.

use std::cmp::Ordering;

use meridian_core::{Operation, OperationKind, PolicyKind, Value};

use super::detector::{commutes, ConflictDetector};
use crate::log::OperationLog;

/// The re-derived state of one path.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Value the path holds afterwards; `None` leaves it absent.
    pub value: Option<Value>,
    /// Logged ids (the incoming one included) whose effect `value` reflects,
    /// in write order.
    pub applied: Vec<String>,
    /// Every replayed operation, in write order.
    pub replayed: Vec<Operation>,
    /// Id of the last operation whose effect is in `value`.
    pub winner: String,
    /// Under `merge`, some step replaced a value instead of merging into it.
    pub replaced_under_merge: bool,
}

impl Settlement {
    pub fn is_applied(&self, op_id: &str) -> bool {
        self.applied.iter().any(|id| id == op_id)
    }
}

/// One operation taking part in the replay: the logged operation, which
/// fixes its order, and the operation whose effect it stands for.
struct Contender<'a> {
    operation: &'a Operation,
    effect: &'a Operation,
}

/// Re-derive the path of `incoming` under `policy`, treating `incoming` as
/// if it were logged. Returns `None` when its conflict component contains no
/// overwrite to start from.
pub fn settle(
    policy: PolicyKind,
    incoming: &Operation,
    log: &OperationLog,
    detector: &ConflictDetector,
) -> Option<Settlement> {
    let mut contenders: Vec<Contender<'_>> = log
        .live_operations_on(incoming.path())
        .filter(|entry| entry.operation.id() != incoming.id())
        .map(|entry| Contender {
            operation: &entry.operation,
            effect: entry.effective_operation(),
        })
        .collect();
    contenders.push(Contender {
        operation: incoming,
        effect: incoming,
    });

    let component = component_of(&contenders, contenders.len() - 1, log, detector);
    let start = component
        .iter()
        .map(|&index| &contenders[index])
        .filter(|contender| contender.effect.kind().overwrites())
        .min_by(|a, b| a.operation.cmp_write_order(b.operation))?
        .operation;

    let mut replay: Vec<&Contender<'_>> = contenders
        .iter()
        .filter(|contender| contender.operation.cmp_write_order(start) != Ordering::Less)
        .collect();
    replay.sort_by(|a, b| a.operation.cmp_write_order(b.operation));

    let merge = policy == PolicyKind::Merge;
    let mut value: Option<Value> = None;
    let mut replaced_under_merge = false;
    let mut kept: Vec<&Contender<'_>> = Vec::new();

    for &contender in &replay {
        if policy == PolicyKind::FirstWriteWins && races_any(contender, &kept, log, detector) {
            continue;
        }
        let effect = contender.effect;
        match effect.kind() {
            OperationKind::Set => match (&mut value, effect.value()) {
                (Some(Value::Mapping(current)), Value::Mapping(partial)) if merge => {
                    current.extend(partial.clone());
                }
                (current, replacement) => {
                    replaced_under_merge |= merge && current.is_some();
                    *current = Some(replacement.clone());
                    kept.clear();
                }
            },
            OperationKind::Delete => {
                replaced_under_merge |= merge && value.is_some();
                value = None;
                kept.clear();
            }
            OperationKind::Append => match &mut value {
                None => value = Some(Value::Sequence(vec![effect.value().clone()])),
                Some(Value::Sequence(items)) => items.push(effect.value().clone()),
                // Does not fit what the replay built so far.
                Some(_) => continue,
            },
            OperationKind::Increment => {
                let delta = effect.value().as_number().unwrap_or_default();
                match &mut value {
                    None => value = Some(Value::Number(delta)),
                    Some(Value::Number(total)) => *total += delta,
                    Some(_) => continue,
                }
            }
        }
        kept.push(contender);
    }

    let winner = kept
        .last()
        .map_or(start.id(), |contender| contender.effect.id())
        .to_string();
    Some(Settlement {
        value,
        applied: kept
            .iter()
            .map(|contender| contender.operation.id().to_string())
            .collect(),
        replayed: replay
            .iter()
            .map(|contender| contender.operation.clone())
            .collect(),
        winner,
        replaced_under_merge,
    })
}

/// Indexes of the contenders connected to `start` through concurrent pairs.
fn component_of(
    contenders: &[Contender<'_>],
    start: usize,
    log: &OperationLog,
    detector: &ConflictDetector,
) -> Vec<usize> {
    let mut member = vec![false; contenders.len()];
    member[start] = true;
    let mut frontier = vec![start];
    while let Some(index) = frontier.pop() {
        let current = contenders[index].operation;
        for (other, contender) in contenders.iter().enumerate() {
            if !member[other] && detector.are_concurrent(log, current, contender.operation) {
                member[other] = true;
                frontier.push(other);
            }
        }
    }
    (0..contenders.len()).filter(|&index| member[index]).collect()
}

fn races_any(
    contender: &Contender<'_>,
    kept: &[&Contender<'_>],
    log: &OperationLog,
    detector: &ConflictDetector,
) -> bool {
    kept.iter().any(|prior| {
        !commutes(prior.effect.kind(), contender.effect.kind())
            && detector.are_concurrent(log, prior.operation, contender.operation)
    })
}
