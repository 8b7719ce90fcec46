//! Property tests for replica convergence and snapshot integrity.

use proptest::prelude::*;

use meridian_core::errors::SyncError;
use meridian_core::value::Mapping;
use meridian_core::{
    KeyPath, MeridianError, Operation, OperationKind, PolicyKind, SyncConfig, Value,
};
use meridian_sync::{NodeState, SyncSnapshot};

/// A node whose conflict window covers every generated timestamp.
fn wide_window_node(origin: &str) -> NodeState {
    let config = SyncConfig {
        conflict_window_secs: 1_000.0,
        ..SyncConfig::default()
    };
    NodeState::with_config(origin, config).unwrap()
}

/// One write per origin on the same path.
fn contested_writes(
    writes: &[(u32, bool, i32)],
    kind: fn(bool) -> OperationKind,
) -> Vec<Operation> {
    writes
        .iter()
        .enumerate()
        .map(|(i, &(ts, flag, value))| {
            let kind = kind(flag);
            let value = if kind == OperationKind::Delete {
                Value::Null
            } else {
                Value::from(value)
            };
            let path = KeyPath::parse("doc.field").unwrap();
            Operation::new(kind, path, value, format!("node-{i}"), 1)
                .with_timestamp(f64::from(ts))
        })
        .collect()
}

fn set_or_delete(is_delete: bool) -> OperationKind {
    if is_delete {
        OperationKind::Delete
    } else {
        OperationKind::Set
    }
}

fn always_append(_: bool) -> OperationKind {
    OperationKind::Append
}

/// Operations paired with a shuffled copy of themselves.
fn with_shuffle(
    ops: Vec<Operation>,
) -> impl Strategy<Value = (Vec<Operation>, Vec<Operation>)> {
    let shuffled = Just(ops.clone()).prop_shuffle();
    (Just(ops), shuffled)
}

/// Kinds a mixed history on one path draws from. Sets carry values the
/// other kinds can build on.
#[derive(Debug, Clone, Copy)]
enum Family {
    Sequence,
    Counter,
    Mapping,
}

/// One write per origin on the same path, kinds picked from `family`.
fn mixed_writes(writes: &[(u32, u8, i32)], family: Family) -> Vec<Operation> {
    writes
        .iter()
        .enumerate()
        .map(|(i, &(ts, pick, n))| {
            let (kind, value) = match (pick % 3, family) {
                (0, _) => (OperationKind::Delete, Value::Null),
                (_, Family::Mapping) => {
                    let key = format!("k{}", n % 3);
                    (OperationKind::Set, Value::Mapping(Mapping::from([(key, Value::from(n))])))
                }
                (1, Family::Sequence) => (OperationKind::Set, Value::from(vec![Value::from(n)])),
                (1, Family::Counter) => (OperationKind::Set, Value::from(n)),
                (_, Family::Sequence) => (OperationKind::Append, Value::from(n)),
                (_, Family::Counter) => (OperationKind::Increment, Value::from(n)),
            };
            let path = KeyPath::parse("doc.field").unwrap();
            Operation::new(kind, path, value, format!("node-{i}"), 1)
                .with_timestamp(f64::from(ts))
        })
        .collect()
}

/// Value of a path after `ops`, all mutually concurrent, under `policy`.
fn expected_value(ops: &[Operation], policy: PolicyKind) -> Value {
    let mut sorted: Vec<&Operation> = ops.iter().collect();
    sorted.sort_by(|a, b| a.cmp_write_order(b));
    let Some(start) = sorted.iter().position(|op| op.kind().overwrites()) else {
        return fold(&sorted, false);
    };
    match policy {
        // Everything after the first overwrite races it.
        PolicyKind::FirstWriteWins => fold(&sorted[start..=start], false),
        PolicyKind::LastWriteWins => fold(&sorted[start..], false),
        PolicyKind::Merge => fold(&sorted[start..], true),
    }
}

fn fold(ops: &[&Operation], merge: bool) -> Value {
    let mut value: Option<Value> = None;
    for op in ops {
        let next = match (op.kind(), value.take()) {
            (OperationKind::Delete, _) => None,
            (OperationKind::Set, Some(Value::Mapping(mut current))) if merge => {
                if let Value::Mapping(partial) = op.value() {
                    current.extend(partial.clone());
                    Some(Value::Mapping(current))
                } else {
                    Some(op.value().clone())
                }
            }
            (OperationKind::Set, _) => Some(op.value().clone()),
            (OperationKind::Append, None) => Some(Value::from(vec![op.value().clone()])),
            (OperationKind::Append, Some(Value::Sequence(mut items))) => {
                items.push(op.value().clone());
                Some(Value::Sequence(items))
            }
            (OperationKind::Increment, None) => op.value().as_number().map(Value::Number),
            (OperationKind::Increment, Some(Value::Number(total))) => {
                op.value().as_number().map(|delta| Value::Number(total + delta))
            }
            (_, other) => other,
        };
        value = next;
    }
    value.unwrap_or(Value::Null)
}

fn family_strategy() -> impl Strategy<Value = (Family, PolicyKind)> {
    prop_oneof![
        Just((Family::Sequence, PolicyKind::LastWriteWins)),
        Just((Family::Sequence, PolicyKind::FirstWriteWins)),
        Just((Family::Counter, PolicyKind::LastWriteWins)),
        Just((Family::Counter, PolicyKind::FirstWriteWins)),
        Just((Family::Mapping, PolicyKind::Merge)),
    ]
}

fn mixed_strategy() -> impl Strategy<Value = Vec<(u32, u8, i32)>> {
    prop::collection::vec((0u32..50, any::<u8>(), 0i32..100), 2..7)
}

fn writes_strategy() -> impl Strategy<Value = Vec<(u32, bool, i32)>> {
    prop::collection::vec((0u32..50, any::<bool>(), 0i32..100), 2..7)
}

// =============================================================================
// Delivering a batch twice changes nothing
// =============================================================================
proptest! {
    #[test]
    fn redelivery_is_idempotent(
        writes in prop::collection::vec((0usize..6, 0i32..100), 1..30),
    ) {
        let source = NodeState::new("node-a").unwrap();
        for (key, value) in writes {
            // Even keys hold sequences, odd keys scalars.
            if key % 2 == 0 {
                source.append(&format!("seq.k{key}"), value).unwrap();
            } else {
                source.set(&format!("val.k{key}"), value).unwrap();
            }
        }
        let batch = source.get_pending_operations(true);

        let target = NodeState::new("node-b").unwrap();
        target.receive_operations(batch.clone());
        let (state, version) = (target.state(), target.version());
        target.receive_operations(batch);

        prop_assert_eq!(target.state(), state);
        prop_assert_eq!(target.version(), version);
        prop_assert_eq!(target.state(), source.state());
    }
}

// =============================================================================
// Writes to disjoint paths commute
// =============================================================================
proptest! {
    #[test]
    fn disjoint_writes_commute(
        (ops, shuffled) in prop::collection::vec(0i32..1000, 1..10).prop_flat_map(|values| {
            let ops: Vec<Operation> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    Operation::new(
                        OperationKind::Set,
                        KeyPath::parse(&format!("k{i}")).unwrap(),
                        Value::from(v),
                        format!("node-{}", i % 3),
                        (i / 3 + 1) as u64,
                    )
                    .with_timestamp(10.0)
                })
                .collect();
            with_shuffle(ops)
        }),
    ) {
        let forward = NodeState::new("observer-1").unwrap();
        forward.receive_operations(ops);
        let backward = NodeState::new("observer-2").unwrap();
        backward.receive_operations(shuffled);

        prop_assert_eq!(forward.state(), backward.state());
        prop_assert_eq!(forward.version(), backward.version());
    }
}

// =============================================================================
// Conflict resolution is independent of delivery order
// =============================================================================
proptest! {
    #[test]
    fn resolution_picks_the_extreme_write(
        (ops, shuffled) in writes_strategy()
            .prop_flat_map(|writes| with_shuffle(contested_writes(&writes, set_or_delete))),
        first_wins in any::<bool>(),
    ) {
        let policy = if first_wins { PolicyKind::FirstWriteWins } else { PolicyKind::LastWriteWins };
        let extreme = if first_wins {
            ops.iter().min_by(|a, b| a.cmp_write_order(b))
        } else {
            ops.iter().max_by(|a, b| a.cmp_write_order(b))
        }
        .unwrap();
        let expected = match extreme.kind() {
            OperationKind::Delete => Value::Null,
            _ => extreme.value().clone(),
        };

        for order in [ops.clone(), shuffled] {
            let node = wide_window_node("observer");
            node.set_path_policy("doc", policy).unwrap();
            let report = node.receive_operations(order);
            prop_assert!(report.rejected().next().is_none());
            prop_assert_eq!(node.get("doc.field", Value::Null), expected.clone());
        }
    }
}

// =============================================================================
// Mixed kinds on one path settle the same in any delivery order
// =============================================================================
proptest! {
    #[test]
    fn mixed_writes_settle_independently_of_order(
        ((family, policy), ops, shuffled) in (family_strategy(), mixed_strategy())
            .prop_flat_map(|(choice, writes)| {
                let ops = mixed_writes(&writes, choice.0);
                (Just(choice), Just(ops.clone()), Just(ops).prop_shuffle())
            }),
    ) {
        let expected = expected_value(&ops, policy);
        for order in [ops.clone(), shuffled] {
            let node = wide_window_node("observer");
            node.set_path_policy("doc", policy).unwrap();
            let report = node.receive_operations(order);
            prop_assert!(report.rejected().next().is_none(), "{:?} {:?}", family, report);
            prop_assert_eq!(node.get("doc.field", Value::Null), expected.clone());
        }
    }
}

// =============================================================================
// Writes chained through overlapping windows settle on the latest
// =============================================================================
proptest! {
    #[test]
    fn chained_windows_settle_on_the_latest_write(
        (ops, shuffled) in (3usize..7).prop_flat_map(|count| {
            // Neighbours are 0.9s apart, so the window of 1s never spans two steps.
            let ops: Vec<Operation> = (0..count)
                .map(|i| {
                    Operation::new(
                        OperationKind::Set,
                        KeyPath::parse("doc.field").unwrap(),
                        Value::from(i as i64),
                        format!("node-{i}"),
                        1,
                    )
                    .with_timestamp(10.0 + 0.9 * i as f64)
                })
                .collect();
            with_shuffle(ops)
        }),
    ) {
        let latest = Value::from((ops.len() - 1) as i64);
        let config = SyncConfig {
            conflict_window_secs: 1.0,
            ..SyncConfig::default()
        };
        for order in [ops.clone(), shuffled] {
            let node = NodeState::with_config("observer", config.clone()).unwrap();
            let report = node.receive_operations(order);
            prop_assert!(report.rejected().next().is_none());
            prop_assert_eq!(node.get("doc.field", Value::Null), latest.clone());
        }
    }
}

// =============================================================================
// Concurrent appends converge to (timestamp, origin) order
// =============================================================================
proptest! {
    #[test]
    fn concurrent_appends_converge(
        (ops, shuffled) in writes_strategy()
            .prop_flat_map(|writes| with_shuffle(contested_writes(&writes, always_append))),
    ) {
        let mut sorted = ops.clone();
        sorted.sort_by(|a, b| a.cmp_write_order(b));
        let expected = Value::from(
            sorted.iter().map(|op| op.value().clone()).collect::<Vec<_>>(),
        );

        for order in [ops, shuffled] {
            let node = wide_window_node("observer");
            node.receive_operations(order);
            prop_assert_eq!(node.get("doc.field", Value::Null), expected.clone());
        }
    }
}

// =============================================================================
// Snapshots round-trip, and any checksum edit is detected
// =============================================================================
proptest! {
    #[test]
    fn snapshot_round_trips_and_detects_tampering(
        writes in prop::collection::vec((0usize..5, -1000i32..1000), 0..20),
        flip_at in 0usize..64,
    ) {
        let source = NodeState::new("node-a").unwrap();
        for (key, value) in writes {
            source.set(&format!("data.k{key}"), value).unwrap();
        }
        let snapshot = source.export_snapshot().unwrap();
        let decoded = SyncSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        prop_assert!(decoded.verify().is_ok());

        let target = NodeState::new("node-b").unwrap();
        target.import_snapshot(&decoded).unwrap();
        prop_assert_eq!(target.state(), source.state());
        prop_assert_eq!(target.version(), source.version());

        let mut tampered = snapshot.clone();
        let original = tampered.checksum.as_bytes()[flip_at];
        let replacement = if original == b'a' { "b" } else { "a" };
        tampered.checksum.replace_range(flip_at..=flip_at, replacement);
        let is_mismatch = matches!(
            target.import_snapshot(&tampered),
            Err(MeridianError::Sync(SyncError::ChecksumMismatch { .. }))
        );
        prop_assert!(is_mismatch);
    }
}

// =============================================================================
// Local operations advance the clock by exactly one
// =============================================================================
proptest! {
    #[test]
    fn local_operations_advance_clock(
        steps in prop::collection::vec((0u8..3, 0usize..4), 1..40),
    ) {
        let node = NodeState::new("node-a").unwrap();
        let mut expected = 0;
        for (kind, key) in steps {
            let result = match kind {
                0 => node.set(&format!("set.k{key}"), 1),
                1 => node.increment(&format!("num.k{key}"), 1.0),
                _ => node.append(&format!("seq.k{key}"), "x"),
            };
            let op = result.unwrap();
            expected += 1;
            prop_assert_eq!(op.version(), expected);
            prop_assert_eq!(node.vector_clock().get("node-a"), expected);
            prop_assert_eq!(node.version(), expected);
        }
    }
}
