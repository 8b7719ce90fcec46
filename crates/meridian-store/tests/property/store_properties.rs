//! Property tests for meridian-store.

use proptest::prelude::*;

use meridian_core::{KeyPath, OperationKind, Value};
use meridian_store::ValueStore;

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000i64..1_000).prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

fn path_strategy() -> impl Strategy<Value = KeyPath> {
    prop::collection::vec("[a-d]", 1..4)
        .prop_map(|segments| KeyPath::parse(&segments.join(".")).unwrap())
}

fn kind_strategy() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Set),
        Just(OperationKind::Delete),
        Just(OperationKind::Append),
        Just(OperationKind::Increment),
    ]
}

fn payload_for(kind: OperationKind, value: Value) -> Value {
    match kind {
        OperationKind::Delete => Value::Null,
        OperationKind::Increment => Value::from(3),
        _ => value,
    }
}

fn unrelated(a: &KeyPath, b: &KeyPath) -> bool {
    !a.is_prefix_of(b) && !b.is_prefix_of(a)
}

// =============================================================================
// Writes on unrelated paths commute
// =============================================================================
proptest! {
    #[test]
    fn sets_on_unrelated_paths_commute(
        p1 in path_strategy(),
        p2 in path_strategy(),
        v1 in scalar_strategy(),
        v2 in scalar_strategy(),
    ) {
        prop_assume!(unrelated(&p1, &p2));

        let mut forward = ValueStore::new();
        forward.set(&p1, v1.clone()).unwrap();
        forward.set(&p2, v2.clone()).unwrap();

        let mut backward = ValueStore::new();
        backward.set(&p2, v2).unwrap();
        backward.set(&p1, v1).unwrap();

        prop_assert_eq!(forward.canonical_bytes().unwrap(), backward.canonical_bytes().unwrap());
    }
}

// =============================================================================
// A rejected write never changes the tree
// =============================================================================
proptest! {
    #[test]
    fn failed_write_leaves_store_unchanged(
        steps in prop::collection::vec((kind_strategy(), path_strategy(), scalar_strategy()), 1..24),
    ) {
        let mut store = ValueStore::new();
        for (kind, path, value) in steps {
            let before = store.clone();
            let precheck = store.check_write(kind, &path);
            let outcome = store.apply(kind, &path, &payload_for(kind, value));
            prop_assert_eq!(precheck.is_ok(), outcome.is_ok());
            if outcome.is_err() {
                prop_assert_eq!(&store, &before);
            }
        }
    }
}

// =============================================================================
// get after set returns the written value
// =============================================================================
proptest! {
    #[test]
    fn set_then_get_round_trips(path in path_strategy(), value in scalar_strategy()) {
        let mut store = ValueStore::new();
        store.set(&path, value.clone()).unwrap();
        prop_assert_eq!(store.get(&path), Some(&value));
    }
}
