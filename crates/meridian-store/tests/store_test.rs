//! Integration tests for ValueStore.

use meridian_core::errors::StoreError;
use meridian_core::value::Mapping;
use meridian_core::{KeyPath, OperationKind, Value};
use meridian_store::ValueStore;
use serde_json::json;

fn path(raw: &str) -> KeyPath {
    KeyPath::parse(raw).unwrap()
}

fn store_from(json: serde_json::Value) -> ValueStore {
    ValueStore::from_value(Value::from(json)).unwrap()
}

// =============================================================================
// get / set
// =============================================================================

#[test]
fn set_vivifies_intermediate_mappings() {
    let mut store = ValueStore::new();
    store
        .set(&path("users.alice.status"), Value::from("online"))
        .unwrap();

    assert_eq!(
        store.to_value().to_json(),
        json!({ "users": { "alice": { "status": "online" } } })
    );
    assert!(store.get(&path("users.alice")).unwrap().as_mapping().is_some());
}

#[test]
fn set_through_scalar_intermediate_fails_and_leaves_store_untouched() {
    let mut store = store_from(json!({ "users": "nobody" }));
    let before = store.clone();

    let err = store
        .set(&path("users.alice.status"), Value::from("online"))
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::PathTypeError {
            path: "users".to_string(),
            expected: "mapping".to_string(),
            found: "string".to_string(),
        }
    );
    assert_eq!(store, before);
}

#[test]
fn get_or_returns_default_for_missing_paths() {
    let store = store_from(json!({ "a": { "b": 1 } }));
    assert_eq!(store.get_or(&path("a.b"), Value::Null), Value::from(1));
    assert_eq!(store.get_or(&path("a.c"), Value::from("dflt")), Value::from("dflt"));
    // Walking through a scalar is a miss, not an error.
    assert_eq!(store.get_or(&path("a.b.c"), Value::from(0)), Value::from(0));
    assert!(!store.contains(&path("x")));
}

// =============================================================================
// update
// =============================================================================

#[test]
fn update_shallow_merges_into_existing_mapping() {
    let mut store = store_from(json!({ "cfg": { "a": 1, "b": { "deep": true } } }));
    let partial: Mapping = [
        ("b".to_string(), Value::from(2)),
        ("c".to_string(), Value::from(3)),
    ]
    .into_iter()
    .collect();

    store.update(&path("cfg"), &partial).unwrap();
    assert_eq!(
        store.get(&path("cfg")).unwrap().to_json(),
        json!({ "a": 1, "b": 2, "c": 3 })
    );
}

#[test]
fn update_creates_absent_mapping() {
    let mut store = ValueStore::new();
    let partial: Mapping = [("k".to_string(), Value::from(true))].into_iter().collect();
    store.update(&path("fresh.map"), &partial).unwrap();
    assert_eq!(store.get(&path("fresh.map.k")), Some(&Value::Bool(true)));
}

#[test]
fn update_on_non_mapping_is_a_path_type_error() {
    let mut store = store_from(json!({ "n": 5 }));
    let err = store.update(&path("n"), &Mapping::new()).unwrap_err();
    assert!(matches!(err, StoreError::PathTypeError { found, .. } if found == "number"));
}

// =============================================================================
// append / insert_at
// =============================================================================

#[test]
fn append_creates_sequence_and_returns_index() {
    let mut store = ValueStore::new();
    assert_eq!(store.append(&path("logs"), Value::from("a")).unwrap(), 0);
    assert_eq!(store.append(&path("logs"), Value::from("b")).unwrap(), 1);
    assert_eq!(store.get(&path("logs")).unwrap().to_json(), json!(["a", "b"]));
}

#[test]
fn append_on_non_sequence_fails() {
    let mut store = store_from(json!({ "logs": { "not": "a list" } }));
    let err = store.append(&path("logs"), Value::from(1)).unwrap_err();
    assert_eq!(
        err,
        StoreError::AppendOnNonSequence {
            path: "logs".to_string(),
            found: "mapping".to_string(),
        }
    );
}

#[test]
fn insert_at_clamps_index() {
    let mut store = store_from(json!({ "s": [1, 3] }));
    assert_eq!(store.insert_at(&path("s"), 1, Value::from(2)).unwrap(), 1);
    assert_eq!(store.insert_at(&path("s"), 99, Value::from(4)).unwrap(), 3);
    assert_eq!(store.get(&path("s")).unwrap().to_json(), json!([1, 2, 3, 4]));
}

// =============================================================================
// increment
// =============================================================================

#[test]
fn increment_treats_absent_as_zero() {
    let mut store = ValueStore::new();
    assert_eq!(store.increment(&path("stats.hits"), 2.0).unwrap(), 2.0);
    assert_eq!(store.increment(&path("stats.hits"), 0.5).unwrap(), 2.5);
}

#[test]
fn increment_on_non_numeric_fails() {
    let mut store = store_from(json!({ "hits": "many" }));
    let err = store.increment(&path("hits"), 1.0).unwrap_err();
    assert!(matches!(err, StoreError::IncrementOnNonNumeric { .. }));
    assert_eq!(store.get(&path("hits")), Some(&Value::from("many")));
}

// =============================================================================
// delete
// =============================================================================

#[test]
fn delete_returns_removed_value_and_ignores_missing() {
    let mut store = store_from(json!({ "a": { "b": 1, "c": 2 } }));
    assert_eq!(store.delete(&path("a.b")), Some(Value::from(1)));
    assert_eq!(store.delete(&path("a.b")), None);
    assert_eq!(store.delete(&path("nope.deeper")), None);
    assert_eq!(store.to_value().to_json(), json!({ "a": { "c": 2 } }));
}

// =============================================================================
// apply / check_write
// =============================================================================

#[test]
fn apply_dispatches_on_kind() {
    let mut store = ValueStore::new();
    store
        .apply(OperationKind::Set, &path("a"), &Value::from(1))
        .unwrap();
    store
        .apply(OperationKind::Increment, &path("a"), &Value::from(4))
        .unwrap();
    store
        .apply(OperationKind::Append, &path("l"), &Value::from("x"))
        .unwrap();
    store
        .apply(OperationKind::Delete, &path("missing"), &Value::Null)
        .unwrap();
    assert_eq!(store.to_value().to_json(), json!({ "a": 5, "l": ["x"] }));
}

#[test]
fn check_write_matches_apply_outcome() {
    let store = store_from(json!({ "s": "text", "n": 1, "l": [] }));

    assert!(store.check_write(OperationKind::Set, &path("s")).is_ok());
    assert!(store.check_write(OperationKind::Append, &path("l")).is_ok());
    assert!(store.check_write(OperationKind::Increment, &path("n")).is_ok());
    assert!(store.check_write(OperationKind::Append, &path("s")).is_err());
    assert!(store.check_write(OperationKind::Increment, &path("s")).is_err());
    assert!(store.check_write(OperationKind::Set, &path("s.child")).is_err());
    // Deleting below a scalar is a no-op, never an error.
    assert!(store.check_write(OperationKind::Delete, &path("s.child")).is_ok());
    assert!(store.check_write(OperationKind::Set, &path("new.deep.path")).is_ok());
}

// =============================================================================
// whole-document conversions
// =============================================================================

#[test]
fn from_value_requires_mapping_root() {
    let err = ValueStore::from_value(Value::from(vec![Value::from(1)])).unwrap_err();
    assert!(matches!(err, StoreError::PathTypeError { path, .. } if path == "<root>"));
}

#[test]
fn canonical_bytes_are_key_ordered() {
    let mut first = ValueStore::new();
    first.set(&path("b"), Value::from(2)).unwrap();
    first.set(&path("a"), Value::from(1)).unwrap();

    let mut second = ValueStore::new();
    second.set(&path("a"), Value::from(1)).unwrap();
    second.set(&path("b"), Value::from(2)).unwrap();

    assert_eq!(first.canonical_bytes().unwrap(), second.canonical_bytes().unwrap());
    let text = String::from_utf8(first.canonical_bytes().unwrap()).unwrap();
    assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
}

#[test]
fn to_value_is_a_deep_copy() {
    let mut store = store_from(json!({ "a": { "b": [1] } }));
    let copy = store.to_value();
    store.append(&path("a.b"), Value::from(2)).unwrap();
    assert_eq!(copy.to_json(), json!({ "a": { "b": [1] } }));
}
