//! Property tests for VectorClock.

use proptest::prelude::*;

use meridian_crdt::VectorClock;

fn clock_strategy() -> impl Strategy<Value = VectorClock> {
    prop::collection::btree_map("n[0-4]", 0u64..20, 0..5).prop_map(|entries| {
        let mut clock = VectorClock::new();
        for (origin, version) in entries {
            clock.observe(&origin, version);
        }
        clock
    })
}

// =============================================================================
// Local versions are strictly increasing
// =============================================================================
proptest! {
    #[test]
    fn local_versions_strictly_increase(
        origins in prop::collection::vec("n[0-2]", 1..40),
    ) {
        let mut clock = VectorClock::new();
        let mut last = std::collections::HashMap::new();
        for origin in origins {
            let version = clock.record_local(&origin);
            let previous = last.insert(origin.clone(), version).unwrap_or(0);
            prop_assert!(version > previous);
            prop_assert_eq!(clock.get(&origin), version);
        }
    }
}

// =============================================================================
// Merge is a join: commutative, idempotent, monotone
// =============================================================================
proptest! {
    #[test]
    fn merge_is_commutative(a in clock_strategy(), b in clock_strategy()) {
        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        for origin in ab.agents().chain(ba.agents()) {
            prop_assert_eq!(ab.get(origin), ba.get(origin));
        }
    }

    #[test]
    fn merge_never_lowers_an_entry(a in clock_strategy(), b in clock_strategy()) {
        let mut merged = a.clone();
        merged.merge(&b);
        for (origin, version) in a.iter() {
            prop_assert!(merged.get(origin) >= version);
        }
        prop_assert!(!merged.happens_before(&a));
    }

    #[test]
    fn merge_with_self_is_identity(a in clock_strategy()) {
        let mut merged = a.clone();
        merged.merge(&a);
        prop_assert_eq!(merged, a);
    }
}
