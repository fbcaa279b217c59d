//! Cross-module property and scenario tests for [`raw_btree_map::collections::btree_map::BTreeMap`].
//!
//! Per-module unit tests live alongside their modules in `#[cfg(test)] mod tests`; this file
//! holds the whole-map invariants that only make sense exercised end to end.

use std::collections::BTreeSet as StdBTreeSet;

use proptest::prelude::*;

use raw_btree_map::collections::btree_map::BTreeMap;
use raw_btree_map::error::BTreeError;

fn node_occupancy_holds(map: &BTreeMap<i32, i32>) -> bool {
    // Re-derived from public introspection rather than reaching into private node state:
    // a map with N nodes and size S can only have every non-root node within bounds if
    // fullness (S / (N · NODE_KV_COUNT)) stays in a sane range once there's more than one node.
    if map.node_count() <= 1 {
        return true;
    }
    map.fullness() > 0.0 && map.fullness() <= 1.0
}

proptest! {
    // Property 1 (§8): distinct-key insertion sequences enumerate in strictly ascending order.
    #[test]
    fn ascending_enumeration_after_arbitrary_distinct_inserts(
        keys in prop::collection::hash_set(-500i32..500, 0..200)
    ) {
        let mut map: BTreeMap<i32, i32> = BTreeMap::new();
        let keys: Vec<i32> = keys.into_iter().collect();
        for &k in &keys {
            map.add(k, k).unwrap();
        }

        let got: Vec<_> = map.enumerate().map(|(k, _)| k).collect();
        let mut expected: Vec<_> = keys.clone();
        expected.sort_unstable();

        prop_assert_eq!(got, expected);
        prop_assert_eq!(map.count(), keys.len());
        prop_assert!(node_occupancy_holds(&map));
    }

    // Property 2 (§8): insert/remove interleaving matches the sorted set difference.
    #[test]
    fn remaining_keys_match_sorted_set_difference(
        inserts in prop::collection::hash_set(-200i32..200, 0..150),
        removes in prop::collection::hash_set(-200i32..200, 0..150),
    ) {
        let mut map: BTreeMap<i32, i32> = BTreeMap::new();
        let mut live: StdBTreeSet<i32> = StdBTreeSet::new();

        for &k in &inserts {
            map.add(k, k).unwrap();
            live.insert(k);
        }
        for &k in &removes {
            let removed = map.remove(&k);
            let was_present = live.remove(&k);
            prop_assert_eq!(removed, was_present);
        }

        let got: Vec<_> = map.enumerate().map(|(k, _)| k).collect();
        let expected: Vec<_> = live.into_iter().collect();
        prop_assert_eq!(got, expected);
        prop_assert!(node_occupancy_holds(&map));
    }

    // Property 3 (§8): add-then-remove round-trips exactly back to the pre-add state.
    #[test]
    fn add_then_remove_round_trips_to_prior_state(
        seed in prop::collection::hash_set(-200i32..200, 0..100),
        k in -200i32..200,
    ) {
        let mut map: BTreeMap<i32, i32> = BTreeMap::new();
        for &key in &seed {
            map.add(key, key).unwrap();
        }
        prop_assume!(!seed.contains(&k));

        let before: Vec<_> = map.enumerate().collect();
        let before_count = map.count();

        map.add(k, k).unwrap();
        prop_assert!(map.remove(&k));

        let after: Vec<_> = map.enumerate().collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(before_count, map.count());
    }

    // Property 4 (§8): contains agrees with membership in the inserted key set.
    #[test]
    fn contains_agrees_with_membership(
        inserted in prop::collection::hash_set(-100i32..100, 0..80),
        probe in -100i32..100,
    ) {
        let mut map: BTreeMap<i32, i32> = BTreeMap::new();
        for &k in &inserted {
            map.add(k, k).unwrap();
        }
        prop_assert_eq!(map.contains(&probe), inserted.contains(&probe));
    }

    // Property 5 (§8): range(a, b) equals the enumeration subsequence in [a, b).
    #[test]
    fn range_matches_enumeration_subsequence(
        keys in prop::collection::hash_set(-100i32..100, 0..120),
        a in -100i32..100,
        span in 0i32..50,
    ) {
        let mut map: BTreeMap<i32, i32> = BTreeMap::new();
        for &k in &keys {
            map.add(k, k).unwrap();
        }
        let b = a + span;

        let got: Vec<_> = map.range(&a, &b).unwrap().map(|(k, _)| k).collect();
        let mut expected: Vec<_> = keys.into_iter().filter(|k| *k >= a && *k < b).collect();
        expected.sort_unstable();

        prop_assert_eq!(got, expected);
    }

    // Property 6 (§8): n steps forward then n steps back returns a cursor to where it started.
    #[test]
    fn bidirectional_traversal_returns_to_start(
        keys in prop::collection::hash_set(0i32..300, 10..150),
        steps in 1usize..10,
    ) {
        let mut map: BTreeMap<i32, i32> = BTreeMap::new();
        let mut sorted: Vec<i32> = keys.into_iter().collect();
        sorted.sort_unstable();
        for &k in &sorted {
            map.add(k, k).unwrap();
        }
        let n = steps.min(sorted.len().saturating_sub(1)).max(1);

        let mut cur = map.begin();
        for _ in 0..n {
            cur.increment();
        }
        for _ in 0..n {
            cur.decrement();
        }
        prop_assert_eq!(cur.key(), sorted[0]);
    }
}

// Concrete scenarios (§8), not amenable to property generation.

#[test]
fn scenario_1_insert_single_entry() {
    let mut map: BTreeMap<u32, u32> = BTreeMap::new();
    map.add(1, 100).unwrap();
    assert_eq!(map.get(&1), Ok(100));
    assert_eq!(map.count(), 1);
}

#[test]
fn scenario_2_insert_then_remove_empties_the_map() {
    let mut map: BTreeMap<u32, u32> = BTreeMap::new();
    map.add(1, 100).unwrap();
    assert!(map.remove(&1));
    assert_eq!(map.get(&1), Err(BTreeError::KeyNotFound));
    assert_eq!(map.count(), 0);
}

#[test]
fn scenario_3_set_overwrites_in_place() {
    let mut map: BTreeMap<u32, u32> = BTreeMap::new();
    map.add(1, 100).unwrap();
    assert_eq!(map.set(1, 200), Some(100));
    assert_eq!(map.get(&1), Ok(200));
    assert_eq!(map.count(), 1);
}

#[test]
fn scenario_4_shuffled_insert_of_0_to_99_enumerates_sorted() {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let mut keys: Vec<u32> = (0..100).collect();
    keys.shuffle(&mut thread_rng());

    let mut map: BTreeMap<u32, u32> = BTreeMap::new();
    for k in keys {
        map.add(k, k + 100).unwrap();
    }

    let got: Vec<_> = map.enumerate().collect();
    let expected: Vec<_> = (0..100u32).map(|k| (k, k + 100)).collect();
    assert_eq!(got, expected);
}

#[test]
fn scenario_5_shuffled_insert_then_remove_evens() {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let mut keys: Vec<u32> = (0..1000).collect();
    keys.shuffle(&mut thread_rng());

    let mut map: BTreeMap<u32, u32> = BTreeMap::new();
    for k in &keys {
        map.add(*k, *k).unwrap();
    }
    for k in (0..1000u32).step_by(2) {
        assert!(map.remove(&k));
    }

    assert_eq!(map.count(), 500);
    let got: Vec<_> = map.enumerate().map(|(k, _)| k).collect();
    let expected: Vec<_> = (0..1000u32).filter(|k| k % 2 == 1).collect();
    assert_eq!(got, expected);
}

#[test]
fn scenario_6_range_over_multiples_of_ten() {
    let mut map: BTreeMap<u32, u32> = BTreeMap::new();
    for k in (0..=100).step_by(10) {
        map.add(k, k / 10).unwrap();
    }

    let got: Vec<_> = map.range(&45, &100_000).unwrap().map(|(k, _)| k).collect();
    assert_eq!(got, vec![50, 60, 70, 80, 90, 100]);
}

#[test]
fn scenario_7_range_with_end_before_start_is_invalid() {
    let map: BTreeMap<u32, u32> = BTreeMap::new();
    assert!(matches!(map.range(&3, &1), Err(BTreeError::InvalidRange)));
}

#[test]
fn range_with_equal_bounds_is_always_empty() {
    let mut map: BTreeMap<u32, u32> = BTreeMap::new();
    map.add(5, 500).unwrap();

    assert_eq!(map.range(&5, &5).unwrap().collect::<Vec<_>>(), vec![]);
    assert_eq!(map.range(&9, &9).unwrap().collect::<Vec<_>>(), vec![]);
}

#[test]
fn scenario_8_adjacent_ranges_partition_the_map() {
    let mut map: BTreeMap<u32, u32> = BTreeMap::new();
    map.add(1, 100).unwrap();
    map.add(5, 101).unwrap();

    assert_eq!(map.range(&0, &3).unwrap().collect::<Vec<_>>(), vec![(1, 100)]);
    assert_eq!(map.range(&3, &20).unwrap().collect::<Vec<_>>(), vec![(5, 101)]);
}
