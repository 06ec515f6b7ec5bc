//! Property-based tests for the tree engine and the snapshot codec.
//!
//! Uses differential testing against `BTreeMap` as an oracle: after every
//! operation the tree must agree with the oracle on membership and values,
//! and the full invariant set must hold.

use crabtree::{default_key_cmp, BPlusTree, Key, TreeInsert, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Operations for random testing.
#[derive(Debug, Clone)]
enum Op {
    Insert(Key, u8),
    Remove(Key),
    Search(Key),
}

/// Strategy for generating random operations over a small key universe,
/// so removes and duplicate inserts actually hit existing keys.
fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            3 => (0..64i64, any::<u8>()).prop_map(|(k, v)| Op::Insert(k, v)),
            2 => (0..64i64).prop_map(Op::Remove),
            1 => (0..64i64).prop_map(Op::Search),
        ],
        0..=max_ops,
    )
}

/// Strategy for node capacities small enough to force splits and merges.
fn capacities() -> impl Strategy<Value = (usize, usize)> {
    (3..=8usize, 3..=8usize)
}

fn val(key: Key, tag: u8) -> Value {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&key.to_le_bytes());
    out[8] = tag;
    out
}

fn apply(tree: &BPlusTree, oracle: &mut BTreeMap<Key, Value>, op: &Op) {
    match *op {
        Op::Insert(key, tag) => {
            let value = val(key, tag);
            let outcome = tree.insert(key, value).unwrap();
            if oracle.contains_key(&key) {
                assert_eq!(outcome, TreeInsert::DuplicateKey);
            } else {
                assert!(outcome.is_ok());
                oracle.insert(key, value);
            }
        }
        Op::Remove(key) => {
            tree.remove(key).unwrap();
            oracle.remove(&key);
        }
        Op::Search(key) => {
            assert_eq!(tree.search(key).unwrap(), oracle.get(&key).copied());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(192))]

    /// The tree agrees with a BTreeMap oracle after every operation, and
    /// the structural invariants hold throughout.
    #[test]
    fn differential_against_btreemap(
        (leaf_max, interior_max) in capacities(),
        ops in operations(120),
    ) {
        let tree = BPlusTree::open("prop_diff", default_key_cmp, leaf_max, interior_max).unwrap();
        let mut oracle = BTreeMap::new();

        for op in &ops {
            apply(&tree, &mut oracle, op);
            tree.check_integrity().unwrap();
        }

        prop_assert_eq!(tree.keys().unwrap(), oracle.keys().copied().collect::<Vec<_>>());
        prop_assert_eq!(tree.is_empty(), oracle.is_empty());
        for (key, value) in &oracle {
            prop_assert_eq!(tree.search(*key).unwrap(), Some(*value));
        }
    }

    /// Every inserted and not-removed key resolves to its most recent
    /// value; everything else resolves to nothing.
    #[test]
    fn lookups_see_exactly_the_live_keys(ops in operations(200)) {
        let tree = BPlusTree::open("prop_live", default_key_cmp, 4, 4).unwrap();
        let mut oracle = BTreeMap::new();
        for op in &ops {
            apply(&tree, &mut oracle, op);
        }
        for key in 0..64i64 {
            prop_assert_eq!(tree.search(key).unwrap(), oracle.get(&key).copied());
        }
    }

    /// Removing a key twice leaves the tree exactly as removing it once.
    #[test]
    fn remove_is_idempotent(ops in operations(80), key in 0..64i64) {
        let tree = BPlusTree::open("prop_idem", default_key_cmp, 3, 3).unwrap();
        let mut oracle = BTreeMap::new();
        for op in &ops {
            apply(&tree, &mut oracle, op);
        }

        tree.remove(key).unwrap();
        let keys_after_first = tree.keys().unwrap();
        let pages_after_first = tree.page_count();
        let root_after_first = tree.root_page_id();

        tree.remove(key).unwrap();
        prop_assert_eq!(tree.keys().unwrap(), keys_after_first);
        prop_assert_eq!(tree.page_count(), pages_after_first);
        prop_assert_eq!(tree.root_page_id(), root_after_first);
        tree.check_integrity().unwrap();
    }

    /// Serialize -> deserialize is the identity on every observable:
    /// root id, page count, lookups, and the leaf chain.
    #[test]
    fn snapshot_round_trip_is_identity(
        (leaf_max, interior_max) in capacities(),
        ops in operations(120),
    ) {
        let tree = BPlusTree::open("prop_snap", default_key_cmp, leaf_max, interior_max).unwrap();
        let mut oracle = BTreeMap::new();
        for op in &ops {
            apply(&tree, &mut oracle, op);
        }

        let mut buf = Vec::new();
        tree.serialize_to_writer(&mut buf).unwrap();

        let mut restored = BPlusTree::with_defaults("prop_snap_restore").unwrap();
        restored.deserialize_from_reader(&mut &buf[..]).unwrap();

        prop_assert_eq!(restored.root_page_id(), tree.root_page_id());
        prop_assert_eq!(restored.page_count(), tree.page_count());
        prop_assert_eq!(restored.leaf_max_size(), leaf_max);
        prop_assert_eq!(restored.interior_max_size(), interior_max);
        prop_assert_eq!(restored.keys().unwrap(), tree.keys().unwrap());
        restored.check_integrity().unwrap();
        for key in 0..64i64 {
            prop_assert_eq!(restored.search(key).unwrap(), tree.search(key).unwrap());
        }

        // A second generation must round-trip to the same bytes.
        let mut second = Vec::new();
        restored.serialize_to_writer(&mut second).unwrap();
        prop_assert_eq!(buf, second);
    }
}
