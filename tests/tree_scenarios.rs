//! # End-to-End Tree Scenarios
//!
//! Literal small-fanout scenarios exercising split, borrow, merge and root
//! transitions with `leaf_max = interior_max = 3`, where every structural
//! event is reachable within a handful of keys. Each step re-validates the
//! full invariant set.

use crabtree::{default_key_cmp, BPlusTree, Key, TreeInsert, Value, INVALID_PAGE_ID};

fn val(text: &str) -> Value {
    let mut out = [0u8; 16];
    let bytes = text.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

fn tiny_tree() -> BPlusTree {
    BPlusTree::open("scenario", default_key_cmp, 3, 3).unwrap()
}

#[test]
fn split_at_root_promotes_the_middle_key() {
    let tree = tiny_tree();
    tree.insert(1, val("a")).unwrap();
    tree.insert(2, val("b")).unwrap();
    tree.insert(3, val("c")).unwrap();

    // Still a single leaf holding [1, 2, 3].
    assert_eq!(tree.page_count(), 1);
    assert_eq!(tree.keys().unwrap(), vec![1, 2, 3]);

    tree.insert(4, val("d")).unwrap();

    // Root is now an interior node over leaves [1, 2] and [3, 4].
    assert_eq!(tree.page_count(), 3);
    let snap = tree.stats().snapshot();
    assert_eq!(snap.leaf_splits, 1);
    assert_eq!(snap.root_grows, 1);

    assert_eq!(tree.search(1).unwrap(), Some(val("a")));
    assert_eq!(tree.search(2).unwrap(), Some(val("b")));
    assert_eq!(tree.search(3).unwrap(), Some(val("c")));
    assert_eq!(tree.search(4).unwrap(), Some(val("d")));
    assert_eq!(tree.search(5).unwrap(), None);
    tree.check_integrity().unwrap();
}

#[test]
fn underflowed_leaf_borrows_from_its_left_sibling() {
    let tree = tiny_tree();
    for (k, v) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
        tree.insert(k, val(v)).unwrap();
    }
    tree.insert(0, val("z")).unwrap();
    tree.check_integrity().unwrap();

    tree.remove(4).unwrap();

    assert!(tree.stats().snapshot().leaf_borrows >= 1);
    assert_eq!(tree.search(0).unwrap(), Some(val("z")));
    assert_eq!(tree.search(1).unwrap(), Some(val("a")));
    assert_eq!(tree.search(2).unwrap(), Some(val("b")));
    assert_eq!(tree.search(3).unwrap(), Some(val("c")));
    assert_eq!(tree.search(4).unwrap(), None);
    tree.check_integrity().unwrap();
}

#[test]
fn merges_collapse_the_root_back_to_a_single_leaf() {
    let tree = tiny_tree();
    for k in [1, 2, 3, 4, 5] {
        tree.insert(k, val("x")).unwrap();
    }
    assert!(tree.page_count() > 1);

    let mut saw_single_leaf_root = false;
    for k in [5, 4, 3] {
        tree.remove(k).unwrap();
        tree.check_integrity().unwrap();
        if tree.page_count() == 1 {
            assert_ne!(tree.root_page_id(), INVALID_PAGE_ID);
            saw_single_leaf_root = true;
        }
    }
    assert!(
        saw_single_leaf_root,
        "the deletion sequence never shrank the tree to a single leaf"
    );
    assert_eq!(tree.stats().snapshot().root_collapses, 1);
    assert_eq!(tree.keys().unwrap(), vec![1, 2]);
}

#[test]
fn duplicate_insert_fails_without_mutation() {
    let tree = tiny_tree();
    assert!(tree.insert(10, val("v1")).unwrap().is_ok());
    let pages_before = tree.page_count();

    assert_eq!(tree.insert(10, val("v2")).unwrap(), TreeInsert::DuplicateKey);

    assert_eq!(tree.search(10).unwrap(), Some(val("v1")));
    assert_eq!(tree.page_count(), pages_before);
    tree.check_integrity().unwrap();
}

#[test]
fn duplicate_insert_into_a_full_leaf_does_not_split() {
    let tree = tiny_tree();
    for k in [1, 2, 3] {
        tree.insert(k, val("x")).unwrap();
    }
    let pages_before = tree.page_count();
    assert_eq!(tree.insert(2, val("y")).unwrap(), TreeInsert::DuplicateKey);
    assert_eq!(tree.page_count(), pages_before);
    assert_eq!(tree.search(2).unwrap(), Some(val("x")));
    tree.check_integrity().unwrap();
}

#[test]
fn fresh_tree_round_trips_through_a_snapshot_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.snapshot");

    let tree = tiny_tree();
    tree.serialize(&path).unwrap();

    let mut restored = tiny_tree();
    restored.deserialize(&path).unwrap();
    assert!(restored.is_empty());
    assert_eq!(restored.root_page_id(), INVALID_PAGE_ID);
    assert_eq!(restored.page_count(), 0);
    restored.check_integrity().unwrap();
}

#[test]
fn deep_trees_survive_a_full_drain_in_every_order() {
    let keys: Vec<Key> = (0..200).collect();

    // Ascending drain.
    let tree = tiny_tree();
    for &k in &keys {
        tree.insert(k, val("x")).unwrap();
    }
    for &k in &keys {
        tree.remove(k).unwrap();
        tree.check_integrity().unwrap();
    }
    assert!(tree.is_empty());

    // Descending drain.
    let tree = tiny_tree();
    for &k in &keys {
        tree.insert(k, val("x")).unwrap();
    }
    for &k in keys.iter().rev() {
        tree.remove(k).unwrap();
        tree.check_integrity().unwrap();
    }
    assert!(tree.is_empty());

    // Inside-out drain.
    let tree = tiny_tree();
    for &k in &keys {
        tree.insert(k, val("x")).unwrap();
    }
    let mut inside_out: Vec<Key> = keys.clone();
    inside_out.sort_by_key(|k| (k - 100).abs());
    for &k in &inside_out {
        tree.remove(k).unwrap();
        tree.check_integrity().unwrap();
    }
    assert!(tree.is_empty());
    assert_eq!(tree.page_count(), 0);
}

#[test]
fn leaf_chain_yields_every_key_exactly_once_in_order() {
    let tree = tiny_tree();
    let mut keys: Vec<Key> = (0..97).map(|k| k * 7 % 97).collect();
    for &k in &keys {
        tree.insert(k, val("x")).unwrap();
    }
    keys.sort_unstable();
    assert_eq!(tree.keys().unwrap(), keys);
    tree.check_integrity().unwrap();
}
