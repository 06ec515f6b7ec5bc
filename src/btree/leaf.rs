//! # B+Tree Leaf Nodes
//!
//! Leaf nodes store the actual key-value entries of the tree and are linked
//! together left-to-right for in-order traversal of the key space.
//!
//! ## Layout
//!
//! ```text
//! LeafNode
//! +---------+----------+--------------------------------+--------------+
//! | page_id | max_size | entries: sorted (Key, Value)[] | next_page_id |
//! +---------+----------+--------------------------------+--------------+
//! ```
//!
//! Entries are kept sorted by key at all times; every mutation goes through
//! a binary search. A leaf holds at most `max_size` entries. During a split
//! the pending entry is inserted first, so the entry vector briefly holds
//! `max_size + 1` entries before the upper half moves to the new sibling.
//!
//! ## Occupancy
//!
//! Non-root leaves keep at least `min_size = ceil(max_size / 2)` entries.
//! A deletion that would drop a leaf below `min_size` triggers
//! redistribution or a merge at the tree-engine level; the helpers here
//! (`pop_first`, `pop_last`, `insert_first`, `push_last`, `merge_from`)
//! are the building blocks for those operations.
//!
//! ## Thread Safety
//!
//! `LeafNode` itself is not synchronized. The page table wraps every node
//! in a reader-writer latch and the descent context arbitrates access; see
//! `btree::descent`.

use eyre::{ensure, Result};

use crate::config::{Key, KeyComparator, PageId, Value, INVALID_PAGE_ID};

use super::node::Operation;

#[derive(Debug)]
pub struct LeafNode {
    page_id: PageId,
    max_size: usize,
    entries: Vec<(Key, Value)>,
    next_page_id: PageId,
}

impl LeafNode {
    pub(crate) fn new(page_id: PageId, max_size: usize) -> Self {
        Self {
            page_id,
            max_size,
            entries: Vec::with_capacity(max_size + 1),
            next_page_id: INVALID_PAGE_ID,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Minimum occupancy of a non-root leaf.
    pub fn min_size(&self) -> usize {
        self.max_size.div_ceil(2)
    }

    pub fn next_page_id(&self) -> PageId {
        self.next_page_id
    }

    pub(crate) fn set_next_page_id(&mut self, next_page_id: PageId) {
        self.next_page_id = next_page_id;
    }

    /// Whether an operation arriving at this leaf can be absorbed without
    /// any structural change escaping the node. Governs when the descent
    /// may release ancestor latches.
    pub fn is_safe(&self, op: Operation) -> bool {
        match op {
            Operation::Insert => self.entries.len() + 1 < self.max_size,
            Operation::Delete => self.entries.len() > self.min_size(),
        }
    }

    /// Binary search for `key`: `Ok(slot)` when present, `Err(slot)` with
    /// the insertion point otherwise.
    pub fn search(&self, key: Key, cmp: KeyComparator) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by(|(k, _)| cmp(k, &key))
    }

    pub fn get(&self, key: Key, cmp: KeyComparator) -> Option<Value> {
        self.search(key, cmp).ok().map(|slot| self.entries[slot].1)
    }

    pub fn key_at(&self, slot: usize) -> Result<Key> {
        ensure!(
            slot < self.entries.len(),
            "leaf page {} slot {} out of bounds (size={})",
            self.page_id,
            slot,
            self.entries.len()
        );
        Ok(self.entries[slot].0)
    }

    pub fn first_key(&self) -> Option<Key> {
        self.entries.first().map(|(k, _)| *k)
    }

    pub fn entries(&self) -> &[(Key, Value)] {
        &self.entries
    }

    /// Inserts the entry at its sorted position. Returns `Ok(false)` without
    /// mutation when an equal key is already present. Exceeding capacity by
    /// more than the one-slot split headroom indicates an engine bug.
    pub(crate) fn insert(&mut self, key: Key, value: Value, cmp: KeyComparator) -> Result<bool> {
        ensure!(
            self.entries.len() <= self.max_size,
            "leaf page {} over capacity (size={}, max={})",
            self.page_id,
            self.entries.len(),
            self.max_size
        );
        match self.search(key, cmp) {
            Ok(_) => Ok(false),
            Err(slot) => {
                self.entries.insert(slot, (key, value));
                Ok(true)
            }
        }
    }

    /// Removes and returns the entry at `slot`.
    pub(crate) fn delete(&mut self, slot: usize) -> Result<(Key, Value)> {
        ensure!(
            slot < self.entries.len(),
            "leaf page {} delete slot {} out of bounds (size={})",
            self.page_id,
            slot,
            self.entries.len()
        );
        Ok(self.entries.remove(slot))
    }

    /// Prepends an entry borrowed from the left sibling. The caller
    /// guarantees `key` sorts before every existing entry.
    pub(crate) fn insert_first(&mut self, key: Key, value: Value) -> Result<()> {
        ensure!(
            self.entries.len() < self.max_size,
            "leaf page {} cannot prepend at capacity (max={})",
            self.page_id,
            self.max_size
        );
        self.entries.insert(0, (key, value));
        Ok(())
    }

    /// Appends an entry borrowed from the right sibling. The caller
    /// guarantees `key` sorts after every existing entry.
    pub(crate) fn push_last(&mut self, key: Key, value: Value) -> Result<()> {
        ensure!(
            self.entries.len() < self.max_size,
            "leaf page {} cannot append at capacity (max={})",
            self.page_id,
            self.max_size
        );
        self.entries.push((key, value));
        Ok(())
    }

    pub(crate) fn pop_first(&mut self) -> Option<(Key, Value)> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub(crate) fn pop_last(&mut self) -> Option<(Key, Value)> {
        self.entries.pop()
    }

    /// Moves the upper half of this leaf's entries into the empty `right`
    /// sibling and returns the separator to promote: the first key of the
    /// new sibling, which also remains in the sibling. Sibling-chain
    /// rewiring is the caller's job.
    pub(crate) fn split_into(&mut self, right: &mut LeafNode) -> Result<Key> {
        ensure!(
            right.entries.is_empty(),
            "split target leaf page {} is not empty",
            right.page_id
        );
        ensure!(
            self.entries.len() >= 2,
            "leaf page {} too small to split (size={})",
            self.page_id,
            self.entries.len()
        );
        let split = self.entries.len() / 2;
        right.entries = self.entries.split_off(split);
        Ok(right.entries[0].0)
    }

    /// Appends every entry of `victim` after this leaf's entries. The
    /// caller guarantees `victim` is the immediate right sibling, so the
    /// combined sequence stays sorted.
    pub(crate) fn merge_from(&mut self, victim: &mut LeafNode) -> Result<()> {
        ensure!(
            self.entries.len() + victim.entries.len() <= self.max_size,
            "merging leaf pages {} and {} would exceed capacity ({} + {} > {})",
            self.page_id,
            victim.page_id,
            self.entries.len(),
            victim.entries.len(),
            self.max_size
        );
        self.entries.append(&mut victim.entries);
        Ok(())
    }

    /// Replaces the entry array wholesale. Snapshot restore only.
    pub(crate) fn set_entries(&mut self, entries: Vec<(Key, Value)>) -> Result<()> {
        ensure!(
            entries.len() <= self.max_size,
            "leaf page {} restored with {} entries over capacity {}",
            self.page_id,
            entries.len(),
            self.max_size
        );
        self.entries = entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_key_cmp;

    fn val(byte: u8) -> Value {
        [byte; 16]
    }

    fn leaf_with(keys: &[Key]) -> LeafNode {
        let mut leaf = LeafNode::new(1, 5);
        for &k in keys {
            leaf.insert(k, val(k as u8), default_key_cmp).unwrap();
        }
        leaf
    }

    #[test]
    fn insert_keeps_entries_sorted() {
        let leaf = leaf_with(&[30, 10, 20]);
        let keys: Vec<Key> = leaf.entries().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![10, 20, 30]);
    }

    #[test]
    fn insert_rejects_duplicate_without_mutation() {
        let mut leaf = leaf_with(&[10]);
        assert!(!leaf.insert(10, val(0xFF), default_key_cmp).unwrap());
        assert_eq!(leaf.get(10, default_key_cmp), Some(val(10)));
        assert_eq!(leaf.len(), 1);
    }

    #[test]
    fn search_reports_insertion_point_for_missing_key() {
        let leaf = leaf_with(&[10, 20, 30]);
        assert_eq!(leaf.search(20, default_key_cmp), Ok(1));
        assert_eq!(leaf.search(25, default_key_cmp), Err(2));
        assert_eq!(leaf.search(5, default_key_cmp), Err(0));
    }

    #[test]
    fn split_moves_upper_half_and_promotes_first_right_key() {
        let mut leaf = leaf_with(&[1, 2, 3, 4]);
        let mut right = LeafNode::new(2, 5);
        let promoted = leaf.split_into(&mut right).unwrap();
        assert_eq!(promoted, 3);
        assert_eq!(leaf.len(), 2);
        assert_eq!(right.len(), 2);
        assert_eq!(right.first_key(), Some(3));
    }

    #[test]
    fn merge_appends_right_sibling_entries() {
        let mut left = leaf_with(&[1, 2]);
        let mut right = leaf_with(&[3, 4]);
        left.merge_from(&mut right).unwrap();
        let keys: Vec<Key> = left.entries().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 3, 4]);
        assert_eq!(right.len(), 0);
    }

    #[test]
    fn merge_over_capacity_is_an_error() {
        let mut left = leaf_with(&[1, 2, 3]);
        let mut right = leaf_with(&[4, 5, 6]);
        let err = left.merge_from(&mut right).unwrap_err();
        assert!(err.to_string().contains("exceed capacity"));
    }

    #[test]
    fn safety_predicates_use_split_and_underflow_margins() {
        // max_size = 5 -> insert-safe below 4 entries, delete-safe above 3.
        let leaf = leaf_with(&[1, 2, 3]);
        assert!(leaf.is_safe(Operation::Insert));
        assert!(!leaf.is_safe(Operation::Delete));
        let leaf = leaf_with(&[1, 2, 3, 4]);
        assert!(!leaf.is_safe(Operation::Insert));
        assert!(leaf.is_safe(Operation::Delete));
    }

    #[test]
    fn redistribution_helpers_preserve_order() {
        let mut leaf = leaf_with(&[20, 30]);
        leaf.insert_first(10, val(10)).unwrap();
        leaf.push_last(40, val(40)).unwrap();
        assert_eq!(leaf.pop_first().unwrap().0, 10);
        assert_eq!(leaf.pop_last().unwrap().0, 40);
        assert_eq!(leaf.len(), 2);
    }
}
