//! # Crabtree Configuration
//!
//! This module centralizes the fixed-width types and capacity constants the
//! rest of the crate builds on. Constants that depend on each other are
//! co-located and tied together with compile-time assertions so they cannot
//! drift apart.
//!
//! ## Dependency Graph
//!
//! ```text
//! VALUE_SIZE (16 bytes)
//!       │
//!       └─> Value ([u8; VALUE_SIZE]) - also the per-entry payload width in
//!           the snapshot format, so changing it changes the file format.
//!
//! MIN_NODE_CAPACITY (3)
//!       │
//!       ├─> DEFAULT_LEAF_MAX_SIZE (must be >=)
//!       │
//!       └─> DEFAULT_INTERIOR_MAX_SIZE (must be >=)
//!             Below three slots a split cannot leave both halves with a
//!             usable entry plus room to absorb a borrowed one.
//! ```
//!
//! ## Capacity Semantics
//!
//! A leaf holds up to `max_size` entries and splits when one more would not
//! fit. An interior node holds up to `max_size` children; slot 0 carries the
//! leftmost child pointer and a dummy key, so `max_size` children means
//! `max_size - 1` real separator keys. Minimum occupancy is derived from
//! `max_size` inside the node types (see `btree::leaf` and
//! `btree::interior`).

use std::cmp::Ordering;

/// Identifier of a node registered in the page table. Stable for the life
/// of the tree; never reused after the node is destroyed.
pub type PageId = i32;

/// Sentinel page id meaning "no page" (empty tree root, end of leaf chain).
pub const INVALID_PAGE_ID: PageId = -1;

/// The first id handed out by a fresh page table.
pub const FIRST_PAGE_ID: PageId = 1;

/// Index keys are fixed-width signed integers.
pub type Key = i64;

/// Width of an index value in bytes.
pub const VALUE_SIZE: usize = 16;

/// Index values are opaque fixed-width byte arrays.
pub type Value = [u8; VALUE_SIZE];

/// Key ordering injected at tree construction.
pub type KeyComparator = fn(&Key, &Key) -> Ordering;

/// The comparator used by [`BPlusTree::with_defaults`](crate::BPlusTree::with_defaults).
pub fn default_key_cmp(lhs: &Key, rhs: &Key) -> Ordering {
    lhs.cmp(rhs)
}

/// Smallest supported node capacity, for both node kinds.
pub const MIN_NODE_CAPACITY: usize = 3;

/// Default leaf capacity in entries.
pub const DEFAULT_LEAF_MAX_SIZE: usize = 128;

/// Default interior capacity in children.
pub const DEFAULT_INTERIOR_MAX_SIZE: usize = 128;

const _: () = assert!(MIN_NODE_CAPACITY >= 3);
const _: () = assert!(DEFAULT_LEAF_MAX_SIZE >= MIN_NODE_CAPACITY);
const _: () = assert!(DEFAULT_INTERIOR_MAX_SIZE >= MIN_NODE_CAPACITY);
const _: () = assert!(INVALID_PAGE_ID < FIRST_PAGE_ID);
