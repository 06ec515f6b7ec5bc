//! # Crabtree - Concurrent In-Memory B+Tree Index
//!
//! Crabtree is the index core of an embedded storage engine: a thread-safe
//! B+ tree mapping fixed-width `i64` keys to fixed-width 16-byte values,
//! with a binary snapshot codec that persists and restores the entire tree
//! structure - page ids included - to a single file.
//!
//! ## Quick Start
//!
//! ```
//! use crabtree::{BPlusTree, TreeInsert};
//!
//! # fn main() -> eyre::Result<()> {
//! let tree = BPlusTree::with_defaults("users_pk")?;
//!
//! assert!(tree.insert(42, *b"0123456789abcdef")?.is_ok());
//! assert_eq!(tree.insert(42, [0u8; 16])?, TreeInsert::DuplicateKey);
//! assert_eq!(tree.search(42)?, Some(*b"0123456789abcdef"));
//!
//! tree.remove(42)?;
//! assert!(tree.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------+
//! |        Public API (BPlusTree)        |
//! +--------------------------------------+
//! |  Tree engine: descent, split, merge  |
//! +-------------------+------------------+
//! |  Descent context  |  Snapshot codec  |
//! |  (latch crabbing) |  (BFS, MYBPTREE) |
//! +-------------------+------------------+
//! |  Node layer: leaf / interior arrays  |
//! +--------------------------------------+
//! |  Page table: id -> latched node      |
//! +--------------------------------------+
//! ```
//!
//! ## Concurrency
//!
//! Any number of threads may call [`BPlusTree::search`],
//! [`BPlusTree::insert`] and [`BPlusTree::remove`] concurrently. Descents
//! use latch coupling: each node carries a reader-writer latch, writers
//! release all ancestor latches once the current node is *safe* (its
//! occupancy guarantees no structural change can propagate above it), and
//! readers release each parent as soon as the child is latched. Point
//! operations are linearizable.
//!
//! The snapshot codec and the diagnostic helpers ([`BPlusTree::keys`],
//! [`BPlusTree::check_integrity`], [`BPlusTree::clear`]) assume a
//! quiescent tree; they do not latch-couple.
//!
//! ## Module Overview
//!
//! - [`btree`]: node layer, page table, descent context, tree engine
//! - [`snapshot`]: binary snapshot serializer and restorer
//! - [`config`]: fixed-width types and capacity constants

pub mod btree;
pub mod config;
pub mod snapshot;

pub use btree::{BPlusTree, TreeInsert, TreeStats, TreeStatsSnapshot};
pub use config::{
    default_key_cmp, Key, KeyComparator, PageId, Value, DEFAULT_INTERIOR_MAX_SIZE,
    DEFAULT_LEAF_MAX_SIZE, INVALID_PAGE_ID, VALUE_SIZE,
};
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
