//! # B+Tree Index
//!
//! A thread-safe in-memory B+ tree mapping fixed-width integer keys to
//! fixed-width byte-array values.
//!
//! - [`leaf`] and [`interior`] implement the two node kinds: fixed-capacity
//!   sorted arrays with local split/merge/redistribution operations.
//! - [`page_table`] owns every live node behind a short mutex and allocates
//!   monotonic page ids.
//! - [`descent`] implements latch coupling: a per-operation context that
//!   owns the root-latch guard and the per-node latch path, releasing
//!   ancestors as soon as the current node is safe for the operation.
//! - [`tree`] ties it together: descent, splits with root growth, removal
//!   with redistribution, merges and root collapse, and point lookups.
//! - [`stats`] counts structural events for observability.

pub mod descent;
pub mod interior;
pub mod leaf;
pub mod node;
pub mod page_table;
pub mod stats;
pub mod tree;

pub use descent::{DescentContext, ReadLatch, WriteLatch};
pub use interior::InteriorNode;
pub use leaf::LeafNode;
pub use node::{Node, Operation};
pub use page_table::{PageRef, PageTable};
pub use stats::{TreeStats, TreeStatsSnapshot};
pub use tree::{BPlusTree, TreeInsert};
