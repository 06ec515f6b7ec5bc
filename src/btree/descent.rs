//! # Descent Context
//!
//! A descent context is the single authority over the set of latches a
//! thread holds while inside one tree operation. It owns:
//!
//! - the guard on the tree-wide **root latch** (a reader-writer latch
//!   protecting the root *pointer*, not the root node),
//! - the **write path**: per-node write-latch guards from the highest
//!   still-latched ancestor down to the current node, and
//! - the **read path**: at most the current node's read-latch guard plus
//!   the parent being released.
//!
//! ## Latch Coupling
//!
//! Writers latch each node on the way down and call [`crab`] after every
//! child acquisition. When the newest node is *safe* for the operation
//! (its occupancy guarantees no split, borrow, or merge can propagate
//! above it), every ancestor guard is released from the top of the path down,
//! and the root-latch guard with them (a safe node also pins the root
//! pointer in place). When the newest node is unsafe, the ancestors stay
//! latched because the upward rebalance may modify them.
//!
//! Readers release ancestors unconditionally: point lookups never look
//! back up.
//!
//! ## Ordering
//!
//! The root latch is acquired before any node latch and is never
//! re-acquired after release within one operation; node latches are
//! acquired strictly top-down; sibling latches during rebalancing are
//! acquired under a held parent in (left, right) order. This yields a
//! total acquisition order, so descents cannot deadlock.
//!
//! All still-held guards release in deterministic order (oldest ancestor
//! first, root guard last) when the context drops, on every exit path
//! including errors.

use eyre::{eyre, Result};
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;

use crate::config::{PageId, INVALID_PAGE_ID};

use super::node::{Node, Operation};
use super::page_table::PageRef;

/// Owned write latch on a single node. Holding one keeps the node alive
/// even if the page table entry is destroyed mid-rebalance.
pub struct WriteLatch {
    page_id: PageId,
    guard: ArcRwLockWriteGuard<RawRwLock, Node>,
}

impl WriteLatch {
    pub(crate) fn acquire(page: &PageRef) -> Self {
        let guard = page.write_arc();
        let page_id = guard.page_id();
        Self { page_id, guard }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn node(&self) -> &Node {
        &self.guard
    }

    pub fn node_mut(&mut self) -> &mut Node {
        &mut self.guard
    }
}

/// Owned read latch on a single node.
pub struct ReadLatch {
    page_id: PageId,
    guard: ArcRwLockReadGuard<RawRwLock, Node>,
}

impl ReadLatch {
    pub(crate) fn acquire(page: &PageRef) -> Self {
        let guard = page.read_arc();
        let page_id = guard.page_id();
        Self { page_id, guard }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn node(&self) -> &Node {
        &self.guard
    }
}

pub struct DescentContext<'t> {
    root_cell: &'t RwLock<PageId>,
    root_write: Option<RwLockWriteGuard<'t, PageId>>,
    root_read: Option<RwLockReadGuard<'t, PageId>>,
    /// Root id observed under the root latch at operation entry, kept
    /// valid for the whole operation even after the latch is released.
    root_page_id: PageId,
    write_path: SmallVec<[WriteLatch; 8]>,
    read_path: SmallVec<[ReadLatch; 2]>,
}

impl<'t> DescentContext<'t> {
    pub(crate) fn new(root_cell: &'t RwLock<PageId>) -> Self {
        Self {
            root_cell,
            root_write: None,
            root_read: None,
            root_page_id: INVALID_PAGE_ID,
            write_path: SmallVec::new(),
            read_path: SmallVec::new(),
        }
    }

    /// Acquires the root latch in write mode and snapshots the root
    /// pointer. Idempotent within one context.
    pub fn lock_root_write(&mut self) {
        debug_assert!(self.root_read.is_none(), "root latch already held shared");
        if self.root_write.is_none() {
            let guard = self.root_cell.write();
            self.root_page_id = *guard;
            self.root_write = Some(guard);
        }
    }

    /// Acquires the root latch in read mode and snapshots the root
    /// pointer. Idempotent within one context.
    pub fn lock_root_read(&mut self) {
        debug_assert!(self.root_write.is_none(), "root latch already held exclusive");
        if self.root_read.is_none() {
            let guard = self.root_cell.read();
            self.root_page_id = *guard;
            self.root_read = Some(guard);
        }
    }

    /// Releases the root latch in whichever mode it is held. The snapshot
    /// taken at acquisition stays readable.
    pub fn release_root_latch(&mut self) {
        self.root_write = None;
        self.root_read = None;
    }

    /// The root id observed at operation entry.
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Publishes a new root pointer. Only legal while the write-mode root
    /// latch is still held, which the crab rule guarantees for any
    /// operation that can reach a root change.
    pub fn set_root_page_id(&mut self, page_id: PageId) -> Result<()> {
        let guard = self
            .root_write
            .as_mut()
            .ok_or_else(|| eyre!("root pointer update without the root latch held"))?;
        **guard = page_id;
        self.root_page_id = page_id;
        Ok(())
    }

    /// Write-latches a node and appends it to the write path.
    pub fn push_write(&mut self, page: &PageRef) {
        self.write_path.push(WriteLatch::acquire(page));
    }

    /// Read-latches a node and appends it to the read path.
    pub fn push_read(&mut self, page: &PageRef) {
        self.read_path.push(ReadLatch::acquire(page));
    }

    /// The crabbing release rule: if the newest node on the write path is
    /// safe for `op`, no structural change can escape it, so every
    /// ancestor latch and the root-latch guard are released, keeping only
    /// the newest node.
    pub fn crab(&mut self, op: Operation) {
        let Some(current) = self.write_path.last() else {
            return;
        };
        if current.node().is_safe(op) {
            let keep_from = self.write_path.len() - 1;
            self.write_path.drain(..keep_from);
            self.release_root_latch();
        }
    }

    /// Unconditionally releases every read latch except the newest one.
    pub fn release_read_ancestors(&mut self) {
        if self.read_path.len() > 1 {
            let keep_from = self.read_path.len() - 1;
            self.read_path.drain(..keep_from);
        }
    }

    /// Detaches the newest write latch, transferring ownership to the
    /// caller. Used when walking back up the held path during splits and
    /// rebalances.
    pub fn pop_write(&mut self) -> Option<WriteLatch> {
        self.write_path.pop()
    }

    pub fn last_write(&self) -> Option<&WriteLatch> {
        self.write_path.last()
    }

    pub fn last_write_mut(&mut self) -> Option<&mut WriteLatch> {
        self.write_path.last_mut()
    }

    pub fn last_read(&self) -> Option<&ReadLatch> {
        self.read_path.last()
    }

    pub fn write_depth(&self) -> usize {
        self.write_path.len()
    }
}
