//! # B+Tree Engine
//!
//! This module implements the tree-level algorithms over the node layer:
//! descent, insertion with node splits and root growth, removal with
//! redistribution, merges and root collapse, and point lookups.
//!
//! ## Architecture Overview
//!
//! ```text
//!                     root pointer  (RwLock<PageId>)
//!                          |
//!                    [Interior 5]          page table: id -> latch(Node)
//!                    /          \
//!             [Leaf 2]        [Leaf 3]
//!                |---------------->|      (leaf chain, next_page_id)
//! ```
//!
//! All data lives in the leaves; interior nodes store separators and child
//! page ids. The engine never holds node references across operations: it
//! stores page ids and dereferences through the page table, and a descent
//! context carries the latch guards that keep dereferenced nodes valid.
//!
//! ## Insert Algorithm
//!
//! ```text
//! 1. Latch the root pointer in write mode, snapshot the root id
//! 2. Empty tree: allocate a leaf, insert, publish it as root
//! 3. Descend, write-latching each node; after latching a child, release
//!    all ancestors if the child is safe for INSERT (crabbing)
//! 4. At the leaf: reject duplicates; insert when the entry fits
//! 5. Overflow: insert, move the upper half into a new sibling, rewire the
//!    leaf chain, and push the promoted separator into the parent
//! 6. A full parent splits the same way, recursively; a root split
//!    allocates a fresh interior root over the two halves
//! ```
//!
//! ## Remove Algorithm
//!
//! ```text
//! 1. Latch the root pointer in write mode; empty tree is a no-op
//! 2. Descend with the DELETE safety predicate driving the crab rule
//! 3. Absent key: no change. Safe leaf (or root leaf): plain delete; a
//!    root leaf emptied by the delete is destroyed and the root cleared
//! 4. Underflow: delete, then rebalance: borrow from the left sibling,
//!    else the right, else merge with whichever sibling the union fits
//! 5. An interior node underflowed by a merge rebalances the same way,
//!    with the rotation running through the parent separator
//! 6. An interior root left with one child hands the tree to that child
//! ```
//!
//! ## Latching
//!
//! See `btree::descent` for the coupling protocol. Sibling latches during
//! rebalancing are acquired while the parent is exclusively latched, in
//! (left, right) order, so no two rebalances can close a cycle.

use eyre::{bail, ensure, eyre, Result};
use parking_lot::RwLock;
use std::cmp::Ordering;

use crate::config::{
    default_key_cmp, Key, KeyComparator, PageId, Value, DEFAULT_INTERIOR_MAX_SIZE,
    DEFAULT_LEAF_MAX_SIZE, INVALID_PAGE_ID, MIN_NODE_CAPACITY,
};

use super::descent::{DescentContext, WriteLatch};
use super::node::{Node, Operation};
use super::page_table::PageTable;
use super::stats::TreeStats;

/// Outcome of [`BPlusTree::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeInsert {
    Ok,
    /// An equal key is already present; the tree was not modified.
    DuplicateKey,
}

impl TreeInsert {
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, TreeInsert::Ok)
    }
}

#[derive(Debug)]
pub struct BPlusTree {
    name: String,
    cmp: KeyComparator,
    pub(crate) leaf_max_size: usize,
    pub(crate) interior_max_size: usize,
    pub(crate) pages: PageTable,
    /// The root pointer and its dedicated latch. Kept outside the page
    /// table: the pointer has its own lifecycle and coupling rules.
    pub(crate) root: RwLock<PageId>,
    stats: TreeStats,
}

impl BPlusTree {
    /// Creates an empty tree with an injected comparator and per-kind node
    /// capacities.
    pub fn open(
        name: impl Into<String>,
        cmp: KeyComparator,
        leaf_max_size: usize,
        interior_max_size: usize,
    ) -> Result<Self> {
        ensure!(
            leaf_max_size >= MIN_NODE_CAPACITY,
            "leaf capacity {} below minimum {}",
            leaf_max_size,
            MIN_NODE_CAPACITY
        );
        ensure!(
            interior_max_size >= MIN_NODE_CAPACITY,
            "interior capacity {} below minimum {}",
            interior_max_size,
            MIN_NODE_CAPACITY
        );
        ensure!(
            leaf_max_size <= i32::MAX as usize && interior_max_size <= i32::MAX as usize,
            "node capacity exceeds the snapshot representation"
        );
        Ok(Self {
            name: name.into(),
            cmp,
            leaf_max_size,
            interior_max_size,
            pages: PageTable::new(),
            root: RwLock::new(INVALID_PAGE_ID),
            stats: TreeStats::default(),
        })
    }

    /// Creates an empty tree with the integer comparator and default
    /// capacities.
    pub fn with_defaults(name: impl Into<String>) -> Result<Self> {
        Self::open(
            name,
            default_key_cmp,
            DEFAULT_LEAF_MAX_SIZE,
            DEFAULT_INTERIOR_MAX_SIZE,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn interior_max_size(&self) -> usize {
        self.interior_max_size
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root.read()
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id() == INVALID_PAGE_ID
    }

    /// Number of live nodes.
    pub fn page_count(&self) -> usize {
        self.pages.count()
    }

    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    /// Point lookup. Descends under read latches, releasing each ancestor
    /// as soon as the child is latched.
    pub fn search(&self, key: Key) -> Result<Option<Value>> {
        self.stats.inc_searches();
        let mut ctx = DescentContext::new(&self.root);
        ctx.lock_root_read();
        if ctx.root_page_id() == INVALID_PAGE_ID {
            return Ok(None);
        }
        let root = self.pages.get(ctx.root_page_id())?;
        ctx.push_read(&root);
        ctx.release_root_latch();
        loop {
            let next = {
                let latch = ctx
                    .last_read()
                    .ok_or_else(|| eyre!("read descent lost its latch path"))?;
                match latch.node() {
                    Node::Leaf(leaf) => return Ok(leaf.get(key, self.cmp)),
                    Node::Interior(interior) => {
                        interior.child_at(interior.child_index_for(key, self.cmp))?
                    }
                }
            };
            let child = self.pages.get(next)?;
            ctx.push_read(&child);
            ctx.release_read_ancestors();
        }
    }

    /// Inserts a key-value pair. Returns [`TreeInsert::DuplicateKey`]
    /// without modifying the tree when an equal key is present.
    pub fn insert(&self, key: Key, value: Value) -> Result<TreeInsert> {
        self.stats.inc_inserts();
        let mut ctx = DescentContext::new(&self.root);
        ctx.lock_root_write();

        if ctx.root_page_id() == INVALID_PAGE_ID {
            let (page_id, page) = self.pages.create_leaf(self.leaf_max_size);
            page.write().as_leaf_mut()?.insert(key, value, self.cmp)?;
            ctx.set_root_page_id(page_id)?;
            return Ok(TreeInsert::Ok);
        }

        self.descend_to_leaf(&mut ctx, key, Operation::Insert)?;

        let (promoted, new_id, new_latch) = {
            let latch = ctx
                .last_write_mut()
                .ok_or_else(|| eyre!("write descent lost its latch path"))?;
            let leaf_id = latch.page_id();
            let leaf = latch.node_mut().as_leaf_mut()?;
            if leaf.search(key, self.cmp).is_ok() {
                return Ok(TreeInsert::DuplicateKey);
            }
            if leaf.len() < leaf.max_size() {
                ensure!(
                    leaf.insert(key, value, self.cmp)?,
                    "leaf page {} rejected key {}",
                    leaf_id,
                    key
                );
                return Ok(TreeInsert::Ok);
            }

            // Overflow: take the pending entry, then move the upper half
            // into a fresh right sibling and rewire the chain.
            ensure!(
                leaf.insert(key, value, self.cmp)?,
                "leaf page {} rejected key {}",
                leaf_id,
                key
            );
            let (new_id, new_page) = self.pages.create_leaf(self.leaf_max_size);
            let mut new_latch = WriteLatch::acquire(&new_page);
            let promoted = {
                let new_leaf = new_latch.node_mut().as_leaf_mut()?;
                let promoted = leaf.split_into(new_leaf)?;
                new_leaf.set_next_page_id(leaf.next_page_id());
                promoted
            };
            leaf.set_next_page_id(new_id);
            self.stats.inc_leaf_splits();
            (promoted, new_id, new_latch)
        };

        let old_latch = ctx
            .pop_write()
            .ok_or_else(|| eyre!("split propagation lost the leaf latch"))?;
        self.insert_into_parent(&mut ctx, old_latch, promoted, new_id, new_latch)?;
        Ok(TreeInsert::Ok)
    }

    /// Removes a key. Removing an absent key is a no-op, not an error.
    pub fn remove(&self, key: Key) -> Result<()> {
        self.stats.inc_removes();
        let mut ctx = DescentContext::new(&self.root);
        ctx.lock_root_write();
        if ctx.root_page_id() == INVALID_PAGE_ID {
            return Ok(());
        }

        self.descend_to_leaf(&mut ctx, key, Operation::Delete)?;

        let (needs_rebalance, root_now_empty) = {
            let root_id = ctx.root_page_id();
            let latch = ctx
                .last_write_mut()
                .ok_or_else(|| eyre!("write descent lost its latch path"))?;
            let leaf_is_root = latch.page_id() == root_id;
            let leaf = latch.node_mut().as_leaf_mut()?;
            let slot = match leaf.search(key, self.cmp) {
                Ok(slot) => slot,
                Err(_) => return Ok(()),
            };
            let needs_rebalance = !leaf_is_root && !leaf.is_safe(Operation::Delete);
            leaf.delete(slot)?;
            (needs_rebalance, leaf_is_root && leaf.is_empty())
        };

        if root_now_empty {
            let latch = ctx
                .pop_write()
                .ok_or_else(|| eyre!("root delete lost the leaf latch"))?;
            let page_id = latch.page_id();
            ctx.set_root_page_id(INVALID_PAGE_ID)?;
            drop(latch);
            self.pages.destroy(page_id);
            return Ok(());
        }
        if !needs_rebalance {
            return Ok(());
        }

        let leaf_latch = ctx
            .pop_write()
            .ok_or_else(|| eyre!("rebalance lost the leaf latch"))?;
        self.rebalance_leaf(&mut ctx, leaf_latch)
    }

    /// Drops every page and resets the root pointer and id allocator.
    ///
    /// Like the snapshot codec, this assumes no concurrent mutation; a
    /// descent already past the root latch keeps its nodes alive through
    /// its own guards but its effects are discarded.
    pub fn clear(&self) {
        let mut root = self.root.write();
        self.pages.clear();
        *root = INVALID_PAGE_ID;
    }

    /// All keys in ascending order, read off the leaf chain.
    ///
    /// Diagnostic helper for a quiescent tree; it does not latch-couple.
    pub fn keys(&self) -> Result<Vec<Key>> {
        let root_id = self.root_page_id();
        if root_id == INVALID_PAGE_ID {
            return Ok(Vec::new());
        }
        let mut page = self.pages.get(root_id)?;
        loop {
            let next = {
                let node = page.read();
                match &*node {
                    Node::Leaf(_) => break,
                    Node::Interior(interior) => interior.child_at(0)?,
                }
            };
            page = self.pages.get(next)?;
        }
        let mut keys = Vec::new();
        loop {
            let next = {
                let node = page.read();
                let leaf = node.as_leaf()?;
                keys.extend(leaf.entries().iter().map(|(k, _)| *k));
                leaf.next_page_id()
            };
            if next == INVALID_PAGE_ID {
                break;
            }
            page = self.pages.get(next)?;
        }
        Ok(keys)
    }

    /// Validates the full set of structural invariants: equal leaf depth,
    /// occupancy floors, in-node ordering, separator agreement with
    /// subtree key ranges, and the leaf chain. Requires a quiescent tree.
    pub fn check_integrity(&self) -> Result<()> {
        let root_id = self.root_page_id();
        if root_id == INVALID_PAGE_ID {
            ensure!(
                self.pages.count() == 0,
                "empty tree still holds {} pages",
                self.pages.count()
            );
            return Ok(());
        }

        let mut chain = Vec::new();
        let mut visited = 0usize;
        self.verify_subtree(root_id, root_id, None, None, &mut chain, &mut visited)?;
        ensure!(
            visited == self.pages.count(),
            "page table holds {} pages but the tree reaches {}",
            self.pages.count(),
            visited
        );

        for window in chain.windows(2) {
            let page = self.pages.get(window[0])?;
            let node = page.read();
            let next = node.as_leaf()?.next_page_id();
            ensure!(
                next == window[1],
                "leaf chain breaks after page {}: expected {}, found {}",
                window[0],
                window[1],
                next
            );
        }
        let last = *chain
            .last()
            .ok_or_else(|| eyre!("non-empty tree has no leaves"))?;
        let page = self.pages.get(last)?;
        let node = page.read();
        let next = node.as_leaf()?.next_page_id();
        ensure!(
            next == INVALID_PAGE_ID,
            "rightmost leaf page {} still points at page {}",
            last,
            next
        );
        Ok(())
    }

    fn verify_subtree(
        &self,
        page_id: PageId,
        root_id: PageId,
        lower: Option<Key>,
        upper: Option<Key>,
        chain: &mut Vec<PageId>,
        visited: &mut usize,
    ) -> Result<usize> {
        let page = self.pages.get(page_id)?;
        let node = page.read();
        *visited += 1;
        ensure!(
            node.page_id() == page_id,
            "page {} registered under id {}",
            node.page_id(),
            page_id
        );

        match &*node {
            Node::Leaf(leaf) => {
                ensure!(
                    leaf.len() <= leaf.max_size(),
                    "leaf page {} over capacity ({} > {})",
                    page_id,
                    leaf.len(),
                    leaf.max_size()
                );
                if page_id == root_id {
                    ensure!(
                        !leaf.is_empty(),
                        "non-empty tree with an empty root leaf {}",
                        page_id
                    );
                } else {
                    ensure!(
                        leaf.len() >= leaf.min_size(),
                        "leaf page {} under-occupied ({} < {})",
                        page_id,
                        leaf.len(),
                        leaf.min_size()
                    );
                }
                let entries = leaf.entries();
                for pair in entries.windows(2) {
                    ensure!(
                        (self.cmp)(&pair[0].0, &pair[1].0) == Ordering::Less,
                        "leaf page {} keys out of order",
                        page_id
                    );
                }
                if let Some(lo) = lower {
                    ensure!(
                        entries
                            .first()
                            .map_or(true, |(k, _)| (self.cmp)(&lo, k) != Ordering::Greater),
                        "leaf page {} violates its lower bound {}",
                        page_id,
                        lo
                    );
                }
                if let Some(hi) = upper {
                    ensure!(
                        entries
                            .last()
                            .map_or(true, |(k, _)| (self.cmp)(k, &hi) == Ordering::Less),
                        "leaf page {} violates its upper bound {}",
                        page_id,
                        hi
                    );
                }
                chain.push(page_id);
                Ok(0)
            }
            Node::Interior(interior) => {
                ensure!(
                    interior.len() >= 2,
                    "interior page {} has fewer than two children",
                    page_id
                );
                ensure!(
                    interior.len() <= interior.max_size(),
                    "interior page {} over capacity ({} > {})",
                    page_id,
                    interior.len(),
                    interior.max_size()
                );
                let entries = interior.entries();
                for pair in entries[1..].windows(2) {
                    ensure!(
                        (self.cmp)(&pair[0].0, &pair[1].0) == Ordering::Less,
                        "interior page {} separators out of order",
                        page_id
                    );
                }
                for (sep, _) in &entries[1..] {
                    if let Some(lo) = lower {
                        ensure!(
                            (self.cmp)(&lo, sep) != Ordering::Greater,
                            "interior page {} separator {} below its lower bound {}",
                            page_id,
                            sep,
                            lo
                        );
                    }
                    if let Some(hi) = upper {
                        ensure!(
                            (self.cmp)(sep, &hi) == Ordering::Less,
                            "interior page {} separator {} above its upper bound {}",
                            page_id,
                            sep,
                            hi
                        );
                    }
                }
                let mut depth = None;
                for (i, (sep, child)) in entries.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(*sep) };
                    let child_upper = if i + 1 < entries.len() {
                        Some(entries[i + 1].0)
                    } else {
                        upper
                    };
                    let child_depth = self.verify_subtree(
                        *child,
                        root_id,
                        child_lower,
                        child_upper,
                        chain,
                        visited,
                    )?;
                    match depth {
                        None => depth = Some(child_depth),
                        Some(expected) => ensure!(
                            child_depth == expected,
                            "leaves at unequal depth under interior page {}",
                            page_id
                        ),
                    }
                }
                Ok(depth.unwrap_or(0) + 1)
            }
        }
    }

    /// Write-mode descent from the snapshotted root to the target leaf,
    /// applying the crab rule after every latch acquisition.
    fn descend_to_leaf(
        &self,
        ctx: &mut DescentContext<'_>,
        key: Key,
        op: Operation,
    ) -> Result<()> {
        let root = self.pages.get(ctx.root_page_id())?;
        ctx.push_write(&root);
        ctx.crab(op);
        loop {
            let next = {
                let latch = ctx
                    .last_write()
                    .ok_or_else(|| eyre!("write descent lost its latch path"))?;
                match latch.node() {
                    Node::Leaf(_) => return Ok(()),
                    Node::Interior(interior) => {
                        interior.child_at(interior.child_index_for(key, self.cmp))?
                    }
                }
            };
            let child = self.pages.get(next)?;
            ctx.push_write(&child);
            ctx.crab(op);
        }
    }

    /// Pushes the separator produced by a split into the parent on top of
    /// the held path, splitting upward as needed. Latches on `old` and
    /// `new` travel with the call and release once the parent is settled.
    fn insert_into_parent(
        &self,
        ctx: &mut DescentContext<'_>,
        old: WriteLatch,
        promoted: Key,
        new_id: PageId,
        new: WriteLatch,
    ) -> Result<()> {
        if old.page_id() == ctx.root_page_id() {
            let (root_id, root_page) = self.pages.create_interior(self.interior_max_size);
            root_page
                .write()
                .as_interior_mut()?
                .populate_root(old.page_id(), promoted, new_id);
            ctx.set_root_page_id(root_id)?;
            self.stats.inc_root_grows();
            return Ok(());
        }

        let (next_promoted, sibling_id, sibling_latch) = {
            let latch = ctx.last_write_mut().ok_or_else(|| {
                eyre!("split of page {} has no parent on the latch path", old.page_id())
            })?;
            let parent = latch.node_mut().as_interior_mut()?;
            if parent.len() < parent.max_size() {
                parent.insert(promoted, new_id, self.cmp)?;
                return Ok(());
            }

            parent.insert(promoted, new_id, self.cmp)?;
            let (sibling_id, sibling_page) = self.pages.create_interior(self.interior_max_size);
            let mut sibling_latch = WriteLatch::acquire(&sibling_page);
            let next_promoted = parent.split_into(sibling_latch.node_mut().as_interior_mut()?)?;
            self.stats.inc_interior_splits();
            (next_promoted, sibling_id, sibling_latch)
        };

        drop(old);
        drop(new);
        let parent_latch = ctx
            .pop_write()
            .ok_or_else(|| eyre!("split propagation lost the parent latch"))?;
        self.insert_into_parent(ctx, parent_latch, next_promoted, sibling_id, sibling_latch)
    }

    /// Restores the occupancy of an underflowed leaf: borrow from the left
    /// sibling, else the right, else merge with whichever sibling the
    /// union fits. The parent separator entry tracks every outcome.
    fn rebalance_leaf(&self, ctx: &mut DescentContext<'_>, mut leaf_latch: WriteLatch) -> Result<()> {
        let leaf_id = leaf_latch.page_id();
        let parent_latch = ctx.last_write_mut().ok_or_else(|| {
            eyre!("underflowed leaf page {} has no parent on the latch path", leaf_id)
        })?;
        let parent_id = parent_latch.page_id();
        let parent = parent_latch.node_mut().as_interior_mut()?;
        let leaf = leaf_latch.node_mut().as_leaf_mut()?;

        let slot = parent
            .child_slot_of(leaf_id)
            .ok_or_else(|| eyre!("leaf page {} missing from parent page {}", leaf_id, parent_id))?;

        let mut left_latch = if slot > 0 {
            Some(WriteLatch::acquire(&self.pages.get(parent.child_at(slot - 1)?)?))
        } else {
            None
        };
        let mut right_latch = if slot + 1 < parent.len() {
            Some(WriteLatch::acquire(&self.pages.get(parent.child_at(slot + 1)?)?))
        } else {
            None
        };

        if let Some(latch) = left_latch.as_mut() {
            let left_id = latch.page_id();
            let left = latch.node_mut().as_leaf_mut()?;
            if left.is_safe(Operation::Delete) {
                let (borrowed_key, borrowed_value) = left
                    .pop_last()
                    .ok_or_else(|| eyre!("leaf page {} has nothing to lend", left_id))?;
                leaf.insert_first(borrowed_key, borrowed_value)?;
                parent.set_key_at(slot, borrowed_key)?;
                self.stats.inc_leaf_borrows();
                return Ok(());
            }
        }
        if let Some(latch) = right_latch.as_mut() {
            let right_id = latch.page_id();
            let right = latch.node_mut().as_leaf_mut()?;
            if right.is_safe(Operation::Delete) {
                let (borrowed_key, borrowed_value) = right
                    .pop_first()
                    .ok_or_else(|| eyre!("leaf page {} has nothing to lend", right_id))?;
                leaf.push_last(borrowed_key, borrowed_value)?;
                let new_first = right
                    .first_key()
                    .ok_or_else(|| eyre!("leaf page {} emptied by lending", right_id))?;
                parent.set_key_at(slot + 1, new_first)?;
                self.stats.inc_leaf_borrows();
                return Ok(());
            }
        }

        let leaf_max = leaf.max_size();
        let right_fits = right_latch
            .as_ref()
            .is_some_and(|l| leaf.len() + l.node().len() <= leaf_max);
        let left_fits = left_latch
            .as_ref()
            .is_some_and(|l| leaf.len() + l.node().len() <= leaf_max);

        if right_fits {
            let mut victim_latch = match right_latch.take() {
                Some(latch) => latch,
                None => bail!("right sibling latch vanished during merge"),
            };
            let victim_id = victim_latch.page_id();
            let victim = victim_latch.node_mut().as_leaf_mut()?;
            leaf.merge_from(victim)?;
            leaf.set_next_page_id(victim.next_page_id());
            parent.delete(slot + 1)?;
            drop(victim_latch);
            self.pages.destroy(victim_id);
            self.stats.inc_leaf_merges();
            drop(leaf_latch);
        } else if left_fits {
            let mut survivor_latch = match left_latch.take() {
                Some(latch) => latch,
                None => bail!("left sibling latch vanished during merge"),
            };
            let leaf_next = leaf.next_page_id();
            let survivor = survivor_latch.node_mut().as_leaf_mut()?;
            survivor.merge_from(leaf)?;
            survivor.set_next_page_id(leaf_next);
            parent.delete(slot)?;
            drop(survivor_latch);
            drop(leaf_latch);
            self.pages.destroy(leaf_id);
            self.stats.inc_leaf_merges();
        } else {
            bail!("leaf page {} can neither borrow nor merge", leaf_id);
        }

        let parent_underflow = parent.len() <= parent.min_size();
        drop(left_latch);
        drop(right_latch);
        if parent_underflow {
            let parent_latch = ctx
                .pop_write()
                .ok_or_else(|| eyre!("rebalance lost the parent latch"))?;
            return self.rebalance_interior(ctx, parent_latch);
        }
        Ok(())
    }

    /// Interior-level counterpart of [`rebalance_leaf`]. Borrowing is a
    /// three-way rotation through the parent separator; merging descends
    /// the separator into the absorbed range. An interior root with a
    /// single child collapses into that child.
    fn rebalance_interior(
        &self,
        ctx: &mut DescentContext<'_>,
        mut node_latch: WriteLatch,
    ) -> Result<()> {
        let node_id = node_latch.page_id();

        if node_id == ctx.root_page_id() {
            let sole_child = {
                let node = node_latch.node_mut().as_interior_mut()?;
                if node.len() > 1 {
                    return Ok(());
                }
                node.child_at(0)?
            };
            ctx.set_root_page_id(sole_child)?;
            drop(node_latch);
            self.pages.destroy(node_id);
            self.stats.inc_root_collapses();
            return Ok(());
        }

        let parent_latch = ctx.last_write_mut().ok_or_else(|| {
            eyre!("underflowed interior page {} has no parent on the latch path", node_id)
        })?;
        let parent_id = parent_latch.page_id();
        let parent = parent_latch.node_mut().as_interior_mut()?;
        let node = node_latch.node_mut().as_interior_mut()?;

        let slot = parent.child_slot_of(node_id).ok_or_else(|| {
            eyre!("interior page {} missing from parent page {}", node_id, parent_id)
        })?;

        let mut left_latch = if slot > 0 {
            Some(WriteLatch::acquire(&self.pages.get(parent.child_at(slot - 1)?)?))
        } else {
            None
        };
        let mut right_latch = if slot + 1 < parent.len() {
            Some(WriteLatch::acquire(&self.pages.get(parent.child_at(slot + 1)?)?))
        } else {
            None
        };

        if let Some(latch) = left_latch.as_mut() {
            let left_id = latch.page_id();
            let left = latch.node_mut().as_interior_mut()?;
            if left.is_safe(Operation::Delete) {
                let (ascending_key, borrowed_child) = left
                    .pop_last()
                    .ok_or_else(|| eyre!("interior page {} has nothing to lend", left_id))?;
                let separator = parent.key_at(slot)?;
                node.insert_first(separator, borrowed_child)?;
                parent.set_key_at(slot, ascending_key)?;
                self.stats.inc_interior_borrows();
                return Ok(());
            }
        }
        if let Some(latch) = right_latch.as_mut() {
            let right = latch.node_mut().as_interior_mut()?;
            if right.is_safe(Operation::Delete) {
                let separator = parent.key_at(slot + 1)?;
                let borrowed_child = right.child_at(0)?;
                let ascending_key = right.key_at(1)?;
                node.push_last(separator, borrowed_child)?;
                parent.set_key_at(slot + 1, ascending_key)?;
                right.delete(0)?;
                self.stats.inc_interior_borrows();
                return Ok(());
            }
        }

        let node_max = node.max_size();
        let right_fits = right_latch
            .as_ref()
            .is_some_and(|l| node.len() + l.node().len() <= node_max);
        let left_fits = left_latch
            .as_ref()
            .is_some_and(|l| node.len() + l.node().len() <= node_max);

        if right_fits {
            let mut victim_latch = match right_latch.take() {
                Some(latch) => latch,
                None => bail!("right sibling latch vanished during merge"),
            };
            let victim_id = victim_latch.page_id();
            let separator = parent.key_at(slot + 1)?;
            let victim = victim_latch.node_mut().as_interior_mut()?;
            node.merge_from(victim, separator)?;
            parent.delete(slot + 1)?;
            drop(victim_latch);
            self.pages.destroy(victim_id);
            self.stats.inc_interior_merges();
            drop(node_latch);
        } else if left_fits {
            let mut survivor_latch = match left_latch.take() {
                Some(latch) => latch,
                None => bail!("left sibling latch vanished during merge"),
            };
            let separator = parent.key_at(slot)?;
            let survivor = survivor_latch.node_mut().as_interior_mut()?;
            survivor.merge_from(node, separator)?;
            parent.delete(slot)?;
            drop(survivor_latch);
            drop(node_latch);
            self.pages.destroy(node_id);
            self.stats.inc_interior_merges();
        } else {
            // No neighbor can lend or absorb at this fan-out; leave the
            // slack in place.
            return Ok(());
        }

        let parent_underflow = parent.len() <= parent.min_size();
        drop(left_latch);
        drop(right_latch);
        if parent_underflow {
            let parent_latch = ctx
                .pop_write()
                .ok_or_else(|| eyre!("rebalance lost the parent latch"))?;
            return self.rebalance_interior(ctx, parent_latch);
        }
        Ok(())
    }
}
