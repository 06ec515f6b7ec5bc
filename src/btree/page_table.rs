//! # Page Table
//!
//! The page table is the process-wide owner of every live node: a map from
//! page id to a latch-wrapped node, plus the monotonic id allocator.
//!
//! ## Locking
//!
//! A single short-duration mutex guards the map structure and the
//! allocator. Node contents live *outside* the mutex: a lookup clones the
//! `Arc` handle and drops the mutex immediately, and all access to the node
//! itself is arbitrated by the per-node reader-writer latch held through a
//! descent context. Destroying a page only removes the table's handle; a
//! context still holding a latch on the victim keeps it alive until the
//! guard drops.
//!
//! ## Id Allocation
//!
//! Ids are handed out monotonically starting at [`FIRST_PAGE_ID`] and are
//! never reused, not even after a destroy or a snapshot restore (restore
//! registers nodes under their persisted ids and advances the allocator
//! past the maximum).

use eyre::{ensure, eyre, Result};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::config::{PageId, FIRST_PAGE_ID};

use super::interior::InteriorNode;
use super::leaf::LeafNode;
use super::node::Node;

/// Shared handle to a latch-wrapped node.
pub type PageRef = Arc<RwLock<Node>>;

#[derive(Debug)]
pub struct PageTable {
    inner: Mutex<TableInner>,
}

#[derive(Debug)]
struct TableInner {
    pages: HashMap<PageId, PageRef>,
    next_page_id: PageId,
}

impl PageTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                pages: HashMap::new(),
                next_page_id: FIRST_PAGE_ID,
            }),
        }
    }

    /// Allocates a fresh id and registers an empty leaf under it.
    pub(crate) fn create_leaf(&self, max_size: usize) -> (PageId, PageRef) {
        let mut inner = self.inner.lock();
        let page_id = inner.next_page_id;
        inner.next_page_id += 1;
        let page: PageRef = Arc::new(RwLock::new(Node::Leaf(LeafNode::new(page_id, max_size))));
        inner.pages.insert(page_id, Arc::clone(&page));
        (page_id, page)
    }

    /// Allocates a fresh id and registers an empty interior node under it.
    pub(crate) fn create_interior(&self, max_size: usize) -> (PageId, PageRef) {
        let mut inner = self.inner.lock();
        let page_id = inner.next_page_id;
        inner.next_page_id += 1;
        let page: PageRef = Arc::new(RwLock::new(Node::Interior(InteriorNode::new(
            page_id, max_size,
        ))));
        inner.pages.insert(page_id, Arc::clone(&page));
        (page_id, page)
    }

    /// Looks up a live page. A miss is an engine-layer bug: the tree only
    /// dereferences ids it has kept structurally reachable.
    pub(crate) fn get(&self, page_id: PageId) -> Result<PageRef> {
        self.inner
            .lock()
            .pages
            .get(&page_id)
            .cloned()
            .ok_or_else(|| eyre!("page {} not found in page table", page_id))
    }

    /// Removes a page from the table. No-op if the id is absent. The node
    /// itself is freed once the last latch guard on it drops.
    pub(crate) fn destroy(&self, page_id: PageId) {
        self.inner.lock().pages.remove(&page_id);
    }

    /// Registers an empty leaf under a caller-chosen id and advances the
    /// allocator past it. Snapshot restore only.
    pub(crate) fn register_leaf_with_id(&self, page_id: PageId, max_size: usize) -> Result<PageRef> {
        self.register(page_id, Node::Leaf(LeafNode::new(page_id, max_size)))
    }

    /// Registers an empty interior node under a caller-chosen id and
    /// advances the allocator past it. Snapshot restore only.
    pub(crate) fn register_interior_with_id(
        &self,
        page_id: PageId,
        max_size: usize,
    ) -> Result<PageRef> {
        self.register(page_id, Node::Interior(InteriorNode::new(page_id, max_size)))
    }

    fn register(&self, page_id: PageId, node: Node) -> Result<PageRef> {
        ensure!(page_id >= 0, "cannot register negative page id {}", page_id);
        let mut inner = self.inner.lock();
        ensure!(
            !inner.pages.contains_key(&page_id),
            "page {} already registered",
            page_id
        );
        let page: PageRef = Arc::new(RwLock::new(node));
        inner.pages.insert(page_id, Arc::clone(&page));
        inner.next_page_id = inner.next_page_id.max(page_id + 1);
        Ok(page)
    }

    /// Number of live pages.
    pub fn count(&self) -> usize {
        self.inner.lock().pages.len()
    }

    /// Drops every page and rewinds the allocator to its initial state.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.pages.clear();
        inner.next_page_id = FIRST_PAGE_ID;
    }
}
