//! # Binary Snapshot Codec
//!
//! Persists an entire tree - page ids, separator keys, leaf chain and all -
//! to a single file, and restores it into a structurally identical tree.
//!
//! ## File Layout
//!
//! All multi-byte fields are little-endian and packed.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       8     magic            "MYBPTREE" (no trailing NUL)
//! 8       4     version          u32, currently 1
//! 12      4     root_page_id     i32, INVALID_PAGE_ID when empty
//! 16      4     leaf_max_size    i32
//! 20      4     interior_max_size i32
//! 24      4     page_count       u32
//! 28      ...   page records, breadth-first from the root
//! ```
//!
//! Each page record:
//!
//! ```text
//! page_id : i32
//! kind    : u8            1 = leaf, 2 = interior
//! size    : i32
//! body    :
//!   leaf:     size x (key i64 || value 16B), then next_page_id i32
//!   interior: size x (child_page_id i32, and key i64 iff slot > 0)
//!             -- the leading child pointer has no key
//! ```
//!
//! BFS guarantees every node is written before any of its descendants,
//! and nothing stronger; the restorer relies only on the header's
//! `page_count` being exact.
//!
//! ## Concurrency
//!
//! The codec does not latch. Serialization requires that the tree is not
//! concurrently mutated; restoration takes `&mut self`, so exclusivity is
//! enforced by the borrow. A header that fails validation leaves the
//! target tree untouched; an I/O error mid-restore can leave it partially
//! rebuilt, exactly as a mid-write I/O error can leave a partial file.

use eyre::{bail, ensure, eyre, Result, WrapErr};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use zerocopy::little_endian::{I32, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::btree::{BPlusTree, Node};
use crate::config::{Key, PageId, Value, INVALID_PAGE_ID, MIN_NODE_CAPACITY};

/// Magic bytes at offset 0 of every snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"MYBPTREE";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Kind byte of a leaf page record.
pub const LEAF_KIND: u8 = 1;

/// Kind byte of an interior page record.
pub const INTERIOR_KIND: u8 = 2;

pub const SNAPSHOT_HEADER_SIZE: usize = 28;
pub const NODE_RECORD_HEADER_SIZE: usize = 9;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SnapshotHeader {
    magic: [u8; 8],
    version: U32,
    root_page_id: I32,
    leaf_max_size: I32,
    interior_max_size: I32,
    page_count: U32,
}

const _: () = assert!(std::mem::size_of::<SnapshotHeader>() == SNAPSHOT_HEADER_SIZE);

impl SnapshotHeader {
    fn new(
        root_page_id: PageId,
        leaf_max_size: usize,
        interior_max_size: usize,
        page_count: usize,
    ) -> Self {
        Self {
            magic: *SNAPSHOT_MAGIC,
            version: U32::new(SNAPSHOT_VERSION),
            root_page_id: I32::new(root_page_id),
            leaf_max_size: I32::new(leaf_max_size as i32),
            interior_max_size: I32::new(interior_max_size as i32),
            page_count: U32::new(page_count as u32),
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id.get()
    }

    pub fn page_count(&self) -> u32 {
        self.page_count.get()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeRecordHeader {
    page_id: I32,
    kind: u8,
    size: I32,
}

const _: () = assert!(std::mem::size_of::<NodeRecordHeader>() == NODE_RECORD_HEADER_SIZE);

impl NodeRecordHeader {
    fn new(page_id: PageId, kind: u8, size: usize) -> Self {
        Self {
            page_id: I32::new(page_id),
            kind,
            size: I32::new(size as i32),
        }
    }
}

fn read_array<const N: usize>(reader: &mut impl Read) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

impl BPlusTree {
    /// Writes the whole tree to `path` in the format above.
    ///
    /// Precondition: no concurrent mutation. On an I/O error a partial
    /// file may remain.
    pub fn serialize(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .wrap_err_with(|| format!("failed to create snapshot file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.serialize_to_writer(&mut writer)?;
        writer.flush().wrap_err("failed to flush snapshot file")?;
        Ok(())
    }

    /// Writes the whole tree into an arbitrary writer.
    pub fn serialize_to_writer(&self, writer: &mut impl Write) -> Result<()> {
        let root_id = self.root_page_id();
        let page_count = self.pages.count();
        if root_id == INVALID_PAGE_ID {
            ensure!(
                page_count == 0,
                "empty tree still holds {} pages",
                page_count
            );
        }

        let header = SnapshotHeader::new(
            root_id,
            self.leaf_max_size,
            self.interior_max_size,
            page_count,
        );
        writer
            .write_all(header.as_bytes())
            .wrap_err("failed to write snapshot header")?;
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let mut queue: VecDeque<PageId> = VecDeque::new();
        queue.push_back(root_id);
        let mut visited = 0usize;

        while let Some(page_id) = queue.pop_front() {
            let page = self
                .pages
                .get(page_id)
                .wrap_err("snapshot walk found a dangling page reference")?;
            visited += 1;
            ensure!(
                visited <= page_count,
                "tree reaches more pages than the page table holds ({})",
                page_count
            );

            let node = page.read();
            match &*node {
                Node::Leaf(leaf) => {
                    let record = NodeRecordHeader::new(page_id, LEAF_KIND, leaf.len());
                    writer
                        .write_all(record.as_bytes())
                        .wrap_err("failed to write snapshot page record")?;
                    for (key, value) in leaf.entries() {
                        writer
                            .write_all(&key.to_le_bytes())
                            .wrap_err("failed to write leaf entry")?;
                        writer
                            .write_all(value)
                            .wrap_err("failed to write leaf entry")?;
                    }
                    writer
                        .write_all(&leaf.next_page_id().to_le_bytes())
                        .wrap_err("failed to write leaf chain pointer")?;
                }
                Node::Interior(interior) => {
                    let record = NodeRecordHeader::new(page_id, INTERIOR_KIND, interior.len());
                    writer
                        .write_all(record.as_bytes())
                        .wrap_err("failed to write snapshot page record")?;
                    for (slot, (key, child)) in interior.entries().iter().enumerate() {
                        writer
                            .write_all(&child.to_le_bytes())
                            .wrap_err("failed to write interior entry")?;
                        if slot > 0 {
                            writer
                                .write_all(&key.to_le_bytes())
                                .wrap_err("failed to write interior entry")?;
                        }
                        queue.push_back(*child);
                    }
                }
            }
        }

        ensure!(
            visited == page_count,
            "page table holds {} pages but the tree reaches {}",
            page_count,
            visited
        );
        Ok(())
    }

    /// Restores a tree from `path`, replacing this tree's contents.
    ///
    /// The exclusive borrow enforces the codec's quiescence requirement.
    /// Magic, version and capacity metadata are validated before the tree
    /// is touched; on those errors the target keeps its previous state.
    pub fn deserialize(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open snapshot file {}", path.display()))?;
        let mut reader = BufReader::new(file);
        self.deserialize_from_reader(&mut reader)
    }

    /// Restores a tree from an arbitrary reader.
    pub fn deserialize_from_reader(&mut self, reader: &mut impl Read) -> Result<()> {
        let mut header_buf = [0u8; SNAPSHOT_HEADER_SIZE];
        reader
            .read_exact(&mut header_buf)
            .wrap_err("failed to read snapshot header")?;
        let header = SnapshotHeader::ref_from_bytes(&header_buf[..])
            .map_err(|e| eyre!("malformed snapshot header: {e}"))?;

        ensure!(
            &header.magic == SNAPSHOT_MAGIC,
            "invalid snapshot magic {:?}",
            header.magic
        );
        ensure!(
            header.version.get() == SNAPSHOT_VERSION,
            "unsupported snapshot version {}",
            header.version.get()
        );
        let leaf_max = header.leaf_max_size.get();
        let interior_max = header.interior_max_size.get();
        ensure!(
            leaf_max >= MIN_NODE_CAPACITY as i32 && interior_max >= MIN_NODE_CAPACITY as i32,
            "snapshot declares degenerate node capacities ({}, {})",
            leaf_max,
            interior_max
        );
        let root_id = header.root_page_id.get();
        let page_count = header.page_count.get() as usize;
        if root_id == INVALID_PAGE_ID {
            ensure!(page_count == 0, "empty snapshot declares {} pages", page_count);
        } else {
            ensure!(root_id >= 0, "snapshot root page id {} is invalid", root_id);
            ensure!(
                page_count > 0,
                "snapshot with root page {} declares no pages",
                root_id
            );
        }

        // The header checks out; from here on the target is rewritten.
        self.clear();
        self.leaf_max_size = leaf_max as usize;
        self.interior_max_size = interior_max as usize;
        *self.root.get_mut() = root_id;

        for _ in 0..page_count {
            let mut record_buf = [0u8; NODE_RECORD_HEADER_SIZE];
            reader
                .read_exact(&mut record_buf)
                .wrap_err("failed to read snapshot page record")?;
            let record = NodeRecordHeader::ref_from_bytes(&record_buf[..])
                .map_err(|e| eyre!("malformed snapshot page record: {e}"))?;
            let page_id = record.page_id.get();
            let size = record.size.get();
            ensure!(
                size >= 1,
                "snapshot page {} declares size {}",
                page_id,
                size
            );

            match record.kind {
                LEAF_KIND => {
                    ensure!(
                        size as usize <= self.leaf_max_size,
                        "snapshot leaf page {} over capacity ({} > {})",
                        page_id,
                        size,
                        self.leaf_max_size
                    );
                    let mut entries: Vec<(Key, Value)> = Vec::with_capacity(size as usize);
                    for _ in 0..size {
                        let key =
                            Key::from_le_bytes(read_array(reader).wrap_err("truncated leaf entry")?);
                        let value: Value = read_array(reader).wrap_err("truncated leaf entry")?;
                        entries.push((key, value));
                    }
                    let next = PageId::from_le_bytes(
                        read_array(reader).wrap_err("truncated leaf chain pointer")?,
                    );
                    let page = self
                        .pages
                        .register_leaf_with_id(page_id, self.leaf_max_size)
                        .wrap_err("snapshot declares a duplicate page")?;
                    let mut node = page.write();
                    let leaf = node.as_leaf_mut()?;
                    leaf.set_entries(entries)?;
                    leaf.set_next_page_id(next);
                }
                INTERIOR_KIND => {
                    ensure!(
                        size as usize <= self.interior_max_size,
                        "snapshot interior page {} over capacity ({} > {})",
                        page_id,
                        size,
                        self.interior_max_size
                    );
                    let mut entries: Vec<(Key, PageId)> = Vec::with_capacity(size as usize);
                    for slot in 0..size {
                        let child = PageId::from_le_bytes(
                            read_array(reader).wrap_err("truncated interior entry")?,
                        );
                        let key = if slot > 0 {
                            Key::from_le_bytes(
                                read_array(reader).wrap_err("truncated interior entry")?,
                            )
                        } else {
                            Key::default()
                        };
                        entries.push((key, child));
                    }
                    let page = self
                        .pages
                        .register_interior_with_id(page_id, self.interior_max_size)
                        .wrap_err("snapshot declares a duplicate page")?;
                    page.write().as_interior_mut()?.set_entries(entries)?;
                }
                other => bail!("snapshot page {} has invalid kind byte {}", page_id, other),
            }
        }

        if root_id != INVALID_PAGE_ID {
            self.pages
                .get(root_id)
                .wrap_err("snapshot root page missing from the page records")?;
        }
        Ok(())
    }
}
