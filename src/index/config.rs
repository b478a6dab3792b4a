//! Config - the aggregate that owns the store, the node cache and the tree
//! header state.
//!
//! Tree algorithms never touch the store or the cache directly; they go
//! through [`Config`], which keeps the two consistent:
//! - Nodes are handed out as clones of the cached copy
//! - [`Config::store_node`] gives a changed node back to the cache
//! - Creation and destruction move slots between the tree and the free stack

use log::{debug, info};

use crate::buffer::{CacheStats, NodeCache, StatsSnapshot};
use crate::common::{Error, PageRef, Region, Result};
use crate::index::{IndexOptions, Node};
use crate::storage::{IndexHeader, PageStore};

/// Store, cache and header state of one index.
///
/// # Node ownership
/// The cache holds the authoritative copy of every resident node. Loads
/// return clones; a clone only becomes visible again through
/// [`Config::store_node`], which consumes it. After storing a node, callers
/// load it again rather than keep using a clone taken before the store.
///
/// # Pinning
/// Between [`Config::begin_update`] and [`Config::finish`] every node loaded
/// or created is pinned, so parents reached on the way down stay resident
/// until the update is done.
pub struct Config {
    store: PageStore,
    cache: NodeCache,
    options: IndexOptions,
    root: Option<PageRef>,
    node_count: u64,
    data_count: u64,
    pinning: bool,
}

impl Config {
    /// Aggregate for a freshly created, empty store.
    pub(crate) fn new(store: PageStore, options: IndexOptions) -> Self {
        let cache = NodeCache::new(options.cache_capacity, options.eviction_failure);
        Self {
            store,
            cache,
            options,
            root: None,
            node_count: 0,
            data_count: 0,
            pinning: false,
        }
    }

    /// Aggregate for an existing store described by `header`.
    pub(crate) fn restore(store: PageStore, options: IndexOptions, header: &IndexHeader) -> Self {
        Self {
            root: header.root,
            node_count: header.node_count,
            data_count: header.data_count,
            ..Self::new(store, options)
        }
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn root(&self) -> Option<PageRef> {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: Option<PageRef>) {
        self.root = root;
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn data_count(&self) -> u64 {
        self.data_count
    }

    pub(crate) fn note_inserted(&mut self) {
        self.data_count += 1;
    }

    pub(crate) fn note_deleted(&mut self) {
        self.data_count = self.data_count.saturating_sub(1);
    }

    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.cache.stats().snapshot()
    }

    pub fn is_degraded(&self) -> bool {
        self.cache.is_degraded()
    }

    // ========================================================================
    // Public API: Cache membership
    // ========================================================================

    /// The cached node at `page`, or an unloaded descriptor for it registered
    /// in the cache without reading the store.
    pub fn get_from_cache(&mut self, page: PageRef) -> Node {
        if let Some(node) = self.cache.get(page.offset) {
            let node = node.clone();
            if self.pinning {
                self.cache.pin(page.offset);
            }
            return node;
        }

        match self.cache.take_backlogged(page.offset) {
            Some(node) => {
                self.admit(node.clone(), true);
                node
            }
            None => {
                let node = Node::unloaded(page);
                self.admit(node.clone(), false);
                node
            }
        }
    }

    /// The node at `page`, read from the store on first access.
    ///
    /// # Errors
    /// Propagates store faults and malformed records.
    pub fn load(&mut self, page: PageRef) -> Result<Node> {
        let node = self.get_from_cache(page);
        if node.loaded {
            return Ok(node);
        }

        let node = self.store.read_node(page)?;
        CacheStats::bump(&self.cache.stats().pages_read);
        self.admit(node.clone(), false);
        Ok(node)
    }

    /// Load a child reached from `parent`, binding its parent reference.
    pub(crate) fn load_child(&mut self, page: PageRef, parent: PageRef) -> Result<Node> {
        let mut node = self.load(page)?;
        if node.parent != Some(parent) {
            node.parent = Some(parent);
            self.cache.set_parent(page.offset, Some(parent));
        }
        Ok(node)
    }

    /// Make `node` the cached copy without marking it dirty.
    pub fn put_to_cache(&mut self, node: Node) {
        self.admit(node, false);
    }

    /// Drop a node from the cache without writing it.
    pub fn remove_from_cache(&mut self, offset: u64) -> Option<Node> {
        self.cache.remove(offset)
    }

    // ========================================================================
    // Internal: Node lifecycle
    // ========================================================================

    /// Give a changed node back to the cache, dirty. Returns its slot, which
    /// differs from the node's old slot if the record outgrew it.
    pub(crate) fn store_node(&mut self, node: Node) -> Result<PageRef> {
        let needed = self.store.codec().encoded_len(&node);
        if needed > node.page.length as usize {
            return self.relocate(node, needed);
        }
        let page = node.page;
        self.admit(node, true);
        Ok(page)
    }

    /// Allocate a slot for a new, empty node and cache it.
    pub(crate) fn create_node(&mut self, region: Region, parent: Option<PageRef>) -> Result<Node> {
        let page = self.store.allocate(self.options.initial_slot_len())?;
        let mut node = Node::new(page, region);
        node.parent = parent;
        self.node_count += 1;
        self.admit(node.clone(), true);
        debug!("created node at {}", page);
        Ok(node)
    }

    /// Remove a node from the cache and free its slot and link block.
    ///
    /// The node must already be unlinked from its parent.
    pub(crate) fn destroy_node(&mut self, node: Node) {
        let offset = node.page.offset;
        let block = match self.cache.remove(offset) {
            Some(cached) if cached.loaded => cached.child_block,
            _ => node.child_block,
        };
        if let Some(block) = block {
            self.store.release(block);
        }
        self.store.release(node.page);
        self.node_count = self.node_count.saturating_sub(1);
        debug!("destroyed node at {}", node.page);
    }

    pub(crate) fn bind_parent(&mut self, offset: u64, parent: Option<PageRef>) {
        self.cache.set_parent(offset, parent);
    }

    pub(crate) fn read_link(&mut self, block: PageRef, pos: usize) -> Result<PageRef> {
        self.store.read_link(block, pos)
    }

    pub(crate) fn remember_links(&mut self, node: &Node) {
        self.cache.remember_links(node);
    }

    /// Move a node into a slot large enough for its record.
    ///
    /// The parent's link is rewritten through the node's parent reference;
    /// a node without one must be the root.
    fn relocate(&mut self, mut node: Node, needed: usize) -> Result<PageRef> {
        let old = node.page;
        let new = self.store.allocate(needed.next_power_of_two())?;
        debug!("relocating node {} -> {} ({} bytes)", old, new, needed);

        node.page = new;
        let parent = node.parent;
        self.cache.rekey(old.offset, node);
        self.cache.rebind_parent(old, new);

        match parent {
            Some(parent) => {
                let mut parent = self.load(parent)?;
                parent.materialize_all(self)?;
                parent.replace_child(old.offset, new)?;
                self.store_node(parent)?;
            }
            None if self.root == Some(old) => self.root = Some(new),
            None => {
                return Err(Error::Structural(format!(
                    "relocated node {} has no parent and is not the root",
                    old
                )))
            }
        }

        self.store.release(old);
        Ok(new)
    }

    fn admit(&mut self, node: Node, dirty: bool) {
        if self.pinning {
            self.cache.insert_pinned(node, dirty, &mut self.store);
        } else {
            self.cache.insert(node, dirty, &mut self.store);
        }
    }

    // ========================================================================
    // Internal: Operation lifecycle
    // ========================================================================

    /// Start pinning every node touched, until [`Config::finish`].
    ///
    /// # Errors
    /// Returns `Error::WriteBack`, with nothing changed, if the eviction
    /// policy blocks updates while earlier write-backs are outstanding.
    pub(crate) fn begin_update(&mut self) -> Result<()> {
        self.cache.prepare_update(&mut self.store)?;
        self.pinning = true;
        Ok(())
    }

    /// Release pins, shrink back to capacity and note any write-back
    /// failure held by the cache.
    pub(crate) fn finish(&mut self) {
        self.pinning = false;
        self.cache.unpin_all();
        self.cache.shrink(&mut self.store);
        self.cache.settle();
    }

    /// Write every dirty node and empty the cache.
    pub(crate) fn flush_all(&mut self) -> Result<()> {
        self.cache.flush_all(&mut self.store)
    }

    /// Write every dirty node, the free list and the header, then sync.
    pub(crate) fn checkpoint(&mut self) -> Result<()> {
        self.flush_all()?;
        let (free_list, free_count) = self.store.save_free_list()?;

        let mut header = self.header();
        header.free_list = free_list;
        header.free_count = free_count;
        self.store.write_header(&header)?;
        self.store.sync()?;

        info!(
            "checkpoint: {} nodes, {} entries, {} free ranges",
            self.node_count, self.data_count, free_count
        );
        Ok(())
    }

    /// Drop every node: the store shrinks back to an empty header.
    pub(crate) fn reset(&mut self) -> Result<()> {
        self.cache.clear();
        self.store.truncate()?;
        self.root = None;
        self.node_count = 0;
        self.data_count = 0;
        let header = self.header();
        self.store.write_header(&header)
    }

    /// Header describing the current in-memory state, without a free list.
    pub(crate) fn header(&self) -> IndexHeader {
        IndexHeader {
            root: self.root,
            node_count: self.node_count,
            data_count: self.data_count,
            end: self.store.end(),
            ..IndexHeader::empty(self.store.codec().byte_order(), self.options.strategy as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Entry;
    use crate::storage::{ByteOrder, MemoryChannel};

    fn region(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Region {
        Region::new(min_x, min_y, max_x, max_y).unwrap()
    }

    fn create_config(options: IndexOptions) -> Config {
        let store = PageStore::new(Box::new(MemoryChannel::new()), ByteOrder::Little, false);
        Config::new(store, options)
    }

    #[test]
    fn test_get_from_cache_registers_descriptor() {
        let mut cfg = create_config(IndexOptions::rtree());
        let page = PageRef::new(4096, 64);

        let node = cfg.get_from_cache(page);
        assert!(!node.is_loaded());
        assert!(cfg.cache().contains(4096));
        assert_eq!(cfg.stats().pages_read, 0);
    }

    #[test]
    fn test_create_store_load() {
        let mut cfg = create_config(IndexOptions::rtree().with_cache_capacity(1));

        let mut node = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        let page = node.page();
        node.add_entry(Entry::new(region(0.2, 0.2, 0.3, 0.3), 5));
        assert_eq!(cfg.store_node(node).unwrap(), page);

        // A second node pushes the first out of the cache and onto the store
        let other = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        assert!(!cfg.cache().contains(page.offset));
        assert!(cfg.cache().contains(other.page().offset));

        let loaded = cfg.load(page).unwrap();
        assert_eq!(loaded.entries()[0].payload, 5);
        assert_eq!(cfg.stats().pages_read, 1);
        assert_eq!(cfg.node_count(), 2);
    }

    #[test]
    fn test_destroy_frees_slot() {
        let mut cfg = create_config(IndexOptions::rtree());
        let node = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        let page = node.page();

        cfg.destroy_node(node);
        assert!(!cfg.cache().contains(page.offset));
        assert_eq!(cfg.node_count(), 0);

        let reused = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        assert_eq!(reused.page(), page);
    }

    #[test]
    fn test_relocation_updates_root() {
        let mut cfg = create_config(IndexOptions::quadtree());
        let node = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        let old = node.page();
        cfg.set_root(Some(old));

        let mut node = cfg.load(old).unwrap();
        for i in 0..10 {
            node.add_entry(Entry::new(region(0.1, 0.1, 0.2, 0.2), i));
        }
        let new = cfg.store_node(node).unwrap();

        assert_ne!(new, old);
        assert_eq!(new.length, 512);
        assert_eq!(cfg.load(new).unwrap().entries().len(), 10);
        assert_eq!(cfg.root(), Some(new));
        assert!(!cfg.cache().contains(old.offset));
        assert!(cfg.store().free_pages().iter().any(|r| *r == old));
    }

    #[test]
    fn test_relocation_updates_parent_link() {
        let mut cfg = create_config(IndexOptions::quadtree());
        let parent = cfg.create_node(region(-1.0, -1.0, 1.0, 1.0), None).unwrap();
        let parent_page = parent.page();
        cfg.set_root(Some(parent_page));
        let child = cfg
            .create_node(region(0.0, 0.0, 1.0, 1.0), Some(parent_page))
            .unwrap();
        let child_page = child.page();

        let mut parent = cfg.load(parent_page).unwrap();
        parent.add_child(child_page).unwrap();
        cfg.store_node(parent).unwrap();

        let mut child = cfg.load(child_page).unwrap();
        for i in 0..10 {
            child.add_entry(Entry::new(region(0.1, 0.1, 0.2, 0.2), i));
        }
        let moved = cfg.store_node(child).unwrap();

        let parent = cfg.load(parent_page).unwrap();
        assert_eq!(parent.child_pages(), &[moved]);
        assert_eq!(cfg.root(), Some(parent_page));
    }

    #[test]
    fn test_orphan_relocation_is_structural() {
        let mut cfg = create_config(IndexOptions::quadtree());
        let mut node = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        for i in 0..10 {
            node.add_entry(Entry::new(region(0.1, 0.1, 0.2, 0.2), i));
        }
        assert!(matches!(cfg.store_node(node), Err(Error::Structural(_))));
    }

    #[test]
    fn test_pins_hold_until_finish() {
        let mut cfg = create_config(IndexOptions::rtree().with_cache_capacity(1));
        cfg.begin_update().unwrap();
        let a = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        let b = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        assert_eq!(cfg.cache().len(), 2);

        cfg.finish();
        assert_eq!(cfg.cache().len(), 1);
        assert!(!cfg.cache().contains(a.page().offset));
        assert!(cfg.cache().contains(b.page().offset));
    }

    #[test]
    fn test_reset_truncates() {
        let mut cfg = create_config(IndexOptions::rtree());
        let node = cfg.create_node(region(0.0, 0.0, 1.0, 1.0), None).unwrap();
        cfg.set_root(Some(node.page()));
        cfg.note_inserted();

        cfg.reset().unwrap();
        assert_eq!(cfg.root(), None);
        assert_eq!(cfg.node_count(), 0);
        assert_eq!(cfg.data_count(), 0);
        assert!(cfg.cache().is_empty());
        assert_eq!(cfg.store().end(), crate::common::config::HEADER_SIZE);
    }
}
