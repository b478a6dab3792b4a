//! Node Cache - the bounded, write-back cache of materialized nodes.
//!
//! The [`NodeCache`] provides:
//! - A recency-ordered map from node offset to [`Node`]
//! - Pin-based protection of nodes in use by the current operation
//! - Write-back of dirty nodes when they are evicted or flushed
//! - An explicit policy for write-backs that fail during eviction

use std::collections::HashMap;

use log::{debug, warn};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::CacheStats;
use crate::common::{Error, PageRef, Result};
use crate::index::Node;

/// Destination for dirty nodes leaving the cache.
///
/// Implemented by [`crate::storage::PageStore`]; a write-back may update the
/// node (for example, the location of a freshly written child-link block).
pub trait WriteBack {
    fn write_back(&mut self, node: &mut Node) -> Result<()>;
}

/// What happens when writing back an evicted node fails.
///
/// Under every policy the node is moved to a backlog and written by the next
/// flush; it is never dropped. The operation during which the eviction
/// happened has already finished its changes and succeeds. The policies
/// differ in what later updates do while the backlog is not empty.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EvictionFailurePolicy {
    /// Every update first writes the backlog. If that fails the update is
    /// aborted with `Error::WriteBack` before it changes anything.
    #[default]
    Abort,
    /// Updates proceed and the cache is marked degraded until a flush writes
    /// the backlog.
    Degrade,
    /// Try each write-back up to `attempts` times, then behave like `Abort`.
    Retry { attempts: u32 },
}

impl EvictionFailurePolicy {
    fn attempts(&self) -> u32 {
        match self {
            EvictionFailurePolicy::Retry { attempts } => (*attempts).max(1),
            _ => 1,
        }
    }
}

/// A cached node and its bookkeeping.
struct CachedNode {
    node: Node,
    dirty: bool,
    pins: u32,
}

/// Bounded map from node offset to node with LRU write-back eviction.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────┐
/// │                        NodeCache                         │
/// │  ┌────────────────────┐   ┌──────────────────────────┐   │
/// │  │ entries            │   │ replacer (LruReplacer)   │   │
/// │  │ offset → CachedNode│◀─▶│ recency + evictability   │   │
/// │  └─────────┬──────────┘   └──────────────────────────┘   │
/// │            │ evict dirty                                  │
/// │            ▼                                              │
/// │     WriteBack sink ──fails──▶ backlog: offset → Node      │
/// └──────────────────────────────────────────────────────────┘
/// ```
///
/// # Capacity
/// Inserting beyond capacity evicts least-recently-used unpinned nodes.
/// Pinned nodes are never evicted, so the cache can temporarily exceed its
/// capacity while an operation holds pins; [`NodeCache::unpin_all`] followed
/// by [`NodeCache::shrink`] restores the bound.
///
/// # Eviction failures
/// A failed write-back is not reported from the eviction itself. The node
/// goes to the backlog and the failure is held until [`NodeCache::settle`],
/// which the owner calls once the current operation has finished its
/// structural changes. [`NodeCache::prepare_update`] is the gate before the
/// next change: under `Abort` and `Retry` it refuses while the backlog can't
/// be written.
pub struct NodeCache {
    entries: HashMap<u64, CachedNode>,

    replacer: LruReplacer,

    /// Dirty nodes whose write-back failed, waiting for the next flush.
    backlog: HashMap<u64, Node>,

    capacity: usize,

    policy: EvictionFailurePolicy,

    stats: CacheStats,

    degraded: bool,

    /// First write-back failure since the last `settle`.
    failure: Option<Error>,
}

impl NodeCache {
    /// Create a new node cache.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, policy: EvictionFailurePolicy) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        Self {
            entries: HashMap::new(),
            replacer: LruReplacer::new(),
            backlog: HashMap::new(),
            capacity,
            policy,
            stats: CacheStats::new(),
            degraded: false,
            failure: None,
        }
    }

    // ========================================================================
    // Public API: Lookup and membership
    // ========================================================================

    /// Look up a node, making it the most recently used.
    pub fn get(&mut self, offset: u64) -> Option<&Node> {
        match self.entries.get(&offset) {
            Some(entry) => {
                CacheStats::bump(&self.stats.cache_hits);
                self.replacer.record_access(offset);
                Some(&entry.node)
            }
            None => {
                CacheStats::bump(&self.stats.cache_misses);
                None
            }
        }
    }

    /// Insert or replace a node, then evict down to capacity.
    ///
    /// Replacing keeps the entry dirty if it already was, so a clean
    /// re-insert never loses pending changes.
    pub fn insert<W: WriteBack + ?Sized>(&mut self, node: Node, dirty: bool, sink: &mut W) {
        self.admit(node, dirty, false, sink);
    }

    /// Like [`NodeCache::insert`], but pins the node before evicting, so the
    /// node itself is never the victim.
    pub fn insert_pinned<W: WriteBack + ?Sized>(&mut self, node: Node, dirty: bool, sink: &mut W) {
        self.admit(node, dirty, true, sink);
    }

    /// Drop a node without writing it back.
    pub fn remove(&mut self, offset: u64) -> Option<Node> {
        self.replacer.remove(offset);
        let cached = self.entries.remove(&offset).map(|entry| entry.node);
        let backlogged = self.backlog.remove(&offset);
        cached.or(backlogged)
    }

    /// Take a node out of the write-back backlog.
    pub fn take_backlogged(&mut self, offset: u64) -> Option<Node> {
        self.backlog.remove(&offset)
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.entries.contains_key(&offset)
    }

    pub fn is_dirty(&self, offset: u64) -> bool {
        self.entries.get(&offset).is_some_and(|entry| entry.dirty)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dirty_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.dirty).count()
    }

    /// Number of nodes waiting in the write-back backlog.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    // ========================================================================
    // Public API: Pinning
    // ========================================================================

    /// Protect a cached node from eviction. Returns false if it isn't cached.
    pub fn pin(&mut self, offset: u64) -> bool {
        match self.entries.get_mut(&offset) {
            Some(entry) => {
                entry.pins += 1;
                self.replacer.set_evictable(offset, false);
                true
            }
            None => false,
        }
    }

    /// Release one pin. Returns false if the node wasn't pinned.
    pub fn unpin(&mut self, offset: u64) -> bool {
        match self.entries.get_mut(&offset) {
            Some(entry) if entry.pins > 0 => {
                entry.pins -= 1;
                if entry.pins == 0 {
                    self.replacer.set_evictable(offset, true);
                }
                true
            }
            _ => false,
        }
    }

    /// Release every pin.
    pub fn unpin_all(&mut self) {
        for (&offset, entry) in self.entries.iter_mut() {
            if entry.pins > 0 {
                entry.pins = 0;
                self.replacer.set_evictable(offset, true);
            }
        }
    }

    // ========================================================================
    // Public API: Eviction and flushing
    // ========================================================================

    /// Evict unpinned nodes until the cache is within capacity.
    pub fn shrink<W: WriteBack + ?Sized>(&mut self, sink: &mut W) {
        while self.entries.len() > self.capacity {
            let Some(victim) = self.replacer.evict() else {
                break;
            };
            self.evict(victim, sink);
        }
    }

    /// Take note of any write-back failure held since the last call.
    ///
    /// Under [`EvictionFailurePolicy::Degrade`] the failure marks the cache
    /// degraded. Otherwise the backlog is left for [`NodeCache::prepare_update`].
    pub fn settle(&mut self) {
        let Some(err) = self.failure.take() else {
            return;
        };
        match self.policy {
            EvictionFailurePolicy::Degrade => {
                if !self.degraded {
                    warn!(
                        "node cache degraded: {} node(s) awaiting write-back ({})",
                        self.backlog.len(),
                        err
                    );
                }
                self.degraded = true;
            }
            _ => warn!(
                "{} node(s) held for write-back, updates blocked until written ({})",
                self.backlog.len(),
                err
            ),
        }
    }

    /// Check that an update may start.
    ///
    /// Under `Abort` and `Retry` the backlog is written first.
    ///
    /// # Errors
    /// Returns `Error::WriteBack` if a backlogged node still can't be
    /// written. Nothing in the cache has changed apart from the nodes that
    /// were written.
    pub fn prepare_update<W: WriteBack + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        match self.policy {
            EvictionFailurePolicy::Degrade => Ok(()),
            _ => self.drain_backlog(sink),
        }
    }

    /// Write every backlogged node. A node that fails stays in the backlog.
    pub fn drain_backlog<W: WriteBack + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        let attempts = self.policy.attempts();

        let pending: Vec<u64> = self.backlog.keys().copied().collect();
        for offset in pending {
            if let Some(mut node) = self.backlog.remove(&offset) {
                if let Err(e) = write_node(attempts, &self.stats, &mut node, sink) {
                    self.backlog.insert(offset, node);
                    return Err(Error::WriteBack {
                        offset,
                        source: Box::new(e),
                    });
                }
            }
        }
        self.failure = None;
        Ok(())
    }

    /// Write every dirty node, backlog first, then empty the cache.
    ///
    /// On failure the failing node stays where it was (backlog or cache,
    /// still dirty) and the cache is not emptied.
    pub fn flush_all<W: WriteBack + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        let attempts = self.policy.attempts();
        self.drain_backlog(sink)?;

        let offsets: Vec<u64> = self.entries.keys().copied().collect();
        for offset in offsets {
            if let Some(entry) = self.entries.get_mut(&offset) {
                if entry.dirty {
                    write_node(attempts, &self.stats, &mut entry.node, sink)?;
                    entry.dirty = false;
                }
            }
        }

        self.entries.clear();
        self.replacer.clear();
        self.failure = None;
        if self.degraded {
            debug!("backlog written, node cache no longer degraded");
        }
        self.degraded = false;
        Ok(())
    }

    /// Drop everything, including the backlog, without writing.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.replacer.clear();
        self.backlog.clear();
        self.failure = None;
        self.degraded = false;
    }

    // ========================================================================
    // Internal: in-place fixups
    // ========================================================================

    /// Move a node to a new offset, keeping its pins. The node is marked dirty.
    pub(crate) fn rekey(&mut self, old_offset: u64, node: Node) {
        let pins = self
            .entries
            .remove(&old_offset)
            .map_or(0, |entry| entry.pins);
        self.replacer.remove(old_offset);
        self.backlog.remove(&old_offset);

        let offset = node.page.offset;
        self.entries.insert(
            offset,
            CachedNode {
                node,
                dirty: true,
                pins,
            },
        );
        self.replacer.record_access(offset);
        self.replacer.set_evictable(offset, pins == 0);
    }

    /// Point every resident child of `old` at `new` instead.
    pub(crate) fn rebind_parent(&mut self, old: PageRef, new: PageRef) {
        let nodes = self
            .entries
            .values_mut()
            .map(|entry| &mut entry.node)
            .chain(self.backlog.values_mut());
        for node in nodes {
            if node.parent == Some(old) {
                node.parent = Some(new);
            }
        }
    }

    /// Update the parent back-reference of a resident node, if present.
    pub(crate) fn set_parent(&mut self, offset: u64, parent: Option<PageRef>) {
        if let Some(entry) = self.entries.get_mut(&offset) {
            entry.node.parent = parent;
        } else if let Some(node) = self.backlog.get_mut(&offset) {
            node.parent = parent;
        }
    }

    /// Copy child links materialized on a detached copy into the cached node,
    /// when both still describe the same link block.
    pub(crate) fn remember_links(&mut self, node: &Node) {
        if let Some(entry) = self.entries.get_mut(&node.page.offset) {
            let cached = &mut entry.node;
            if cached.loaded
                && !cached.children_dirty
                && cached.child_block == node.child_block
                && cached.children.len() < node.children.len()
            {
                cached.children.clone_from(&node.children);
            }
        }
    }

    fn admit<W: WriteBack + ?Sized>(&mut self, node: Node, dirty: bool, pin: bool, sink: &mut W) {
        let offset = node.page.offset;
        let dirty = dirty | self.backlog.remove(&offset).is_some();

        let entry = self.entries.entry(offset).or_insert_with(|| CachedNode {
            node: Node::unloaded(node.page),
            dirty: false,
            pins: 0,
        });
        entry.node = node;
        entry.dirty |= dirty;
        if pin {
            entry.pins += 1;
        }
        let evictable = entry.pins == 0;

        self.replacer.record_access(offset);
        self.replacer.set_evictable(offset, evictable);
        self.shrink(sink);
    }

    fn evict<W: WriteBack + ?Sized>(&mut self, offset: u64, sink: &mut W) {
        let Some(entry) = self.entries.remove(&offset) else {
            return;
        };
        CacheStats::bump(&self.stats.evictions);
        if !entry.dirty {
            return;
        }

        let mut node = entry.node;
        match write_node(self.policy.attempts(), &self.stats, &mut node, sink) {
            Ok(()) => debug!("evicted dirty node at {}", node.page),
            Err(e) => {
                warn!("write-back of evicted node at {} failed: {}", node.page, e);
                self.backlog.insert(offset, node);
                if self.failure.is_none() {
                    self.failure = Some(Error::WriteBack {
                        offset,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}

/// Write a node back, retrying up to `attempts` times in total.
fn write_node<W: WriteBack + ?Sized>(
    attempts: u32,
    stats: &CacheStats,
    node: &mut Node,
    sink: &mut W,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match sink.write_back(node) {
            Ok(()) => {
                CacheStats::bump(&stats.pages_written);
                return Ok(());
            }
            Err(e) => {
                CacheStats::bump(&stats.write_back_failures);
                if attempt >= attempts {
                    return Err(e);
                }
                debug!(
                    "write-back of {} failed (attempt {}/{}): {}",
                    node.page, attempt, attempts, e
                );
                attempt += 1;
            }
        }
    }
}
