//! SpatialIndex - the public entry point.
//!
//! Ties a [`Config`] to one node strategy and wraps every public operation
//! in the pin/settle lifecycle of the node cache.

use std::fmt;
use std::path::Path;

use log::{debug, info};

use crate::buffer::StatsSnapshot;
use crate::common::{Entry, Error, Point, Region, Result};
use crate::index::query::{traverse, QueryKind};
use crate::index::quadtree::QuadTree;
use crate::index::rtree::RTree;
use crate::index::{Config, IndexOptions, StrategyKind, Visitor};
use crate::storage::{Channel, FileChannel, MemoryChannel, PageStore};

/// Node count and entry count of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStatistics {
    pub node_count: u64,
    pub data_count: u64,
}

impl fmt::Display for IndexStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} nodes, {} entries", self.node_count, self.data_count)
    }
}

/// Node strategies are a closed set; the header records which one a store
/// was built with.
#[derive(Debug, Clone, Copy)]
enum Strategy {
    CapacityBounded(RTree),
    Quadrant(QuadTree),
}

impl Strategy {
    fn new(options: &IndexOptions) -> Self {
        match options.strategy {
            StrategyKind::CapacityBounded => Strategy::CapacityBounded(RTree::new(options)),
            StrategyKind::Quadrant => Strategy::Quadrant(QuadTree::new()),
        }
    }

    fn insert(&self, cfg: &mut Config, entry: Entry) -> Result<()> {
        match self {
            Strategy::CapacityBounded(tree) => tree.insert(cfg, entry),
            Strategy::Quadrant(tree) => tree.insert(cfg, entry),
        }
    }

    fn delete(&self, cfg: &mut Config, entry: &Entry) -> Result<bool> {
        match self {
            Strategy::CapacityBounded(tree) => tree.delete(cfg, entry),
            Strategy::Quadrant(tree) => tree.delete(cfg, entry),
        }
    }
}

/// A persistent 2D spatial index over a byte channel.
///
/// # Example
/// ```
/// use geopagedb::{CollectingVisitor, IndexOptions, Region, SpatialIndex};
///
/// let mut index = SpatialIndex::in_memory(IndexOptions::rtree()).unwrap();
/// index.insert(Region::new(0.0, 0.0, 1.0, 1.0).unwrap(), 7).unwrap();
///
/// let mut hits = CollectingVisitor::new();
/// let query = Region::new(0.5, 0.5, 2.0, 2.0).unwrap();
/// index.intersection_query(&query, &mut hits).unwrap();
/// assert_eq!(hits.payloads(), vec![7]);
/// ```
///
/// # Durability
/// Changed nodes reach the channel when they are evicted from the cache or
/// on [`SpatialIndex::checkpoint`]. Only a checkpointed store can be
/// reopened with [`SpatialIndex::open`].
///
/// # Thread Safety
/// Every operation takes `&mut self`. Use [`crate::SyncSpatialIndex`] to
/// share an index between threads.
pub struct SpatialIndex {
    config: Config,
    strategy: Strategy,
}

impl SpatialIndex {
    // ========================================================================
    // Public API: Construction
    // ========================================================================

    /// Create an empty index on `channel`, discarding anything it held.
    ///
    /// # Errors
    /// Returns `Error::InvalidOptions` for inconsistent options, or a store
    /// fault if the header can't be written.
    pub fn create(channel: Box<dyn Channel>, options: IndexOptions) -> Result<Self> {
        options.validate()?;
        let store = PageStore::new(channel, options.byte_order, options.force_sync);
        let strategy = Strategy::new(&options);
        let mut config = Config::new(store, options);
        config.reset()?;

        info!(
            "created {:?} index (cache capacity {})",
            config.options().strategy,
            config.options().cache_capacity
        );
        Ok(Self { config, strategy })
    }

    /// Reopen a checkpointed index. The byte order comes from the store;
    /// the strategy in `options` must match the one the store was built with.
    ///
    /// # Errors
    /// Returns `Error::IncompatibleStore` if the header is missing, corrupt,
    /// or written by a different strategy.
    pub fn open(mut channel: Box<dyn Channel>, mut options: IndexOptions) -> Result<Self> {
        options.validate()?;
        let header = PageStore::read_header(channel.as_mut())?;
        if header.strategy != options.strategy as u8 {
            return Err(Error::IncompatibleStore(format!(
                "store was built with strategy {}, opened as {:?}",
                header.strategy, options.strategy
            )));
        }
        options.byte_order = header.byte_order;

        let store = PageStore::restore(channel, &header, options.force_sync)?;
        let strategy = Strategy::new(&options);
        let config = Config::restore(store, options, &header);

        info!(
            "opened {:?} index: {} nodes, {} entries",
            config.options().strategy,
            header.node_count,
            header.data_count
        );
        Ok(Self { config, strategy })
    }

    /// Create an index backed by memory only.
    pub fn in_memory(options: IndexOptions) -> Result<Self> {
        Self::create(Box::new(MemoryChannel::new()), options)
    }

    /// Create a new index file.
    ///
    /// # Errors
    /// Fails if the file already exists.
    pub fn create_file<P: AsRef<Path>>(path: P, options: IndexOptions) -> Result<Self> {
        Self::create(Box::new(FileChannel::create(path)?), options)
    }

    /// Reopen a checkpointed index file.
    pub fn open_file<P: AsRef<Path>>(path: P, options: IndexOptions) -> Result<Self> {
        Self::open(Box::new(FileChannel::open(path)?), options)
    }

    // ========================================================================
    // Public API: Updates
    // ========================================================================

    /// Add an entry. Duplicate pairs are kept as separate entries.
    pub fn insert(&mut self, region: Region, payload: i32) -> Result<()> {
        let entry = Entry::new(region, payload);
        self.update(|strategy, cfg| {
            strategy.insert(cfg, entry)?;
            cfg.note_inserted();
            Ok(())
        })
    }

    /// Remove one entry with exactly this region and payload.
    ///
    /// Returns `Ok(false)`, with the index unchanged, if there is none.
    pub fn delete(&mut self, region: &Region, payload: i32) -> Result<bool> {
        let entry = Entry::new(*region, payload);
        self.update(|strategy, cfg| {
            let removed = strategy.delete(cfg, &entry)?;
            if removed {
                cfg.note_deleted();
            }
            Ok(removed)
        })
    }

    /// Write every cached node, then clear the index to empty.
    pub fn flush(&mut self) -> Result<()> {
        self.config.flush_all()?;
        self.config.reset()?;
        info!("index flushed and cleared");
        Ok(())
    }

    /// Write every dirty node, the free list and the header, then sync. The
    /// index stays populated and can be reopened from the store afterwards.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.config.checkpoint()
    }

    // ========================================================================
    // Public API: Queries
    // ========================================================================

    /// Visit every entry whose region intersects `query`.
    pub fn intersection_query<V: Visitor + ?Sized>(
        &mut self,
        query: &Region,
        visitor: &mut V,
    ) -> Result<()> {
        self.query(query, QueryKind::Intersection, visitor)
    }

    /// Visit every entry whose region lies inside `query`.
    pub fn containment_query<V: Visitor + ?Sized>(
        &mut self,
        query: &Region,
        visitor: &mut V,
    ) -> Result<()> {
        self.query(query, QueryKind::Containment, visitor)
    }

    /// Visit every entry whose region contains `point`.
    pub fn point_query<V: Visitor + ?Sized>(&mut self, point: Point, visitor: &mut V) -> Result<()> {
        let query = point.to_region()?;
        self.query(&query, QueryKind::Intersection, visitor)
    }

    // ========================================================================
    // Public API: Introspection
    // ========================================================================

    pub fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            node_count: self.config.node_count(),
            data_count: self.config.data_count(),
        }
    }

    /// Region of the root node, or None for an empty index.
    pub fn bounds(&mut self) -> Result<Option<Region>> {
        let Some(root) = self.config.root() else {
            return Ok(None);
        };
        let region = self.config.load(root).map(|node| node.region);
        self.config.finish();
        Ok(Some(region?))
    }

    pub fn cache_stats(&self) -> StatsSnapshot {
        self.config.stats()
    }

    /// Number of nodes currently held by the cache.
    pub fn cached_nodes(&self) -> usize {
        self.config.cache().len()
    }

    /// True while evicted nodes are waiting in the write-back backlog under
    /// [`crate::EvictionFailurePolicy::Degrade`].
    pub fn is_degraded(&self) -> bool {
        self.config.is_degraded()
    }

    pub fn options(&self) -> &IndexOptions {
        self.config.options()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Run a structural change with pinning on, then release pins.
    ///
    /// Under the `Abort` and `Retry` eviction policies the change does not
    /// start while evicted nodes can't be written back, so an error from
    /// this gate means the index is unchanged.
    fn update<T>(&mut self, op: impl FnOnce(&Strategy, &mut Config) -> Result<T>) -> Result<T> {
        self.config.begin_update()?;
        let result = op(&self.strategy, &mut self.config);
        self.config.finish();
        result
    }

    fn query<V: Visitor + ?Sized>(
        &mut self,
        query: &Region,
        kind: QueryKind,
        visitor: &mut V,
    ) -> Result<()> {
        let Some(root) = self.config.root() else {
            return Ok(());
        };
        debug!("{:?} query {}", kind, query);
        let result = traverse(&mut self.config, root, query, kind, visitor);
        self.config.finish();
        result
    }
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("strategy", &self.config.options().strategy)
            .field("root", &self.config.root())
            .field("statistics", &self.statistics())
            .field("cached_nodes", &self.cached_nodes())
            .finish()
    }
}
