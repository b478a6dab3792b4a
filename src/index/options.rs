//! Index tuning options.

use crate::buffer::EvictionFailurePolicy;
use crate::common::config::{
    record_len, DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_NODE_ENTRIES, DEFAULT_MIN_NODE_ENTRIES,
    QUAD_SLOT_ENTRIES,
};
use crate::common::{Error, Result};
use crate::storage::ByteOrder;

/// Which node strategy an index uses. Recorded in the store header.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// R-tree: nodes hold between `min_node_entries` and `max_node_entries`
    /// items and split on overflow.
    #[default]
    CapacityBounded = 0,
    /// Quadtree: fixed 4-way subdivision around each node's center, with a
    /// root that grows outward from the origin.
    Quadrant = 1,
}

impl StrategyKind {
    /// Convert from u8, returning None for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(StrategyKind::CapacityBounded),
            1 => Some(StrategyKind::Quadrant),
            _ => None,
        }
    }
}

/// How an overflowing R-tree node is partitioned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Guttman's linear-cost split.
    Linear,
    /// Guttman's quadratic-cost split.
    #[default]
    Quadratic,
}

/// Runtime options for a [`crate::SpatialIndex`].
///
/// # Example
/// ```
/// use geopagedb::{IndexOptions, SplitPolicy};
///
/// let options = IndexOptions::rtree()
///     .with_node_capacity(2, 8)
///     .with_split_policy(SplitPolicy::Linear)
///     .with_cache_capacity(32);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    pub strategy: StrategyKind,
    /// Maximum entries (leaf) or children (internal) of an R-tree node.
    pub max_node_entries: usize,
    /// Minimum fill of a non-root R-tree node; underfull nodes are dissolved
    /// on delete.
    pub min_node_entries: usize,
    pub split_policy: SplitPolicy,
    /// Number of nodes kept in memory between operations.
    pub cache_capacity: usize,
    /// Byte order of node records. Ignored when opening an existing store.
    pub byte_order: ByteOrder,
    /// Sync the channel after every node and header write.
    pub force_sync: bool,
    pub eviction_failure: EvictionFailurePolicy,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::CapacityBounded,
            max_node_entries: DEFAULT_MAX_NODE_ENTRIES,
            min_node_entries: DEFAULT_MIN_NODE_ENTRIES,
            split_policy: SplitPolicy::Quadratic,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            byte_order: ByteOrder::Little,
            force_sync: false,
            eviction_failure: EvictionFailurePolicy::Abort,
        }
    }
}

impl IndexOptions {
    /// Defaults for a capacity-bounded (R-tree) index.
    pub fn rtree() -> Self {
        Self::default()
    }

    /// Defaults for a quadrant (quadtree) index.
    pub fn quadtree() -> Self {
        Self {
            strategy: StrategyKind::Quadrant,
            ..Self::default()
        }
    }

    pub fn with_node_capacity(mut self, min: usize, max: usize) -> Self {
        self.min_node_entries = min;
        self.max_node_entries = max;
        self
    }

    pub fn with_split_policy(mut self, policy: SplitPolicy) -> Self {
        self.split_policy = policy;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_force_sync(mut self, force_sync: bool) -> Self {
        self.force_sync = force_sync;
        self
    }

    pub fn with_eviction_failure(mut self, policy: EvictionFailurePolicy) -> Self {
        self.eviction_failure = policy;
        self
    }

    /// Check that the options describe a usable index.
    ///
    /// # Errors
    /// Returns `Error::InvalidOptions` if the cache has no room, the R-tree
    /// fill bounds are inconsistent, or a retry policy allows no attempts.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::InvalidOptions("cache_capacity must be > 0".into()));
        }
        if self.strategy == StrategyKind::CapacityBounded {
            if self.max_node_entries < 2 {
                return Err(Error::InvalidOptions(format!(
                    "max_node_entries must be >= 2, got {}",
                    self.max_node_entries
                )));
            }
            if self.min_node_entries == 0 || self.min_node_entries > self.max_node_entries / 2 {
                return Err(Error::InvalidOptions(format!(
                    "min_node_entries must be in 1..={}, got {}",
                    self.max_node_entries / 2,
                    self.min_node_entries
                )));
            }
        }
        if let EvictionFailurePolicy::Retry { attempts: 0 } = self.eviction_failure {
            return Err(Error::InvalidOptions("retry policy needs at least one attempt".into()));
        }
        Ok(())
    }

    /// Slot size given to a freshly created node.
    pub(crate) fn initial_slot_len(&self) -> usize {
        match self.strategy {
            StrategyKind::CapacityBounded => record_len(self.max_node_entries),
            StrategyKind::Quadrant => record_len(QUAD_SLOT_ENTRIES),
        }
    }
}
