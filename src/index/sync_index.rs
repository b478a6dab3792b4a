//! Shared access to a [`SpatialIndex`] from several threads.

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::StatsSnapshot;
use crate::common::{Entry, Point, Region, Result};
use crate::index::{CollectingVisitor, IndexStatistics, SpatialIndex};

/// A [`SpatialIndex`] behind a mutex.
///
/// # Thread Safety
/// - `inner`: `Mutex`, not `RwLock` - queries page nodes into the cache, so
///   even reads change state
///
/// Every operation holds the lock for its whole duration; operations from
/// different threads are serialized, never interleaved.
///
/// # Usage
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use geopagedb::{IndexOptions, Region, SpatialIndex, SyncSpatialIndex};
///
/// let index = SpatialIndex::in_memory(IndexOptions::quadtree()).unwrap();
/// let shared = Arc::new(SyncSpatialIndex::new(index));
///
/// let handles: Vec<_> = (0..4)
///     .map(|t| {
///         let shared = Arc::clone(&shared);
///         thread::spawn(move || {
///             let x = t as f64;
///             shared.insert(Region::new(x, x, x + 0.5, x + 0.5).unwrap(), t).unwrap();
///         })
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(shared.statistics().data_count, 4);
/// ```
pub struct SyncSpatialIndex {
    inner: Mutex<SpatialIndex>,
}

impl SyncSpatialIndex {
    pub fn new(index: SpatialIndex) -> Self {
        Self {
            inner: Mutex::new(index),
        }
    }

    pub fn insert(&self, region: Region, payload: i32) -> Result<()> {
        self.inner.lock().insert(region, payload)
    }

    pub fn delete(&self, region: &Region, payload: i32) -> Result<bool> {
        self.inner.lock().delete(region, payload)
    }

    /// Entries intersecting `query`.
    pub fn intersection_query(&self, query: &Region) -> Result<Vec<Entry>> {
        let mut visitor = CollectingVisitor::new();
        self.inner.lock().intersection_query(query, &mut visitor)?;
        Ok(visitor.entries)
    }

    /// Entries inside `query`.
    pub fn containment_query(&self, query: &Region) -> Result<Vec<Entry>> {
        let mut visitor = CollectingVisitor::new();
        self.inner.lock().containment_query(query, &mut visitor)?;
        Ok(visitor.entries)
    }

    /// Entries containing `point`.
    pub fn point_query(&self, point: Point) -> Result<Vec<Entry>> {
        let mut visitor = CollectingVisitor::new();
        self.inner.lock().point_query(point, &mut visitor)?;
        Ok(visitor.entries)
    }

    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.inner.lock().checkpoint()
    }

    pub fn statistics(&self) -> IndexStatistics {
        self.inner.lock().statistics()
    }

    pub fn cache_stats(&self) -> StatsSnapshot {
        self.inner.lock().cache_stats()
    }

    /// Lock the index for a sequence of operations, for example a query with
    /// a custom [`crate::Visitor`].
    pub fn lock(&self) -> MutexGuard<'_, SpatialIndex> {
        self.inner.lock()
    }

    pub fn into_inner(self) -> SpatialIndex {
        self.inner.into_inner()
    }
}
