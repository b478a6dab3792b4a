//! geopagedb - a disk-resident spatial index with a bounded write-back node
//! cache.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           geopagedb                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Index Layer (index/)                        │   │
//! │  │   SpatialIndex → Strategy (R-tree | Quadtree) → Node     │   │
//! │  │   Visitor-driven queries: intersection, containment,     │   │
//! │  │   point                                                  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Config (index/config.rs)                           │   │
//! │  │   load / store_node / create_node / destroy_node         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Node Cache (buffer/)                               │   │
//! │  │   LRU + pins, write-back on evict, failure policy        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Storage Layer (storage/)                           │   │
//! │  │   PageStore (free-page stack) + PageCodec + Channel      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (Region, Entry, PageRef, Error, config)
//! - [`buffer`] - Node cache, LRU replacer and statistics
//! - [`storage`] - Byte channels, node record format and slot allocation
//! - [`index`] - Tree strategies, queries and the public index
//!
//! # Quick Start
//! ```no_run
//! use geopagedb::{CollectingVisitor, IndexOptions, Point, Region, SpatialIndex};
//!
//! let mut index = SpatialIndex::create_file("parcels.idx", IndexOptions::quadtree()).unwrap();
//! index.insert(Region::new(10.0, 10.0, 12.0, 11.0).unwrap(), 1).unwrap();
//!
//! let mut hits = CollectingVisitor::new();
//! index.point_query(Point::new(11.0, 10.5), &mut hits).unwrap();
//! index.checkpoint().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::{Entry, Error, FaultKind, PageRef, Point, Region, Result};

pub use buffer::{CacheStats, EvictionFailurePolicy, StatsSnapshot};
pub use index::{
    CollectingVisitor, IndexOptions, IndexStatistics, Node, SpatialIndex, SplitPolicy,
    StrategyKind, SyncSpatialIndex, Visitor,
};
pub use storage::{ByteOrder, Channel, FileChannel, MemoryChannel};
