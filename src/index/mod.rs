//! Index layer - the persistent spatial tree.
//!
//! # Components
//! - [`SpatialIndex`] - Public operations: insert, delete, queries, flush
//! - [`SyncSpatialIndex`] - Mutex-guarded index for shared use
//! - [`Config`] - Owns the page store, node cache and header state
//! - [`Node`] - In-memory view of one page
//! - [`Visitor`] - Receives query results
//! - [`IndexOptions`] - Strategy, node capacity, cache size and policies
//!
//! Two node strategies are available: a capacity-bounded R-tree and a
//! quadtree whose root grows outward from the origin.

mod config;
mod node;
mod options;
mod quadtree;
mod query;
mod rtree;
mod spatial_index;
mod split;
mod sync_index;

pub use config::Config;
pub use node::Node;
pub use options::{IndexOptions, SplitPolicy, StrategyKind};
pub use query::{CollectingVisitor, Visitor};
pub use spatial_index::{IndexStatistics, SpatialIndex};
pub use sync_index::SyncSpatialIndex;
