//! Node cache management.
//!
//! The node cache is the in-memory layer between the tree algorithms and the
//! page store. It keeps a bounded set of materialized nodes and writes dirty
//! ones back when they leave.
//!
//! # Components
//! - [`NodeCache`] - The bounded write-back cache
//! - [`WriteBack`] - Where evicted dirty nodes are written
//! - [`EvictionFailurePolicy`] - What a failed eviction write-back does
//! - [`CacheStats`] - Performance statistics
//! - [`replacer`] - Eviction policy implementations

mod node_cache;
pub mod replacer;
mod stats;

pub use node_cache::{EvictionFailurePolicy, NodeCache, WriteBack};
pub use stats::{CacheStats, StatsSnapshot};
