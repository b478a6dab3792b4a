//! Eviction policy implementations (replacers).
//!
//! Currently implements:
//! - [`LruReplacer`] - Least Recently Used, with pinning

mod lru;

pub use lru::LruReplacer;
