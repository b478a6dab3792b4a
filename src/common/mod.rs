//! Common types and utilities shared across geopagedb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and on-disk sizes
//! - Error types
//! - Keys and identifiers (Region, Entry, PageRef)

pub mod config;
pub mod error;
mod page_ref;
mod region;

pub use error::{Error, FaultKind, Result};
pub use page_ref::PageRef;
pub use region::{Entry, Point, Region};
