//! TrackSim State - the latest known pose per tracked entity
//!
//! This crate implements:
//! - The pose cache (single update path, latest value wins)
//! - Coalesced change notification
//! - The `PoseStore` contract shared by networked and local stores

pub mod cache;
pub mod store;

pub use cache::*;
pub use store::*;
