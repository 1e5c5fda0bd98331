//! TrackSim Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout TrackSim:
//! - Identifiers (EntityKey, ActorKey, Aspect)
//! - Wall-clock timestamps
//! - Transform algebra over homogeneous 4x4 matrices
//! - Timestamped poses
//! - The shared error taxonomy

pub mod error;
pub mod id;
pub mod pose;
pub mod time;
pub mod transform;

pub use error::*;
pub use id::*;
pub use pose::*;
pub use time::*;
pub use transform::{apply, approx_eq, compose, from_row_major, identity, invert, to_row_major};
pub use transform::{Matrix4, Point3, SINGULAR_EPSILON};
