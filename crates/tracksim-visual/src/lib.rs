//! TrackSim Visual Bindings
//!
//! Poses become pictures here. Every tracked entity may be drawn as up to
//! three actors (tracker geometry, tool geometry, and for a subject tracker
//! the bound subject surface). The binding manager keeps those actors in step
//! with the pose store; the manipulation controller turns user drags back
//! into tracker poses.
//!
//! # Refresh cycle
//!
//! - Drop actors whose entity left the registry
//! - Restore persisted poses once per process
//! - Mirror live poses into pose memory
//! - Create, move, show or hide each actor
//!
//! Actors currently being dragged are never touched by a refresh.

pub mod binding;
pub mod entity;
pub mod headless;
pub mod manipulate;
pub mod memory;
pub mod renderer;

pub use binding::*;
pub use entity::*;
pub use headless::*;
pub use manipulate::*;
pub use memory::*;
pub use renderer::*;
