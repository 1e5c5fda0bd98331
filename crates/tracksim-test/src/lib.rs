//! TrackSim Test Harness
//!
//! This crate provides:
//! - A simulated positions server speaking the wire protocol
//! - Entity and pose fixtures
//! - End-to-end scenarios: client, panel, drag and snapshot flows

pub mod fixtures;
pub mod integration;
pub mod server;

pub use fixtures::*;
pub use server::*;
