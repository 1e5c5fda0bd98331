//! TrackSim Transport Layer - framed TCP channels
//!
//! This crate provides:
//! - Connecting with a bounded timeout
//! - Framed message read/write over any async byte stream
//! - A background receive loop feeding a bounded channel

pub mod tcp;

pub use tcp::*;
