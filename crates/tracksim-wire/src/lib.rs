//! TrackSim Wire Protocol - Binary frame format
//!
//! Every message on both channels is one frame:
//! - Fixed header (12 bytes)
//! - Payload (message-kind specific)
//!
//! The subscribe channel carries `PoseUpdate` frames from the server.
//! The command channel carries `RecordPose` requests answered by `Ack` or
//! `Reject` with the same sequence number.

pub mod header;
pub mod message;

pub use header::*;
pub use message::*;
