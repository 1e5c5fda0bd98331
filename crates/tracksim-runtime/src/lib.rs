//! TrackSim Runtime
//!
//! Wires the pieces together for a running tool panel:
//!
//! - [`PositionsClient`]: the networked pose store
//! - [`snapshot`]: JSON import and export of every pose at once
//! - [`JsonPoseMemory`]: poses remembered across restarts
//! - [`ToolPanel`]: composition root, refresh driver and bulk operations

pub mod client;
pub mod config;
pub mod logging;
pub mod memory;
pub mod panel;
pub mod snapshot;

pub use client::PositionsClient;
pub use config::{ClientConfig, PanelConfig};
pub use logging::{init_tracing, LogConfig};
pub use memory::JsonPoseMemory;
pub use panel::{EntityEvent, ToolPanel};
pub use snapshot::{
    default_snapshot_file_name, export_snapshot, import_poses, import_snapshot, parse_snapshot,
    read_snapshot_file, write_snapshot_file, ExportOptions, Snapshot,
};
