//! Positions snapshots
//!
//! A snapshot is a JSON object keyed by entity key:
//!
//! ```json
//! {
//!   "pointer": { "time": 1700000000.0, "transform": [16 numbers, row-major], "relativeTo": null },
//!   "coil":    { "time": 1700000000.0, "transform": null, "relativeTo": "subject" }
//! }
//! ```
//!
//! Import also accepts `transform` as a nested 4x4 array.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use tracksim_core::{
    from_row_major, to_row_major, EntityKey, Matrix4, Timestamp, TimestampedPose, TrackError,
    TrackResult,
};
use tracksim_state::PoseStore;

/// Poses keyed by entity, in key order
pub type Snapshot = BTreeMap<EntityKey, TimestampedPose>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Keep entries whose pose is relative to another entity
    pub include_relative: bool,
}

/// Transform as written in JSON files
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum TransformRepr {
    RowMajor(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

impl TransformRepr {
    pub(crate) fn from_matrix(m: &Matrix4) -> Self {
        TransformRepr::RowMajor(to_row_major(m).to_vec())
    }

    pub(crate) fn to_matrix(&self) -> TrackResult<Matrix4> {
        let values: Vec<f64> = match self {
            TransformRepr::RowMajor(values) => values.clone(),
            TransformRepr::Nested(rows) => {
                if rows.len() != 4 || rows.iter().any(|r| r.len() != 4) {
                    return Err(TrackError::MalformedSnapshot(
                        "transform must be 4x4".into(),
                    ));
                }
                rows.concat()
            }
        };
        let values: [f64; 16] = values.try_into().map_err(|v: Vec<f64>| {
            TrackError::MalformedSnapshot(format!("transform has {} values, expected 16", v.len()))
        })?;
        Ok(from_row_major(&values))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotEntry {
    #[serde(default)]
    time: f64,
    #[serde(default)]
    transform: Option<TransformRepr>,
    #[serde(default)]
    relative_to: Option<String>,
}

impl SnapshotEntry {
    fn from_pose(pose: &TimestampedPose) -> Self {
        SnapshotEntry {
            time: pose.time.as_secs_f64(),
            transform: pose.transform.as_ref().map(TransformRepr::from_matrix),
            relative_to: pose.relative_to.as_ref().map(|k| k.as_str().to_string()),
        }
    }

    fn into_pose(self) -> TrackResult<TimestampedPose> {
        Ok(TimestampedPose {
            time: Timestamp::from_secs_f64(self.time),
            transform: self.transform.as_ref().map(TransformRepr::to_matrix).transpose()?,
            relative_to: self.relative_to.map(EntityKey::new),
        })
    }
}

/// Serialize poses as pretty-printed JSON
pub fn export_snapshot(poses: &Snapshot, options: ExportOptions) -> TrackResult<String> {
    let entries: BTreeMap<&str, SnapshotEntry> = poses
        .iter()
        .filter(|(_, pose)| options.include_relative || !pose.is_relative())
        .map(|(key, pose)| (key.as_str(), SnapshotEntry::from_pose(pose)))
        .collect();
    serde_json::to_string_pretty(&entries).map_err(|e| TrackError::MalformedSnapshot(e.to_string()))
}

/// Parse a whole snapshot; nothing is returned unless every entry is valid
pub fn parse_snapshot(json: &str) -> TrackResult<Snapshot> {
    let entries: BTreeMap<String, SnapshotEntry> =
        serde_json::from_str(json).map_err(|e| TrackError::MalformedSnapshot(e.to_string()))?;
    entries
        .into_iter()
        .map(|(key, entry)| {
            let pose = entry.into_pose().map_err(|e| match e {
                TrackError::MalformedSnapshot(reason) => {
                    TrackError::MalformedSnapshot(format!("{}: {}", key, reason))
                }
                other => other,
            })?;
            Ok((EntityKey::new(key), pose))
        })
        .collect()
}

/// Record every pose as new, stamped now. Keys need not belong to a known
/// entity. Returns the number of poses recorded.
pub async fn import_poses<S: PoseStore>(store: &S, poses: Snapshot) -> TrackResult<usize> {
    let now = Timestamp::now();
    let mut recorded = 0;
    for (key, pose) in poses {
        tracing::info!("Setting pose for {} to {:?}", key, pose.transform);
        store.record_pose(key, pose.restamped(now)).await?;
        recorded += 1;
    }
    Ok(recorded)
}

/// Parse then import. A malformed snapshot records nothing.
pub async fn import_snapshot<S: PoseStore>(store: &S, json: &str) -> TrackResult<usize> {
    let poses = parse_snapshot(json)?;
    import_poses(store, poses).await
}

pub fn read_snapshot_file(path: impl AsRef<Path>) -> TrackResult<Snapshot> {
    let json = std::fs::read_to_string(path)?;
    parse_snapshot(&json)
}

/// Returns the number of entries written
pub fn write_snapshot_file(
    path: impl AsRef<Path>,
    poses: &Snapshot,
    options: ExportOptions,
) -> TrackResult<usize> {
    let path = path.as_ref();
    let json = export_snapshot(poses, options)?;
    std::fs::write(path, json)?;
    let written = poses
        .values()
        .filter(|p| options.include_relative || !p.is_relative())
        .count();
    tracing::info!("Exported positions snapshot to {:?}", path);
    Ok(written)
}

/// `SimulatedPositions_<yymmddHHMMSS>.json`, in the clock's own time zone
pub fn default_snapshot_file_name<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("SimulatedPositions_{}.json", now.format("%y%m%d%H%M%S"))
}
