//! File-backed pose memory
//!
//! Same JSON shape as a snapshot entry, without the time:
//! `{ "<tracker key>": { "transform": [...] | null, "relativeTo": "..." | null } }`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use tracksim_core::{EntityKey, TrackError, TrackResult};
use tracksim_visual::{PersistedPose, PoseMemory};

use crate::snapshot::TransformRepr;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryEntry {
    #[serde(default)]
    transform: Option<TransformRepr>,
    #[serde(default)]
    relative_to: Option<String>,
}

/// Pose memory persisted to a JSON file on [`PoseMemory::flush`]
#[derive(Debug)]
pub struct JsonPoseMemory {
    path: PathBuf,
    poses: RwLock<BTreeMap<EntityKey, PersistedPose>>,
    dirty: AtomicBool,
}

impl JsonPoseMemory {
    /// Load `path` if it exists, start empty otherwise
    pub fn open(path: impl Into<PathBuf>) -> TrackResult<Self> {
        let path = path.into();
        let poses = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            parse_memory(&json)?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = ?path, entries = poses.len(), "opened pose memory");
        Ok(JsonPoseMemory {
            path,
            poses: RwLock::new(poses),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_memory(json: &str) -> TrackResult<BTreeMap<EntityKey, PersistedPose>> {
    let entries: BTreeMap<String, MemoryEntry> =
        serde_json::from_str(json).map_err(|e| TrackError::Config(e.to_string()))?;
    entries
        .into_iter()
        .map(|(key, entry)| {
            let transform = entry
                .transform
                .as_ref()
                .map(TransformRepr::to_matrix)
                .transpose()?;
            let pose = PersistedPose {
                transform,
                relative_to: entry.relative_to.map(EntityKey::new),
            };
            Ok((EntityKey::new(key), pose))
        })
        .collect()
}

impl PoseMemory for JsonPoseMemory {
    fn load(&self) -> BTreeMap<EntityKey, PersistedPose> {
        self.poses.read().clone()
    }

    fn contains(&self, key: &EntityKey) -> bool {
        self.poses.read().contains_key(key)
    }

    fn store(&self, key: &EntityKey, pose: PersistedPose) {
        let mut poses = self.poses.write();
        if poses.get(key) != Some(&pose) {
            poses.insert(key.clone(), pose);
            self.dirty.store(true, Ordering::Release);
        }
    }

    fn flush(&self) -> TrackResult<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let entries: BTreeMap<String, MemoryEntry> = self
            .poses
            .read()
            .iter()
            .map(|(key, pose)| {
                let entry = MemoryEntry {
                    transform: pose.transform.as_ref().map(TransformRepr::from_matrix),
                    relative_to: pose.relative_to.as_ref().map(|k| k.as_str().to_string()),
                };
                (key.as_str().to_string(), entry)
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| TrackError::Config(e.to_string()))?;
        if let Err(e) = std::fs::write(&self.path, json) {
            self.dirty.store(true, Ordering::Release);
            return Err(e.into());
        }
        Ok(())
    }
}
