//! Pose memory - poses that outlive the process
//!
//! The binding manager mirrors live poses into memory on every refresh and
//! restores them into the pose store once at startup.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use tracksim_core::{EntityKey, Matrix4, TimestampedPose, TrackResult};

/// What is remembered per tracker key
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersistedPose {
    pub transform: Option<Matrix4>,
    pub relative_to: Option<EntityKey>,
}

impl From<&TimestampedPose> for PersistedPose {
    fn from(pose: &TimestampedPose) -> Self {
        PersistedPose {
            transform: pose.transform,
            relative_to: pose.relative_to.clone(),
        }
    }
}

/// Key-value store for persisted poses
pub trait PoseMemory: Send + Sync {
    fn load(&self) -> BTreeMap<EntityKey, PersistedPose>;

    fn contains(&self, key: &EntityKey) -> bool;

    fn store(&self, key: &EntityKey, pose: PersistedPose);

    /// Write pending changes to durable storage
    fn flush(&self) -> TrackResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPoseMemory {
    poses: RwLock<BTreeMap<EntityKey, PersistedPose>>,
}

impl InMemoryPoseMemory {
    pub fn new() -> Self {
        InMemoryPoseMemory::default()
    }

    pub fn with_poses(poses: BTreeMap<EntityKey, PersistedPose>) -> Self {
        InMemoryPoseMemory {
            poses: RwLock::new(poses),
        }
    }

    pub fn get(&self, key: &EntityKey) -> Option<PersistedPose> {
        self.poses.read().get(key).cloned()
    }
}

impl PoseMemory for InMemoryPoseMemory {
    fn load(&self) -> BTreeMap<EntityKey, PersistedPose> {
        self.poses.read().clone()
    }

    fn contains(&self, key: &EntityKey) -> bool {
        self.poses.read().contains_key(key)
    }

    fn store(&self, key: &EntityKey, pose: PersistedPose) {
        self.poses.write().insert(key.clone(), pose);
    }
}
