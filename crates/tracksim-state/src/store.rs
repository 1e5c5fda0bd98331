//! Pose store contract and the serverless local store

use std::collections::BTreeMap;
use std::future::Future;

use tracksim_core::{EntityKey, Matrix4, TimestampedPose, TrackResult};

use crate::{PoseCache, PoseChanges};

/// Source of truth for the latest pose of every tracked entity.
///
/// Reads are served from the local [`PoseCache`] and never wait on the
/// network. Record commands update the cache only once the authority behind
/// the store has confirmed them.
pub trait PoseStore: Send + Sync + 'static {
    /// Local cache backing the reads
    fn cache(&self) -> &PoseCache;

    /// Record a new pose and wait for confirmation.
    ///
    /// Dropping the returned future before it completes leaves the cache
    /// untouched.
    fn record_pose(
        &self,
        key: EntityKey,
        pose: TimestampedPose,
    ) -> impl Future<Output = TrackResult<()>> + Send;

    /// Record a new pose, blocking the calling thread until confirmed
    fn record_pose_blocking(&self, key: EntityKey, pose: TimestampedPose) -> TrackResult<()>;

    fn latest(&self, key: &EntityKey) -> Option<TimestampedPose> {
        self.cache().get(key)
    }

    fn latest_transform(&self, key: &EntityKey) -> Option<Matrix4> {
        self.cache().transform(key)
    }

    fn latest_poses(&self) -> BTreeMap<EntityKey, TimestampedPose> {
        self.cache().snapshot()
    }

    fn subscribe(&self) -> PoseChanges {
        self.cache().subscribe()
    }
}

/// Pose store with no remote authority: every command is confirmed
/// immediately.
#[derive(Debug, Default)]
pub struct LocalPoseStore {
    cache: PoseCache,
}

impl LocalPoseStore {
    pub fn new() -> Self {
        LocalPoseStore::default()
    }

    /// Pre-populate the store without going through record commands
    pub fn with_poses<I>(poses: I) -> Self
    where
        I: IntoIterator<Item = (EntityKey, TimestampedPose)>,
    {
        let store = LocalPoseStore::new();
        store.cache.apply(poses);
        store
    }
}

impl PoseStore for LocalPoseStore {
    fn cache(&self) -> &PoseCache {
        &self.cache
    }

    fn record_pose(
        &self,
        key: EntityKey,
        pose: TimestampedPose,
    ) -> impl Future<Output = TrackResult<()>> + Send {
        async move {
            self.cache.apply([(key, pose)]);
            Ok(())
        }
    }

    fn record_pose_blocking(&self, key: EntityKey, pose: TimestampedPose) -> TrackResult<()> {
        self.cache.apply([(key, pose)]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_record_is_visible_before_notification() {
        let store = LocalPoseStore::new();
        let mut changes = store.subscribe();
        let key = EntityKey::new("pointer");

        store
            .record_pose(key.clone(), TimestampedPose::identity_now())
            .await
            .unwrap();

        changes.changed().await.unwrap();
        assert_eq!(store.latest_transform(&key), Some(Matrix4::identity()));
    }

    #[test]
    fn test_blocking_record_clears_pose() {
        let key = EntityKey::new("coil");
        let store = LocalPoseStore::with_poses([(key.clone(), TimestampedPose::identity_now())]);

        store
            .record_pose_blocking(key.clone(), TimestampedPose::absent_now())
            .unwrap();

        assert!(store.latest(&key).is_some());
        assert!(store.latest_transform(&key).is_none());
    }

    #[test]
    fn test_latest_poses_is_ordered() {
        let store = LocalPoseStore::with_poses([
            (EntityKey::new("b"), TimestampedPose::identity_now()),
            (EntityKey::new("a"), TimestampedPose::identity_now()),
        ]);
        let keys: Vec<_> = store.latest_poses().into_keys().collect();
        assert_eq!(keys, vec![EntityKey::new("a"), EntityKey::new("b")]);
    }
}
