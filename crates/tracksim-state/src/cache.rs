//! Pose cache - the local view of every tracked entity's latest pose

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tokio::sync::watch;

use tracksim_core::{EntityKey, Matrix4, TimestampedPose};

/// Write counter of one cache slot. Every write to a key gets a fresh,
/// strictly increasing revision.
pub type Revision = u64;

#[derive(Debug)]
struct Slot {
    pose: TimestampedPose,
    revision: Revision,
}

#[derive(Debug, Default)]
struct Slots {
    poses: HashMap<EntityKey, Slot>,
    writes: Revision,
}

impl Slots {
    fn put(&mut self, key: EntityKey, pose: TimestampedPose) {
        self.writes += 1;
        let revision = self.writes;
        self.poses.insert(key, Slot { pose, revision });
    }
}

/// Latest pose per entity key.
///
/// Every mutation goes through [`PoseCache::apply`] or
/// [`PoseCache::apply_unless_superseded`]: all entries of a batch are written
/// before the change generation advances, so a subscriber woken by a
/// notification never reads a value older than the one that caused it.
#[derive(Debug)]
pub struct PoseCache {
    slots: RwLock<Slots>,
    generation: watch::Sender<u64>,
}

impl PoseCache {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        PoseCache {
            slots: RwLock::new(Slots::default()),
            generation,
        }
    }

    /// Latest pose for a key
    pub fn get(&self, key: &EntityKey) -> Option<TimestampedPose> {
        self.slots.read().poses.get(key).map(|s| s.pose.clone())
    }

    /// Latest known transform for a key
    pub fn transform(&self, key: &EntityKey) -> Option<Matrix4> {
        self.slots.read().poses.get(key).and_then(|s| s.pose.transform)
    }

    /// Revision of the latest write to a key, `None` if never written
    pub fn revision(&self, key: &EntityKey) -> Option<Revision> {
        self.slots.read().poses.get(key).map(|s| s.revision)
    }

    /// Check if a key has ever been seen
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.slots.read().poses.contains_key(key)
    }

    /// Copy of the whole cache, ordered by key
    pub fn snapshot(&self) -> BTreeMap<EntityKey, TimestampedPose> {
        self.slots
            .read()
            .poses
            .iter()
            .map(|(k, s)| (k.clone(), s.pose.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().poses.is_empty()
    }

    /// Store a batch of updates and notify subscribers once.
    /// Later entries for the same key supersede earlier ones.
    /// Returns the number of entries written.
    pub fn apply<I>(&self, updates: I) -> usize
    where
        I: IntoIterator<Item = (EntityKey, TimestampedPose)>,
    {
        let written = {
            let mut slots = self.slots.write();
            let mut written = 0;
            for (key, pose) in updates {
                slots.put(key, pose);
                written += 1;
            }
            written
        };

        if written > 0 {
            self.notify();
            tracing::trace!(written, "pose cache updated");
        }
        written
    }

    /// Store `pose` only if `key` has not been written since `seen` was read
    /// from [`PoseCache::revision`]. Returns false when a newer write won.
    pub fn apply_unless_superseded(
        &self,
        key: EntityKey,
        pose: TimestampedPose,
        seen: Option<Revision>,
    ) -> bool {
        {
            let mut slots = self.slots.write();
            let current = slots.poses.get(&key).map(|s| s.revision);
            if current != seen {
                tracing::trace!(key = %key, "pose superseded before confirmation");
                return false;
            }
            slots.put(key, pose);
        }
        self.notify();
        true
    }

    fn notify(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    /// Number of notification cycles so far
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Subscribe to change notifications. Changes before this call are
    /// considered seen.
    pub fn subscribe(&self) -> PoseChanges {
        PoseChanges {
            rx: self.generation.subscribe(),
        }
    }
}

impl Default for PoseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Coalescing change feed for a [`PoseCache`].
///
/// Any number of `apply` calls between two awaits of [`PoseChanges::changed`]
/// produce a single wake-up.
#[derive(Debug, Clone)]
pub struct PoseChanges {
    rx: watch::Receiver<u64>,
}

impl PoseChanges {
    /// Wait for the next change. Returns the new generation, or `None` once
    /// the cache has been dropped.
    pub async fn changed(&mut self) -> Option<u64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// True if a change happened that has not been observed yet
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Mark everything up to now as seen
    pub fn mark_seen(&mut self) -> u64 {
        *self.rx.borrow_and_update()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracksim_core::Timestamp;

    fn pose_at(secs: f64) -> TimestampedPose {
        TimestampedPose::new(Timestamp::from_secs_f64(secs), Some(Matrix4::identity()))
    }

    #[test]
    fn test_latest_wins_within_batch() {
        let cache = PoseCache::new();
        let key = EntityKey::new("T1");
        let mut changes = cache.subscribe();

        cache.apply(vec![(key.clone(), pose_at(1.0)), (key.clone(), pose_at(2.0))]);

        assert!(changes.has_changed());
        assert_eq!(changes.mark_seen(), 1);
        assert_eq!(cache.get(&key).unwrap().time, Timestamp::from_secs_f64(2.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_empty_batch_does_not_notify() {
        let cache = PoseCache::new();
        let changes = cache.subscribe();
        assert_eq!(cache.apply(Vec::new()), 0);
        assert!(!changes.has_changed());
        assert_eq!(cache.generation(), 0);
    }

    #[test]
    fn test_absent_transform_is_still_an_entry() {
        let cache = PoseCache::new();
        let key = EntityKey::new("coil");
        cache.apply([(key.clone(), TimestampedPose::absent_now())]);
        assert!(cache.contains(&key));
        assert!(cache.transform(&key).is_none());
    }

    #[test]
    fn test_confirmation_loses_to_newer_write() {
        let cache = PoseCache::new();
        let key = EntityKey::new("T1");
        let seen = cache.revision(&key);
        assert_eq!(seen, None);

        // a tracker report lands while the command is in flight
        cache.apply([(key.clone(), pose_at(9.0))]);
        assert!(!cache.apply_unless_superseded(key.clone(), pose_at(1.0), seen));
        assert_eq!(cache.get(&key).unwrap().time, Timestamp::from_secs_f64(9.0));

        let seen = cache.revision(&key);
        assert!(cache.apply_unless_superseded(key.clone(), pose_at(10.0), seen));
        assert_eq!(cache.get(&key).unwrap().time, Timestamp::from_secs_f64(10.0));
        assert!(cache.revision(&key) > seen);
        assert_eq!(cache.generation(), 2);
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_wakeup() {
        let cache = PoseCache::new();
        let mut changes = cache.subscribe();

        for i in 0..5 {
            cache.apply([(EntityKey::new("T1"), pose_at(i as f64))]);
        }

        let generation = changes.changed().await.unwrap();
        assert_eq!(generation, 5);
        assert!(!changes.has_changed());
        assert_eq!(
            cache.get(&EntityKey::new("T1")).unwrap().time,
            Timestamp::from_secs_f64(4.0)
        );
    }

    #[tokio::test]
    async fn test_changed_ends_when_cache_dropped() {
        let cache = PoseCache::new();
        let mut changes = cache.subscribe();
        drop(cache);
        assert_eq!(changes.changed().await, None);
    }
}
