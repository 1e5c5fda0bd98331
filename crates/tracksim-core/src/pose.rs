//! Timestamped pose - a tracked entity's pose at a moment
//!
//! A pose is never mutated in place: each update produces a new value that
//! supersedes the previous one for the same key.

use crate::{EntityKey, Matrix4, Timestamp};

/// Pose of a tracked entity at a moment in time
#[derive(Clone, Debug, PartialEq)]
pub struct TimestampedPose {
    /// When the pose was recorded
    pub time: Timestamp,
    /// Tracker-to-world (or tracker-to-`relative_to`) transform; absent when
    /// the entity has no known pose
    pub transform: Option<Matrix4>,
    /// Entity whose frame this pose is expressed in; absent means world frame
    pub relative_to: Option<EntityKey>,
}

impl TimestampedPose {
    pub fn new(time: Timestamp, transform: Option<Matrix4>) -> Self {
        TimestampedPose {
            time,
            transform,
            relative_to: None,
        }
    }

    /// Known pose stamped with the current time
    pub fn now(transform: Matrix4) -> Self {
        Self::new(Timestamp::now(), Some(transform))
    }

    /// "No known pose" stamped with the current time
    pub fn absent_now() -> Self {
        Self::new(Timestamp::now(), None)
    }

    /// Identity pose stamped with the current time
    pub fn identity_now() -> Self {
        Self::now(Matrix4::identity())
    }

    pub fn with_relative_to(mut self, other: impl Into<EntityKey>) -> Self {
        self.relative_to = Some(other.into());
        self
    }

    /// Same pose, re-stamped
    pub fn restamped(mut self, time: Timestamp) -> Self {
        self.time = time;
        self
    }

    #[inline]
    pub fn is_known(&self) -> bool {
        self.transform.is_some()
    }

    #[inline]
    pub fn is_relative(&self) -> bool {
        self.relative_to.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_pose() {
        let pose = TimestampedPose::absent_now();
        assert!(!pose.is_known());
        assert!(!pose.is_relative());
    }

    #[test]
    fn test_relative_pose() {
        let pose = TimestampedPose::identity_now().with_relative_to("T1");
        assert!(pose.is_known());
        assert_eq!(pose.relative_to, Some(EntityKey::new("T1")));
    }

    #[test]
    fn test_restamp_keeps_transform() {
        let pose = TimestampedPose::identity_now();
        let restamped = pose.clone().restamped(Timestamp::from_secs_f64(5.0));
        assert_eq!(restamped.time, Timestamp::from_secs_f64(5.0));
        assert_eq!(restamped.transform, pose.transform);
    }
}
