//! Identity types for TrackSim
//!
//! Entities are identified by stable string keys supplied by the entity
//! registry. Visual actors derive their key deterministically from the owning
//! entity and the aspect being rendered.

use std::borrow::Borrow;
use std::fmt;

/// Tracked entity identity (a tracker or a tool)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        EntityKey(key.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        EntityKey(value.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        EntityKey(value)
    }
}

impl Borrow<str> for EntityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Renderable representation of an entity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aspect {
    /// Geometry of the tracker itself
    Tracker,
    /// Geometry of the tool carried by the tracker
    Tool,
    /// Subject surface bound to a subject tracker
    BoundSubject,
}

impl Aspect {
    /// Aspects every entity may render
    pub const STANDARD: [Aspect; 2] = [Aspect::Tracker, Aspect::Tool];

    /// Suffix used when deriving actor keys
    pub fn tag(self) -> &'static str {
        match self {
            Aspect::Tracker => "tracker",
            Aspect::Tool => "tool",
            Aspect::BoundSubject => "subject",
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Visual actor identity: `<entity>_<aspect>`
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorKey(String);

impl ActorKey {
    pub fn new(entity: &EntityKey, aspect: Aspect) -> Self {
        ActorKey(format!("{}_{}", entity.as_str(), aspect.tag()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Actor({})", self.0)
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
