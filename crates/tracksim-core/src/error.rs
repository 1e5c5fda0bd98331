//! Error types for TrackSim

use std::time::Duration;

use thiserror::Error;

use crate::{Aspect, EntityKey};

/// Core TrackSim errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    // Connection errors
    #[error("Connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    #[error("Transport error: {0}")]
    TransportError(String),

    // Command errors
    #[error("Server rejected pose for {key}: {reason}")]
    CommandRejected { key: EntityKey, reason: String },

    #[error("Command for {key} timed out after {after:?}")]
    CommandTimeout { key: EntityKey, after: Duration },

    #[error("Command channel closed")]
    CommandChannelClosed,

    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    // Transform errors
    #[error("Singular matrix (determinant {determinant:e})")]
    SingularMatrix { determinant: f64 },

    // Manipulation errors
    #[error("Picked actor is not bound to any tracked entity")]
    UnrecognizedActor,

    #[error("Moving the {0} aspect is not supported")]
    UnsupportedAspect(Aspect),

    #[error("Another manipulation is already in progress")]
    ManipulationInProgress,

    // Registry errors
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityKey),

    #[error("Entity {entity} has no {aspect} offset")]
    MissingOffset { entity: EntityKey, aspect: Aspect },

    // Snapshot errors
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    // Environment errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TrackError {
    /// True for failures of a single record command (rejected, timed out,
    /// or no longer deliverable). The local cache is unchanged in all cases.
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            TrackError::CommandRejected { .. }
                | TrackError::CommandTimeout { .. }
                | TrackError::CommandChannelClosed
        )
    }
}

impl From<std::io::Error> for TrackError {
    fn from(e: std::io::Error) -> Self {
        TrackError::Io(e.to_string())
    }
}

/// Result type for TrackSim operations
pub type TrackResult<T> = Result<T, TrackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_grouping() {
        let key = EntityKey::new("pointer");
        assert!(TrackError::CommandRejected {
            key: key.clone(),
            reason: "busy".into()
        }
        .is_command_error());
        assert!(TrackError::CommandTimeout {
            key,
            after: Duration::from_millis(10)
        }
        .is_command_error());
        assert!(!TrackError::UnrecognizedActor.is_command_error());
        assert!(!TrackError::SingularMatrix { determinant: 0.0 }.is_command_error());
    }

    #[test]
    fn test_error_messages() {
        let err = TrackError::MissingOffset {
            entity: EntityKey::new("coil"),
            aspect: Aspect::Tool,
        };
        assert_eq!(err.to_string(), "Entity coil has no tool offset");
    }
}
