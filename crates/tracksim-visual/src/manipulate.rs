//! Interactive manipulation
//!
//! Lets the user pick an actor and drag it, committing the implied tracker
//! pose on every intermediate move, or pick an actor and clear its pose.
//!
//! While an actor is dragged its key sits in the binding table's moving set,
//! so refreshes driven by the commits never fight the user's hand.

use std::sync::Arc;

use parking_lot::Mutex;

use tracksim_core::{
    compose, invert, ActorKey, Aspect, EntityKey, Matrix4, TimestampedPose, TrackError,
    TrackResult,
};
use tracksim_state::PoseStore;

use crate::{
    ActorHandle, EntityRegistry, PickRequest, PickStyle, Renderer, SharedBindings, TrackedEntity,
    VisualBinding,
};

/// Where the (single) manipulation session currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManipulationPhase {
    Idle,
    Picking,
    Dragging,
    Committing,
}

/// Outcome of a completed drag
#[derive(Clone, Debug, PartialEq)]
pub struct MoveSummary {
    pub actor: ActorKey,
    pub entity: EntityKey,
    pub tracker_key: EntityKey,
    /// Intermediate poses the store accepted
    pub commits: usize,
    /// Intermediate poses the store refused
    pub rejected: usize,
    pub last_pose: Option<Matrix4>,
}

/// Tracker-to-world pose implied by placing `aspect`'s geometry at `world`
pub fn tracker_pose_from_world(
    entity: &TrackedEntity,
    aspect: Aspect,
    world: &Matrix4,
) -> TrackResult<Matrix4> {
    let offset_inverse = geometry_inverse(entity, aspect)?;
    Ok(compose(&[offset_inverse, *world]))
}

fn geometry_inverse(entity: &TrackedEntity, aspect: Aspect) -> TrackResult<Matrix4> {
    if aspect == Aspect::BoundSubject {
        return Err(TrackError::UnsupportedAspect(aspect));
    }
    let offset = entity
        .geometry_to_tracker(aspect)
        .ok_or_else(|| TrackError::MissingOffset {
            entity: entity.key.clone(),
            aspect,
        })?;
    invert(&offset)
}

/// Resets the phase to `Idle` however the session ends
struct PhaseGuard {
    phase: Arc<Mutex<ManipulationPhase>>,
}

impl PhaseGuard {
    fn set(&self, phase: ManipulationPhase) {
        *self.phase.lock() = phase;
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        *self.phase.lock() = ManipulationPhase::Idle;
    }
}

/// Holds an actor in the moving set for the lifetime of a drag
struct MovingGuard {
    table: SharedBindings,
    key: ActorKey,
}

impl MovingGuard {
    fn acquire(table: &SharedBindings, key: ActorKey) -> TrackResult<Self> {
        if !table.lock().begin_move(key.clone()) {
            return Err(TrackError::ManipulationInProgress);
        }
        Ok(MovingGuard {
            table: Arc::clone(table),
            key,
        })
    }
}

impl Drop for MovingGuard {
    fn drop(&mut self) {
        self.table.lock().end_move(&self.key);
    }
}

/// Turns picks and drags into pose store commands
pub struct ManipulationController<S, R> {
    store: Arc<S>,
    registry: Arc<dyn EntityRegistry>,
    renderer: Arc<Mutex<R>>,
    table: SharedBindings,
    phase: Arc<Mutex<ManipulationPhase>>,
}

impl<S, R> Clone for ManipulationController<S, R> {
    fn clone(&self) -> Self {
        ManipulationController {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            renderer: Arc::clone(&self.renderer),
            table: Arc::clone(&self.table),
            phase: Arc::clone(&self.phase),
        }
    }
}

impl<S: PoseStore, R: Renderer> ManipulationController<S, R> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<dyn EntityRegistry>,
        renderer: Arc<Mutex<R>>,
        table: SharedBindings,
    ) -> Self {
        ManipulationController {
            store,
            registry,
            renderer,
            table,
            phase: Arc::new(Mutex::new(ManipulationPhase::Idle)),
        }
    }

    pub fn phase(&self) -> ManipulationPhase {
        *self.phase.lock()
    }

    fn begin_session(&self) -> TrackResult<PhaseGuard> {
        let mut phase = self.phase.lock();
        if *phase != ManipulationPhase::Idle {
            return Err(TrackError::ManipulationInProgress);
        }
        *phase = ManipulationPhase::Picking;
        Ok(PhaseGuard {
            phase: Arc::clone(&self.phase),
        })
    }

    async fn pick(&self, message: &str) -> Option<ActorHandle> {
        let request = PickRequest {
            candidates: self.table.lock().handles(),
            message: message.to_string(),
            style: PickStyle::Wireframe,
            left_clicking: true,
        };
        let reply = self.renderer.lock().pick(request);
        reply.await.ok().flatten()
    }

    fn resolve(&self, handle: Option<ActorHandle>) -> TrackResult<(VisualBinding, TrackedEntity)> {
        let binding = handle
            .and_then(|h| self.table.lock().find_by_handle(h).cloned())
            .ok_or(TrackError::UnrecognizedActor)?;
        let entity = self
            .registry
            .entity(&binding.entity)
            .ok_or_else(|| TrackError::UnknownEntity(binding.entity.clone()))?;
        Ok((binding, entity))
    }

    /// Pick an actor (or use `picked`) and let the user drag it.
    ///
    /// Every intermediate position is committed as the carrying tracker's
    /// new pose. A rejected commit is logged and the drag continues.
    pub async fn select_and_move(&self, picked: Option<ActorHandle>) -> TrackResult<MoveSummary> {
        let session = self.begin_session()?;

        let handle = match picked {
            Some(handle) => Some(handle),
            None => self.pick("Left click on mesh to move").await,
        };
        let (binding, entity) = self.resolve(handle).map_err(|e| {
            tracing::warn!("Unrecognized actor picked. Cancelling select and move: {}", e);
            e
        })?;
        if binding.aspect == Aspect::BoundSubject {
            tracing::error!("Moving the subject surface is not supported");
            return Err(TrackError::UnsupportedAspect(binding.aspect));
        }
        let offset_inverse = geometry_inverse(&entity, binding.aspect)?;

        tracing::info!(actor = %binding.actor_key, tracker = %entity.tracker_key, "Moving actor");
        let moving = MovingGuard::acquire(&self.table, binding.actor_key.clone())?;
        session.set(ManipulationPhase::Dragging);

        let mut moves = self.renderer.lock().begin_interactive_move(binding.handle);
        let mut summary = MoveSummary {
            actor: binding.actor_key.clone(),
            entity: entity.key.clone(),
            tracker_key: entity.tracker_key.clone(),
            commits: 0,
            rejected: 0,
            last_pose: None,
        };

        while let Some(world) = moves.recv().await {
            let tracker_pose = compose(&[offset_inverse, world]);
            match self
                .store
                .record_pose(entity.tracker_key.clone(), TimestampedPose::now(tracker_pose))
                .await
            {
                Ok(()) => {
                    tracing::debug!(tracker = %entity.tracker_key, "committed drag pose");
                    summary.commits += 1;
                    summary.last_pose = Some(tracker_pose);
                }
                Err(e) => {
                    tracing::warn!("Pose for {} not recorded during drag: {}", entity.tracker_key, e);
                    summary.rejected += 1;
                }
            }
        }

        session.set(ManipulationPhase::Committing);
        drop(moving);
        tracing::debug!(
            actor = %summary.actor,
            commits = summary.commits,
            rejected = summary.rejected,
            "Move finished"
        );
        Ok(summary)
    }

    /// Pick an actor (or use `entity`) and clear its tracker's pose
    pub async fn select_and_clear(&self, entity: Option<EntityKey>) -> TrackResult<EntityKey> {
        let session = self.begin_session()?;

        let key = match entity {
            Some(key) => key,
            None => {
                let handle = self.pick("Left click on mesh to clear").await;
                let (binding, entity) = self.resolve(handle).map_err(|e| {
                    tracing::warn!("Unrecognized actor picked. Cancelling select and clear: {}", e);
                    e
                })?;
                if binding.aspect == Aspect::BoundSubject {
                    tracing::error!("Clearing the subject surface is not supported");
                    return Err(TrackError::UnsupportedAspect(binding.aspect));
                }
                entity.key
            }
        };

        session.set(ManipulationPhase::Committing);
        self.clear_entity_pose(&key).await?;
        Ok(key)
    }

    /// Record "no known pose" for the tracker carrying `key`
    pub async fn clear_entity_pose(&self, key: &EntityKey) -> TrackResult<()> {
        let entity = self
            .registry
            .entity(key)
            .ok_or_else(|| TrackError::UnknownEntity(key.clone()))?;
        tracing::info!("Clearing pose of {}", entity.tracker_key);
        self.store
            .record_pose(entity.tracker_key, TimestampedPose::absent_now())
            .await
    }
}
