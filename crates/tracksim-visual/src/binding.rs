//! Visual binding manager
//!
//! Owns the mapping from (entity, aspect) to renderer actors and brings the
//! scene in line with the pose store on every refresh.
//!
//! # Display transform
//!
//! - Tracker and tool actors: `compose([static_offset, tracker_to_world])`
//! - Bound subject actor: `compose([invert(subject_alignment), tracker_to_world])`
//!
//! Refreshing twice with no intervening change creates no actors and flips
//! no visibility.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use tracksim_core::{
    compose, invert, ActorKey, Aspect, EntityKey, Matrix4, TimestampedPose, TrackError,
    TrackResult,
};
use tracksim_state::PoseStore;

use crate::{
    ActorHandle, Color, EntityRegistry, Mesh, MeshActor, PersistedPose, PoseMemory, Renderer,
    TrackedEntity,
};

/// Fallback color for entity meshes
pub const DEFAULT_MESH_COLOR: Color = Color::rgb(0x44, 0x44, 0x44);

/// Color of the bound subject surface
pub const SUBJECT_COLOR: Color = Color::rgb(0xd9, 0xa5, 0xb2);

/// Presentation settings for the binding manager
#[derive(Clone, Debug, PartialEq)]
pub struct ViewConfig {
    /// Reset the camera after a refresh that created an actor
    pub reset_camera_on_new_actor: bool,
    pub default_mesh_color: Color,
    pub subject_color: Color,
    pub subject_opacity: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            reset_camera_on_new_actor: false,
            default_mesh_color: DEFAULT_MESH_COLOR,
            subject_color: SUBJECT_COLOR,
            subject_opacity: 0.8,
        }
    }
}

/// One renderer actor bound to an entity aspect
#[derive(Clone, Debug, PartialEq)]
pub struct VisualBinding {
    pub actor_key: ActorKey,
    pub entity: EntityKey,
    pub aspect: Aspect,
    pub handle: ActorHandle,
}

/// Bindings plus the set of actors currently under a user drag.
///
/// Shared between the binding manager and the manipulation controller.
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: HashMap<ActorKey, VisualBinding>,
    moving: HashSet<ActorKey>,
}

/// Binding table handle shared across components
pub type SharedBindings = Arc<Mutex<BindingTable>>;

impl BindingTable {
    pub fn new() -> Self {
        BindingTable::default()
    }

    pub fn shared() -> SharedBindings {
        Arc::new(Mutex::new(BindingTable::new()))
    }

    pub fn get(&self, key: &ActorKey) -> Option<&VisualBinding> {
        self.bindings.get(key)
    }

    pub fn find_by_handle(&self, handle: ActorHandle) -> Option<&VisualBinding> {
        self.bindings.values().find(|b| b.handle == handle)
    }

    /// Handles of every bound actor
    pub fn handles(&self) -> Vec<ActorHandle> {
        let mut handles: Vec<_> = self.bindings.values().map(|b| b.handle).collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn is_moving(&self, key: &ActorKey) -> bool {
        self.moving.contains(key)
    }

    pub fn moving_count(&self) -> usize {
        self.moving.len()
    }

    /// Returns false if the actor was already being moved
    pub(crate) fn begin_move(&mut self, key: ActorKey) -> bool {
        self.moving.insert(key)
    }

    pub(crate) fn end_move(&mut self, key: &ActorKey) -> bool {
        self.moving.remove(key)
    }

    pub(crate) fn insert(&mut self, binding: VisualBinding) {
        self.bindings.insert(binding.actor_key.clone(), binding);
    }

    fn drain_where(&mut self, mut pred: impl FnMut(&VisualBinding) -> bool) -> Vec<VisualBinding> {
        let keys: Vec<ActorKey> = self
            .bindings
            .values()
            .filter(|b| pred(b))
            .map(|b| b.actor_key.clone())
            .collect();
        keys.iter()
            .filter_map(|k| self.bindings.remove(k))
            .collect()
    }
}

/// What a refresh did
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Tracker keys whose persisted pose was pushed into the store
    pub restored: Vec<EntityKey>,
    pub removed: Vec<ActorKey>,
    pub created: Vec<ActorKey>,
    pub shown: Vec<ActorKey>,
    pub hidden: Vec<ActorKey>,
    /// Eligible actors left alone because they are being dragged
    pub skipped_moving: Vec<ActorKey>,
    /// Actors whose display transform could not be computed
    pub failures: Vec<(ActorKey, TrackError)>,
    pub camera_reset_requested: bool,
}

impl RefreshReport {
    pub fn flips(&self) -> usize {
        self.shown.len() + self.hidden.len()
    }

    /// Nothing created, removed or flipped
    pub fn is_quiet(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.flips() == 0
    }
}

/// Resolved display for one actor
struct Display {
    transform: Matrix4,
    mesh: Mesh,
    color: Option<Color>,
    opacity: f32,
}

/// Keeps renderer actors consistent with poses and entity configuration
pub struct VisualBindingManager<S, R> {
    store: Arc<S>,
    registry: Arc<dyn EntityRegistry>,
    memory: Arc<dyn PoseMemory>,
    renderer: Arc<Mutex<R>>,
    table: SharedBindings,
    config: ViewConfig,
    has_restored: bool,
    initialized: bool,
}

impl<S: PoseStore, R: Renderer> VisualBindingManager<S, R> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<dyn EntityRegistry>,
        memory: Arc<dyn PoseMemory>,
        renderer: Arc<Mutex<R>>,
        config: ViewConfig,
    ) -> Self {
        VisualBindingManager {
            store,
            registry,
            memory,
            renderer,
            table: BindingTable::shared(),
            config,
            has_restored: false,
            initialized: false,
        }
    }

    pub fn bindings(&self) -> SharedBindings {
        Arc::clone(&self.table)
    }

    pub fn renderer(&self) -> Arc<Mutex<R>> {
        Arc::clone(&self.renderer)
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Open the gate: from now on refreshes touch the renderer
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Entity configuration changed for `changed`. Their actors are rebuilt
    /// from the new configuration on the refresh that follows.
    pub async fn on_entities_changed(&mut self, changed: &[EntityKey]) -> RefreshReport {
        let mut removed = self.remove_bindings(|b| changed.contains(&b.entity));
        let mut report = self.refresh().await;
        removed.append(&mut report.removed);
        report.removed = removed;
        report
    }

    /// Bring the scene in line with the store
    pub async fn refresh(&mut self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let entities = self.registry.entities();

        let known: HashSet<&EntityKey> = entities.iter().map(|e| &e.key).collect();
        report.removed = self.remove_bindings(|b| !known.contains(&b.entity));

        if !self.has_restored {
            self.restore_persisted(&mut report).await;
            self.has_restored = true;
        }

        self.mirror_to_memory(&entities);

        if !self.initialized {
            return report;
        }

        self.render_pass(&entities, &mut report);
        report
    }

    fn remove_bindings(&self, pred: impl FnMut(&VisualBinding) -> bool) -> Vec<ActorKey> {
        let removed = self.table.lock().drain_where(pred);
        if removed.is_empty() {
            return Vec::new();
        }

        let mut renderer = self.renderer.lock();
        removed
            .into_iter()
            .map(|binding| {
                tracing::debug!(actor = %binding.actor_key, "removing actor");
                renderer.remove_actor(binding.handle);
                binding.actor_key
            })
            .collect()
    }

    /// Push remembered poses into the store for trackers it knows nothing about
    async fn restore_persisted(&self, report: &mut RefreshReport) {
        for (key, persisted) in self.memory.load() {
            let Some(transform) = persisted.transform else {
                continue;
            };
            if self.store.latest(&key).is_some() {
                continue;
            }

            let mut pose = TimestampedPose::now(transform);
            pose.relative_to = persisted.relative_to;
            match self.store.record_pose(key.clone(), pose).await {
                Ok(()) => {
                    tracing::info!("Restored persisted pose for {}", key);
                    report.restored.push(key);
                }
                Err(e) => tracing::warn!("Failed to restore pose for {}: {}", key, e),
            }
        }
    }

    fn mirror_to_memory(&self, entities: &[TrackedEntity]) {
        for entity in entities {
            let live = self.store.latest(&entity.tracker_key);
            let persisted = live.as_ref().map(PersistedPose::from).unwrap_or_default();
            if persisted.transform.is_none() && !self.memory.contains(&entity.tracker_key) {
                continue;
            }
            self.memory.store(&entity.tracker_key, persisted);
        }
    }

    fn render_pass(&self, entities: &[TrackedEntity], report: &mut RefreshReport) {
        let alignment = self.registry.subject_alignment();
        let surface = self.registry.subject_surface();

        let mut renderer = self.renderer.lock();
        let mut table = self.table.lock();

        for entity in entities {
            let tracker_to_world = if entity.is_active {
                self.store.latest_transform(&entity.tracker_key)
            } else {
                None
            };

            let Some(tracker_to_world) = tracker_to_world else {
                for aspect in entity.aspects() {
                    let actor_key = ActorKey::new(&entity.key, aspect);
                    if let Some(binding) = table.get(&actor_key) {
                        if renderer.is_visible(binding.handle) {
                            renderer.set_visible(binding.handle, false);
                            renderer.render();
                            report.hidden.push(actor_key);
                        }
                    }
                }
                continue;
            };

            for aspect in entity.aspects() {
                let actor_key = ActorKey::new(&entity.key, aspect);
                if table.is_moving(&actor_key) {
                    report.skipped_moving.push(actor_key);
                    continue;
                }

                let display = match self.resolve_display(
                    entity,
                    aspect,
                    &tracker_to_world,
                    alignment.as_ref(),
                    surface.as_ref(),
                ) {
                    Ok(display) => display,
                    Err(e) => {
                        tracing::warn!("Cannot place {}: {}", actor_key, e);
                        report.failures.push((actor_key, e));
                        continue;
                    }
                };

                let show = match display {
                    Some(display) => {
                        let handle = match table.get(&actor_key) {
                            Some(binding) => binding.handle,
                            None => {
                                let handle = renderer.add_mesh(MeshActor {
                                    name: actor_key.as_str(),
                                    mesh: &display.mesh,
                                    color: display.color,
                                    default_color: self.config.default_mesh_color,
                                    opacity: display.opacity,
                                });
                                tracing::debug!(actor = %actor_key, "created actor");
                                table.insert(VisualBinding {
                                    actor_key: actor_key.clone(),
                                    entity: entity.key.clone(),
                                    aspect,
                                    handle,
                                });
                                report.created.push(actor_key.clone());
                                report.camera_reset_requested = true;
                                handle
                            }
                        };
                        renderer.set_transform(handle, &display.transform);
                        renderer.render();
                        true
                    }
                    None => false,
                };

                if let Some(binding) = table.get(&actor_key) {
                    let visible = renderer.is_visible(binding.handle);
                    if show != visible {
                        renderer.set_visible(binding.handle, show);
                        renderer.render();
                        if show {
                            report.shown.push(actor_key);
                        } else {
                            report.hidden.push(actor_key);
                        }
                    }
                }
            }
        }

        if report.camera_reset_requested && self.config.reset_camera_on_new_actor {
            renderer.reset_camera();
        }
    }

    /// `None` means the actor should not be shown
    fn resolve_display(
        &self,
        entity: &TrackedEntity,
        aspect: Aspect,
        tracker_to_world: &Matrix4,
        alignment: Option<&Matrix4>,
        surface: Option<&Mesh>,
    ) -> TrackResult<Option<Display>> {
        match aspect {
            Aspect::Tracker | Aspect::Tool => {
                if !entity.render_enabled(aspect) {
                    return Ok(None);
                }
                let (Some(offset), Some(mesh)) = (entity.static_offset(aspect), entity.mesh(aspect))
                else {
                    return Ok(None);
                };
                Ok(Some(Display {
                    transform: compose(&[offset, *tracker_to_world]),
                    mesh: mesh.clone(),
                    color: entity.color(aspect),
                    opacity: entity.opacity(aspect).unwrap_or(1.0),
                }))
            }
            Aspect::BoundSubject => {
                let (Some(alignment), Some(surface)) = (alignment, surface) else {
                    return Ok(None);
                };
                Ok(Some(Display {
                    transform: compose(&[invert(alignment)?, *tracker_to_world]),
                    mesh: surface.clone(),
                    color: Some(self.config.subject_color),
                    opacity: self.config.subject_opacity,
                }))
            }
        }
    }
}
