//! Tool panel - composition root for simulated tool positions
//!
//! Owns the binding manager and the manipulation controller, drives
//! refreshes from pose and entity-change notifications, and offers the bulk
//! operations (clear all, zero all, snapshot import/export).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tracksim_core::{EntityKey, Matrix4, TimestampedPose, TrackError, TrackResult};
use tracksim_state::PoseStore;
use tracksim_visual::{
    ActorHandle, EntityRegistry, InMemoryPoseMemory, ManipulationController, MoveSummary,
    PoseMemory, RefreshReport, Renderer, SharedBindings, ViewConfig, VisualBindingManager,
};

use crate::snapshot::{self, ExportOptions};
use crate::{init_tracing, JsonPoseMemory, PanelConfig, PositionsClient};

/// Entity registry notifications
#[derive(Clone, Debug, PartialEq)]
pub enum EntityEvent {
    /// Entities were added or removed
    SetChanged,
    /// Configuration (meshes, offsets, colors, flags) of these entities changed
    ConfigChanged(Vec<EntityKey>),
}

type SharedView<S, R> = Arc<tokio::sync::Mutex<VisualBindingManager<S, R>>>;

pub struct ToolPanel<S: PoseStore, R: Renderer> {
    store: Arc<S>,
    registry: Arc<dyn EntityRegistry>,
    memory: Arc<dyn PoseMemory>,
    renderer: Arc<Mutex<R>>,
    bindings: SharedBindings,
    view: SharedView<S, R>,
    controller: ManipulationController<S, R>,
    events: mpsc::UnboundedSender<EntityEvent>,
    pending_events: Mutex<Option<mpsc::UnboundedReceiver<EntityEvent>>>,
}

impl<S: PoseStore, R: Renderer> ToolPanel<S, R> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<dyn EntityRegistry>,
        memory: Arc<dyn PoseMemory>,
        renderer: R,
        config: ViewConfig,
    ) -> Self {
        let renderer = Arc::new(Mutex::new(renderer));
        let view = VisualBindingManager::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&memory),
            Arc::clone(&renderer),
            config,
        );
        let bindings = view.bindings();
        let controller = ManipulationController::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&renderer),
            Arc::clone(&bindings),
        );
        let (events, pending) = mpsc::unbounded_channel();

        ToolPanel {
            store,
            registry,
            memory,
            renderer,
            bindings,
            view: Arc::new(tokio::sync::Mutex::new(view)),
            controller,
            events,
            pending_events: Mutex::new(Some(pending)),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn renderer(&self) -> Arc<Mutex<R>> {
        Arc::clone(&self.renderer)
    }

    pub fn bindings(&self) -> SharedBindings {
        Arc::clone(&self.bindings)
    }

    pub fn controller(&self) -> &ManipulationController<S, R> {
        &self.controller
    }

    /// Run one refresh cycle now
    pub async fn refresh(&self) -> RefreshReport {
        let report = self.view.lock().await.refresh().await;
        flush_memory(self.memory.as_ref());
        report
    }

    /// The panel's widgets exist: let refreshes reach the renderer
    pub async fn finish_initialization(&self) -> RefreshReport {
        let mut view = self.view.lock().await;
        view.mark_initialized();
        let report = view.refresh().await;
        drop(view);
        flush_memory(self.memory.as_ref());
        report
    }

    pub fn notify_entities_changed(&self) {
        let _ = self.events.send(EntityEvent::SetChanged);
    }

    pub fn notify_entity_config_changed(&self, keys: Vec<EntityKey>) {
        let _ = self.events.send(EntityEvent::ConfigChanged(keys));
    }

    /// Start the task that refreshes on every pose or entity change.
    /// Only one refresh loop may run per panel.
    pub fn spawn_refresh_loop(&self) -> TrackResult<JoinHandle<()>> {
        let mut events = self
            .pending_events
            .lock()
            .take()
            .ok_or_else(|| TrackError::Config("refresh loop already running".into()))?;
        let mut changes = self.store.subscribe();
        let view = Arc::clone(&self.view);
        let memory = Arc::clone(&self.memory);

        Ok(tokio::spawn(async move {
            loop {
                let report = tokio::select! {
                    generation = changes.changed() => {
                        if generation.is_none() {
                            break;
                        }
                        view.lock().await.refresh().await
                    }
                    event = events.recv() => match event {
                        Some(EntityEvent::SetChanged) => view.lock().await.refresh().await,
                        Some(EntityEvent::ConfigChanged(keys)) => {
                            view.lock().await.on_entities_changed(&keys).await
                        }
                        None => break,
                    },
                };
                if !report.is_quiet() {
                    tracing::debug!(
                        created = report.created.len(),
                        removed = report.removed.len(),
                        flips = report.flips(),
                        "refreshed visual bindings"
                    );
                }
                flush_memory(memory.as_ref());
            }
            tracing::debug!("refresh loop stopped");
        }))
    }

    /// Record "no known pose" for every entity's tracker, waiting for each
    /// ack. Returns the number of commands sent.
    pub fn clear_all_positions(&self) -> TrackResult<usize> {
        let mut cleared = 0;
        for entity in self.registry.entities() {
            self.store
                .record_pose_blocking(entity.tracker_key, TimestampedPose::absent_now())?;
            cleared += 1;
        }
        tracing::info!("Cleared {} positions", cleared);
        Ok(cleared)
    }

    /// Record an identity pose for every active entity's tracker, leaving
    /// trackers positioned relative to another entity alone.
    pub fn zero_all_positions(&self) -> TrackResult<usize> {
        let mut zeroed = 0;
        for entity in self.registry.entities() {
            if !entity.is_active {
                continue;
            }
            let relative = self
                .store
                .latest(&entity.tracker_key)
                .map(|p| p.is_relative())
                .unwrap_or(false);
            if relative {
                tracing::debug!("Not zeroing {}: pose is relative", entity.tracker_key);
                continue;
            }
            self.store.record_pose_blocking(
                entity.tracker_key,
                TimestampedPose::now(Matrix4::identity()),
            )?;
            zeroed += 1;
        }
        tracing::info!("Zeroed {} positions", zeroed);
        Ok(zeroed)
    }

    pub async fn import_poses(&self, poses: snapshot::Snapshot) -> TrackResult<usize> {
        snapshot::import_poses(self.store.as_ref(), poses).await
    }

    pub async fn import_snapshot_file(&self, path: impl AsRef<Path>) -> TrackResult<usize> {
        let path = path.as_ref();
        let poses = snapshot::read_snapshot_file(path)?;
        tracing::info!("Importing positions snapshot from {:?}", path);
        self.import_poses(poses).await
    }

    pub fn export_snapshot_file(
        &self,
        path: impl AsRef<Path>,
        options: ExportOptions,
    ) -> TrackResult<usize> {
        snapshot::write_snapshot_file(path, &self.store.latest_poses(), options)
    }

    /// Export into `dir` under the default snapshot name
    pub fn export_snapshot_to_dir(
        &self,
        dir: impl AsRef<Path>,
        options: ExportOptions,
    ) -> TrackResult<PathBuf> {
        let path = dir
            .as_ref()
            .join(snapshot::default_snapshot_file_name(&chrono::Local::now()));
        self.export_snapshot_file(&path, options)?;
        Ok(path)
    }

    pub async fn select_and_move(&self, picked: Option<ActorHandle>) -> TrackResult<MoveSummary> {
        self.controller.select_and_move(picked).await
    }

    pub async fn select_and_clear(&self, entity: Option<EntityKey>) -> TrackResult<EntityKey> {
        self.controller.select_and_clear(entity).await
    }

    pub async fn clear_entity_pose(&self, key: &EntityKey) -> TrackResult<()> {
        self.controller.clear_entity_pose(key).await
    }
}

impl<R: Renderer> ToolPanel<PositionsClient, R> {
    /// Build a panel from configuration: install tracing, open pose memory
    /// and connect to the positions server.
    pub async fn start(
        config: &PanelConfig,
        registry: Arc<dyn EntityRegistry>,
        renderer: R,
    ) -> TrackResult<Self> {
        init_tracing(&config.log_config());
        let view = config.view_config()?;

        let memory: Arc<dyn PoseMemory> = match &config.memory_path {
            Some(path) => Arc::new(JsonPoseMemory::open(path)?),
            None => Arc::new(InMemoryPoseMemory::new()),
        };
        let client = PositionsClient::connect(&config.client).await?;

        Ok(ToolPanel::new(Arc::new(client), registry, memory, renderer, view))
    }
}

fn flush_memory(memory: &dyn PoseMemory) {
    if let Err(e) = memory.flush() {
        tracing::warn!("Failed to save remembered poses: {}", e);
    }
}
