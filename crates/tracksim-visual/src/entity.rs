//! Tracked entities and their static geometry
//!
//! The registry is owned elsewhere (session model); this crate only reads it.

use std::sync::Arc;

use parking_lot::RwLock;

use tracksim_core::{compose, Aspect, EntityKey, Matrix4};

/// 8-bit RGB color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color([r, g, b])
    }

    /// Parse `#rrggbb` (leading `#` optional)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Color([channel(0)?, channel(2)?, channel(4)?]))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

/// Geometry payload handed to the renderer
#[derive(Debug)]
pub struct MeshData {
    pub label: String,
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

/// Shared, immutable mesh
#[derive(Clone, Debug)]
pub struct Mesh {
    inner: Arc<MeshData>,
}

impl Mesh {
    pub fn new(label: impl Into<String>, vertices: Vec<[f32; 3]>, triangles: Vec<[u32; 3]>) -> Self {
        Mesh {
            inner: Arc::new(MeshData {
                label: label.into(),
                vertices,
                triangles,
            }),
        }
    }

    /// Axis-aligned cube centred on the origin
    pub fn cube(label: impl Into<String>, size: f32) -> Self {
        let h = size / 2.0;
        let vertices = vec![
            [-h, -h, -h],
            [h, -h, -h],
            [h, h, -h],
            [-h, h, -h],
            [-h, -h, h],
            [h, -h, h],
            [h, h, h],
            [-h, h, h],
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [1, 2, 6],
            [1, 6, 5],
            [0, 4, 7],
            [0, 7, 3],
        ];
        Mesh::new(label, vertices, triangles)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn data(&self) -> &MeshData {
        &self.inner
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.vertices.len()
    }

    /// Same underlying geometry (not structural equality)
    pub fn same_as(&self, other: &Mesh) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// What kind of physical object an entity is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Tool,
    /// Tracker rigidly attached to the subject; also renders the subject surface
    SubjectTracker,
}

/// A tracked entity and its static offsets
#[derive(Clone, Debug)]
pub struct TrackedEntity {
    pub key: EntityKey,
    /// Pose store key of the tracker carrying this entity
    pub tracker_key: EntityKey,
    pub kind: EntityKind,
    pub is_active: bool,
    pub render_tracker: bool,
    pub render_tool: bool,
    pub tracker_mesh: Option<Mesh>,
    pub tool_mesh: Option<Mesh>,
    pub tracker_mesh_to_tracker: Option<Matrix4>,
    pub tool_mesh_to_tool: Matrix4,
    pub tool_to_tracker: Option<Matrix4>,
    pub tracker_color: Option<Color>,
    pub tool_color: Option<Color>,
    pub tracker_opacity: Option<f32>,
    pub tool_opacity: Option<f32>,
}

impl TrackedEntity {
    pub fn new(key: impl Into<EntityKey>, tracker_key: impl Into<EntityKey>) -> Self {
        TrackedEntity {
            key: key.into(),
            tracker_key: tracker_key.into(),
            kind: EntityKind::Tool,
            is_active: true,
            render_tracker: true,
            render_tool: true,
            tracker_mesh: None,
            tool_mesh: None,
            tracker_mesh_to_tracker: None,
            tool_mesh_to_tool: Matrix4::identity(),
            tool_to_tracker: None,
            tracker_color: None,
            tool_color: None,
            tracker_opacity: None,
            tool_opacity: None,
        }
    }

    pub fn with_tracker_mesh(mut self, mesh: Mesh, mesh_to_tracker: Matrix4) -> Self {
        self.tracker_mesh = Some(mesh);
        self.tracker_mesh_to_tracker = Some(mesh_to_tracker);
        self
    }

    pub fn with_tool_mesh(mut self, mesh: Mesh, mesh_to_tool: Matrix4, tool_to_tracker: Matrix4) -> Self {
        self.tool_mesh = Some(mesh);
        self.tool_mesh_to_tool = mesh_to_tool;
        self.tool_to_tracker = Some(tool_to_tracker);
        self
    }

    pub fn as_subject_tracker(mut self) -> Self {
        self.kind = EntityKind::SubjectTracker;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Aspects this entity may render
    pub fn aspects(&self) -> Vec<Aspect> {
        let mut aspects = Aspect::STANDARD.to_vec();
        if self.kind == EntityKind::SubjectTracker {
            aspects.push(Aspect::BoundSubject);
        }
        aspects
    }

    pub fn render_enabled(&self, aspect: Aspect) -> bool {
        match aspect {
            Aspect::Tracker => self.render_tracker,
            Aspect::Tool => self.render_tool,
            Aspect::BoundSubject => true,
        }
    }

    pub fn mesh(&self, aspect: Aspect) -> Option<&Mesh> {
        match aspect {
            Aspect::Tracker => self.tracker_mesh.as_ref(),
            Aspect::Tool => self.tool_mesh.as_ref(),
            Aspect::BoundSubject => None,
        }
    }

    pub fn color(&self, aspect: Aspect) -> Option<Color> {
        match aspect {
            Aspect::Tracker => self.tracker_color,
            Aspect::Tool => self.tool_color,
            Aspect::BoundSubject => None,
        }
    }

    pub fn opacity(&self, aspect: Aspect) -> Option<f32> {
        match aspect {
            Aspect::Tracker => self.tracker_opacity,
            Aspect::Tool => self.tool_opacity,
            Aspect::BoundSubject => None,
        }
    }

    /// Mesh-frame to tracker-frame transform for an aspect, regardless of
    /// whether a mesh is loaded. Tool geometry goes mesh → tool → tracker.
    pub fn geometry_to_tracker(&self, aspect: Aspect) -> Option<Matrix4> {
        match aspect {
            Aspect::Tracker => self.tracker_mesh_to_tracker,
            Aspect::Tool => self
                .tool_to_tracker
                .map(|tool_to_tracker| compose(&[self.tool_mesh_to_tool, tool_to_tracker])),
            Aspect::BoundSubject => None,
        }
    }

    /// Offset used for display: present only when there is a mesh to show
    pub fn static_offset(&self, aspect: Aspect) -> Option<Matrix4> {
        self.mesh(aspect)?;
        self.geometry_to_tracker(aspect)
    }
}

/// Read-only view of the tracked entities and subject registration
pub trait EntityRegistry: Send + Sync {
    /// All entities, in registry order
    fn entities(&self) -> Vec<TrackedEntity>;

    fn entity(&self, key: &EntityKey) -> Option<TrackedEntity> {
        self.entities().into_iter().find(|e| &e.key == key)
    }

    /// Subject-tracker-to-subject-image alignment, once registration is done
    fn subject_alignment(&self) -> Option<Matrix4>;

    /// Subject surface bound to the subject tracker
    fn subject_surface(&self) -> Option<Mesh>;
}

#[derive(Debug, Default)]
struct SubjectBinding {
    alignment: Option<Matrix4>,
    surface: Option<Mesh>,
}

/// In-memory registry, edited by whoever owns the session
#[derive(Debug, Default)]
pub struct StaticRegistry {
    entities: RwLock<Vec<TrackedEntity>>,
    subject: RwLock<SubjectBinding>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        StaticRegistry::default()
    }

    pub fn with_entities(entities: Vec<TrackedEntity>) -> Self {
        StaticRegistry {
            entities: RwLock::new(entities),
            subject: RwLock::new(SubjectBinding::default()),
        }
    }

    /// Insert or replace (by key)
    pub fn insert(&self, entity: TrackedEntity) {
        let mut entities = self.entities.write();
        match entities.iter_mut().find(|e| e.key == entity.key) {
            Some(existing) => *existing = entity,
            None => entities.push(entity),
        }
    }

    pub fn remove(&self, key: &EntityKey) -> Option<TrackedEntity> {
        let mut entities = self.entities.write();
        let idx = entities.iter().position(|e| &e.key == key)?;
        Some(entities.remove(idx))
    }

    /// Edit an entity in place. Returns false if the key is unknown.
    pub fn update(&self, key: &EntityKey, edit: impl FnOnce(&mut TrackedEntity)) -> bool {
        match self.entities.write().iter_mut().find(|e| &e.key == key) {
            Some(entity) => {
                edit(entity);
                true
            }
            None => false,
        }
    }

    pub fn set_subject_alignment(&self, alignment: Option<Matrix4>) {
        self.subject.write().alignment = alignment;
    }

    pub fn set_subject_surface(&self, surface: Option<Mesh>) {
        self.subject.write().surface = surface;
    }
}

impl EntityRegistry for StaticRegistry {
    fn entities(&self) -> Vec<TrackedEntity> {
        self.entities.read().clone()
    }

    fn subject_alignment(&self) -> Option<Matrix4> {
        self.subject.read().alignment
    }

    fn subject_surface(&self) -> Option<Mesh> {
        self.subject.read().surface.clone()
    }
}
