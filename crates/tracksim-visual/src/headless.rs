//! Headless renderer
//!
//! Keeps actors in memory and counts what a real scene would do. Picks and
//! drags are scripted up front or driven step by step.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, oneshot};

use tracksim_core::Matrix4;

use crate::{ActorHandle, Color, Mesh, MeshActor, MoveStream, PickReply, PickRequest, Renderer};

/// An actor as the headless scene holds it
#[derive(Clone, Debug)]
pub struct HeadlessActor {
    pub name: String,
    pub mesh: Mesh,
    pub color: Color,
    pub opacity: f32,
    pub transform: Matrix4,
    pub visible: bool,
}

/// Counters for renderer side effects
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub meshes_added: usize,
    pub actors_removed: usize,
    pub render_requests: usize,
    pub visibility_changes: usize,
    pub camera_resets: usize,
    pub picks: usize,
}

#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    next_handle: u64,
    actors: HashMap<ActorHandle, HeadlessActor>,
    stats: RenderStats,
    pick_responses: VecDeque<Option<ActorHandle>>,
    drag_scripts: VecDeque<Vec<Matrix4>>,
    active_drags: HashMap<ActorHandle, mpsc::UnboundedSender<Matrix4>>,
    last_pick: Option<PickRequest>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        HeadlessRenderer::default()
    }

    pub fn actor(&self, handle: ActorHandle) -> Option<&HeadlessActor> {
        self.actors.get(&handle)
    }

    pub fn actor_named(&self, name: &str) -> Option<(ActorHandle, &HeadlessActor)> {
        self.actors
            .iter()
            .find(|(_, a)| a.name == name)
            .map(|(h, a)| (*h, a))
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    pub fn last_pick(&self) -> Option<&PickRequest> {
        self.last_pick.as_ref()
    }

    /// Answer for the next pick (`None` cancels it)
    pub fn queue_pick(&mut self, handle: Option<ActorHandle>) {
        self.pick_responses.push_back(handle);
    }

    /// Moves for the next drag. The drag ends after the last one.
    pub fn queue_drag(&mut self, moves: Vec<Matrix4>) {
        self.drag_scripts.push_back(moves);
    }

    pub fn is_dragging(&self, handle: ActorHandle) -> bool {
        self.active_drags.contains_key(&handle)
    }

    /// Move an actor under an open drag. Returns false if no drag is open
    /// for it or the controller stopped listening.
    pub fn drag_to(&mut self, handle: ActorHandle, transform: Matrix4) -> bool {
        let Some(tx) = self.active_drags.get(&handle) else {
            return false;
        };
        if tx.send(transform).is_err() {
            self.active_drags.remove(&handle);
            return false;
        }
        if let Some(actor) = self.actors.get_mut(&handle) {
            actor.transform = transform;
        }
        true
    }

    /// Release the mouse
    pub fn end_drag(&mut self, handle: ActorHandle) -> bool {
        self.active_drags.remove(&handle).is_some()
    }
}

impl Renderer for HeadlessRenderer {
    fn add_mesh(&mut self, actor: MeshActor<'_>) -> ActorHandle {
        self.next_handle += 1;
        let handle = ActorHandle(self.next_handle);
        self.actors.insert(
            handle,
            HeadlessActor {
                name: actor.name.to_string(),
                mesh: actor.mesh.clone(),
                color: actor.effective_color(),
                opacity: actor.opacity,
                transform: Matrix4::identity(),
                visible: true,
            },
        );
        self.stats.meshes_added += 1;
        handle
    }

    fn set_transform(&mut self, handle: ActorHandle, transform: &Matrix4) {
        if let Some(actor) = self.actors.get_mut(&handle) {
            actor.transform = *transform;
        }
    }

    fn is_visible(&self, handle: ActorHandle) -> bool {
        self.actors.get(&handle).map(|a| a.visible).unwrap_or(false)
    }

    fn set_visible(&mut self, handle: ActorHandle, visible: bool) {
        if let Some(actor) = self.actors.get_mut(&handle) {
            if actor.visible != visible {
                actor.visible = visible;
                self.stats.visibility_changes += 1;
            }
        }
    }

    fn remove_actor(&mut self, handle: ActorHandle) {
        if self.actors.remove(&handle).is_some() {
            self.stats.actors_removed += 1;
        }
        self.active_drags.remove(&handle);
    }

    fn render(&mut self) {
        self.stats.render_requests += 1;
    }

    fn reset_camera(&mut self) {
        self.stats.camera_resets += 1;
    }

    fn pick(&mut self, request: PickRequest) -> PickReply {
        self.stats.picks += 1;
        let (tx, rx) = oneshot::channel();
        let answer = self
            .pick_responses
            .pop_front()
            .flatten()
            .filter(|h| request.candidates.contains(h));
        self.last_pick = Some(request);
        let _ = tx.send(answer);
        rx
    }

    fn begin_interactive_move(&mut self, handle: ActorHandle) -> MoveStream {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.drag_scripts.pop_front() {
            Some(moves) => {
                for transform in moves {
                    if let Some(actor) = self.actors.get_mut(&handle) {
                        actor.transform = transform;
                    }
                    let _ = tx.send(transform);
                }
            }
            None => {
                self.active_drags.insert(handle, tx);
            }
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PickStyle;

    fn add(renderer: &mut HeadlessRenderer, name: &str) -> ActorHandle {
        let mesh = Mesh::cube(name, 1.0);
        renderer.add_mesh(MeshActor {
            name,
            mesh: &mesh,
            color: None,
            default_color: Color::rgb(0x44, 0x44, 0x44),
            opacity: 1.0,
        })
    }

    #[test]
    fn test_actor_lifecycle() {
        let mut renderer = HeadlessRenderer::new();
        let handle = add(&mut renderer, "pointer_tool");

        assert!(renderer.is_visible(handle));
        assert_eq!(renderer.actor(handle).unwrap().color.to_hex(), "#444444");

        renderer.set_visible(handle, false);
        renderer.set_visible(handle, false);
        assert_eq!(renderer.stats().visibility_changes, 1);

        renderer.remove_actor(handle);
        assert!(!renderer.is_visible(handle));
        assert_eq!(renderer.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_pick_filters_candidates() {
        let mut renderer = HeadlessRenderer::new();
        let a = add(&mut renderer, "a");
        let b = add(&mut renderer, "b");

        renderer.queue_pick(Some(b));
        let request = PickRequest {
            candidates: vec![a],
            message: "pick".into(),
            style: PickStyle::Wireframe,
            left_clicking: true,
        };
        assert_eq!(renderer.pick(request).await.unwrap(), None);

        renderer.queue_pick(Some(a));
        let request = PickRequest {
            candidates: vec![a, b],
            message: "pick".into(),
            style: PickStyle::Wireframe,
            left_clicking: true,
        };
        assert_eq!(renderer.pick(request).await.unwrap(), Some(a));
        assert_eq!(renderer.stats().picks, 2);
    }

    #[tokio::test]
    async fn test_manual_drag() {
        let mut renderer = HeadlessRenderer::new();
        let handle = add(&mut renderer, "coil_tool");

        let mut moves = renderer.begin_interactive_move(handle);
        let mut target = Matrix4::identity();
        target[(1, 3)] = 3.0;

        assert!(renderer.drag_to(handle, target));
        assert!(renderer.end_drag(handle));
        assert!(!renderer.drag_to(handle, target));

        assert_eq!(moves.recv().await, Some(target));
        assert_eq!(moves.recv().await, None);
        assert_eq!(renderer.actor(handle).unwrap().transform, target);
    }
}
