//! Renderer contract
//!
//! The binding manager and manipulation controller only ever talk to a
//! [`Renderer`]. Interactive operations (picking, dragging) hand back
//! channels so the caller can await the user without holding the renderer.

use tokio::sync::{mpsc, oneshot};

use tracksim_core::Matrix4;

use crate::{Color, Mesh};

/// Opaque handle to a renderer-owned actor
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorHandle(pub u64);

/// Everything needed to create a mesh actor
#[derive(Clone, Debug)]
pub struct MeshActor<'a> {
    pub name: &'a str,
    pub mesh: &'a Mesh,
    /// Entity-configured color, if any
    pub color: Option<Color>,
    /// Used when `color` is unset
    pub default_color: Color,
    pub opacity: f32,
}

impl MeshActor<'_> {
    pub fn effective_color(&self) -> Color {
        self.color.unwrap_or(self.default_color)
    }
}

/// How pick candidates are highlighted while the user chooses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickStyle {
    Wireframe,
    Surface,
}

/// A single user pick among candidate actors
#[derive(Clone, Debug, PartialEq)]
pub struct PickRequest {
    pub candidates: Vec<ActorHandle>,
    /// Prompt shown to the user
    pub message: String,
    pub style: PickStyle,
    pub left_clicking: bool,
}

/// Resolves to the picked actor, or `None` if the pick was cancelled
pub type PickReply = oneshot::Receiver<Option<ActorHandle>>;

/// World transforms of the dragged actor, one per intermediate move.
/// The drag is over when the stream closes.
pub type MoveStream = mpsc::UnboundedReceiver<Matrix4>;

/// 3D scene the visual bindings draw into
pub trait Renderer: Send + 'static {
    /// Create a visible actor
    fn add_mesh(&mut self, actor: MeshActor<'_>) -> ActorHandle;

    /// Set the actor's world transform. Unknown handles are ignored.
    fn set_transform(&mut self, handle: ActorHandle, transform: &Matrix4);

    fn is_visible(&self, handle: ActorHandle) -> bool;

    fn set_visible(&mut self, handle: ActorHandle, visible: bool);

    fn remove_actor(&mut self, handle: ActorHandle);

    /// Request a redraw
    fn render(&mut self);

    fn reset_camera(&mut self);

    /// Ask the user to pick one of the candidates
    fn pick(&mut self, request: PickRequest) -> PickReply;

    /// Let the user drag an actor
    fn begin_interactive_move(&mut self, handle: ActorHandle) -> MoveStream;
}
