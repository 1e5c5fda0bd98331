//! Entity and pose fixtures

use std::time::Duration;

use nalgebra::{Isometry3, Vector3};
use rand::Rng;

use tracksim_core::Matrix4;
use tracksim_visual::{Mesh, TrackedEntity};

pub fn translation(x: f64, y: f64, z: f64) -> Matrix4 {
    Isometry3::translation(x, y, z).to_homogeneous()
}

/// Rotation about `axis` (scaled by the angle in radians) then translation
pub fn rigid(axis_angle: [f64; 3], offset: [f64; 3]) -> Matrix4 {
    Isometry3::new(
        Vector3::new(offset[0], offset[1], offset[2]),
        Vector3::new(axis_angle[0], axis_angle[1], axis_angle[2]),
    )
    .to_homogeneous()
}

/// Random rigid transform within a 200 mm cube
pub fn random_rigid<R: Rng>(rng: &mut R) -> Matrix4 {
    let axis_angle = [
        rng.gen_range(-1.5..1.5),
        rng.gen_range(-1.5..1.5),
        rng.gen_range(-1.5..1.5),
    ];
    let offset = [
        rng.gen_range(-100.0..100.0),
        rng.gen_range(-100.0..100.0),
        rng.gen_range(-100.0..100.0),
    ];
    rigid(axis_angle, offset)
}

/// Tracked pointer: tool mesh offset along the tip, no tracker mesh
pub fn pointer(key: &str) -> TrackedEntity {
    TrackedEntity::new(key, format!("{}_tracker", key)).with_tool_mesh(
        Mesh::cube(format!("{} tip", key), 5.0),
        Matrix4::identity(),
        translation(0.0, 0.0, 120.0),
    )
}

/// Coil with both tracker and tool geometry, rotated offsets
pub fn coil(key: &str) -> TrackedEntity {
    TrackedEntity::new(key, format!("{}_tracker", key))
        .with_tool_mesh(
            Mesh::cube(format!("{} body", key), 60.0),
            rigid([0.0, 0.0, 0.4], [0.0, 10.0, 0.0]),
            rigid([0.3, 0.0, 0.0], [15.0, -30.0, 45.0]),
        )
        .with_tracker_mesh(
            Mesh::cube(format!("{} tracker", key), 20.0),
            rigid([0.0, 0.2, 0.0], [2.0, 0.0, 0.0]),
        )
}

/// Subject tracker, rendered together with the subject surface
pub fn subject_tracker(key: &str) -> TrackedEntity {
    TrackedEntity::new(key, key)
        .with_tracker_mesh(Mesh::cube(format!("{} tracker", key), 20.0), Matrix4::identity())
        .as_subject_tracker()
}

/// Poll `cond` until it holds or `timeout` passes
pub async fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
