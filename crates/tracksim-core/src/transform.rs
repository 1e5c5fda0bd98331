//! Transform algebra over homogeneous 4x4 matrices
//!
//! Chains are written innermost-first: `compose(&[a_to_b, b_to_c])` yields
//! `a_to_c`, i.e. the matrix product `b_to_c * a_to_b`.
//!
//! Inversion is a general LU inverse rather than the rigid shortcut so that
//! calibration offsets with scale or shear survive a round trip.

use nalgebra::Vector4;

use crate::{TrackError, TrackResult};

pub type Matrix4 = nalgebra::Matrix4<f64>;
pub type Point3 = nalgebra::Point3<f64>;

/// Determinant magnitude below which a matrix is treated as singular
pub const SINGULAR_EPSILON: f64 = 1e-12;

#[inline]
pub fn identity() -> Matrix4 {
    Matrix4::identity()
}

/// Compose a chain of transforms, first element applied first
pub fn compose(chain: &[Matrix4]) -> Matrix4 {
    chain
        .iter()
        .fold(Matrix4::identity(), |acc, next| next * acc)
}

/// Invert a transform, rejecting singular and near-singular input
pub fn invert(m: &Matrix4) -> TrackResult<Matrix4> {
    let determinant = m.determinant();
    if !determinant.is_finite() || determinant.abs() < SINGULAR_EPSILON {
        return Err(TrackError::SingularMatrix { determinant });
    }

    let inverse = m
        .try_inverse()
        .ok_or(TrackError::SingularMatrix { determinant })?;

    // LU can still produce non-finite entries on badly scaled input
    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(TrackError::SingularMatrix { determinant });
    }

    Ok(inverse)
}

/// Apply a transform to a point (homogeneous divide when w != 1)
pub fn apply(m: &Matrix4, p: &Point3) -> Point3 {
    let h = m * Vector4::new(p.x, p.y, p.z, 1.0);
    if h.w.abs() > f64::EPSILON && (h.w - 1.0).abs() > f64::EPSILON {
        Point3::new(h.x / h.w, h.y / h.w, h.z / h.w)
    } else {
        Point3::new(h.x, h.y, h.z)
    }
}

/// Build a matrix from 16 row-major values
pub fn from_row_major(values: &[f64; 16]) -> Matrix4 {
    Matrix4::from_row_slice(values)
}

/// Flatten a matrix into 16 row-major values
pub fn to_row_major(m: &Matrix4) -> [f64; 16] {
    let mut out = [0.0; 16];
    for row in 0..4 {
        for col in 0..4 {
            out[row * 4 + col] = m[(row, col)];
        }
    }
    out
}

/// Element-wise comparison within an absolute tolerance
pub fn approx_eq(a: &Matrix4, b: &Matrix4, tolerance: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
}
