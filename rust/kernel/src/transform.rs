// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Placement transform construction.
//!
//! All placement frames are 4x4 affine matrices whose columns are the world
//! directions of the local axes plus the origin. Values are immutable: every
//! helper returns a new matrix instead of mutating shared state.

use crate::UP;
use nalgebra::{Matrix4, Point3, Vector3};

/// Build a frame with origin, local X along `x_dir` (projected horizontal),
/// and local Z vertical. Local Y completes the right-handed set.
pub fn frame_from_origin_x(origin: Point3<f64>, x_dir: Vector3<f64>) -> Matrix4<f64> {
    let x_axis = Vector3::new(x_dir.x, x_dir.y, 0.0)
        .try_normalize(1e-12)
        .unwrap_or_else(|| Vector3::new(1.0, 0.0, 0.0));
    let y_axis = UP.cross(&x_axis);
    frame_axes(origin, x_axis, y_axis, UP)
}

/// Build a frame from explicit axes. The axes are used as given.
pub fn frame_axes(
    origin: Point3<f64>,
    x_axis: Vector3<f64>,
    y_axis: Vector3<f64>,
    z_axis: Vector3<f64>,
) -> Matrix4<f64> {
    Matrix4::new(
        x_axis.x, y_axis.x, z_axis.x, origin.x,
        x_axis.y, y_axis.y, z_axis.y, origin.y,
        x_axis.z, y_axis.z, z_axis.z, origin.z,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Non-orthogonal axis construction: skew enabled, scale disabled.
///
/// Local X follows `x_dir` and local Y follows `y_dir`, both normalized but
/// not orthogonalized, with local Z vertical. Handedness rule: when the
/// triple product `x · (y × z)` is negative, Y is flipped so the frame keeps
/// a consistent orientation for left-handed configurations.
pub fn skew_axes(
    origin: Point3<f64>,
    x_dir: Vector3<f64>,
    y_dir: Vector3<f64>,
) -> Matrix4<f64> {
    let x_axis = x_dir
        .try_normalize(1e-12)
        .unwrap_or_else(|| Vector3::new(1.0, 0.0, 0.0));
    let mut y_axis = y_dir
        .try_normalize(1e-12)
        .unwrap_or_else(|| UP.cross(&x_axis));

    if x_axis.dot(&y_axis.cross(&UP)) < 0.0 {
        y_axis = -y_axis;
    }

    frame_axes(origin, x_axis, y_axis, UP)
}

/// Rotate a vector in-plane about the vertical axis.
pub fn rotate_about_z(v: Vector3<f64>, angle: f64) -> Vector3<f64> {
    let (sin, cos) = angle.sin_cos();
    Vector3::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos, v.z)
}

/// Midpoint interpolation between two placement transforms: translation at
/// the arithmetic midpoint, orientation basis taken from `a`.
pub fn midpoint_transform(a: &Matrix4<f64>, b: &Matrix4<f64>) -> Matrix4<f64> {
    let mut result = *a;
    result[(0, 3)] = (a[(0, 3)] + b[(0, 3)]) * 0.5;
    result[(1, 3)] = (a[(1, 3)] + b[(1, 3)]) * 0.5;
    result[(2, 3)] = (a[(2, 3)] + b[(2, 3)]) * 0.5;
    result
}

/// Extract the translation component of a transform.
pub fn translation(m: &Matrix4<f64>) -> Point3<f64> {
    Point3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// True when the rotation part of the transform is mirrored (negative
/// determinant). Mirrored instances reverse edge winding.
pub fn is_mirrored(m: &Matrix4<f64>) -> bool {
    let rot = m.fixed_view::<3, 3>(0, 0);
    rot.determinant() < 0.0
}
