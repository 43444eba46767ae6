// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Volume fitting: shearing the template prototype into a segment.
//!
//! The prototype is instantiated at the segment's local frame, then its two
//! extreme-X faces are sheared onto the segment's boundary planes. The shear
//! moves only vertices sitting at the prototype's extreme X values and only
//! along X; everything else keeps its coordinates. Chamfer cut planes are
//! applied afterwards, and shared boundary faces are hidden (never deleted)
//! so they survive as merge seams.

use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::template::Template;
use townrow_kernel::{newell_normal, Plane, Solid, Vector3, TOLERANCE};

/// Builds the fitted volume for one segment, in segment-local coordinates.
///
/// Fatal unless the prototype exposes exactly one face with normal −X and
/// exactly one with normal +X (the gable-face invariant).
pub fn build_segment_volume(
    template: &Template,
    segment: &Segment,
    back_along_path: bool,
) -> Result<Solid> {
    let mut volume = template.prototype.clone();
    check_gable_invariant(template, &volume)?;

    let (min, max) = volume.bounds();

    if back_along_path {
        let depth = template.depth.unwrap_or(max.y - min.y);
        let offset = nalgebra::Matrix4::new_translation(&Vector3::new(0.0, -depth, 0.0));
        volume.transform(&offset);
    }

    shear_extremes(&mut volume, min.x, max.x, segment)?;

    // Chamfer cuts, keeping the segment body
    for cut in [&segment.cut_left, &segment.cut_right].into_iter().flatten() {
        volume.cut_with_plane(&cut.plane)?;
    }

    hide_seam_faces(&mut volume, segment);

    Ok(volume)
}

/// Hides every face lying on a shared boundary or chamfer cut plane.
/// Booleans rebuild the mesh and lose hidden flags, so the solid composer
/// re-invokes this after each composition.
pub fn hide_seam_faces(volume: &mut Solid, segment: &Segment) {
    for cut in [&segment.cut_left, &segment.cut_right].into_iter().flatten() {
        hide_faces_on_plane(volume, &cut.plane);
    }
    if segment.shares_left() && segment.cut_left.is_none() {
        hide_faces_on_plane(volume, &segment.plane_left);
    }
    if segment.shares_right() && segment.cut_right.is_none() {
        hide_faces_on_plane(volume, &segment.plane_right);
    }
}

fn check_gable_invariant(template: &Template, prototype: &Solid) -> Result<()> {
    let neg = prototype.faces_with_normal(&-Vector3::x(), 1e-6).len();
    let pos = prototype.faces_with_normal(&Vector3::x(), 1e-6).len();
    if neg != 1 || pos != 1 {
        return Err(Error::MalformedPrototype {
            template: template.id.clone(),
            detail: format!(
                "expected exactly one -X and one +X gable face, found {neg} and {pos}"
            ),
        });
    }
    Ok(())
}

/// Moves every vertex at the prototype's extreme X onto the matching
/// boundary plane, adjusting X only. Solving the plane equation for X gives
/// the tangent-driven shear directly; a boundary whose normal has no X
/// component (tangent perpendicular to the chord) leaves the vertex where
/// it is.
fn shear_extremes(volume: &mut Solid, x_min: f64, x_max: f64, segment: &Segment) -> Result<()> {
    let solve_x = |plane: &Plane, y: f64, z: f64| -> Option<f64> {
        let n = plane.normal;
        if n.x.abs() < 1e-9 {
            return None;
        }
        let d = n.dot(&plane.point.coords);
        Some((d - n.y * y - n.z * z) / n.x)
    };

    for vk in volume.vertex_keys() {
        let Some(p) = volume.vertex_position(vk) else {
            continue;
        };
        let target = if (p.x - x_min).abs() < TOLERANCE {
            solve_x(&segment.plane_left, p.y, p.z)
        } else if (p.x - x_max).abs() < TOLERANCE {
            solve_x(&segment.plane_right, p.y, p.z)
        } else {
            None
        };
        if let Some(x) = target {
            let mut moved = p;
            moved.x = x;
            volume.set_vertex_position(vk, moved);
        }
    }

    // Vertex moves invalidate stored face normals
    for fk in volume.face_keys() {
        let points = volume.face_points(fk);
        if points.len() >= 3 {
            let normal = newell_normal(&points);
            if let Some(face) = volume.face_mut(fk) {
                face.normal = normal;
            }
        }
    }

    Ok(())
}

/// Hides every face whose outer loop lies entirely on `plane`.
fn hide_faces_on_plane(volume: &mut Solid, plane: &Plane) {
    for fk in volume.face_keys() {
        let points = volume.face_points(fk);
        if points.len() >= 3 && points.iter().all(|p| plane.contains(p, 1e-6)) {
            volume.hide_face(fk);
        }
    }
}
