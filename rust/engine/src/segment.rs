// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segment resolution: frames, boundary planes, and chamfer cuts.
//!
//! Each path edge becomes a [`Segment`] with a local placement frame
//! (origin at the left corner, local X along the chord, local Z vertical)
//! and boundary planes derived from the averaged corner tangents. Convex
//! interior corners with a chamfer transition additionally get per-side cut
//! planes and a wedge-shaped transition segment bridging the two adjacent
//! boundaries. Segments are ephemeral: recomputed in full on every draw,
//! never persisted.

use crate::building::CornerTransition;
use crate::error::{Error, Result};
use crate::template::ChamferStyle;
use rustc_hash::FxHashMap;
use townrow_kernel::transform::{frame_from_origin_x, rotate_about_z};
use townrow_kernel::{Matrix4, Plane, Point3, Vector3};

/// A chamfer cut plane owned by one segment side.
#[derive(Debug, Clone)]
pub struct TransitionCut {
    /// Cut plane in the owning segment's local coordinates, oriented so the
    /// kept half-space is the segment body.
    pub plane: Plane,
    /// Index of the path corner this chamfer bevels.
    pub corner: usize,
}

/// One building segment (or chamfer transition wedge), fully derived.
#[derive(Debug, Clone)]
pub struct Segment {
    pub index: usize,
    /// World-space corner points.
    pub left: Point3<f64>,
    pub right: Point3<f64>,
    /// Averaged corner tangents (world space).
    pub tangent_left: Vector3<f64>,
    pub tangent_right: Vector3<f64>,
    /// Local → world placement frame.
    pub frame: Matrix4<f64>,
    pub length: f64,
    /// Boundary planes in local coordinates, normals pointing outward.
    pub plane_left: Plane,
    pub plane_right: Plane,
    /// Chord directions of the neighboring segments (world space), used by
    /// skew-aligned corner placement. `None` at building ends.
    pub adjacent_dir_left: Option<Vector3<f64>>,
    pub adjacent_dir_right: Option<Vector3<f64>>,
    pub cut_left: Option<TransitionCut>,
    pub cut_right: Option<TransitionCut>,
    /// True for the wedge volumes bridging a chamfered corner.
    pub is_transition: bool,
}

impl Segment {
    /// Unit chord direction in world space.
    pub fn chord_dir(&self) -> Vector3<f64> {
        Vector3::new(self.frame[(0, 0)], self.frame[(1, 0)], self.frame[(2, 0)])
    }

    /// Expresses a world direction in this segment's local frame.
    /// The frame's rotation part is orthonormal, so the transpose inverts it.
    pub fn to_local_dir(&self, v: &Vector3<f64>) -> Vector3<f64> {
        let rot = self.frame.fixed_view::<3, 3>(0, 0);
        rot.transpose() * v
    }

    /// Expresses a world point in this segment's local frame.
    pub fn to_local_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let rot = self.frame.fixed_view::<3, 3>(0, 0);
        let origin = Vector3::new(self.frame[(0, 3)], self.frame[(1, 3)], self.frame[(2, 3)]);
        Point3::from(rot.transpose() * (p.coords - origin))
    }

    /// A boundary is shared (and later hidden) when a neighbor or chamfer
    /// sits on that side.
    pub fn shares_left(&self) -> bool {
        self.adjacent_dir_left.is_some()
    }

    pub fn shares_right(&self) -> bool {
        self.adjacent_dir_right.is_some()
    }

    /// Usable X range inside the segment, accounting for chamfer cuts.
    pub fn usable_range(&self) -> (f64, f64) {
        let lo = self
            .cut_left
            .as_ref()
            .map(|c| c.plane.point.x)
            .unwrap_or(0.0);
        let hi = self
            .cut_right
            .as_ref()
            .map(|c| c.plane.point.x)
            .unwrap_or(self.length);
        (lo, hi)
    }
}

/// Output of one resolver pass: the per-edge segments plus the chamfer
/// transition wedges, in path order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPath {
    pub segments: Vec<Segment>,
    pub transitions: Vec<Segment>,
}

/// Resolves a path into segments.
///
/// Tangents at interior corners are the normalized average of the incoming
/// and outgoing edge directions; end tangents are the edge direction rotated
/// in-plane by the corresponding end angle. With `back_along_path` set the
/// path is reversed first (front/back semantics are defined against the
/// un-reversed path), swapping and negating the end angles.
pub fn resolve_segments(
    path: &[Point3<f64>],
    end_angles: (f64, f64),
    back_along_path: bool,
    transitions: &FxHashMap<usize, CornerTransition>,
) -> Result<ResolvedPath> {
    // Drop consecutive duplicate points so every edge has positive length
    let mut points: Vec<Point3<f64>> = Vec::with_capacity(path.len());
    for p in path {
        if points
            .last()
            .map(|last: &Point3<f64>| (p - last).norm() > 1e-9)
            .unwrap_or(true)
        {
            points.push(*p);
        }
    }
    if points.len() < 2 {
        return Err(Error::PathTooShort {
            points: points.len(),
        });
    }

    // Reversing the path negates every edge direction, and rotation is
    // linear, so rotating the reversed end direction by the original angle
    // equals the negated un-reversed end tangent. The angles swap sides but
    // keep their sign.
    let (first_angle, last_angle) = if back_along_path {
        points.reverse();
        (end_angles.1, end_angles.0)
    } else {
        end_angles
    };

    let edge_count = points.len() - 1;
    let dirs: Vec<Vector3<f64>> = (0..edge_count)
        .map(|i| (points[i + 1] - points[i]).normalize())
        .collect();

    // Corner tangents: ends rotated by the end angles, interiors averaged
    let mut tangents = Vec::with_capacity(points.len());
    tangents.push(rotate_about_z(dirs[0], first_angle));
    for c in 1..edge_count {
        let avg = (dirs[c - 1] + dirs[c])
            .try_normalize(1e-9)
            .unwrap_or(dirs[c]);
        tangents.push(avg);
    }
    tangents.push(rotate_about_z(dirs[edge_count - 1], last_angle));

    let mut segments = Vec::with_capacity(edge_count);
    for i in 0..edge_count {
        let left = points[i];
        let right = points[i + 1];
        let length = (right - left).norm();
        let frame = frame_from_origin_x(left, right - left);

        let mut seg = Segment {
            index: i,
            left,
            right,
            tangent_left: tangents[i],
            tangent_right: tangents[i + 1],
            frame,
            length,
            plane_left: Plane::new(Point3::origin(), -Vector3::x()),
            plane_right: Plane::new(Point3::new(length, 0.0, 0.0), Vector3::x()),
            adjacent_dir_left: (i > 0).then(|| dirs[i - 1]),
            adjacent_dir_right: (i + 1 < edge_count).then(|| dirs[i + 1]),
            cut_left: None,
            cut_right: None,
            is_transition: false,
        };

        // Boundary plane normals follow the corner tangents in local
        // coordinates; for a straight path they degenerate to ∓X
        let left_normal = seg.to_local_dir(&tangents[i]);
        let right_normal = seg.to_local_dir(&tangents[i + 1]);
        seg.plane_left = Plane::new(Point3::origin(), -left_normal);
        seg.plane_right = Plane::new(Point3::new(length, 0.0, 0.0), right_normal);

        segments.push(seg);
    }

    // Chamfer transitions at convex interior corners
    let mut wedges = Vec::new();
    for corner in 1..edge_count {
        let CornerTransition::Chamfer { style, length } = transitions
            .get(&corner)
            .copied()
            .unwrap_or(CornerTransition::Sharp)
        else {
            continue;
        };
        if length <= 0.0 {
            continue;
        }

        let d_in = dirs[corner - 1];
        let d_out = dirs[corner];
        // Convex for transition purposes: non-negative vertical cross component
        if d_in.cross(&d_out).z < 0.0 {
            continue;
        }

        // Half the turn angle sits between each facade and the bisector
        let cos_half = {
            let cos_turn = d_in.dot(&d_out).clamp(-1.0, 1.0);
            ((1.0 + cos_turn) * 0.5).sqrt()
        };
        if cos_half < 1e-6 {
            tracing::warn!(corner, "chamfer skipped: facades fold back on themselves");
            continue;
        }

        let chord = match style {
            ChamferStyle::Diagonal => length,
            ChamferStyle::Projection => length / cos_half,
        };
        // Facade setback from the corner point to each chamfer endpoint
        let setback = chord / (2.0 * cos_half);

        let prev_len = segments[corner - 1].length;
        let next_len = segments[corner].length;
        if setback >= prev_len || setback >= next_len {
            tracing::warn!(corner, setback, "chamfer skipped: wider than a segment");
            continue;
        }

        segments[corner - 1].cut_right = Some(TransitionCut {
            plane: Plane::new(Point3::new(prev_len - setback, 0.0, 0.0), Vector3::x()),
            corner,
        });
        segments[corner].cut_left = Some(TransitionCut {
            plane: Plane::new(Point3::new(setback, 0.0, 0.0), -Vector3::x()),
            corner,
        });

        // Wedge segment spanning the chamfer chord, sheared later onto the
        // two cut planes by the volume builder
        let corner_point = points[corner];
        let wedge_left = corner_point - d_in * setback;
        let wedge_right = corner_point + d_out * setback;
        let wedge_chord = wedge_right - wedge_left;
        let wedge_length = wedge_chord.norm();
        let frame = frame_from_origin_x(wedge_left, wedge_chord);

        let mut wedge = Segment {
            index: corner,
            left: wedge_left,
            right: wedge_right,
            tangent_left: d_in,
            tangent_right: d_out,
            frame,
            length: wedge_length,
            plane_left: Plane::new(Point3::origin(), -Vector3::x()),
            plane_right: Plane::new(Point3::new(wedge_length, 0.0, 0.0), Vector3::x()),
            adjacent_dir_left: Some(d_in),
            adjacent_dir_right: Some(d_out),
            cut_left: None,
            cut_right: None,
            is_transition: true,
        };
        let left_normal = wedge.to_local_dir(&d_in);
        let right_normal = wedge.to_local_dir(&d_out);
        wedge.plane_left = Plane::new(Point3::origin(), -left_normal);
        wedge.plane_right = Plane::new(Point3::new(wedge_length, 0.0, 0.0), right_normal);

        wedges.push(wedge);
    }

    Ok(ResolvedPath {
        segments,
        transitions: wedges,
    })
}
