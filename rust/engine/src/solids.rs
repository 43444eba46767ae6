// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Solid composition and the multi-face opening cutter.
//!
//! Two disjoint operation classes, selected by a part's solid tag:
//!
//! * Boolean composition: union/subtract parts across all segments are
//!   sorted by their explicit ordering index and applied one at a time
//!   against the owning segment volume; the part instance is consumed.
//! * Multi-face cut: not a boolean. The part's naked boundary loops are
//!   redrawn as edges in the segment mesh, the mesh merges them into its
//!   faces, and a winding-based classification plus connected-face flood
//!   fill decides which faces fall inside the cut. Inside faces are hidden,
//!   never deleted.

use crate::error::Result;
use crate::placement::PlacedPart;
use crate::segment::Segment;
use crate::template::{SolidOp, Template};
use crate::volume::hide_seam_faces;
use rustc_hash::{FxHashMap, FxHashSet};
use townrow_kernel::transform::is_mirrored;
use townrow_kernel::{EdgeKey, FaceKey, Matrix4, Point3, Solid, TOLERANCE};

/// Advisory progress reporting for long passes. No-op by default; sinks
/// must never fail or block.
pub trait ProgressSink {
    fn report(&mut self, current: usize, total: usize) {
        let _ = (current, total);
    }
}

/// The default sink: ignores everything.
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// A fitted segment volume awaiting composition.
#[derive(Debug, Clone)]
pub struct SegmentVolume {
    pub segment: Segment,
    pub solid: Solid,
}

/// What the composer did, in kernel-visible order.
#[derive(Debug, Clone, Default)]
pub struct SolidReport {
    /// Boolean operations as applied: (part name, operation, order index).
    pub applied: Vec<(String, SolidOp, i32)>,
    /// Cut loops resolved by the opening cutter.
    pub cut_loops: usize,
    /// Faces hidden by the opening cutter.
    pub hidden_faces: usize,
    /// Non-solid parts removed because they were glued to a hidden face.
    pub dropped_parts: Vec<String>,
}

/// Runs boolean composition, then the multi-face cutter, over the fitted
/// volumes. Boolean parts are consumed from `placed`; parts glued to faces
/// the cutter hides are removed as well.
pub fn compose_solids(
    template: &Template,
    volumes: &mut [SegmentVolume],
    placed: &mut Vec<PlacedPart>,
    progress: &mut dyn ProgressSink,
) -> Result<SolidReport> {
    let mut report = SolidReport::default();

    // Ascending by explicit index; stable sort keeps discovery order on ties
    let mut boolean_ops: Vec<usize> = (0..placed.len())
        .filter(|&i| {
            matches!(
                placed[i].solid_tag.map(|t| t.op),
                Some(SolidOp::Union) | Some(SolidOp::Subtract)
            )
        })
        .collect();
    boolean_ops.sort_by_key(|&i| placed[i].solid_tag.map(|t| t.index).unwrap_or(0));

    let cutters: Vec<usize> = (0..placed.len())
        .filter(|&i| placed[i].solid_tag.map(|t| t.op) == Some(SolidOp::CutFaces))
        .collect();
    let total = boolean_ops.len() + cutters.len();
    let mut done = 0;

    let mut consumed: FxHashSet<usize> = FxHashSet::default();
    let mut touched: FxHashSet<usize> = FxHashSet::default();

    for i in boolean_ops {
        let part = &placed[i];
        // Guarded at parse time, but tags are caller-constructible
        let Some(tag) = part.solid_tag else { continue };

        let Some(body) = template.part(&part.part_name).map(|p| &p.body) else {
            tracing::warn!(part = part.part_name.as_str(), "boolean part has no template entry");
            continue;
        };
        let Some(volume) = volumes
            .iter_mut()
            .find(|v| !v.segment.is_transition && v.segment.index == part.segment)
        else {
            continue;
        };

        // Re-express the part in the volume's local context
        let to_local = volume
            .segment
            .frame
            .try_inverse()
            .unwrap_or_else(Matrix4::identity)
            * part.transform;
        let tool = body.transformed(&to_local);

        match tag.op {
            SolidOp::Union => volume.solid.union_with(&tool)?,
            SolidOp::Subtract => volume.solid.subtract(&tool)?,
            SolidOp::CutFaces => unreachable!(),
        }
        touched.insert(part.segment);
        consumed.insert(i);
        report
            .applied
            .push((part.part_name.clone(), tag.op, tag.index));

        done += 1;
        progress.report(done, total);
    }

    // Booleans rebuild the mesh and lose hidden flags
    for volume in volumes.iter_mut() {
        if touched.contains(&volume.segment.index) && !volume.segment.is_transition {
            hide_seam_faces(&mut volume.solid, &volume.segment);
        }
    }

    // Multi-face cuts, grouped per segment volume
    let mut hidden_by_segment: FxHashMap<usize, FxHashSet<FaceKey>> = FxHashMap::default();
    for i in cutters {
        let part = &placed[i];
        let Some(body) = template.part(&part.part_name).map(|p| &p.body) else {
            tracing::warn!(part = part.part_name.as_str(), "cut part has no template entry");
            continue;
        };
        let Some(volume) = volumes
            .iter_mut()
            .find(|v| !v.segment.is_transition && v.segment.index == part.segment)
        else {
            continue;
        };

        let to_local = volume
            .segment
            .frame
            .try_inverse()
            .unwrap_or_else(Matrix4::identity)
            * part.transform;

        let mut loops = Vec::new();
        for mut points in body.naked_loops() {
            for p in &mut points {
                *p = to_local.transform_point(p);
            }
            // Mirrored placements reverse traversal; restore the recorded
            // orientation so winding classification stays consistent
            if is_mirrored(&to_local) {
                points.reverse();
            }
            loops.push(points);
        }
        if loops.is_empty() {
            tracing::warn!(
                part = part.part_name.as_str(),
                "cut part has no naked boundary loops"
            );
            continue;
        }

        let hidden = cut_openings(&mut volume.solid, &loops);
        report.cut_loops += loops.len();
        report.hidden_faces += hidden.len();
        hidden_by_segment
            .entry(part.segment)
            .or_default()
            .extend(hidden);
        consumed.insert(i);

        done += 1;
        progress.report(done, total);
    }

    // Parts glued to a face the cutter hid disappear with it
    let mut dropped = Vec::new();
    for (i, part) in placed.iter().enumerate() {
        if part.solid_tag.is_some() || consumed.contains(&i) {
            continue;
        }
        let Some(hidden) = hidden_by_segment.get(&part.segment) else {
            continue;
        };
        let Some(volume) = volumes
            .iter()
            .find(|v| !v.segment.is_transition && v.segment.index == part.segment)
        else {
            continue;
        };
        let to_local = volume
            .segment
            .frame
            .try_inverse()
            .unwrap_or_else(Matrix4::identity)
            * part.transform;
        // Attachment probe: the body's center when there is one, else the
        // placement origin
        let probe = match template.part(&part.part_name).map(|p| &p.body) {
            Some(body) if !body.is_empty() => {
                let (min, max) = body.bounds();
                to_local.transform_point(&Point3::from((min.coords + max.coords) * 0.5))
            }
            _ => Point3::from(to_local.column(3).xyz()),
        };
        if hidden
            .iter()
            .any(|&fk| volume.solid.face_contains_point(fk, &probe, 1e-6))
        {
            dropped.push(i);
            report.dropped_parts.push(part.part_name.clone());
        }
    }
    consumed.extend(dropped);

    let mut index = 0;
    placed.retain(|_| {
        let keep = !consumed.contains(&index);
        index += 1;
        keep
    });

    Ok(report)
}

type QuantizedPoint = (i64, i64, i64);

fn quantize(p: &Point3<f64>) -> QuantizedPoint {
    (
        (p.x / TOLERANCE).round() as i64,
        (p.y / TOLERANCE).round() as i64,
        (p.z / TOLERANCE).round() as i64,
    )
}

/// Inserts the recorded loops into the mesh, merges, and hides every face
/// that falls inside a cut loop. Returns the hidden faces.
fn cut_openings(solid: &mut Solid, loops: &[Vec<Point3<f64>>]) -> FxHashSet<FaceKey> {
    for points in loops {
        let n = points.len();
        for i in 0..n {
            solid.add_edge(points[i], points[(i + 1) % n]);
        }
    }

    solid.merge();
    // The merge can miss loops touching host geometry only at their
    // boundary; retry once for edges still bounding no face
    let leftovers = solid.free_edges();
    if !leftovers.is_empty() {
        solid.merge_edges(&leftovers);
    }

    // Forward/reverse occurrence counts per segment pair; an edge recorded
    // in both directions across loops is ambiguous and skips classification
    let mut directions: FxHashMap<(QuantizedPoint, QuantizedPoint), (u32, u32)> =
        FxHashMap::default();
    for points in loops {
        let n = points.len();
        for i in 0..n {
            let (qa, qb) = (quantize(&points[i]), quantize(&points[(i + 1) % n]));
            let entry = directions
                .entry((qa.min(qb), qa.max(qb)))
                .or_insert((0, 0));
            if qa <= qb {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }

    let mut cut_edges: FxHashSet<EdgeKey> = FxHashSet::default();
    let mut inside_seeds: FxHashSet<FaceKey> = FxHashSet::default();
    let mut keep_seeds: FxHashSet<FaceKey> = FxHashSet::default();

    for points in loops {
        let n = points.len();
        for i in 0..n {
            let (a, b) = (points[i], points[(i + 1) % n]);
            let Some(ek) = solid.edge_by_endpoints(&a, &b) else {
                tracing::warn!("cut edge missing after merge, skipped");
                continue;
            };
            cut_edges.insert(ek);

            let (qa, qb) = (quantize(&a), quantize(&b));
            let ambiguous = directions
                .get(&(qa.min(qb), qa.max(qb)))
                .map(|&(f, r)| f > 0 && r > 0)
                .unwrap_or(false);
            if ambiguous {
                continue;
            }

            let Some((start, _)) = solid.edge_endpoints(ek) else {
                continue;
            };
            let recorded_forward = (start - a).norm() < 1e-6;

            for &fk in solid.edge_faces(ek) {
                let Some(face_forward) = solid.face_uses_edge_forward(fk, ek) else {
                    continue;
                };
                // Winding agreeing with the recorded loop marks the keep
                // side; disagreement marks the inside of the cut
                if face_forward == recorded_forward {
                    keep_seeds.insert(fk);
                } else {
                    inside_seeds.insert(fk);
                }
            }
        }
    }

    // Grow both sets across shared edges, never crossing the cut edges
    // themselves; this tolerates loops not lying perfectly flush
    let inside = flood_fill(solid, &inside_seeds, &cut_edges);
    let keep = flood_fill(solid, &keep_seeds, &cut_edges);

    // Faces reachable from both sets are ambiguous and stay visible
    let hidden: FxHashSet<FaceKey> = inside.difference(&keep).copied().collect();

    for &fk in &hidden {
        solid.hide_face(fk);
    }
    // Enclosed edges: everything they bound is now hidden
    for ek in solid.edge_keys() {
        let faces = solid.edge_faces(ek);
        if !faces.is_empty() {
            let all_hidden = faces
                .iter()
                .all(|&fk| solid.face(fk).map(|f| f.hidden).unwrap_or(true));
            let rim = cut_edges.contains(&ek)
                && faces
                    .iter()
                    .any(|&fk| solid.face(fk).map(|f| f.hidden).unwrap_or(false));
            if all_hidden || rim {
                solid.hide_edge(ek);
            }
        }
    }

    hidden
}

/// Connected-face traversal across shared boundary edges, excluding the
/// cut edges. Explicit worklist; the output hierarchy gives no recursion
/// guarantees.
fn flood_fill(
    solid: &Solid,
    seeds: &FxHashSet<FaceKey>,
    excluded: &FxHashSet<EdgeKey>,
) -> FxHashSet<FaceKey> {
    let mut reached = seeds.clone();
    let mut worklist: Vec<FaceKey> = seeds.iter().copied().collect();

    while let Some(fk) = worklist.pop() {
        for ek in solid.face_edge_keys(fk) {
            if excluded.contains(&ek) {
                continue;
            }
            for &neighbor in solid.edge_faces(ek) {
                if reached.insert(neighbor) {
                    worklist.push(neighbor);
                }
            }
        }
    }

    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::place_parts;
    use crate::segment::resolve_segments;
    use crate::template::{Part, PartKind, SpreadCount};
    use crate::volume::build_segment_volume;
    use crate::Building;
    use rustc_hash::FxHashMap;

    fn prototype() -> Solid {
        Solid::box_solid(Point3::origin(), Point3::new(1.0, 4.0, 3.0))
    }

    fn straight_volume(template: &Template) -> SegmentVolume {
        let resolved = resolve_segments(
            &[Point3::origin(), Point3::new(10.0, 0.0, 0.0)],
            (0.0, 0.0),
            false,
            &FxHashMap::default(),
        )
        .unwrap();
        let segment = resolved.segments.into_iter().next().unwrap();
        let solid = build_segment_volume(template, &segment, false).unwrap();
        SegmentVolume { segment, solid }
    }

    fn tool_box() -> Solid {
        Solid::box_solid(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5))
    }

    /// Quad facing +Y, into the front facade whose outward normal is −Y:
    /// the stamp-onto-wall convention the cutter classification expects.
    fn cutter_quad(x0: f64, x1: f64, z0: f64, z1: f64) -> Solid {
        let mut body = Solid::new();
        body.add_face(&[
            Point3::new(x0, 0.0, z0),
            Point3::new(x0, 0.0, z1),
            Point3::new(x1, 0.0, z1),
            Point3::new(x1, 0.0, z0),
        ])
        .unwrap();
        body
    }

    #[test]
    fn booleans_apply_in_index_order() {
        let template = Template::new("t", prototype())
            .with_part(
                Part::new("late", PartKind::None)
                    .with_body(tool_box())
                    .with_solid_tag(SolidOp::Subtract, 2),
            )
            .with_part(
                Part::new("first", PartKind::None)
                    .with_body(tool_box())
                    .with_solid_tag(SolidOp::Subtract, 0),
            )
            .with_part(
                Part::new("middle", PartKind::None)
                    .with_body(tool_box())
                    .with_solid_tag(SolidOp::Subtract, 1),
            );
        let building = Building::new("t", vec![Point3::origin(), Point3::new(10.0, 0.0, 0.0)]);

        let resolved = resolve_segments(&building.path, (0.0, 0.0), false, &FxHashMap::default())
            .unwrap();
        let mut placed = place_parts(&template, &building, &resolved).unwrap();
        let mut volumes = vec![straight_volume(&template)];

        let report =
            compose_solids(&template, &mut volumes, &mut placed, &mut NoProgress).unwrap();

        // Discovery order was [2, 0, 1]; kernel-visible order is [0, 1, 2]
        let indices: Vec<i32> = report.applied.iter().map(|(_, _, i)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let names: Vec<&str> = report.applied.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["first", "middle", "late"]);

        // Boolean parts are consumed
        assert!(placed.is_empty());
    }

    #[test]
    fn subtract_carves_the_volume() {
        let template = Template::new("t", prototype()).with_part(
            Part::new("niche", PartKind::Align(crate::template::AlignAnchor::Center))
                .with_body(Solid::box_solid(
                    Point3::new(-1.0, -0.5, 1.0),
                    Point3::new(1.0, 1.5, 2.0),
                ))
                .with_solid_tag(SolidOp::Subtract, 0),
        );
        let building = Building::new("t", vec![Point3::origin(), Point3::new(10.0, 0.0, 0.0)]);

        let resolved = resolve_segments(&building.path, (0.0, 0.0), false, &FxHashMap::default())
            .unwrap();
        let mut placed = place_parts(&template, &building, &resolved).unwrap();
        let mut volumes = vec![straight_volume(&template)];
        let before = volumes[0].solid.face_count();

        let report =
            compose_solids(&template, &mut volumes, &mut placed, &mut NoProgress).unwrap();
        assert_eq!(report.applied.len(), 1);
        assert!(volumes[0].solid.face_count() > before);
    }

    #[test]
    fn rectangular_loop_hides_one_face() {
        let template = Template::new("t", prototype());
        let mut volume = straight_volume(&template);
        let faces_before = volume.solid.face_count();

        // Loop fully inside the front facade (y = 0)
        let body = cutter_quad(3.0, 7.0, 1.0, 2.0);
        let loops = body.naked_loops();
        assert_eq!(loops.len(), 1);

        let hidden = cut_openings(&mut volume.solid, &loops);
        assert_eq!(hidden.len(), 1);

        // The interior disc exists, hidden; the host face stays visible
        assert_eq!(volume.solid.face_count(), faces_before + 1);
        let fk = *hidden.iter().next().unwrap();
        assert!(volume.solid.face(fk).unwrap().hidden);

        // The bounding loop's edges are hidden with it
        let rim = volume
            .solid
            .edge_by_endpoints(&Point3::new(3.0, 0.0, 1.0), &Point3::new(7.0, 0.0, 1.0))
            .unwrap();
        assert!(volume.solid.edge(rim).unwrap().hidden);
    }

    #[test]
    fn self_overlapping_loops_hide_nothing() {
        let template = Template::new("t", prototype());
        let mut volume = straight_volume(&template);

        // The same rectangle recorded twice with opposite orientation:
        // every edge matches forward AND reversed, so classification skips
        // all of them and no face lands in the inside set
        let forward = cutter_quad(3.0, 7.0, 1.0, 2.0).naked_loops();
        let mut reversed = forward.clone();
        for l in &mut reversed {
            l.reverse();
        }
        let mut loops = forward;
        loops.extend(reversed);

        let hidden = cut_openings(&mut volume.solid, &loops);
        assert!(hidden.is_empty());
    }

    #[test]
    fn side_by_side_loops_hide_both_interiors() {
        let template = Template::new("t", prototype());
        let mut volume = straight_volume(&template);

        let mut loops = cutter_quad(2.0, 4.0, 1.0, 2.0).naked_loops();
        loops.extend(cutter_quad(6.0, 8.0, 1.0, 2.0).naked_loops());

        let hidden = cut_openings(&mut volume.solid, &loops);
        assert_eq!(hidden.len(), 2);
    }

    #[test]
    fn glued_parts_are_dropped() {
        let template = Template::new("t", prototype())
            .with_part(
                Part::new("porthole", PartKind::Align(crate::template::AlignAnchor::Center))
                    .with_body(cutter_quad(-2.0, 2.0, 1.0, 2.0))
                    .with_solid_tag(SolidOp::CutFaces, 0),
            )
            .with_part(
                Part::new(
                    "window",
                    PartKind::Spread {
                        count: SpreadCount::Fixed(1),
                        margin_left: 0.0,
                        margin_right: 0.0,
                        allow_overflow: false,
                    },
                )
                .with_body(cutter_quad(-1.0, 1.0, 1.0, 2.0)),
            );
        let building = Building::new("t", vec![Point3::origin(), Point3::new(10.0, 0.0, 0.0)]);

        let resolved = resolve_segments(&building.path, (0.0, 0.0), false, &FxHashMap::default())
            .unwrap();
        let mut placed = place_parts(&template, &building, &resolved).unwrap();
        // The single window slot sits at x=5 y=0, inside the cut interior
        assert_eq!(placed.len(), 2);

        let mut volumes = vec![straight_volume(&template)];
        let report =
            compose_solids(&template, &mut volumes, &mut placed, &mut NoProgress).unwrap();

        assert_eq!(report.hidden_faces, 1);
        assert_eq!(report.dropped_parts, vec!["window".to_string()]);
        assert!(placed.is_empty());
    }

    #[test]
    fn progress_is_reported() {
        struct Counter(Vec<(usize, usize)>);
        impl ProgressSink for Counter {
            fn report(&mut self, current: usize, total: usize) {
                self.0.push((current, total));
            }
        }

        let template = Template::new("t", prototype()).with_part(
            Part::new("niche", PartKind::None)
                .with_body(tool_box())
                .with_solid_tag(SolidOp::Subtract, 0),
        );
        let building = Building::new("t", vec![Point3::origin(), Point3::new(10.0, 0.0, 0.0)]);
        let resolved = resolve_segments(&building.path, (0.0, 0.0), false, &FxHashMap::default())
            .unwrap();
        let mut placed = place_parts(&template, &building, &resolved).unwrap();
        let mut volumes = vec![straight_volume(&template)];

        let mut sink = Counter(Vec::new());
        compose_solids(&template, &mut volumes, &mut placed, &mut sink).unwrap();
        assert_eq!(sink.0, vec![(1, 1)]);
    }
}
