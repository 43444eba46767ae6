// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Part placement: corner, gable, align, spread, and replacement parts.
//!
//! Produces world-space placement transforms for every part instance of a
//! draw pass. Spread parts fill a segment's usable span at a margin-aware
//! spacing; replacement parts consume slots of an align/spread part and
//! inherit or interpolate the covered transforms.

use crate::building::{Building, Side};
use crate::error::{Error, Result};
use crate::segment::{ResolvedPath, Segment};
use crate::template::{
    AlignAnchor, PartKind, SolidTag, SpreadCount, SpreadRounding, Template,
};
use rustc_hash::FxHashMap;
use townrow_kernel::transform::{frame_axes, frame_from_origin_x, midpoint_transform, skew_axes};
use townrow_kernel::{Matrix4, Vector3, UP};

/// One placed part instance.
#[derive(Debug, Clone)]
pub struct PlacedPart {
    pub part_name: String,
    /// World-space placement.
    pub transform: Matrix4<f64>,
    /// Index of the hosting segment.
    pub segment: usize,
    /// Slot index for align/spread instances, targetable by replacements.
    pub slot: Option<usize>,
    pub solid_tag: Option<SolidTag>,
}

/// Computes all part placements for the resolved path.
pub fn place_parts(
    template: &Template,
    building: &Building,
    resolved: &ResolvedPath,
) -> Result<Vec<PlacedPart>> {
    let segments = &resolved.segments;
    let mut placed = Vec::new();

    place_gables(template, building, segments, &mut placed);
    place_corners(template, building, segments, &mut placed);

    // Slot-bearing parts, keyed for replacement resolution
    let mut slots: FxHashMap<(String, usize), Vec<PlacedPart>> = FxHashMap::default();
    for part in &template.parts {
        match &part.kind {
            PartKind::Align(anchor) => {
                for seg in segments {
                    let x = align_x(*anchor, seg.length);
                    slots
                        .entry((part.name.clone(), seg.index))
                        .or_default()
                        .push(PlacedPart {
                            part_name: part.name.clone(),
                            transform: seg.frame * translation_x(x),
                            segment: seg.index,
                            slot: Some(0),
                            solid_tag: part.solid_tag,
                        });
                }
            }
            PartKind::Spread {
                count,
                margin_left,
                margin_right,
                allow_overflow,
            } => {
                for seg in segments {
                    let instances = place_spread(
                        template,
                        building,
                        segments.len(),
                        seg,
                        &part.name,
                        part.solid_tag,
                        *count,
                        (*margin_left, *margin_right),
                        *allow_overflow,
                        part_extent(template, &part.name),
                    )?;
                    slots
                        .entry((part.name.clone(), seg.index))
                        .or_default()
                        .extend(instances);
                }
            }
            PartKind::None if part.solid_tag.is_some() => {
                // Solid-only parts ride along with every segment volume
                for seg in segments {
                    placed.push(PlacedPart {
                        part_name: part.name.clone(),
                        transform: seg.frame,
                        segment: seg.index,
                        slot: None,
                        solid_tag: part.solid_tag,
                    });
                }
            }
            _ => {}
        }
    }

    resolve_replacements(template, building, &mut slots, &mut placed);

    for (_, instances) in slots {
        placed.extend(instances);
    }

    Ok(placed)
}

fn translation_x(x: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&Vector3::new(x, 0.0, 0.0))
}

fn align_x(anchor: AlignAnchor, length: f64) -> f64 {
    match anchor {
        AlignAnchor::Left => 0.0,
        AlignAnchor::Right => length,
        AlignAnchor::Center => length * 0.5,
        AlignAnchor::Percent(p) => length * p.clamp(0.0, 1.0),
    }
}

/// X extent of a part's body, for the boundary acceptance filter.
fn part_extent(template: &Template, name: &str) -> (f64, f64) {
    template
        .part(name)
        .map(|p| {
            if p.body.is_empty() {
                (0.0, 0.0)
            } else {
                let (min, max) = p.body.bounds();
                (min.x, max.x)
            }
        })
        .unwrap_or((0.0, 0.0))
}

fn place_gables(
    template: &Template,
    building: &Building,
    segments: &[Segment],
    placed: &mut Vec<PlacedPart>,
) {
    let Some(first) = segments.first() else {
        return;
    };
    let last = segments.last().unwrap_or(first);

    // Gable frames: local Y follows the end tangent (so gables skew with
    // end-angle rotation), local X stays on the transverse axis
    let ends = [
        (Side::Left, first, first.left, first.tangent_left),
        (Side::Right, last, last.right, last.tangent_right),
    ];
    for (side, seg, origin, tangent) in ends {
        let Some(name) = building.gable_part(side) else {
            continue;
        };
        let Some(part) = template.part(name) else {
            tracing::warn!(part = name, "gable part missing from template, skipped");
            continue;
        };
        let transverse = UP.cross(&seg.chord_dir());
        placed.push(PlacedPart {
            part_name: name.to_string(),
            transform: frame_axes(origin, transverse, tangent, UP),
            segment: seg.index,
            slot: None,
            solid_tag: part.solid_tag,
        });
    }
}

fn place_corners(
    template: &Template,
    building: &Building,
    segments: &[Segment],
    placed: &mut Vec<PlacedPart>,
) {
    let n = segments.len();
    for corner in 0..=n {
        // The final path corner rides on the last segment's right end
        let (seg, at_right) = if corner < n {
            (&segments[corner], false)
        } else {
            (&segments[n - 1], true)
        };
        let (origin, tangent, adjacent) = if at_right {
            (seg.right, seg.tangent_right, seg.adjacent_dir_right)
        } else {
            (seg.left, seg.tangent_left, seg.adjacent_dir_left)
        };

        for name in building.corner_parts_at(corner) {
            let Some(part) = template.part(name) else {
                tracing::warn!(part = name, "corner part missing from template, skipped");
                continue;
            };
            let PartKind::Corner { mode, .. } = part.kind else {
                continue;
            };

            use crate::template::CornerMode;
            let transform = match (mode, adjacent) {
                // Skewed leans toward the adjacent wall; at building ends
                // there is no adjacent wall and bisector alignment applies
                (CornerMode::Skewed, Some(adj)) => skew_axes(origin, seg.chord_dir(), adj),
                _ => frame_from_origin_x(origin, tangent),
            };
            placed.push(PlacedPart {
                part_name: name.to_string(),
                transform,
                segment: seg.index,
                slot: None,
                solid_tag: part.solid_tag,
            });
        }
    }
}

/// Effective facade margin for one segment side: the caller's explicit
/// margin when set, otherwise the auto-suggested one (§ corner/gable part
/// margins), otherwise the part's own default.
fn effective_margin(
    template: &Template,
    building: &Building,
    segment_count: usize,
    segment: usize,
    side: Side,
    part_default: f64,
) -> f64 {
    if let Some(explicit) = building.margin(segment, side) {
        return explicit;
    }
    let suggested = suggested_margin(template, building, segment_count, segment, side);
    if suggested > 0.0 {
        suggested
    } else {
        part_default
    }
}

/// Auto-suggested facade margin: the maximum configured margin among the
/// corner/gable parts used adjacent to the given segment side.
pub fn suggested_margin(
    template: &Template,
    building: &Building,
    segment_count: usize,
    segment: usize,
    side: Side,
) -> f64 {
    let corner = match side {
        Side::Left => segment,
        Side::Right => segment + 1,
    };

    let mut margin: f64 = 0.0;
    for name in building.corner_parts_at(corner) {
        if let Some(part) = template.part(name) {
            margin = margin.max(part.margin);
        }
    }

    let is_end = (side == Side::Left && segment == 0)
        || (side == Side::Right && segment + 1 == segment_count);
    if is_end {
        if let Some(name) = building.gable_part(side) {
            if let Some(part) = template.part(name) {
                margin = margin.max(part.margin);
            }
        }
    }

    margin
}

fn spread_count(raw: f64, rounding: SpreadRounding) -> usize {
    match rounding {
        SpreadRounding::Nearest => (raw.round() as i64).max(1) as usize,
        SpreadRounding::ForceOdd => {
            let lower = {
                let f = raw.floor() as i64;
                if f % 2 == 0 { f - 1 } else { f }
            };
            let upper = lower + 2;
            let pick = if (raw - lower as f64) <= (upper as f64 - raw) {
                lower
            } else {
                upper
            };
            pick.max(1) as usize
        }
        SpreadRounding::ForceEven => {
            let lower = {
                let f = raw.floor() as i64;
                if f % 2 == 0 { f } else { f - 1 }
            };
            let upper = lower + 2;
            let pick = if (raw - lower as f64) <= (upper as f64 - raw) {
                lower
            } else {
                upper
            };
            pick.max(2) as usize
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn place_spread(
    template: &Template,
    building: &Building,
    segment_count: usize,
    seg: &Segment,
    part_name: &str,
    solid_tag: Option<SolidTag>,
    count: SpreadCount,
    part_margins: (f64, f64),
    allow_overflow: bool,
    body_extent: (f64, f64),
) -> Result<Vec<PlacedPart>> {
    let margin_left = effective_margin(
        template,
        building,
        segment_count,
        seg.index,
        Side::Left,
        part_margins.0,
    );
    let margin_right = effective_margin(
        template,
        building,
        segment_count,
        seg.index,
        Side::Right,
        part_margins.1,
    );

    let span = seg.length - margin_left - margin_right;
    if span <= 0.0 {
        tracing::warn!(
            segment = seg.index,
            part = part_name,
            "margins consume the whole segment, no spread instances"
        );
        return Ok(Vec::new());
    }

    let n = match count {
        SpreadCount::Fixed(n) => n,
        SpreadCount::Interval { interval, rounding } => {
            if interval <= 0.0 {
                return Err(Error::InvalidSpread {
                    part: part_name.to_string(),
                    segment: seg.index,
                    detail: format!("non-positive interval {interval}"),
                });
            }
            spread_count(span / interval, rounding)
        }
    };
    if n == 0 {
        return Ok(Vec::new());
    }

    let spacing = span / n as f64;
    let (lo, hi) = seg.usable_range();
    let mut instances = Vec::with_capacity(n);

    for k in 0..n {
        let x = margin_left + (k as f64 + 0.5) * spacing;

        // Hard acceptance filter: an instance whose body would cross a
        // segment boundary or cut plane is dropped, not clamped
        if !allow_overflow {
            let (bmin, bmax) = body_extent;
            if x + bmin < lo - 1e-9 || x + bmax > hi + 1e-9 {
                continue;
            }
        }

        instances.push(PlacedPart {
            part_name: part_name.to_string(),
            transform: seg.frame * translation_x(x),
            segment: seg.index,
            slot: Some(k),
            solid_tag,
        });
    }

    Ok(instances)
}

/// Applies the building's replacement assignments to the slotted instances.
fn resolve_replacements(
    template: &Template,
    building: &Building,
    slots: &mut FxHashMap<(String, usize), Vec<PlacedPart>>,
    placed: &mut Vec<PlacedPart>,
) {
    // Deterministic order regardless of map iteration
    let mut assignments: Vec<(&(String, usize, usize), &Option<String>)> =
        building.replacements().iter().collect();
    assignments.sort_by(|a, b| a.0.cmp(b.0));

    for ((part_name, segment, slot), replacement) in assignments {
        let Some(instances) = slots.get_mut(&(part_name.clone(), *segment)) else {
            continue;
        };

        let (name, slot_count) = match replacement {
            // Explicit "none": the covered slot disappears without a stand-in
            None => {
                instances.retain(|p| p.slot != Some(*slot));
                continue;
            }
            Some(name) => match template.part(name) {
                Some(part) => match &part.kind {
                    PartKind::Replacement { slots, .. } => (name, (*slots).max(1)),
                    _ => {
                        tracing::warn!(
                            part = name.as_str(),
                            "replacement target is not a replacement part, skipped"
                        );
                        continue;
                    }
                },
                None => {
                    tracing::warn!(
                        part = name.as_str(),
                        "unknown replacement part, skipped"
                    );
                    continue;
                }
            },
        };

        let covered: Vec<Matrix4<f64>> = instances
            .iter()
            .filter(|p| {
                p.slot
                    .map(|s| s >= *slot && s < *slot + slot_count)
                    .unwrap_or(false)
            })
            .map(|p| p.transform)
            .collect();
        if covered.is_empty() {
            continue;
        }

        let transform = if covered.len() == 1 {
            covered[0]
        } else {
            midpoint_transform(&covered[0], &covered[covered.len() - 1])
        };

        instances.retain(|p| {
            p.slot
                .map(|s| s < *slot || s >= *slot + slot_count)
                .unwrap_or(true)
        });

        let solid_tag = template.part(name).and_then(|p| p.solid_tag);
        placed.push(PlacedPart {
            part_name: name.clone(),
            transform,
            segment: *segment,
            slot: None,
            solid_tag,
        });
    }
}
