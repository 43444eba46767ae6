// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Draw orchestration.
//!
//! Decides how much of a building's output must be rebuilt by comparing the
//! current state against the snapshot taken after the previous draw, then
//! runs the pipeline at that level:
//!
//! * Full — path, template, or transition changes; everything is rebuilt
//!   into a staging subtree that replaces the old output only on success.
//! * PartsOnly — corner/gable/margin/replacement selection changed while
//!   solids are disabled; segment volumes are kept, part instances redone.
//! * MaterialsOnly — nothing else changed; only the material pass runs.
//!
//! Selection changes while solids are enabled force a full rebuild: boolean
//! parts were consumed into the segment volumes and cannot be re-placed.
//!
//! The snapshot is refreshed at the end of every draw, success or failure,
//! so a failed draw is not retried at full strength forever.

use crate::building::Building;
use crate::catalog::TemplateCatalog;
use crate::error::{Error, Result};
use crate::placement::{place_parts, PlacedPart};
use crate::segment::resolve_segments;
use crate::solids::{compose_solids, SegmentVolume, SolidReport};
use crate::template::Template;
use crate::volume::build_segment_volume;
use rustc_hash::FxHashMap;
use townrow_kernel::{NodeKey, NodeKind, Scene, SolidKey};

pub use crate::solids::{NoProgress, ProgressSink};

/// How much of the output the draw pass rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildKind {
    Full,
    PartsOnly,
    MaterialsOnly,
}

/// Outcome of one draw pass.
#[derive(Debug, Clone)]
pub struct DrawReport {
    pub kind: RebuildKind,
    /// Straight segments in the resolved path (transitions excluded).
    pub segments: usize,
    /// Nodes in the output subtree, root included.
    pub nodes: usize,
    pub solids: SolidReport,
}

/// Draws `building` into `scene` using its template from `catalog`.
///
/// On failure the previous output subtree is left untouched.
pub fn draw(
    scene: &mut Scene,
    catalog: &TemplateCatalog,
    building: &mut Building,
    progress: &mut dyn ProgressSink,
) -> Result<DrawReport> {
    let result = draw_inner(scene, catalog, building, progress);
    // Refreshed even on failure, otherwise the same failing diff would keep
    // forcing full rebuilds on every subsequent draw
    building.update_snapshot();
    result
}

fn draw_inner(
    scene: &mut Scene,
    catalog: &TemplateCatalog,
    building: &mut Building,
    progress: &mut dyn ProgressSink,
) -> Result<DrawReport> {
    let template = catalog
        .get(&building.template_id)
        .ok_or_else(|| Error::MissingTemplate {
            id: building.template_id.clone(),
        })?;

    let kind = decide_rebuild(building, &template);
    tracing::debug!(template = template.id.as_str(), ?kind, "draw pass");

    let (segments, solids) = match kind {
        RebuildKind::Full => full_rebuild(scene, &template, building, progress)?,
        RebuildKind::PartsOnly => (parts_rebuild(scene, &template, building)?, SolidReport::default()),
        RebuildKind::MaterialsOnly => (0, SolidReport::default()),
    };

    propagate_materials(scene, building);

    let nodes = building
        .output()
        .map(|root| scene.descendants(root).len() + 1)
        .unwrap_or(0);

    Ok(DrawReport {
        kind,
        segments,
        nodes,
        solids,
    })
}

fn decide_rebuild(building: &Building, template: &Template) -> RebuildKind {
    let Some(previous) = building.snapshot() else {
        return RebuildKind::Full;
    };
    if building.output().is_none() {
        return RebuildKind::Full;
    }
    let current = building.make_snapshot();
    if previous.structural_differs(&current) {
        RebuildKind::Full
    } else if previous.selection_differs(&current) {
        // Corner-part chamfer preferences make some selection changes
        // geometric: when the effective transition plan shifts, the
        // segment volumes themselves are stale
        if current.solids_enabled()
            || previous.transition_plan(template) != current.transition_plan(template)
        {
            RebuildKind::Full
        } else {
            RebuildKind::PartsOnly
        }
    } else {
        RebuildKind::MaterialsOnly
    }
}

/// Rebuilds everything. All fallible geometry work happens before the scene
/// is touched; materialization goes into a staging group that replaces the
/// old output only once it is complete.
fn full_rebuild(
    scene: &mut Scene,
    template: &Template,
    building: &mut Building,
    progress: &mut dyn ProgressSink,
) -> Result<(usize, SolidReport)> {
    let plan = building.transition_plan(template);
    let resolved = resolve_segments(
        &building.path,
        building.end_angles,
        building.back_along_path,
        &plan,
    )?;

    let mut volumes = Vec::with_capacity(resolved.segments.len() + resolved.transitions.len());
    for seg in resolved.segments.iter().chain(resolved.transitions.iter()) {
        volumes.push(SegmentVolume {
            segment: seg.clone(),
            solid: build_segment_volume(template, seg, building.back_along_path)?,
        });
    }

    let mut placed = place_parts(template, building, &resolved)?;

    let solids = if building.solids_enabled && template.has_solids() {
        compose_solids(template, &mut volumes, &mut placed, progress)?
    } else {
        SolidReport::default()
    };

    let staging = scene.add_group(None, building.template_id.clone());
    scene.set_allow_nested_materials(staging, true);
    match materialize(scene, staging, template, &volumes, &placed) {
        Ok(()) => {
            if let Some(old) = building.output() {
                scene.remove_subtree(old);
            }
            building.set_output(Some(staging));
            Ok((resolved.segments.len(), solids))
        }
        Err(e) => {
            scene.remove_subtree(staging);
            Err(e)
        }
    }
}

/// Fills `root` with per-segment groups, each holding the segment volume
/// instance followed by its part instances.
fn materialize(
    scene: &mut Scene,
    root: NodeKey,
    template: &Template,
    volumes: &[SegmentVolume],
    placed: &[PlacedPart],
) -> Result<()> {
    let mut part_groups: FxHashMap<usize, NodeKey> = FxHashMap::default();

    for v in volumes {
        let name = if v.segment.is_transition {
            format!("corner_{}", v.segment.index)
        } else {
            format!("segment_{}", v.segment.index)
        };
        let group = scene.add_group(Some(root), name);
        scene.set_allow_nested_materials(group, true);
        let solid = scene.add_solid(v.solid.clone());
        scene.add_instance(group, solid, v.segment.frame)?;
        if !v.segment.is_transition {
            part_groups.insert(v.segment.index, group);
        }
    }

    add_part_instances(scene, root, template, placed, &part_groups)
}

/// Adds one instance per placed part, sharing the body solid between
/// instances of the same part.
fn add_part_instances(
    scene: &mut Scene,
    root: NodeKey,
    template: &Template,
    placed: &[PlacedPart],
    part_groups: &FxHashMap<usize, NodeKey>,
) -> Result<()> {
    let mut bodies: FxHashMap<String, SolidKey> = FxHashMap::default();

    for p in placed {
        let Some(part) = template.part(&p.part_name) else {
            tracing::warn!(part = p.part_name.as_str(), "placed part missing from template");
            continue;
        };
        let solid = *bodies
            .entry(part.name.clone())
            .or_insert_with(|| scene.add_solid(part.body.clone()));
        let parent = part_groups.get(&p.segment).copied().unwrap_or(root);
        let instance = scene.add_instance(parent, solid, p.transform)?;
        scene.init_instance(instance, part.material.clone(), Some(p.part_name.clone()));
    }

    Ok(())
}

/// Re-places part instances, keeping the segment volumes in place. Only
/// valid while solids are disabled: with solids on, boolean parts were
/// consumed into the volumes and a selection change forces a full rebuild.
fn parts_rebuild(
    scene: &mut Scene,
    template: &Template,
    building: &Building,
) -> Result<usize> {
    let Some(root) = building.output() else {
        // decide_rebuild only picks PartsOnly when output exists
        return Ok(0);
    };

    let plan = building.transition_plan(template);
    let resolved = resolve_segments(
        &building.path,
        building.end_angles,
        building.back_along_path,
        &plan,
    )?;
    let placed = place_parts(template, building, &resolved)?;

    // Part instances carry their source part name; volume instances do not
    for key in scene.descendants(root) {
        if scene.source_part(key).is_some() {
            scene.remove_subtree(key);
        }
    }

    let mut part_groups: FxHashMap<usize, NodeKey> = FxHashMap::default();
    for child in scene.children(root).to_vec() {
        let Some(name) = scene.group_name(child) else {
            continue;
        };
        if let Some(index) = name
            .strip_prefix("segment_")
            .and_then(|s| s.parse::<usize>().ok())
        {
            part_groups.insert(index, child);
        }
    }

    add_part_instances(scene, root, template, &placed, &part_groups)?;
    Ok(resolved.segments.len())
}

/// Applies the building's material substitutions over the output subtree.
///
/// Instances whose original material has a substitution get the replacement
/// applied; everything else is restored to its original material, so
/// clearing a substitution takes effect on the next draw. Groups flagged to
/// disallow nested materials stop the walk; the root never does.
fn propagate_materials(scene: &mut Scene, building: &Building) {
    let Some(root) = building.output() else {
        return;
    };
    let subs = building.material_substitutions();

    let mut updates: Vec<(NodeKey, Option<String>)> = Vec::new();
    let mut worklist = vec![root];
    while let Some(key) = worklist.pop() {
        let Some(node) = scene.node(key) else {
            continue;
        };
        match &node.kind {
            NodeKind::Group {
                children,
                allow_nested_materials,
                ..
            } => {
                if key == root || *allow_nested_materials {
                    worklist.extend_from_slice(children);
                }
            }
            NodeKind::Instance {
                original_material, ..
            } => {
                let replacement = original_material.as_ref().and_then(|m| subs.get(m));
                updates.push((key, replacement.cloned()));
            }
        }
    }

    for (key, replacement) in updates {
        match replacement {
            Some(material) => scene.set_material(key, Some(material)),
            None => scene.restore_material(key),
        }
    }
}
