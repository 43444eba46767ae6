// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-building state: path, preferences, and the draw snapshot.
//!
//! A [`Building`] owns everything the user can configure for one placed
//! building. Selection setters validate part names against the assigned
//! template but keep indices beyond the current path's corner/segment
//! count stored; out-of-range entries are ignored at draw time, so a later
//! path edit can bring them back into effect.

use crate::error::{Error, Result};
use crate::template::{ChamferStyle, PartKind, Template};
use rustc_hash::{FxHashMap, FxHashSet};
use townrow_kernel::{NodeKey, Point3};

/// A segment side, viewed walking the path forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Transition choice for one interior corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CornerTransition {
    Sharp,
    Chamfer { style: ChamferStyle, length: f64 },
}

/// Copy of the draw-relevant fields, taken after each draw. Consulted only
/// through equality comparison in the rebuild decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawSnapshot {
    template_id: String,
    path: Vec<Point3<f64>>,
    end_angles: (f64, f64),
    back_along_path: bool,
    solids_enabled: bool,
    transitions: FxHashMap<usize, CornerTransition>,
    corner_usage: FxHashMap<String, FxHashSet<usize>>,
    gable_usage: FxHashMap<Side, String>,
    margins: FxHashMap<(usize, Side), f64>,
    replacements: FxHashMap<(String, usize, usize), Option<String>>,
}

impl DrawSnapshot {
    /// True when a field forcing a full rebuild differs.
    pub fn structural_differs(&self, other: &DrawSnapshot) -> bool {
        self.template_id != other.template_id
            || self.path != other.path
            || self.end_angles != other.end_angles
            || self.back_along_path != other.back_along_path
            || self.solids_enabled != other.solids_enabled
            || self.transitions != other.transitions
    }

    /// True when a corner/gable/margin/replacement selection differs.
    pub fn selection_differs(&self, other: &DrawSnapshot) -> bool {
        self.corner_usage != other.corner_usage
            || self.gable_usage != other.gable_usage
            || self.margins != other.margins
            || self.replacements != other.replacements
    }

    pub fn solids_enabled(&self) -> bool {
        self.solids_enabled
    }

    /// Effective transitions this snapshot would draw with. Used by the
    /// rebuild decision: a selection change that alters the plan needs the
    /// segment volumes rebuilt, not just the parts.
    pub fn transition_plan(&self, template: &Template) -> FxHashMap<usize, CornerTransition> {
        plan_transitions(template, &self.corner_usage, &self.transitions)
    }
}

/// Overlays explicit transition choices on the chamfer preferences of the
/// corner parts in use. Part names are visited in sorted order, so the
/// alphabetically first preference wins when several parts share a corner.
fn plan_transitions(
    template: &Template,
    corner_usage: &FxHashMap<String, FxHashSet<usize>>,
    explicit: &FxHashMap<usize, CornerTransition>,
) -> FxHashMap<usize, CornerTransition> {
    let mut plan = explicit.clone();

    let mut names: Vec<&String> = corner_usage.keys().collect();
    names.sort_unstable();
    for name in names {
        let Some(part) = template.part(name) else {
            continue;
        };
        let PartKind::Corner {
            chamfer_style: Some(style),
            chamfer_length: Some(length),
            ..
        } = part.kind
        else {
            continue;
        };
        if length <= 0.0 {
            continue;
        }
        for &corner in &corner_usage[name] {
            plan.entry(corner)
                .or_insert(CornerTransition::Chamfer { style, length });
        }
    }

    plan
}

/// One placed building: template reference, path, and preferences.
#[derive(Debug, Clone)]
pub struct Building {
    pub template_id: String,
    /// Frontage polyline. All points share one elevation (caller invariant).
    pub path: Vec<Point3<f64>>,
    /// In-plane rotation of the first/last gable away from perpendicular.
    pub end_angles: (f64, f64),
    /// Building body extends behind the path instead of in front of it.
    pub back_along_path: bool,
    pub solids_enabled: bool,

    corner_usage: FxHashMap<String, FxHashSet<usize>>,
    gable_usage: FxHashMap<Side, String>,
    transitions: FxHashMap<usize, CornerTransition>,
    margins: FxHashMap<(usize, Side), f64>,
    replacements: FxHashMap<(String, usize, usize), Option<String>>,
    material_subs: FxHashMap<String, String>,

    output: Option<NodeKey>,
    snapshot: Option<DrawSnapshot>,
}

impl Building {
    pub fn new(template_id: impl Into<String>, path: Vec<Point3<f64>>) -> Self {
        Self {
            template_id: template_id.into(),
            path,
            end_angles: (0.0, 0.0),
            back_along_path: false,
            solids_enabled: false,
            corner_usage: FxHashMap::default(),
            gable_usage: FxHashMap::default(),
            transitions: FxHashMap::default(),
            margins: FxHashMap::default(),
            replacements: FxHashMap::default(),
            material_subs: FxHashMap::default(),
            output: None,
            snapshot: None,
        }
    }

    // ---- selection setters ----

    /// Selects (or deselects) a corner part at a path corner. The corner
    /// index may exceed the current path's corner count; the preference is
    /// stored anyway and ignored at draw time.
    pub fn set_corner_usage(
        &mut self,
        template: &Template,
        part_name: &str,
        corner: usize,
        enabled: bool,
    ) -> Result<()> {
        let part = template.part(part_name).ok_or_else(|| Error::UnknownPart {
            template: template.id.clone(),
            part: part_name.to_string(),
        })?;
        if !part.is_corner() {
            return Err(Error::UnknownPart {
                template: template.id.clone(),
                part: part_name.to_string(),
            });
        }
        let corners = self.corner_usage.entry(part_name.to_string()).or_default();
        if enabled {
            corners.insert(corner);
        } else {
            corners.remove(&corner);
        }
        Ok(())
    }

    /// Selects a gable part for one building end, or clears it.
    pub fn set_gable_usage(
        &mut self,
        template: &Template,
        side: Side,
        part_name: Option<&str>,
    ) -> Result<()> {
        match part_name {
            Some(name) => {
                let part = template.part(name).ok_or_else(|| Error::UnknownPart {
                    template: template.id.clone(),
                    part: name.to_string(),
                })?;
                if !part.is_gable() {
                    return Err(Error::UnknownPart {
                        template: template.id.clone(),
                        part: name.to_string(),
                    });
                }
                self.gable_usage.insert(side, name.to_string());
            }
            None => {
                self.gable_usage.remove(&side);
            }
        }
        Ok(())
    }

    /// Sets the transition choice for an interior corner. Sharp is stored
    /// explicitly so it can override a corner part's chamfer preference; a
    /// non-positive chamfer length clears the choice entirely.
    pub fn set_transition(&mut self, corner: usize, transition: CornerTransition) {
        match transition {
            CornerTransition::Chamfer { length, .. } if length <= 0.0 => {
                self.transitions.remove(&corner);
            }
            other => {
                self.transitions.insert(corner, other);
            }
        }
    }

    /// Sets or clears an explicit facade margin for one segment side.
    pub fn set_margin(&mut self, segment: usize, side: Side, margin: Option<f64>) {
        match margin {
            Some(value) => {
                self.margins.insert((segment, side), value);
            }
            None => {
                self.margins.remove(&(segment, side));
            }
        }
    }

    /// Assigns a replacement part to one (segment, slot) of an
    /// align/spread part, or clears the assignment.
    pub fn set_replacement(
        &mut self,
        template: &Template,
        part_name: &str,
        segment: usize,
        slot: usize,
        replacement: Option<&str>,
    ) -> Result<()> {
        let part = template.part(part_name).ok_or_else(|| Error::UnknownPart {
            template: template.id.clone(),
            part: part_name.to_string(),
        })?;
        if !matches!(part.kind, PartKind::Align(_) | PartKind::Spread { .. }) {
            return Err(Error::UnknownPart {
                template: template.id.clone(),
                part: part_name.to_string(),
            });
        }
        let key = (part_name.to_string(), segment, slot);
        match replacement {
            Some(name) => {
                self.replacements.insert(key, Some(name.to_string()));
            }
            None => {
                self.replacements.remove(&key);
            }
        }
        Ok(())
    }

    /// Registers or clears a material substitution (original → replacement).
    pub fn set_material_substitution(&mut self, original: &str, replacement: Option<&str>) {
        match replacement {
            Some(name) => {
                self.material_subs
                    .insert(original.to_string(), name.to_string());
            }
            None => {
                self.material_subs.remove(original);
            }
        }
    }

    // ---- draw-time accessors ----

    pub fn transition_for(&self, corner: usize) -> CornerTransition {
        self.transitions
            .get(&corner)
            .copied()
            .unwrap_or(CornerTransition::Sharp)
    }

    /// Effective per-corner transitions: the chamfer preferences of the
    /// corner parts in use, overridden by any explicit choice (an explicit
    /// Sharp blocks a preference as well).
    pub fn transition_plan(&self, template: &Template) -> FxHashMap<usize, CornerTransition> {
        plan_transitions(template, &self.corner_usage, &self.transitions)
    }

    /// Corner part names selected at a given corner index.
    pub fn corner_parts_at(&self, corner: usize) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .corner_usage
            .iter()
            .filter(|(_, corners)| corners.contains(&corner))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn gable_part(&self, side: Side) -> Option<&str> {
        self.gable_usage.get(&side).map(String::as_str)
    }

    pub fn margin(&self, segment: usize, side: Side) -> Option<f64> {
        self.margins.get(&(segment, side)).copied()
    }

    pub fn replacements(&self) -> &FxHashMap<(String, usize, usize), Option<String>> {
        &self.replacements
    }

    pub fn material_substitutions(&self) -> &FxHashMap<String, String> {
        &self.material_subs
    }

    // ---- output and snapshot ----

    pub fn output(&self) -> Option<NodeKey> {
        self.output
    }

    pub fn set_output(&mut self, node: Option<NodeKey>) {
        self.output = node;
    }

    pub fn snapshot(&self) -> Option<&DrawSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn make_snapshot(&self) -> DrawSnapshot {
        DrawSnapshot {
            template_id: self.template_id.clone(),
            path: self.path.clone(),
            end_angles: self.end_angles,
            back_along_path: self.back_along_path,
            solids_enabled: self.solids_enabled,
            transitions: self.transitions.clone(),
            corner_usage: self.corner_usage.clone(),
            gable_usage: self.gable_usage.clone(),
            margins: self.margins.clone(),
            replacements: self.replacements.clone(),
        }
    }

    /// Records the current state as the post-draw snapshot. Called at the
    /// end of every draw, success or not.
    pub fn update_snapshot(&mut self) {
        self.snapshot = Some(self.make_snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{CornerMode, Part, SpreadCount, SpreadRounding};
    use townrow_kernel::{Point3, Solid};

    fn test_template() -> Template {
        Template::new(
            "row",
            Solid::box_solid(Point3::origin(), Point3::new(1.0, 4.0, 3.0)),
        )
        .with_part(Part::new(
            "post",
            PartKind::Corner {
                mode: CornerMode::Bisector,
                chamfer_style: None,
                chamfer_length: None,
            },
        ))
        .with_part(Part::new("end-wall", PartKind::Gable))
        .with_part(Part::new(
            "window",
            PartKind::Spread {
                count: SpreadCount::Interval {
                    interval: 3.0,
                    rounding: SpreadRounding::Nearest,
                },
                margin_left: 0.5,
                margin_right: 0.5,
                allow_overflow: false,
            },
        ))
    }

    fn straight_building() -> Building {
        Building::new(
            "row",
            vec![Point3::origin(), Point3::new(10.0, 0.0, 0.0)],
        )
    }

    #[test]
    fn corner_setter_validates_kind() {
        let template = test_template();
        let mut building = straight_building();

        assert!(building
            .set_corner_usage(&template, "post", 0, true)
            .is_ok());
        // A spread part is not a corner part
        assert!(building
            .set_corner_usage(&template, "window", 0, true)
            .is_err());
        assert!(building
            .set_corner_usage(&template, "missing", 0, true)
            .is_err());
    }

    #[test]
    fn out_of_range_indices_are_retained() {
        let template = test_template();
        let mut building = straight_building();

        // A straight two-point path has corners 0 and 1; index 7 is out of
        // range but the preference must survive
        building
            .set_corner_usage(&template, "post", 7, true)
            .unwrap();
        assert_eq!(building.corner_parts_at(7), vec!["post"]);
    }

    #[test]
    fn non_positive_chamfer_means_sharp() {
        let mut building = straight_building();
        building.set_transition(
            1,
            CornerTransition::Chamfer {
                style: ChamferStyle::Diagonal,
                length: 0.0,
            },
        );
        assert_eq!(building.transition_for(1), CornerTransition::Sharp);

        building.set_transition(
            1,
            CornerTransition::Chamfer {
                style: ChamferStyle::Diagonal,
                length: 1.5,
            },
        );
        assert!(matches!(
            building.transition_for(1),
            CornerTransition::Chamfer { length, .. } if length == 1.5
        ));
    }

    #[test]
    fn snapshot_diff_classification() {
        let template = test_template();
        let mut building = straight_building();
        let before = building.make_snapshot();

        // Selection-only change
        building
            .set_corner_usage(&template, "post", 0, true)
            .unwrap();
        let after = building.make_snapshot();
        assert!(!before.structural_differs(&after));
        assert!(before.selection_differs(&after));

        // Structural change
        building.end_angles = (0.2, 0.0);
        let after = building.make_snapshot();
        assert!(before.structural_differs(&after));
    }

    #[test]
    fn corner_part_preference_feeds_transition_plan() {
        let template = test_template().with_part(Part::new(
            "bevel",
            PartKind::Corner {
                mode: CornerMode::Bisector,
                chamfer_style: Some(ChamferStyle::Diagonal),
                chamfer_length: Some(2.0),
            },
        ));
        let mut building = straight_building();

        // No parts in use, no explicit choices: empty plan
        assert!(building.transition_plan(&template).is_empty());

        building
            .set_corner_usage(&template, "bevel", 1, true)
            .unwrap();
        assert_eq!(
            building.transition_plan(&template).get(&1),
            Some(&CornerTransition::Chamfer {
                style: ChamferStyle::Diagonal,
                length: 2.0,
            })
        );

        // An explicit choice wins over the part preference
        building.set_transition(
            1,
            CornerTransition::Chamfer {
                style: ChamferStyle::Projection,
                length: 1.0,
            },
        );
        assert_eq!(
            building.transition_plan(&template).get(&1),
            Some(&CornerTransition::Chamfer {
                style: ChamferStyle::Projection,
                length: 1.0,
            })
        );

        // So does an explicit sharp
        building.set_transition(1, CornerTransition::Sharp);
        assert_eq!(
            building.transition_plan(&template).get(&1),
            Some(&CornerTransition::Sharp)
        );
    }

    #[test]
    fn replacement_setter_validates_target_kind() {
        let template = test_template();
        let mut building = straight_building();

        assert!(building
            .set_replacement(&template, "window", 0, 2, Some("door"))
            .is_ok());
        // Corner parts carry no slots
        assert!(building
            .set_replacement(&template, "post", 0, 0, Some("door"))
            .is_err());

        building
            .set_replacement(&template, "window", 0, 2, None)
            .unwrap();
        assert!(building.replacements().is_empty());
    }
}
