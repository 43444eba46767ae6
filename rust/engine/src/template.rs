// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Template descriptors: a prototype volume plus tagged parts.
//!
//! Part kinds are mutually exclusive tagged variants; a part may combine a
//! placement kind with an independent solid-operation tag. String parsing of
//! solid operators happens only at the catalog boundary, through the
//! whitelist in [`SolidOp::parse`].

use townrow_kernel::Solid;

/// How a corner part orients itself at a path corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerMode {
    /// Local X along the averaged corner tangent (the bisector).
    Bisector,
    /// Axes skewed toward the adjacent segment's wall direction.
    Skewed,
}

/// How a user-specified chamfer length is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChamferStyle {
    /// The length is the diagonal chord itself.
    Diagonal,
    /// The length is the chord's projection onto the facade plane.
    Projection,
}

/// Horizontal anchoring of a single-instance part within a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignAnchor {
    Left,
    Right,
    Center,
    /// Linear interpolation between left and right boundary, in [0,1].
    Percent(f64),
}

/// Rounding policy when a spread count is derived from a target interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadRounding {
    Nearest,
    ForceOdd,
    ForceEven,
}

/// How many instances a spread part produces per segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpreadCount {
    Fixed(usize),
    /// Count derived from available span ÷ interval, then rounded.
    Interval {
        interval: f64,
        rounding: SpreadRounding,
    },
}

/// The placement rule of a part. Exactly one kind per part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartKind {
    Corner {
        mode: CornerMode,
        /// Preferred chamfer (style + length) when this corner part is used
        /// at an interior corner and the building has no explicit choice.
        chamfer_style: Option<ChamferStyle>,
        chamfer_length: Option<f64>,
    },
    Gable,
    Align(AlignAnchor),
    Spread {
        count: SpreadCount,
        margin_left: f64,
        margin_right: f64,
        /// When true, instances crossing a segment boundary or cut plane
        /// are kept instead of dropped.
        allow_overflow: bool,
    },
    /// Substitutes for slots of an align/spread part; never placed directly.
    Replacement { target: String, slots: usize },
    /// Inert: geometry carried along with the template, no placement rule.
    None,
}

/// Solid operations a part may request against its segment volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolidOp {
    Union,
    Subtract,
    CutFaces,
}

impl SolidOp {
    /// Parses an operator name from template data. Only the three
    /// whitelisted names are honored; anything else yields `None` since
    /// operator strings originate from untrusted template archives.
    pub fn parse(name: &str) -> Option<SolidOp> {
        match name {
            "union" => Some(SolidOp::Union),
            "subtract" => Some(SolidOp::Subtract),
            "cut_multiple_faces" => Some(SolidOp::CutFaces),
            _ => None,
        }
    }
}

/// Solid-operation tag, combinable with any placement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidTag {
    pub op: SolidOp,
    /// Explicit ordering index for boolean composition. Lower applies
    /// first; ties break by discovery order.
    pub index: i32,
}

/// A named element inside a template volume.
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub kind: PartKind,
    pub solid_tag: Option<SolidTag>,
    /// The part's own geometry, in part-local coordinates.
    pub body: Solid,
    /// Facade margin this part suggests for adjacent segment sides
    /// (meaningful on corner and gable parts).
    pub margin: f64,
    /// Material name the part's instances start out with.
    pub material: Option<String>,
}

impl Part {
    pub fn new(name: impl Into<String>, kind: PartKind) -> Self {
        Self {
            name: name.into(),
            kind,
            solid_tag: None,
            body: Solid::new(),
            margin: 0.0,
            material: None,
        }
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn with_body(mut self, body: Solid) -> Self {
        self.body = body;
        self
    }

    pub fn with_solid_tag(mut self, op: SolidOp, index: i32) -> Self {
        self.solid_tag = Some(SolidTag { op, index });
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn is_corner(&self) -> bool {
        matches!(self.kind, PartKind::Corner { .. })
    }

    pub fn is_gable(&self) -> bool {
        matches!(self.kind, PartKind::Gable)
    }
}

/// A read-only template: prototype volume, nominal depth, and parts.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub depth: Option<f64>,
    /// Cross-section volume with the ±X gable-face invariant.
    pub prototype: Solid,
    pub parts: Vec<Part>,
}

impl Template {
    pub fn new(id: impl Into<String>, prototype: Solid) -> Self {
        Self {
            id: id.into(),
            depth: None,
            prototype,
            parts: Vec::new(),
        }
    }

    pub fn with_depth(mut self, depth: f64) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn has_corners(&self) -> bool {
        self.parts.iter().any(Part::is_corner)
    }

    pub fn has_gables(&self) -> bool {
        self.parts.iter().any(Part::is_gable)
    }

    pub fn has_solids(&self) -> bool {
        self.parts.iter().any(|p| p.solid_tag.is_some())
    }
}
