// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Townhouse building synthesis engine.
//!
//! Stretches a reusable template cross-section along a horizontal path,
//! adapting its parametric sub-parts (windows, corners, gables, roof cuts)
//! to each resulting segment, optionally fusing solid geometry and punching
//! openings across multiple faces at once.
//!
//! Pipeline, driven by [`draw`]:
//!
//! 1. [`segment`] — per-path-edge frames, boundary planes, chamfer cuts
//! 2. [`volume`] — template volume sheared into each segment
//! 3. [`placement`] — corner / gable / align / spread / replacement parts
//! 4. [`solids`] — ordered booleans and the multi-face opening cutter
//! 5. material propagation over the output subtree
//!
//! Geometry lives in [`townrow_kernel`]; this crate only orchestrates it.

pub mod building;
pub mod catalog;
pub mod draw;
pub mod error;
pub mod placement;
pub mod segment;
pub mod solids;
pub mod template;
pub mod volume;

pub use building::{Building, CornerTransition, DrawSnapshot, Side};
pub use catalog::TemplateCatalog;
pub use draw::{draw, DrawReport, NoProgress, ProgressSink, RebuildKind};
pub use error::{Error, Result};
pub use segment::{resolve_segments, Segment};
pub use template::{
    AlignAnchor, ChamferStyle, CornerMode, Part, PartKind, SolidOp, SolidTag, SpreadCount,
    SpreadRounding, Template,
};
