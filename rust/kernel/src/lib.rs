// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Townrow geometry kernel
//!
//! Face/edge/vertex solid meshes with adjacency, planar cuts, self-merge,
//! csgrs-backed booleans, and a scene graph of groups and instances.
//! The building synthesis engine (`townrow-engine`) drives everything in
//! this crate; nothing here knows about paths, templates, or parts.

pub mod error;
pub mod geom;
pub mod keys;
pub mod scene;
pub mod solid;
pub mod transform;
pub mod trimesh;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point2, Point3, Vector2, Vector3};

pub use error::{Error, Result};
pub use geom::{newell_normal, point_in_polygon, project_to_2d, Plane};
pub use keys::{EdgeKey, FaceKey, NodeKey, SolidKey, VertexKey};
pub use scene::{Node, NodeKind, Scene};
pub use solid::{Edge, Face, Solid, Vertex};
pub use transform::{frame_from_origin_x, is_mirrored, midpoint_transform, rotate_about_z, skew_axes};
pub use trimesh::TriMesh;

/// Global up direction. All building geometry treats +Z as vertical.
pub const UP: Vector3<f64> = Vector3::new(0.0, 0.0, 1.0);

/// Geometric tolerance for position comparisons, in model units.
pub const TOLERANCE: f64 = 1e-6;
