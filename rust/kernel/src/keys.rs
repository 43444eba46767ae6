// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Key types for arena-based storage.
//!
//! Each kernel entity gets a unique, type-safe key for O(1) lookup. Keys are
//! created by `slotmap::SlotMap` and remain valid even after other entities
//! are removed (generational indices).

use slotmap::new_key_type;

new_key_type! {
    /// Key for a vertex (point in 3D space).
    pub struct VertexKey;

    /// Key for an edge (line segment between two vertices).
    pub struct EdgeKey;

    /// Key for a face (planar polygon with optional hole loops).
    pub struct FaceKey;

    /// Key for a solid owned by a scene.
    pub struct SolidKey;

    /// Key for a scene-graph node (group or instance).
    pub struct NodeKey;
}
