// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene graph: groups and solid instances.
//!
//! Nodes form a forest. Every node is either a named group with ordered
//! children or an instance referencing a [`Solid`] through a placement
//! transform. Solids are owned by the scene and shared between instances;
//! instances carry their own material override.

use crate::error::{Error, Result};
use crate::keys::{NodeKey, SolidKey};
use crate::solid::Solid;
use nalgebra::Matrix4;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;

/// What a scene node is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A named container of child nodes.
    Group {
        name: String,
        children: Vec<NodeKey>,
        /// When false, material propagation stops at this group's own
        /// children and does not overwrite materials set deeper down.
        allow_nested_materials: bool,
    },
    /// A placed occurrence of a solid.
    Instance {
        solid: SolidKey,
        transform: Matrix4<f64>,
        /// Material currently applied to this instance.
        material: Option<String>,
        /// Material the instance was created with, restored when a
        /// propagated override is cleared.
        original_material: Option<String>,
        /// Name of the part definition this instance came from, if any.
        source_part: Option<String>,
    },
}

/// A node in the scene graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeKey>,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.kind, NodeKind::Instance { .. })
    }
}

/// Owner of all solids and scene nodes.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    nodes: SlotMap<NodeKey, Node>,
    solids: SlotMap<SolidKey, Solid>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- solids ----

    pub fn add_solid(&mut self, solid: Solid) -> SolidKey {
        self.solids.insert(solid)
    }

    pub fn solid(&self, key: SolidKey) -> Option<&Solid> {
        self.solids.get(key)
    }

    pub fn solid_mut(&mut self, key: SolidKey) -> Option<&mut Solid> {
        self.solids.get_mut(key)
    }

    pub fn solid_count(&self) -> usize {
        self.solids.len()
    }

    // ---- node construction ----

    /// Adds a group node. A `parent` of `None` makes it a root.
    pub fn add_group(&mut self, parent: Option<NodeKey>, name: impl Into<String>) -> NodeKey {
        let key = self.nodes.insert(Node {
            parent,
            kind: NodeKind::Group {
                name: name.into(),
                children: Vec::new(),
                allow_nested_materials: true,
            },
        });
        if let Some(p) = parent {
            self.attach_child(p, key);
        }
        key
    }

    /// Adds an instance of `solid` under `parent`.
    pub fn add_instance(
        &mut self,
        parent: NodeKey,
        solid: SolidKey,
        transform: Matrix4<f64>,
    ) -> Result<NodeKey> {
        if !self.nodes.contains_key(parent) {
            return Err(Error::UnknownNode);
        }
        let key = self.nodes.insert(Node {
            parent: Some(parent),
            kind: NodeKind::Instance {
                solid,
                transform,
                material: None,
                original_material: None,
                source_part: None,
            },
        });
        self.attach_child(parent, key);
        Ok(key)
    }

    fn attach_child(&mut self, parent: NodeKey, child: NodeKey) {
        if let Some(Node {
            kind: NodeKind::Group { children, .. },
            ..
        }) = self.nodes.get_mut(parent)
        {
            children.push(child);
        }
    }

    // ---- node access ----

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        match self.nodes.get(key) {
            Some(Node {
                kind: NodeKind::Group { children, .. },
                ..
            }) => children,
            _ => &[],
        }
    }

    pub fn group_name(&self, key: NodeKey) -> Option<&str> {
        match self.nodes.get(key) {
            Some(Node {
                kind: NodeKind::Group { name, .. },
                ..
            }) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn rename_group(&mut self, key: NodeKey, new_name: impl Into<String>) -> Result<()> {
        match self.nodes.get_mut(key) {
            Some(Node {
                kind: NodeKind::Group { name, .. },
                ..
            }) => {
                *name = new_name.into();
                Ok(())
            }
            _ => Err(Error::UnknownNode),
        }
    }

    pub fn set_allow_nested_materials(&mut self, key: NodeKey, allow: bool) {
        if let Some(Node {
            kind: NodeKind::Group {
                allow_nested_materials,
                ..
            },
            ..
        }) = self.nodes.get_mut(key)
        {
            *allow_nested_materials = allow;
        }
    }

    /// First direct child group of `parent` with the given name.
    pub fn find_group(&self, parent: NodeKey, name: &str) -> Option<NodeKey> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.group_name(child) == Some(name))
    }

    // ---- instance fields ----

    pub fn instance_solid(&self, key: NodeKey) -> Option<SolidKey> {
        match self.nodes.get(key) {
            Some(Node {
                kind: NodeKind::Instance { solid, .. },
                ..
            }) => Some(*solid),
            _ => None,
        }
    }

    pub fn instance_transform(&self, key: NodeKey) -> Option<Matrix4<f64>> {
        match self.nodes.get(key) {
            Some(Node {
                kind: NodeKind::Instance { transform, .. },
                ..
            }) => Some(*transform),
            _ => None,
        }
    }

    pub fn material(&self, key: NodeKey) -> Option<&str> {
        match self.nodes.get(key) {
            Some(Node {
                kind: NodeKind::Instance { material, .. },
                ..
            }) => material.as_deref(),
            _ => None,
        }
    }

    /// Sets the applied material of an instance, leaving its original
    /// material untouched.
    pub fn set_material(&mut self, key: NodeKey, value: Option<String>) {
        if let Some(Node {
            kind: NodeKind::Instance { material, .. },
            ..
        }) = self.nodes.get_mut(key)
        {
            *material = value;
        }
    }

    /// Initializes an instance's material and provenance in one step. The
    /// given material becomes both the applied and the original material.
    pub fn init_instance(
        &mut self,
        key: NodeKey,
        material: Option<String>,
        source_part: Option<String>,
    ) {
        if let Some(Node {
            kind:
                NodeKind::Instance {
                    material: applied,
                    original_material,
                    source_part: source,
                    ..
                },
            ..
        }) = self.nodes.get_mut(key)
        {
            *applied = material.clone();
            *original_material = material;
            *source = source_part;
        }
    }

    /// Name of the part an instance came from, if recorded.
    pub fn source_part(&self, key: NodeKey) -> Option<&str> {
        match self.nodes.get(key) {
            Some(Node {
                kind: NodeKind::Instance { source_part, .. },
                ..
            }) => source_part.as_deref(),
            _ => None,
        }
    }

    /// Restores an instance's material to what it was created with.
    pub fn restore_material(&mut self, key: NodeKey) {
        if let Some(Node {
            kind:
                NodeKind::Instance {
                    material,
                    original_material,
                    ..
                },
            ..
        }) = self.nodes.get_mut(key)
        {
            *material = original_material.clone();
        }
    }

    // ---- traversal and removal ----

    /// All nodes under `root` (excluding `root` itself), worklist order.
    pub fn descendants(&self, root: NodeKey) -> Vec<NodeKey> {
        let mut result = Vec::new();
        let mut worklist: Vec<NodeKey> = self.children(root).to_vec();
        while let Some(key) = worklist.pop() {
            worklist.extend_from_slice(self.children(key));
            result.push(key);
        }
        result
    }

    /// Removes a node and everything under it. Solids referenced only by
    /// the removed instances are dropped with them; solids still referenced
    /// elsewhere in the scene survive.
    pub fn remove_subtree(&mut self, root: NodeKey) {
        if let Some(parent) = self.nodes.get(root).and_then(|n| n.parent) {
            if let Some(Node {
                kind: NodeKind::Group { children, .. },
                ..
            }) = self.nodes.get_mut(parent)
            {
                children.retain(|&c| c != root);
            }
        }

        let mut removed_solids: Vec<SolidKey> = Vec::new();
        let mut worklist = vec![root];
        while let Some(key) = worklist.pop() {
            worklist.extend_from_slice(self.children(key));
            if let Some(Node {
                kind: NodeKind::Instance { solid, .. },
                ..
            }) = self.nodes.remove(key)
            {
                removed_solids.push(solid);
            }
        }
        if removed_solids.is_empty() {
            return;
        }

        let still_used: FxHashSet<SolidKey> = self
            .nodes
            .values()
            .filter_map(|n| match n.kind {
                NodeKind::Instance { solid, .. } => Some(solid),
                _ => None,
            })
            .collect();
        for solid in removed_solids {
            if !still_used.contains(&solid) {
                self.solids.remove(solid);
            }
        }
    }

    /// Root nodes (no parent).
    pub fn roots(&self) -> Vec<NodeKey> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(k, _)| k)
            .collect()
    }
}
