//! Handler nodes and the arena that owns them.
//!
//! Nodes are addressed by [`NodeId`] and never freed while the arena lives;
//! destroying a node leaves a tombstone. `previous` links therefore can never
//! dangle, and because they are assigned once at spawn time to an existing
//! node they cannot form cycles.

use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::params::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// World-space placement of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: 1.0,
        }
    }

    pub fn at(position: Vector3<f64>) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    pub fn up(&self) -> Vector3<f64> {
        self.rotation * Vector3::y()
    }

    /// Orients the transform so that its local up axis points along `heading`.
    pub fn set_up(&mut self, heading: &Vector3<f64>) {
        self.rotation = align_up(heading);
    }

    pub fn translate(&mut self, offset: &Vector3<f64>) {
        self.position += offset;
    }

    /// Places `local` (expressed relative to this transform) in world space.
    pub fn compose(&self, local: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (local.position * self.scale),
            rotation: self.rotation * local.rotation,
            scale: self.scale * local.scale,
        }
    }
}

/// Rotation taking the +Y axis onto `heading`.
pub fn align_up(heading: &Vector3<f64>) -> UnitQuaternion<f64> {
    if heading.norm_squared() == 0.0 {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::rotation_between(&Vector3::y(), heading).unwrap_or_else(|| {
        // Antiparallel: any half turn about a horizontal axis works.
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)
    })
}

/// Dimensions recorded by a branch handler for an external mesh builder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub length: f64,
    pub bottom_radius: f64,
    pub top_radius: f64,
    pub faces: usize,
}

/// Leaf outline recorded by a leaf handler for an external mesh builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blade {
    pub medial_size: f64,
    pub lateral_size: f64,
    pub medial_segments: usize,
    pub lateral_segments: usize,
    /// Growth progress in `[0, 1]`.
    pub progress: f64,
    /// Half-width at each medial vertex, base first.
    pub widths: Vec<f64>,
    /// Fold in degrees at each medial vertex.
    pub medial_bend: Vec<f64>,
    /// Curl in degrees at each lateral step away from the midrib.
    pub lateral_curl: Vec<f64>,
    pub color: Color,
}

#[derive(Debug, Clone)]
pub struct NodeState {
    pub symbol: char,
    pub name: String,
    previous: Option<NodeId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub ethereal: bool,
    pub dead: bool,
    pub baked: bool,
    pub destroyed: bool,
    pub hidden: bool,
    pub prefab_identifier: Option<String>,
    pub transform: Transform,
    pub segment: Option<Segment>,
    /// Shared between instances baked under one prefab identifier.
    pub blade: Option<Rc<Blade>>,
}

impl NodeState {
    pub fn previous(&self) -> Option<NodeId> {
        self.previous
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Everything needed to create a node.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    pub symbol: char,
    pub name: String,
    pub previous: Option<NodeId>,
    pub ethereal: bool,
    pub baked: bool,
    pub prefab_identifier: Option<String>,
}

#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<NodeState>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that are neither destroyed nor hidden.
    pub fn live_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| !node.destroyed && !node.hidden)
            .count()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeState> {
        self.nodes.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeState)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index), node))
    }

    /// Creates a node parented to `spec.previous` and placed at its position.
    pub fn spawn(&mut self, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        let transform = spec
            .previous
            .and_then(|prev| self.get(prev))
            .map(|prev| Transform::at(prev.transform.position))
            .unwrap_or_default();

        self.nodes.push(NodeState {
            symbol: spec.symbol,
            name: spec.name,
            previous: spec.previous,
            parent: None,
            children: Vec::new(),
            ethereal: spec.ethereal,
            dead: false,
            baked: spec.baked,
            destroyed: false,
            hidden: false,
            prefab_identifier: spec.prefab_identifier,
            transform,
            segment: None,
            blade: None,
        });
        self.set_parent(id, spec.previous);
        id
    }

    /// Nearest node at or above `id` that can anchor children.
    ///
    /// Ethereal nodes are skipped transitively; a destroyed anchor yields
    /// `None`.
    pub fn anchor_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let node = self.get(candidate)?;
            if node.ethereal {
                current = node.previous;
                continue;
            }
            if node.destroyed {
                return None;
            }
            return Some(candidate);
        }
        None
    }

    /// Missing nodes count as dead.
    pub fn is_dead(&self, id: NodeId) -> bool {
        self.get(id).map_or(true, |node| node.dead)
    }

    pub fn kill(&mut self, id: NodeId) {
        if let Some(node) = self.get_mut(id) {
            node.dead = true;
        }
    }

    pub fn destroy(&mut self, id: NodeId) {
        if let Some(node) = self.get_mut(id) {
            node.destroyed = true;
        }
    }

    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(old) = self.get(id).and_then(|node| node.parent) {
            if let Some(old_parent) = self.get_mut(old) {
                old_parent.children.retain(|child| *child != id);
            }
        }
        let parent = parent.filter(|p| self.get(*p).is_some());
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = parent;
        }
    }

    pub fn detach(&mut self, id: NodeId) {
        self.set_parent(id, None);
    }

    /// Pre-order list of the non-destroyed nodes under (and including) `root`.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            if node.destroyed {
                continue;
            }
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Copies the subtree under `root` and hangs the copy from `parent`.
    ///
    /// Links inside the subtree are remapped onto the copies; a `previous`
    /// link leaving the subtree is redirected to `parent`. Transforms are
    /// placed with `placement` applied on top of their current values.
    pub fn clone_subtree(
        &mut self,
        root: NodeId,
        parent: Option<NodeId>,
        placement: &Transform,
    ) -> Option<NodeId> {
        let ids = self.subtree(root);
        if ids.is_empty() {
            return None;
        }

        let base = self.nodes.len();
        let remap = |id: NodeId| ids.iter().position(|x| *x == id).map(|i| NodeId(base + i));

        let mut copies = Vec::with_capacity(ids.len());
        for id in &ids {
            let source = &self.nodes[id.0];
            let mut copy = source.clone();
            copy.previous = source.previous.and_then(remap).or(parent);
            copy.parent = source.parent.and_then(remap);
            copy.children = source.children.iter().filter_map(|c| remap(*c)).collect();
            copy.transform = placement.compose(&source.transform);
            copies.push(copy);
        }

        self.nodes.extend(copies);
        let new_root = NodeId(base);
        self.nodes[base].parent = None;
        self.set_parent(new_root, parent);
        Some(new_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(symbol: char, previous: Option<NodeId>, ethereal: bool) -> NodeSpec {
        NodeSpec {
            symbol,
            name: symbol.to_string(),
            previous,
            ethereal,
            ..NodeSpec::default()
        }
    }

    #[test]
    fn anchor_skips_ethereal_chain() {
        let mut arena = NodeArena::new();
        let root = arena.spawn(spec('S', None, false));
        let split = arena.spawn(spec('[', Some(root), true));
        let turn = arena.spawn(spec('+', Some(split), true));

        assert_eq!(arena.anchor_of(turn), Some(root));
        assert_eq!(arena.anchor_of(root), Some(root));
    }

    #[test]
    fn anchor_walks_through_destroyed_ethereal_nodes() {
        let mut arena = NodeArena::new();
        let root = arena.spawn(spec('S', None, false));
        let split = arena.spawn(spec('[', Some(root), true));
        arena.destroy(split);
        assert_eq!(arena.anchor_of(split), Some(root));

        arena.destroy(root);
        assert_eq!(arena.anchor_of(split), None);
    }

    #[test]
    fn kill_is_idempotent_and_missing_nodes_are_dead() {
        let mut arena = NodeArena::new();
        let node = arena.spawn(spec('F', None, false));
        assert!(!arena.is_dead(node));
        arena.kill(node);
        arena.kill(node);
        assert!(arena.is_dead(node));
        assert!(arena.is_dead(NodeId(42)));
    }

    #[test]
    fn clone_subtree_remaps_links() {
        let mut arena = NodeArena::new();
        let root = arena.spawn(spec('S', None, false));
        let a = arena.spawn(spec('F', Some(root), false));
        let b = arena.spawn(spec('F', Some(a), false));
        arena.get_mut(b).expect("node").transform.position = Vector3::new(0.0, 2.0, 0.0);

        let host = arena.spawn(spec('H', None, false));
        let placement = Transform {
            position: Vector3::new(10.0, 0.0, 0.0),
            rotation: UnitQuaternion::identity(),
            scale: 2.0,
        };
        let copy = arena
            .clone_subtree(root, Some(host), &placement)
            .expect("non-empty subtree");

        let copied = arena.subtree(copy);
        assert_eq!(copied.len(), 3);
        assert_eq!(arena.get(copy).and_then(|n| n.parent()), Some(host));
        assert_eq!(arena.get(copy).and_then(|n| n.previous()), Some(host));
        let leaf = arena.get(copied[2]).expect("copied leaf");
        assert_eq!(leaf.previous(), Some(copied[1]));
        assert_eq!(leaf.transform.position, Vector3::new(10.0, 4.0, 0.0));
        // Source untouched.
        assert_eq!(arena.subtree(root), vec![root, a, b]);
    }

    #[test]
    fn align_up_handles_degenerate_headings() {
        let down = align_up(&Vector3::new(0.0, -1.0, 0.0)) * Vector3::y();
        assert!((down - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-9);
        assert_eq!(align_up(&Vector3::zeros()), UnitQuaternion::identity());
    }
}
