//! Identifier-keyed store of fully generated node subtrees.
//!
//! The first bake of an identifier claims it, generates once and registers
//! the result as a hidden, dead prototype. Every later request clones the
//! prototype instead of regenerating.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::node::{NodeArena, NodeId, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeEntry {
    /// Generation for this identifier is under way.
    Claimed,
    Ready(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeLookup {
    Hit(NodeId),
    InProgress,
    Miss,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BakeError {
    #[error("bake identifier {0:?} is already registered")]
    AlreadyRegistered(String),
    #[error("bake identifier {0:?} was registered without being claimed")]
    NotClaimed(String),
}

#[derive(Debug, Default)]
pub struct BakeCache {
    entries: HashMap<String, BakeEntry>,
    hits: usize,
}

impl BakeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn lookup(&mut self, identifier: &str) -> BakeLookup {
        match self.entries.get(identifier) {
            Some(BakeEntry::Ready(root)) => {
                self.hits += 1;
                BakeLookup::Hit(*root)
            }
            Some(BakeEntry::Claimed) => BakeLookup::InProgress,
            None => BakeLookup::Miss,
        }
    }

    pub fn prototype(&self, identifier: &str) -> Option<NodeId> {
        match self.entries.get(identifier) {
            Some(BakeEntry::Ready(root)) => Some(*root),
            _ => None,
        }
    }

    /// Marks `identifier` as being generated. Returns `false` if it is
    /// already claimed or registered.
    pub fn claim(&mut self, identifier: &str) -> bool {
        if self.entries.contains_key(identifier) {
            return false;
        }
        self.entries
            .insert(identifier.to_string(), BakeEntry::Claimed);
        true
    }

    /// True while some prototype is being generated. Instances created in
    /// that window end up inside the prototype itself.
    pub fn is_generating(&self) -> bool {
        self.entries.values().any(|e| *e == BakeEntry::Claimed)
    }

    pub fn register(&mut self, identifier: &str, root: NodeId) -> Result<(), BakeError> {
        match self.entries.get(identifier) {
            Some(BakeEntry::Claimed) => {
                self.entries
                    .insert(identifier.to_string(), BakeEntry::Ready(root));
                debug!(identifier, root = root.index(), "registered bake prototype");
                Ok(())
            }
            Some(BakeEntry::Ready(_)) => Err(BakeError::AlreadyRegistered(identifier.to_string())),
            None => Err(BakeError::NotClaimed(identifier.to_string())),
        }
    }
}

/// Moves the subtree under `root` so that `root` sits at the origin with an
/// identity transform. Descendants keep their offsets from `root`.
pub fn reset_to_origin(nodes: &mut NodeArena, root: NodeId) {
    let Some(origin) = nodes.get(root).map(|n| n.transform.position) else {
        return;
    };
    for id in nodes.subtree(root) {
        if let Some(node) = nodes.get_mut(id) {
            node.transform.position -= origin;
        }
    }
    if let Some(node) = nodes.get_mut(root) {
        node.transform = Transform::identity();
    }
}

/// Turns the subtree under `root` into an inert prototype: detached from the
/// scene and every node dead and hidden.
pub fn seal_prototype(nodes: &mut NodeArena, root: NodeId) {
    nodes.detach(root);
    for id in nodes.subtree(root) {
        if let Some(node) = nodes.get_mut(id) {
            node.dead = true;
            node.hidden = true;
        }
    }
}

/// Clones a sealed prototype under `parent`, placed by `placement`.
/// The clone is visible but stays dead: it is finished structure.
pub fn instantiate_prototype(
    nodes: &mut NodeArena,
    prototype: NodeId,
    parent: Option<NodeId>,
    placement: &Transform,
) -> Option<NodeId> {
    let root = nodes.clone_subtree(prototype, parent, placement)?;
    for id in nodes.subtree(root) {
        if let Some(node) = nodes.get_mut(id) {
            node.hidden = false;
        }
    }
    Some(root)
}
