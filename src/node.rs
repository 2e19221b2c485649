//! The dependency tree: one node per distinct observed path.
//!
//! Nodes are created lazily by reads and never pruned, so the tree's size
//! is proportional to the set of paths ever observed, independent of the
//! value tree's current shape. The two trees may diverge freely: a node can
//! exist for a path that currently holds no value.
//!
//! The tree is an arena owned by the store; nodes address each other by
//! [`NodeId`] rather than shared references.

use ahash::AHashMap;
use indexmap::IndexMap;
use slab::Slab;
use tracing::trace;

use crate::batch::Batch;
use crate::observer::SubscriberSet;
use crate::value::{prim_matches, Primitive, Value};

/// Arena index of a dependency node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

/// Subscriptions for one observed path.
#[derive(Default)]
pub(crate) struct DepNode {
    /// Observers interested in "this value changed".
    pub value_subs: SubscriberSet,
    /// Observers interested in existence only (`has`).
    pub exists_subs: SubscriberSet,
    /// Per-compared-value observers interested in the equality verdict.
    pub compare_subs: IndexMap<Primitive, SubscriberSet>,
    /// The compared value currently equal to the path's value, if any.
    /// At most one entry is active at a time.
    pub active_compare: Option<Primitive>,
    /// Child nodes by key token.
    pub children: AHashMap<String, NodeId>,
}

impl DepNode {
    /// Queue this node's value subscriptions for the batch flush.
    pub fn queue_value_subs(&self, batch: &Batch) {
        batch.queue_set(&self.value_subs);
    }

    /// Recompute which compared value is active against `current`, queueing
    /// the subscription sets of both sides of a verdict flip. Returns true
    /// if the verdict flipped.
    pub fn refresh_active(&mut self, current: &Value, batch: &Batch) -> bool {
        let next = self
            .compare_subs
            .keys()
            .find(|p| prim_matches(p, current))
            .cloned();
        if next == self.active_compare {
            return false;
        }
        if let Some(previous) = &self.active_compare {
            if let Some(set) = self.compare_subs.get(previous) {
                batch.queue_set(set);
            }
        }
        if let Some(next) = &next {
            if let Some(set) = self.compare_subs.get(next) {
                batch.queue_set(set);
            }
        }
        trace!(?next, "equality verdict flipped");
        self.active_compare = next;
        true
    }
}

/// The arena of dependency nodes, rooted at the store's root address.
pub(crate) struct DepTree {
    nodes: Slab<DepNode>,
    root: NodeId,
}

impl DepTree {
    pub fn new() -> Self {
        let mut nodes = Slab::new();
        let root = NodeId(nodes.insert(DepNode::default()));
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DepNode {
        &mut self.nodes[id.0]
    }

    /// Existing child for a key, if one was ever observed.
    pub fn child(&self, id: NodeId, key: &str) -> Option<NodeId> {
        self.nodes[id.0].children.get(key).copied()
    }

    /// All existing children of a node, cloned out so callers can recurse
    /// while mutating the arena.
    pub fn children_of(&self, id: NodeId) -> Vec<(String, NodeId)> {
        self.nodes[id.0]
            .children
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Walk a token sequence from `base`, creating nodes as needed.
    pub fn ensure(&mut self, base: NodeId, tokens: &[Box<str>]) -> NodeId {
        let mut current = base;
        for token in tokens {
            current = match self.nodes[current.0].children.get(&**token).copied() {
                Some(child) => child,
                None => {
                    let child = NodeId(self.nodes.insert(DepNode::default()));
                    self.nodes[current.0]
                        .children
                        .insert(token.to_string(), child);
                    child
                }
            };
        }
        current
    }

}
