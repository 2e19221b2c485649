//! The diff engine: given an old and a new value and a dependency node,
//! decide what changed and which descendant nodes must be notified.
//!
//! Verdicts are three-way in spirit: definitely changed, definitely
//! unchanged, or undecidable. Every undecidable case (a value re-written by
//! the same reference, a cycle, an opaque instance with no registered
//! predicate) resolves to "changed" — over-notification is preferred over
//! silent staleness.

use ahash::AHashSet;
use tracing::trace;

use crate::batch::Batch;
use crate::equality::EqualityRegistry;
use crate::node::{DepTree, NodeId};
use crate::value::{prim_eq, Value};

/// Cycle guard: payload addresses visited during one top-level diff call.
pub(crate) type Seen = AHashSet<usize>;

/// Everything a diff traversal needs from the store.
pub(crate) struct DiffCtx<'a> {
    pub tree: &'a mut DepTree,
    pub batch: &'a Batch,
    pub registry: &'a EqualityRegistry,
}

/// Diff `old` against `new` at `node`, queueing notifications for every
/// visited node that must fire. Returns whether the value changed.
///
/// `node` is `None` when the path was never observed; the verdict is still
/// computed so callers can decide about ancestors.
pub(crate) fn diff(
    ctx: &mut DiffCtx,
    node: Option<NodeId>,
    old: &Value,
    new: &Value,
    seen: &mut Seen,
) -> bool {
    let changed = diff_value(ctx, node, old, new, seen);
    if changed {
        if let Some(id) = node {
            trace!(?new, "observed path changed");
            mark_changed(ctx, id, new);
        }
    }
    changed
}

/// Queue a node's value subscriptions and refresh its equality verdict.
fn mark_changed(ctx: &mut DiffCtx, id: NodeId, new: &Value) {
    let DiffCtx { tree, batch, .. } = ctx;
    let node = tree.node_mut(id);
    node.queue_value_subs(batch);
    node.refresh_active(new, batch);
}

fn queue_exists(ctx: &mut DiffCtx, id: NodeId) {
    let DiffCtx { tree, batch, .. } = ctx;
    batch.queue_set(&tree.node_mut(id).exists_subs);
}

fn diff_value(
    ctx: &mut DiffCtx,
    node: Option<NodeId>,
    old: &Value,
    new: &Value,
    seen: &mut Seen,
) -> bool {
    // Rule 1: a primitive-like old value is an identity/value comparison.
    // Function references land here too (identity). Existing dependency
    // nodes below are refreshed against the new value either way.
    if old.as_primitive().is_some() {
        let changed = !prim_eq(old, new);
        sweep_existing(ctx, node, old, new, seen);
        return changed;
    }

    // Rule 2: the same reference on both sides. In-place mutation cannot be
    // distinguished from a no-op, so assume changed, and refresh existing
    // sub-dependencies against the current value.
    if old.same_ref(new) {
        refresh_children(ctx, node, new, seen);
        return true;
    }

    // Cycle guard: re-encountering an allocation within one top-level diff
    // is treated as changed rather than recursed into.
    let Some(addr) = old.ref_addr() else {
        // Non-primitive values always have an address; primitives returned
        // above.
        return true;
    };
    if !seen.insert(addr) {
        trace!("cycle detected, assuming changed");
        return true;
    }

    if old.is_traversable() {
        // Rule 3: structural walk over the key union.
        diff_traversable(ctx, node, old, new, seen)
    } else {
        // Rule 4: opaque instance (or shallow-marked container), decided by
        // the equality registry; no registered predicate means changed.
        let changed = opaque_changed(ctx.registry, old, new);
        sweep_existing(ctx, node, old, new, seen);
        changed
    }
}

fn diff_traversable(
    ctx: &mut DiffCtx,
    node: Option<NodeId>,
    old: &Value,
    new: &Value,
    seen: &mut Seen,
) -> bool {
    // A differing category or live-entry count is an immediate change.
    let mut changed =
        old.shape() != new.shape() || old.live_key_count() != new.live_key_count();

    // Union of old keys and new keys holding a defined value. A key
    // appearing with `Undefined` is not a structural addition: `get`
    // cannot tell it from absence.
    let old_keys = old.keys();
    let old_key_set: AHashSet<&str> = old_keys.iter().map(String::as_str).collect();
    let mut union = Vec::new();
    if new.is_traversable() {
        for key in new.keys() {
            if !old_key_set.contains(key.as_str()) && !new.get_key(&key).is_undefined() {
                union.push(key);
            }
        }
    }
    let mut union_iter = old_keys;
    union_iter.extend(union);

    for key in union_iter {
        let child = node.and_then(|id| ctx.tree.child(id, &key));
        // Once a change is confirmed, traversal continues only into
        // subtrees with live observers.
        if changed && child.is_none() {
            continue;
        }
        if let Some(cid) = child {
            if old.contains_key(&key) != new.contains_key(&key) {
                queue_exists(ctx, cid);
            }
        }
        let old_child = old.get_key(&key);
        let new_child = new.get_key(&key);
        if diff(ctx, child, &old_child, &new_child, seen) {
            changed = true;
        }
    }
    changed
}

fn opaque_changed(registry: &EqualityRegistry, old: &Value, new: &Value) -> bool {
    let (Value::Instance(old), Value::Instance(new)) = (old, new) else {
        return true;
    };
    if old.tag() != new.tag() {
        return true;
    }
    match registry.compare(old.tag(), old.payload(), new.payload()) {
        Some(equal) => !equal,
        None => true,
    }
}

/// Rule 5: the old value was not traversed structurally, but dependency
/// nodes may exist below this one. Diff each of them against the keyed view
/// of the new value (which reads as `Undefined` wherever the new value is
/// not traversable), so stale subscriptions see the new sub-values.
fn sweep_existing(
    ctx: &mut DiffCtx,
    node: Option<NodeId>,
    old: &Value,
    new: &Value,
    seen: &mut Seen,
) {
    let Some(id) = node else { return };
    for (key, cid) in ctx.tree.children_of(id) {
        if old.contains_key(&key) != new.contains_key(&key) {
            queue_exists(ctx, cid);
        }
        let old_child = old.get_key(&key);
        let new_child = new.get_key(&key);
        diff(ctx, Some(cid), &old_child, &new_child, seen);
    }
}

/// Rule 2 traversal: with old and new the same allocation there is nothing
/// to compare against. Reference-valued children are conservatively
/// changed; primitive children fire only when their equality verdict
/// flips (the one comparison that is still decidable).
fn refresh_children(ctx: &mut DiffCtx, node: Option<NodeId>, value: &Value, seen: &mut Seen) {
    let Some(id) = node else { return };
    if !value.is_traversable() {
        return;
    }
    let Some(addr) = value.ref_addr() else { return };
    if !seen.insert(addr) {
        return;
    }
    for (key, cid) in ctx.tree.children_of(id) {
        let child = value.get_key(&key);
        let flipped = {
            let DiffCtx { tree, batch, .. } = ctx;
            tree.node_mut(cid).refresh_active(&child, batch)
        };
        if child.as_primitive().is_none() || flipped {
            let DiffCtx { tree, batch, .. } = ctx;
            tree.node_mut(cid).queue_value_subs(batch);
        }
        refresh_children(ctx, Some(cid), &child, seen);
    }
}
