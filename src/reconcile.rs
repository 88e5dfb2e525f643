//! Child reconciliation and attribute diffing.
//!
//! [`reconcile_children`] turns the child descriptions of one fiber into a linked chain of child
//! fibers and tags each of them against the children of the fiber's alternate. Orphaned old
//! children are appended to the deletion list. Attribute changes are not computed here: commit calls
//! [`diff_attributes`] for every fiber tagged [`MutationTag::Update`].

use alloc::{collections::VecDeque, string::String, vec::Vec};
use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    describe::{AttrValue, Attributes, Description, EventHandler, event_name, is_subscription},
    fiber::{Fiber, FiberArena, FiberId, MutationTag},
};

/// How new children are matched with the previous ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilePolicy {
    /// Same-index comparison. A moved child shows up as a deletion plus a placement.
    #[default]
    Positional,
    /// Children carrying a key are matched by key, unkeyed children by their order among the
    /// unkeyed ones. Reused children that moved are relocated instead of recreated.
    Keyed,
}

/// Builds and tags the child fibers of `parent` from `descriptions`.
pub(crate) fn reconcile_children<N: Clone>(
    arena: &mut FiberArena<N>,
    parent: FiberId,
    descriptions: &[Description],
    policy: ReconcilePolicy,
    deletions: &mut Vec<FiberId>,
) {
    let mut previous: Option<FiberId> = None;
    for description in descriptions {
        let id = arena.insert(Fiber::from_description(description, parent));
        match previous {
            Some(prev) => arena[prev].sibling = Some(id),
            None => arena[parent].child = Some(id),
        }
        previous = Some(id);
    }

    let old_first = arena[parent].alternate.and_then(|alternate| arena[alternate].child);
    match policy {
        ReconcilePolicy::Positional => positional(arena, parent, old_first, deletions),
        ReconcilePolicy::Keyed => keyed(arena, parent, old_first, deletions),
    }
}

fn positional<N: Clone>(
    arena: &mut FiberArena<N>,
    parent: FiberId,
    mut old_cursor: Option<FiberId>,
    deletions: &mut Vec<FiberId>,
) {
    let mut new_cursor = arena[parent].child;
    loop {
        match (old_cursor, new_cursor) {
            (None, None) => break,
            (Some(old), None) => {
                delete(arena, old, deletions);
                old_cursor = arena[old].sibling;
            }
            (None, Some(new)) => {
                arena[new].tag = MutationTag::Placement;
                new_cursor = arena[new].sibling;
            }
            (Some(old), Some(new)) => {
                if arena[old].node_type == arena[new].node_type {
                    reuse(arena, new, old);
                } else {
                    delete(arena, old, deletions);
                    arena[new].tag = MutationTag::Placement;
                }
                old_cursor = arena[old].sibling;
                new_cursor = arena[new].sibling;
            }
        }
    }
}

fn keyed<N: Clone>(
    arena: &mut FiberArena<N>,
    parent: FiberId,
    old_first: Option<FiberId>,
    deletions: &mut Vec<FiberId>,
) {
    let old: Vec<FiberId> = old_first
        .map(|first| {
            core::iter::successors(Some(first), |id| arena[*id].sibling).collect()
        })
        .unwrap_or_default();

    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut unkeyed: VecDeque<usize> = VecDeque::new();
    for (index, id) in old.iter().enumerate() {
        match arena[*id].key.clone() {
            Some(key) => {
                by_key.insert(key, index);
            }
            None => unkeyed.push_back(index),
        }
    }

    let mut used = alloc::vec![false; old.len()];
    let mut last_placed = 0;
    let new: Vec<FiberId> = arena.children(parent).collect();
    for id in new {
        let candidate = match arena[id].key.as_deref() {
            Some(key) => by_key.remove(key),
            None => unkeyed.pop_front(),
        };
        match candidate {
            Some(index) if arena[old[index]].node_type == arena[id].node_type => {
                used[index] = true;
                reuse(arena, id, old[index]);
                if index < last_placed {
                    arena[id].relocate = true;
                } else {
                    last_placed = index;
                }
            }
            _ => arena[id].tag = MutationTag::Placement,
        }
    }

    for (index, id) in old.into_iter().enumerate() {
        if !used[index] {
            delete(arena, id, deletions);
        }
    }
}

fn reuse<N: Clone>(arena: &mut FiberArena<N>, new: FiberId, old: FiberId) {
    let host_node = arena[old].host_node.clone();
    let fiber = &mut arena[new];
    fiber.tag = MutationTag::Update;
    fiber.alternate = Some(old);
    fiber.host_node = host_node;
}

fn delete<N>(arena: &mut FiberArena<N>, old: FiberId, deletions: &mut Vec<FiberId>) {
    arena[old].tag = MutationTag::Deletion;
    deletions.push(old);
}

/// One host operation needed to move a node from its old attributes to its new ones.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeChange {
    /// Drop a property that is no longer present.
    Remove(String),
    /// Set a new or changed property.
    Set(String, AttrValue),
    /// Detach a handler that was removed or replaced.
    Unbind {
        /// Host event name.
        event: String,
        /// The old handler.
        handler: EventHandler,
    },
    /// Attach a new or replacement handler.
    Bind {
        /// Host event name.
        event: String,
        /// The new handler.
        handler: EventHandler,
    },
}

/// Computes the host operations turning `old` into `new`.
///
/// Properties are compared by value, handlers by identity. Unchanged entries produce nothing.
#[must_use]
pub fn diff_attributes(old: &Attributes, new: &Attributes) -> Vec<AttributeChange> {
    let mut changes = Vec::new();

    for (key, _) in old.properties() {
        if new.get(key).is_none_or(|value| is_subscription(key, value)) {
            changes.push(AttributeChange::Remove(key.into()));
        }
    }
    for (key, value) in new.properties() {
        if old.get(key) != Some(value) {
            changes.push(AttributeChange::Set(key.into(), value.clone()));
        }
    }
    for (key, handler) in old.handlers() {
        let kept = new
            .get(key)
            .and_then(AttrValue::as_handler)
            .is_some_and(|current| current.ptr_eq(handler));
        if !kept {
            changes.push(AttributeChange::Unbind {
                event: event_name(key),
                handler: handler.clone(),
            });
        }
    }
    for (key, handler) in new.handlers() {
        let existed = old
            .get(key)
            .and_then(AttrValue::as_handler)
            .is_some_and(|previous| previous.ptr_eq(handler));
        if !existed {
            changes.push(AttributeChange::Bind {
                event: event_name(key),
                handler: handler.clone(),
            });
        }
    }

    changes
}
