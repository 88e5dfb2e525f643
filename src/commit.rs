//! Applying a finished pass to the host.
//!
//! Commit runs in one uninterrupted pass over the work-in-progress tree:
//!
//! 1. Deletions, so removed nodes never sit next to the new ones.
//! 2. Pre-order: create placed host nodes (parents before children) and apply attribute changes
//!    of updated ones.
//! 3. Post-order: attach placed nodes, children before parents, so a new subtree is assembled
//!    detached and inserted into the live tree with its top node last.
//! 4. Promote pending hook state.

use alloc::{string::String, vec::Vec};

use tracing::trace;

use crate::{
    describe::{NodeType, event_name},
    fiber::{FiberArena, FiberId, MutationTag},
    hooks::commit_slots,
    host::{HostRenderer, HostType},
    reconcile::{AttributeChange, diff_attributes},
};

/// Summary of one committed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Host nodes created.
    pub placed: usize,
    /// Reused host nodes whose attributes changed.
    pub updated: usize,
    /// Labels of the removed subtrees, in deletion order.
    pub deleted: Vec<String>,
    /// Host attribute and handler operations issued for updated nodes.
    pub attribute_changes: usize,
    /// Units of work the pass took.
    pub units: usize,
    /// Slices the pass spanned.
    pub slices: usize,
}

impl CommitReport {
    /// Returns `true` if the pass changed nothing on the host.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.placed == 0 && self.updated == 0 && self.deleted.is_empty()
    }
}

/// Applies the effects of the tree rooted at `wip_root` and of `deletions` to `host`.
///
/// Fibers are left in place; promoting the tree to current is the caller's job.
///
/// # Panics
///
/// Panics if a host fiber that should own a host node does not, or if a deleted fiber has no host
/// ancestor.
pub(crate) fn commit_tree<H: HostRenderer>(
    host: &mut H,
    arena: &mut FiberArena<H::Node>,
    wip_root: FiberId,
    deletions: &[FiberId],
) -> Result<CommitReport, H::Error> {
    let mut report = CommitReport::default();

    for &id in deletions {
        let parent = arena
            .nearest_host_ancestor(id)
            .unwrap_or_else(|| panic!("deleted fiber {id:?} has no host ancestor"));
        for node in arena.top_host_nodes(id) {
            trace!(?node, "remove");
            host.remove_child(parent, node)?;
        }
        report.deleted.push(arena[id].node_type.label().into());
    }

    for id in arena.preorder(wip_root) {
        match arena[id].tag {
            MutationTag::Placement if arena[id].node_type.is_host() => {
                let node = create(host, arena, id)?;
                arena[id].host_node = Some(node);
                report.placed += 1;
            }
            MutationTag::Update if arena[id].node_type.is_host() => {
                let changes = update(host, arena, id)?;
                if changes > 0 {
                    report.updated += 1;
                    report.attribute_changes += changes;
                }
            }
            _ => {}
        }
    }

    for id in arena.postorder(wip_root) {
        attach(host, arena, id)?;
    }

    for id in arena.preorder(wip_root) {
        commit_slots(&arena[id].hooks);
    }

    Ok(report)
}

fn create<H: HostRenderer>(
    host: &mut H,
    arena: &FiberArena<H::Node>,
    id: FiberId,
) -> Result<H::Node, H::Error> {
    let fiber = &arena[id];
    let host_type = match &fiber.node_type {
        NodeType::Host(tag) => HostType::Element(tag),
        _ => HostType::Text,
    };
    let node = host.create_node(host_type, &fiber.attributes)?;
    trace!(?node, "create");
    for (key, handler) in fiber.attributes.handlers() {
        host.bind_handler(&node, &event_name(key), handler)?;
    }
    Ok(node)
}

fn update<H: HostRenderer>(
    host: &mut H,
    arena: &FiberArena<H::Node>,
    id: FiberId,
) -> Result<usize, H::Error> {
    let fiber = &arena[id];
    let alternate = fiber
        .alternate
        .unwrap_or_else(|| panic!("updated fiber {id:?} has no alternate"));
    let node = fiber.host_node.as_ref().unwrap_or_else(|| {
        panic!(
            "host fiber `{}` has no host node",
            fiber.node_type.label()
        )
    });

    let changes = diff_attributes(&arena[alternate].attributes, &fiber.attributes);
    for change in &changes {
        trace!(?node, ?change, "update");
        match change {
            AttributeChange::Remove(key) => host.remove_attribute(node, key)?,
            AttributeChange::Set(key, value) => host.set_attribute(node, key, value)?,
            AttributeChange::Unbind { event, handler } => host.unbind_handler(node, event, handler)?,
            AttributeChange::Bind { event, handler } => host.bind_handler(node, event, handler)?,
        }
    }
    Ok(changes.len())
}

/// Attaches a placed host fiber, or moves a relocated one, under its nearest host ancestor.
fn attach<H: HostRenderer>(
    host: &mut H,
    arena: &FiberArena<H::Node>,
    id: FiberId,
) -> Result<(), H::Error> {
    let fiber = &arena[id];
    if fiber.is_root() {
        return Ok(());
    }
    let nodes = match (fiber.tag, fiber.relocate) {
        (MutationTag::Placement, _) if fiber.node_type.is_host() => arena.top_host_nodes(id),
        // Children of a placed component are placed on their own.
        (MutationTag::Placement, _) => return Ok(()),
        (MutationTag::Update, true) => arena.top_host_nodes(id),
        _ => return Ok(()),
    };
    let Some(parent_fiber) = arena.nearest_host_fiber(id) else {
        return Ok(());
    };
    let Some(parent) = arena[parent_fiber].host_node.as_ref() else {
        return Ok(());
    };

    // Every sibling under a placed parent is placed too; append in order.
    let anchor = if arena[parent_fiber].tag == MutationTag::Placement {
        None
    } else {
        arena.host_sibling(id)
    };
    match anchor {
        Some(before) => {
            for node in nodes {
                trace!(?node, ?before, "insert before");
                host.insert_before(parent, node, before)?;
            }
        }
        None => {
            for node in nodes {
                trace!(?node, "append");
                host.append_child(parent, node)?;
            }
        }
    }
    Ok(())
}
