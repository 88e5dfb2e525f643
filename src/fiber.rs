//! Fiber records and the arena that stores them.
//!
//! Both the committed tree and the work-in-progress tree live in one [`FiberArena`]. Links between
//! fibers (`parent`, `child`, `sibling`, `alternate`) are [`FiberId`]s rather than references, so
//! the cyclic shape of the tree never fights the borrow checker, and freeing a fiber invalidates its
//! id explicitly.

use alloc::{rc::Rc, vec::Vec};

use slotmap::{SlotMap, new_key_type};

use crate::{
    describe::{Attributes, Description, NodeType},
    hooks::HookSlot,
};

new_key_type! {
    /// Handle of a fiber stored in a [`FiberArena`].
    pub struct FiberId;
}

/// Pending host operation computed for a fiber during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationTag {
    /// Nothing to do.
    #[default]
    None,
    /// A new host node must be created and attached.
    Placement,
    /// The host node is reused; attributes are diffed at commit time.
    Update,
    /// The host node must be removed.
    Deletion,
}

/// Mutable work record paired with one tree position.
#[derive(Debug)]
pub struct Fiber<N> {
    pub(crate) node_type: NodeType,
    pub(crate) attributes: Attributes,
    pub(crate) key: Option<alloc::string::String>,
    /// Child descriptions not yet turned into fibers.
    pub(crate) pending_children: Vec<Description>,
    pub(crate) host_node: Option<N>,
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) alternate: Option<FiberId>,
    pub(crate) tag: MutationTag,
    pub(crate) relocate: bool,
    pub(crate) hooks: Vec<Rc<dyn HookSlot>>,
}

impl<N> Fiber<N> {
    pub(crate) fn from_description(description: &Description, parent: FiberId) -> Self {
        Self {
            node_type: description.node_type().clone(),
            attributes: description.attributes().clone(),
            key: description.key().map(Into::into),
            pending_children: description.children().to_vec(),
            host_node: None,
            parent: Some(parent),
            child: None,
            sibling: None,
            alternate: None,
            tag: MutationTag::None,
            relocate: false,
            hooks: Vec::new(),
        }
    }

    pub(crate) fn root(description: Description, host_root: N, alternate: Option<FiberId>) -> Self {
        Self {
            node_type: NodeType::Host(ROOT_TAG.into()),
            attributes: Attributes::new(),
            key: None,
            pending_children: alloc::vec![description],
            host_node: Some(host_root),
            parent: None,
            child: None,
            sibling: None,
            alternate,
            tag: MutationTag::None,
            relocate: false,
            hooks: Vec::new(),
        }
    }

    /// The node type.
    #[must_use]
    pub const fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    /// Current attributes.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// The owned host node, once created or carried over from the alternate.
    #[must_use]
    pub const fn host_node(&self) -> Option<&N> {
        self.host_node.as_ref()
    }

    /// Parent fiber; `None` only for a synthetic root.
    #[must_use]
    pub const fn parent(&self) -> Option<FiberId> {
        self.parent
    }

    /// First child.
    #[must_use]
    pub const fn child(&self) -> Option<FiberId> {
        self.child
    }

    /// Next sibling.
    #[must_use]
    pub const fn sibling(&self) -> Option<FiberId> {
        self.sibling
    }

    /// Fiber at the same position in the previously committed tree.
    #[must_use]
    pub const fn alternate(&self) -> Option<FiberId> {
        self.alternate
    }

    /// Mutation computed by the last reconciliation.
    #[must_use]
    pub const fn tag(&self) -> MutationTag {
        self.tag
    }

    /// `true` when a reused fiber has to move among its siblings.
    #[must_use]
    pub const fn relocates(&self) -> bool {
        self.relocate
    }

    /// `true` for the synthetic root.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// A reused fiber that stays where it was. Host siblings can be anchored on it.
    pub(crate) fn is_stable(&self) -> bool {
        self.tag == MutationTag::Update && !self.relocate
    }
}

/// Tag name given to synthetic roots.
pub const ROOT_TAG: &str = "#root";

/// Arena storing every live fiber.
#[derive(Debug)]
pub struct FiberArena<N> {
    fibers: SlotMap<FiberId, Fiber<N>>,
}

impl<N> Default for FiberArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> FiberArena<N> {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fibers: SlotMap::with_key(),
        }
    }

    pub(crate) fn insert(&mut self, fiber: Fiber<N>) -> FiberId {
        self.fibers.insert(fiber)
    }

    /// Looks up a fiber.
    #[must_use]
    pub fn get(&self, id: FiberId) -> Option<&Fiber<N>> {
        self.fibers.get(id)
    }

    /// Number of live fibers, across both trees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    /// Returns `true` if no fiber is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Iterates over the children of `id` in order.
    pub fn children(&self, id: FiberId) -> Children<'_, N> {
        Children {
            arena: self,
            next: self[id].child,
        }
    }

    /// Every fiber of the subtree rooted at `root`, parents before children.
    #[must_use]
    pub fn preorder(&self, root: FiberId) -> Vec<FiberId> {
        let mut order = Vec::new();
        let mut stack = alloc::vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let start = stack.len();
            stack.extend(self.children(id));
            stack[start..].reverse();
        }
        order
    }

    /// Every fiber of the subtree rooted at `root`, children before parents.
    #[must_use]
    pub fn postorder(&self, root: FiberId) -> Vec<FiberId> {
        let mut order = Vec::new();
        let mut stack = alloc::vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            let start = stack.len();
            stack.extend(self.children(id).map(|child| (child, false)));
            stack[start..].reverse();
        }
        order
    }

    /// Next fiber to visit after `id`: its first child, else its sibling, else the sibling of the
    /// closest ancestor that has one. `None` once the walk is back at the root.
    #[must_use]
    pub fn next_unit_of_work(&self, id: FiberId) -> Option<FiberId> {
        let fiber = &self[id];
        if let Some(child) = fiber.child {
            return Some(child);
        }
        let mut cursor = id;
        loop {
            let fiber = &self[cursor];
            if let Some(sibling) = fiber.sibling {
                return Some(sibling);
            }
            cursor = fiber.parent?;
        }
    }

    /// Closest ancestor of `id` that owns a host node.
    #[must_use]
    pub fn nearest_host_fiber(&self, id: FiberId) -> Option<FiberId> {
        let mut cursor = self[id].parent;
        while let Some(parent) = cursor {
            let fiber = &self[parent];
            if fiber.host_node.is_some() {
                return Some(parent);
            }
            cursor = fiber.parent;
        }
        None
    }

    /// Host node of the closest ancestor of `id` that owns one.
    #[must_use]
    pub fn nearest_host_ancestor(&self, id: FiberId) -> Option<&N> {
        self.nearest_host_fiber(id)
            .and_then(|parent| self[parent].host_node.as_ref())
    }

    /// Host node that a newly attached `id` must be inserted before: the first host node that
    /// follows `id` in host order and is not itself being placed or moved. `None` means append.
    #[must_use]
    pub fn host_sibling(&self, id: FiberId) -> Option<&N> {
        let mut cursor = id;
        'siblings: loop {
            while self[cursor].sibling.is_none() {
                let parent = self[cursor].parent?;
                if self[parent].node_type.is_host() {
                    return None;
                }
                cursor = parent;
            }
            cursor = self[cursor].sibling?;

            // Descend through components to the first host node.
            while !self[cursor].node_type.is_host() {
                if !self[cursor].is_stable() {
                    continue 'siblings;
                }
                match self[cursor].child {
                    Some(child) => cursor = child,
                    None => continue 'siblings,
                }
            }
            let fiber = &self[cursor];
            if fiber.is_stable() {
                if let Some(node) = fiber.host_node.as_ref() {
                    return Some(node);
                }
            }
        }
    }

    /// Host nodes directly under the subtree `id`: the fiber's own node, or for components the
    /// top-level host nodes of its descendants.
    #[must_use]
    pub fn top_host_nodes(&self, id: FiberId) -> Vec<&N> {
        let mut nodes = Vec::new();
        let mut stack = alloc::vec![id];
        while let Some(current) = stack.pop() {
            let fiber = &self[current];
            if let Some(node) = fiber.host_node.as_ref() {
                nodes.push(node);
                continue;
            }
            assert!(
                !fiber.node_type.is_host(),
                "host fiber `{}` has no host node",
                fiber.node_type.label()
            );
            let start = stack.len();
            stack.extend(self.children(current));
            stack[start..].reverse();
        }
        nodes
    }

    /// Frees every fiber of the subtree rooted at `root`.
    pub(crate) fn free_subtree(&mut self, root: FiberId) -> usize {
        let ids = self.preorder(root);
        for id in &ids {
            self.fibers.remove(*id);
        }
        ids.len()
    }
}

impl<N> core::ops::Index<FiberId> for FiberArena<N> {
    type Output = Fiber<N>;

    fn index(&self, id: FiberId) -> &Self::Output {
        self.fibers
            .get(id)
            .unwrap_or_else(|| panic!("fiber {id:?} was freed or never existed"))
    }
}

impl<N> core::ops::IndexMut<FiberId> for FiberArena<N> {
    fn index_mut(&mut self, id: FiberId) -> &mut Self::Output {
        self.fibers
            .get_mut(id)
            .unwrap_or_else(|| panic!("fiber {id:?} was freed or never existed"))
    }
}

/// Iterator returned by [`FiberArena::children`].
#[derive(Debug)]
pub struct Children<'a, N> {
    arena: &'a FiberArena<N>,
    next: Option<FiberId>,
}

impl<N> Iterator for Children<'_, N> {
    type Item = FiberId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.arena[id].sibling;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{element, text};

    /// Builds `root > div > [p > #text, span]` with plain links.
    fn sample() -> (FiberArena<u32>, Vec<FiberId>) {
        let mut arena = FiberArena::new();
        let root = arena.insert(Fiber::root(text("unused"), 0, None));
        let div = arena.insert(Fiber::from_description(&element("div").build(), root));
        let p = arena.insert(Fiber::from_description(&element("p").build(), div));
        let leaf = arena.insert(Fiber::from_description(&text("hi"), p));
        let span = arena.insert(Fiber::from_description(&element("span").build(), div));
        arena[root].child = Some(div);
        arena[div].child = Some(p);
        arena[p].child = Some(leaf);
        arena[p].sibling = Some(span);
        (arena, alloc::vec![root, div, p, leaf, span])
    }

    #[test]
    fn walk_order_is_child_then_sibling_then_ancestor_sibling() {
        let (arena, ids) = sample();
        let [root, div, p, leaf, span] = ids[..] else {
            unreachable!()
        };
        assert_eq!(arena.next_unit_of_work(root), Some(div));
        assert_eq!(arena.next_unit_of_work(div), Some(p));
        assert_eq!(arena.next_unit_of_work(p), Some(leaf));
        assert_eq!(arena.next_unit_of_work(leaf), Some(span));
        assert_eq!(arena.next_unit_of_work(span), None);
    }

    #[test]
    fn traversal_orders() {
        let (arena, ids) = sample();
        let [root, div, p, leaf, span] = ids[..] else {
            unreachable!()
        };
        assert_eq!(arena.preorder(root), alloc::vec![root, div, p, leaf, span]);
        assert_eq!(arena.postorder(root), alloc::vec![leaf, p, span, div, root]);
        assert_eq!(arena.children(div).collect::<Vec<_>>(), alloc::vec![p, span]);
    }

    #[test]
    fn nearest_host_ancestor_skips_nodes_without_host() {
        let (mut arena, ids) = sample();
        let [root, div, _p, leaf, _span] = ids[..] else {
            unreachable!()
        };
        assert_eq!(arena.nearest_host_ancestor(leaf), Some(&0));
        assert_eq!(arena.nearest_host_fiber(leaf), Some(root));
        arena[div].host_node = Some(7);
        assert_eq!(arena.nearest_host_ancestor(leaf), Some(&7));
        assert_eq!(arena.nearest_host_fiber(leaf), Some(div));
        assert_eq!(arena.nearest_host_ancestor(root), None);
    }

    #[test]
    fn host_sibling_only_returns_stable_nodes() {
        let (mut arena, ids) = sample();
        let [_root, _div, p, _leaf, span] = ids[..] else {
            unreachable!()
        };
        arena[span].host_node = Some(9);
        arena[span].tag = MutationTag::Placement;
        assert_eq!(arena.host_sibling(p), None);
        arena[span].tag = MutationTag::Update;
        assert_eq!(arena.host_sibling(p), Some(&9));
        arena[span].relocate = true;
        assert_eq!(arena.host_sibling(p), None);
    }

    #[test]
    fn freeing_invalidates_ids() {
        let (mut arena, ids) = sample();
        let freed = arena.free_subtree(ids[1]);
        assert_eq!(freed, 4);
        assert_eq!(arena.len(), 1);
        assert!(arena.get(ids[2]).is_none());
    }

    #[test]
    #[should_panic(expected = "was freed")]
    fn stale_ids_fail_fast() {
        let (mut arena, ids) = sample();
        arena.free_subtree(ids[1]);
        let _ = &arena[ids[3]];
    }
}
