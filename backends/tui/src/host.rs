use std::collections::BTreeMap;

use slotmap::{SlotMap, new_key_type};
use tracing::trace;
use waterui_fiber::{
    describe::{AttrValue, Attributes, EventHandler},
    host::{HostRenderer, HostType},
};

use crate::error::TuiError;

new_key_type! {
    /// Handle of a node in a [`TerminalHost`].
    pub struct TermNode;
}

/// What a terminal node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The screen itself.
    Root,
    /// An element, laid out according to its tag.
    Element(String),
    /// A run of text.
    Text,
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) properties: BTreeMap<String, AttrValue>,
    pub(crate) handlers: Vec<(String, EventHandler)>,
    pub(crate) parent: Option<TermNode>,
    pub(crate) children: Vec<TermNode>,
}

impl NodeData {
    const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            properties: BTreeMap::new(),
            handlers: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Host renderer keeping a retained tree of terminal nodes.
///
/// Nodes are freed as soon as they are removed. The tree is drawn by
/// [`Renderer`](crate::Renderer) whenever the host reports it changed.
#[derive(Debug)]
pub struct TerminalHost {
    nodes: SlotMap<TermNode, NodeData>,
    root: TermNode,
    dirty: bool,
}

impl Default for TerminalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalHost {
    /// Creates an empty screen.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(NodeData::new(NodeKind::Root));
        Self {
            nodes,
            root,
            dirty: true,
        }
    }

    /// The screen node to render into.
    #[must_use]
    pub const fn root(&self) -> TermNode {
        self.root
    }

    /// Number of live nodes, the root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Clears the changed flag, returning whether the tree changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::replace(&mut self.dirty, false)
    }

    pub(crate) fn node(&self, node: TermNode) -> Option<&NodeData> {
        self.nodes.get(node)
    }

    /// Kind of a live node.
    #[must_use]
    pub fn kind(&self, node: TermNode) -> Option<&NodeKind> {
        self.nodes.get(node).map(|data| &data.kind)
    }

    /// Children of a live node.
    #[must_use]
    pub fn children(&self, node: TermNode) -> &[TermNode] {
        self.nodes.get(node).map_or(&[], |data| data.children.as_slice())
    }

    /// First element whose `id` property equals `id`, in document order.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<TermNode> {
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            let data = &self.nodes[node];
            if data.properties.get("id").and_then(AttrValue::as_text) == Some(id) {
                return Some(node);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        None
    }

    /// Runs the handlers bound to `event` on `node` and returns how many ran.
    pub fn dispatch(&self, node: TermNode, event: &str, payload: &dyn core::any::Any) -> usize {
        let handlers: Vec<EventHandler> = self
            .nodes
            .get(node)
            .map(|data| {
                data.handlers
                    .iter()
                    .filter(|(name, _)| name == event)
                    .map(|(_, handler)| handler.clone())
                    .collect()
            })
            .unwrap_or_default();
        for handler in &handlers {
            handler.call(payload);
        }
        handlers.len()
    }

    fn data_mut(&mut self, node: TermNode) -> Result<&mut NodeData, TuiError> {
        self.dirty = true;
        self.nodes.get_mut(node).ok_or(TuiError::UnknownNode)
    }

    fn detach(&mut self, child: TermNode) -> Result<(), TuiError> {
        if let Some(parent) = self.data_mut(child)?.parent.take() {
            self.data_mut(parent)?.children.retain(|node| *node != child);
        }
        Ok(())
    }
}

impl HostRenderer for TerminalHost {
    type Node = TermNode;
    type Error = TuiError;

    fn create_node(
        &mut self,
        node_type: HostType<'_>,
        attributes: &Attributes,
    ) -> Result<TermNode, TuiError> {
        let kind = match node_type {
            HostType::Element(tag) => NodeKind::Element(tag.to_owned()),
            HostType::Text => NodeKind::Text,
        };
        let mut data = NodeData::new(kind);
        for (key, value) in attributes.properties() {
            data.properties.insert(key.to_owned(), value.clone());
        }
        let node = self.nodes.insert(data);
        trace!(?node, ?node_type, "terminal node created");
        Ok(node)
    }

    fn set_attribute(&mut self, node: &TermNode, key: &str, value: &AttrValue) -> Result<(), TuiError> {
        self.data_mut(*node)?
            .properties
            .insert(key.to_owned(), value.clone());
        Ok(())
    }

    fn remove_attribute(&mut self, node: &TermNode, key: &str) -> Result<(), TuiError> {
        self.data_mut(*node)?.properties.remove(key);
        Ok(())
    }

    fn bind_handler(&mut self, node: &TermNode, event: &str, handler: &EventHandler) -> Result<(), TuiError> {
        self.data_mut(*node)?
            .handlers
            .push((event.to_owned(), handler.clone()));
        Ok(())
    }

    fn unbind_handler(&mut self, node: &TermNode, event: &str, handler: &EventHandler) -> Result<(), TuiError> {
        self.data_mut(*node)?
            .handlers
            .retain(|(name, bound)| !(name == event && bound.ptr_eq(handler)));
        Ok(())
    }

    fn append_child(&mut self, parent: &TermNode, child: &TermNode) -> Result<(), TuiError> {
        self.detach(*child)?;
        self.data_mut(*parent)?.children.push(*child);
        self.data_mut(*child)?.parent = Some(*parent);
        Ok(())
    }

    fn insert_before(&mut self, parent: &TermNode, child: &TermNode, before: &TermNode) -> Result<(), TuiError> {
        self.detach(*child)?;
        let siblings = &mut self.data_mut(*parent)?.children;
        let index = siblings
            .iter()
            .position(|node| node == before)
            .ok_or(TuiError::NotAChild)?;
        siblings.insert(index, *child);
        self.data_mut(*child)?.parent = Some(*parent);
        Ok(())
    }

    fn remove_child(&mut self, parent: &TermNode, child: &TermNode) -> Result<(), TuiError> {
        if self.data_mut(*child)?.parent != Some(*parent) {
            return Err(TuiError::NotAChild);
        }
        self.detach(*child)?;
        let mut stack = vec![*child];
        while let Some(node) = stack.pop() {
            if let Some(data) = self.nodes.remove(node) {
                stack.extend(data.children);
            }
        }
        Ok(())
    }
}
