//! In-memory host tree.
//!
//! [`MemoryHost`] keeps a plain node arena, records every call it receives as a [`HostCall`] and can
//! serialize the attached tree as markup. It backs the crate's tests and is handy for embedders that
//! want to assert on exactly what a render pass did.

use alloc::{collections::BTreeMap, format, string::String, vec::Vec};
use core::{any::Any, fmt};

use super::{HostRenderer, HostType};
use crate::describe::{AttrValue, Attributes, EventHandler, TEXT_VALUE_KEY};

/// Handle to a node owned by a [`MemoryHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryNode(usize);

impl MemoryNode {
    /// Raw index inside the host arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Errors reported by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryHostError {
    /// The handle does not belong to this host or the node was removed.
    #[error("node #{0} does not exist")]
    UnknownNode(usize),
    /// `child` is not a child of `parent`.
    #[error("node #{child} is not a child of node #{parent}")]
    NotAChild {
        /// Parent index.
        parent: usize,
        /// Child index.
        child: usize,
    },
    /// Failure requested through [`MemoryHost::fail_after`].
    #[error("injected failure in `{0}`")]
    Injected(&'static str),
}

/// One recorded host call. Node handles are rendered as labels such as `div#1` or `text#3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// `createNode`; `text` carries the value of text nodes.
    CreateNode {
        /// Label of the new node.
        node: String,
        /// Initial text, for text nodes.
        text: Option<String>,
    },
    /// `setAttribute`.
    SetAttribute {
        /// Target node.
        node: String,
        /// Property name.
        key: String,
        /// Rendered value.
        value: String,
    },
    /// `removeAttribute`.
    RemoveAttribute {
        /// Target node.
        node: String,
        /// Property name.
        key: String,
    },
    /// `bindHandler`.
    BindHandler {
        /// Target node.
        node: String,
        /// Event name.
        event: String,
    },
    /// `unbindHandler`.
    UnbindHandler {
        /// Target node.
        node: String,
        /// Event name.
        event: String,
    },
    /// `appendChild`.
    AppendChild {
        /// Parent label.
        parent: String,
        /// Child label.
        child: String,
    },
    /// `insertBefore`.
    InsertBefore {
        /// Parent label.
        parent: String,
        /// Child label.
        child: String,
        /// Anchor label.
        before: String,
    },
    /// `removeChild`.
    RemoveChild {
        /// Parent label.
        parent: String,
        /// Child label.
        child: String,
    },
}

impl fmt::Display for HostCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateNode { node, text: None } => write!(f, "createNode({node})"),
            Self::CreateNode {
                node,
                text: Some(text),
            } => write!(f, "createNode({node}, {text:?})"),
            Self::SetAttribute { node, key, value } => {
                write!(f, "setAttribute({node}, {key}, {value})")
            }
            Self::RemoveAttribute { node, key } => write!(f, "removeAttribute({node}, {key})"),
            Self::BindHandler { node, event } => write!(f, "bindHandler({node}, {event})"),
            Self::UnbindHandler { node, event } => write!(f, "unbindHandler({node}, {event})"),
            Self::AppendChild { parent, child } => write!(f, "appendChild({parent}, {child})"),
            Self::InsertBefore {
                parent,
                child,
                before,
            } => write!(f, "insertBefore({parent}, {child}, {before})"),
            Self::RemoveChild { parent, child } => write!(f, "removeChild({parent}, {child})"),
        }
    }
}

#[derive(Debug)]
enum EntryKind {
    Root,
    Element(String),
    Text,
}

#[derive(Debug)]
struct NodeEntry {
    kind: EntryKind,
    properties: BTreeMap<String, AttrValue>,
    handlers: Vec<(String, EventHandler)>,
    parent: Option<MemoryNode>,
    children: Vec<MemoryNode>,
    removed: bool,
}

impl NodeEntry {
    const fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            properties: BTreeMap::new(),
            handlers: Vec::new(),
            parent: None,
            children: Vec::new(),
            removed: false,
        }
    }
}

/// Host renderer backed by an in-memory tree.
#[derive(Debug)]
pub struct MemoryHost {
    nodes: Vec<NodeEntry>,
    calls: Vec<HostCall>,
    fail_after: Option<usize>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Creates a host holding only its root node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: alloc::vec![NodeEntry::new(EntryKind::Root)],
            calls: Vec::new(),
            fail_after: None,
        }
    }

    /// The root node to render into.
    #[must_use]
    pub const fn root(&self) -> MemoryNode {
        MemoryNode(0)
    }

    /// Calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    /// Recorded calls rendered through `Display`, convenient for assertions.
    #[must_use]
    pub fn call_log(&self) -> Vec<String> {
        self.calls.iter().map(ToString::to_string).collect()
    }

    /// Drains the recorded calls.
    pub fn take_calls(&mut self) -> Vec<HostCall> {
        core::mem::take(&mut self.calls)
    }

    /// Makes every call after the next `calls` successful ones fail.
    pub const fn fail_after(&mut self, calls: usize) {
        self.fail_after = Some(calls);
    }

    /// Label of a node, such as `div#1`.
    #[must_use]
    pub fn label(&self, node: MemoryNode) -> String {
        match self.nodes.get(node.0).map(|entry| &entry.kind) {
            Some(EntryKind::Root) => String::from("root"),
            Some(EntryKind::Element(tag)) => format!("{tag}#{}", node.0),
            Some(EntryKind::Text) => format!("text#{}", node.0),
            None => format!("?#{}", node.0),
        }
    }

    /// Children of an attached node.
    #[must_use]
    pub fn children(&self, node: MemoryNode) -> &[MemoryNode] {
        self.nodes
            .get(node.0)
            .map_or(&[], |entry| entry.children.as_slice())
    }

    /// Value of a property.
    #[must_use]
    pub fn attribute(&self, node: MemoryNode, key: &str) -> Option<&AttrValue> {
        self.nodes.get(node.0)?.properties.get(key)
    }

    /// First live element with the given tag, in document order.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<MemoryNode> {
        let mut stack = alloc::vec![self.root()];
        while let Some(node) = stack.pop() {
            let entry = &self.nodes[node.0];
            if matches!(&entry.kind, EntryKind::Element(name) if name == tag) {
                return Some(node);
            }
            stack.extend(entry.children.iter().rev().copied());
        }
        None
    }

    /// Handlers currently bound for `event` on `node`.
    #[must_use]
    pub fn handlers(&self, node: MemoryNode, event: &str) -> Vec<EventHandler> {
        self.nodes.get(node.0).map_or_else(Vec::new, |entry| {
            entry
                .handlers
                .iter()
                .filter(|(name, _)| name == event)
                .map(|(_, handler)| handler.clone())
                .collect()
        })
    }

    /// Invokes every handler bound for `event` on `node`; returns how many ran.
    pub fn dispatch(&self, node: MemoryNode, event: &str, payload: &dyn Any) -> usize {
        let handlers = self.handlers(node, event);
        for handler in &handlers {
            handler.call(payload);
        }
        handlers.len()
    }

    /// Number of nodes created and not removed, the root excluded.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().skip(1).filter(|entry| !entry.removed).count()
    }

    /// Serializes everything attached under the root.
    #[must_use]
    pub fn markup(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.write_markup(*child, &mut out);
        }
        out
    }

    fn write_markup(&self, node: MemoryNode, out: &mut String) {
        let entry = &self.nodes[node.0];
        match &entry.kind {
            EntryKind::Text => {
                if let Some(value) = entry.properties.get(TEXT_VALUE_KEY).and_then(AttrValue::as_text) {
                    out.push_str(value);
                }
            }
            EntryKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in &entry.properties {
                    out.push_str(&format!(" {key}={value}"));
                }
                out.push('>');
                for child in &entry.children {
                    self.write_markup(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
            EntryKind::Root => {
                for child in &entry.children {
                    self.write_markup(*child, out);
                }
            }
        }
    }

    fn check(&mut self, operation: &'static str) -> Result<(), MemoryHostError> {
        match self.fail_after {
            Some(0) => Err(MemoryHostError::Injected(operation)),
            Some(remaining) => {
                self.fail_after = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn entry_mut(&mut self, node: MemoryNode) -> Result<&mut NodeEntry, MemoryHostError> {
        self.nodes
            .get_mut(node.0)
            .filter(|entry| !entry.removed)
            .ok_or(MemoryHostError::UnknownNode(node.0))
    }

    fn detach(&mut self, child: MemoryNode) -> Result<(), MemoryHostError> {
        if let Some(parent) = self.entry_mut(child)?.parent.take() {
            self.entry_mut(parent)?.children.retain(|node| *node != child);
        }
        Ok(())
    }

    fn mark_removed(&mut self, node: MemoryNode) {
        let mut stack = alloc::vec![node];
        while let Some(current) = stack.pop() {
            let entry = &mut self.nodes[current.0];
            entry.removed = true;
            stack.extend(entry.children.iter().copied());
        }
    }
}

impl HostRenderer for MemoryHost {
    type Node = MemoryNode;
    type Error = MemoryHostError;

    fn create_node(
        &mut self,
        node_type: HostType<'_>,
        attributes: &Attributes,
    ) -> Result<MemoryNode, MemoryHostError> {
        self.check("createNode")?;
        let kind = match node_type {
            HostType::Element(tag) => EntryKind::Element(tag.into()),
            HostType::Text => EntryKind::Text,
        };
        let mut entry = NodeEntry::new(kind);
        for (key, value) in attributes.properties() {
            entry.properties.insert(key.into(), value.clone());
        }
        let text = matches!(node_type, HostType::Text)
            .then(|| entry.properties.get(TEXT_VALUE_KEY).and_then(AttrValue::as_text).map(String::from))
            .flatten();
        let node = MemoryNode(self.nodes.len());
        self.nodes.push(entry);
        self.calls.push(HostCall::CreateNode {
            node: self.label(node),
            text,
        });
        Ok(node)
    }

    fn set_attribute(
        &mut self,
        node: &MemoryNode,
        key: &str,
        value: &AttrValue,
    ) -> Result<(), MemoryHostError> {
        self.check("setAttribute")?;
        self.entry_mut(*node)?
            .properties
            .insert(key.into(), value.clone());
        self.calls.push(HostCall::SetAttribute {
            node: self.label(*node),
            key: key.into(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn remove_attribute(&mut self, node: &MemoryNode, key: &str) -> Result<(), MemoryHostError> {
        self.check("removeAttribute")?;
        self.entry_mut(*node)?.properties.remove(key);
        self.calls.push(HostCall::RemoveAttribute {
            node: self.label(*node),
            key: key.into(),
        });
        Ok(())
    }

    fn bind_handler(
        &mut self,
        node: &MemoryNode,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), MemoryHostError> {
        self.check("bindHandler")?;
        self.entry_mut(*node)?
            .handlers
            .push((event.into(), handler.clone()));
        self.calls.push(HostCall::BindHandler {
            node: self.label(*node),
            event: event.into(),
        });
        Ok(())
    }

    fn unbind_handler(
        &mut self,
        node: &MemoryNode,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), MemoryHostError> {
        self.check("unbindHandler")?;
        self.entry_mut(*node)?
            .handlers
            .retain(|(name, bound)| !(name == event && bound.ptr_eq(handler)));
        self.calls.push(HostCall::UnbindHandler {
            node: self.label(*node),
            event: event.into(),
        });
        Ok(())
    }

    fn append_child(&mut self, parent: &MemoryNode, child: &MemoryNode) -> Result<(), MemoryHostError> {
        self.check("appendChild")?;
        self.detach(*child)?;
        self.entry_mut(*parent)?.children.push(*child);
        self.entry_mut(*child)?.parent = Some(*parent);
        self.calls.push(HostCall::AppendChild {
            parent: self.label(*parent),
            child: self.label(*child),
        });
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: &MemoryNode,
        child: &MemoryNode,
        before: &MemoryNode,
    ) -> Result<(), MemoryHostError> {
        self.check("insertBefore")?;
        self.detach(*child)?;
        let siblings = &mut self.entry_mut(*parent)?.children;
        let index = siblings
            .iter()
            .position(|node| node == before)
            .ok_or(MemoryHostError::NotAChild {
                parent: parent.0,
                child: before.0,
            })?;
        siblings.insert(index, *child);
        self.entry_mut(*child)?.parent = Some(*parent);
        self.calls.push(HostCall::InsertBefore {
            parent: self.label(*parent),
            child: self.label(*child),
            before: self.label(*before),
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: &MemoryNode, child: &MemoryNode) -> Result<(), MemoryHostError> {
        self.check("removeChild")?;
        let not_a_child = MemoryHostError::NotAChild {
            parent: parent.0,
            child: child.0,
        };
        if self.entry_mut(*child)?.parent != Some(*parent) {
            return Err(not_a_child);
        }
        self.detach(*child)?;
        self.mark_removed(*child);
        self.calls.push(HostCall::RemoveChild {
            parent: self.label(*parent),
            child: self.label(*child),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_node(host: &mut MemoryHost, tag: &str) -> MemoryNode {
        host.create_node(HostType::Element(tag), &Attributes::new())
            .expect("create should succeed")
    }

    #[test]
    fn builds_markup_and_logs_calls() {
        let mut host = MemoryHost::new();
        let root = host.root();
        let div = element_node(&mut host, "div");
        let mut attributes = Attributes::new();
        attributes.insert(TEXT_VALUE_KEY, "hi");
        let leaf = host
            .create_node(HostType::Text, &attributes)
            .expect("create should succeed");
        host.append_child(&div, &leaf).expect("append should succeed");
        host.append_child(&root, &div).expect("append should succeed");

        assert_eq!(host.markup(), "<div>hi</div>");
        assert_eq!(
            host.call_log(),
            vec![
                "createNode(div#1)",
                "createNode(text#2, \"hi\")",
                "appendChild(div#1, text#2)",
                "appendChild(root, div#1)",
            ]
        );
    }

    #[test]
    fn insert_before_moves_attached_nodes() {
        let mut host = MemoryHost::new();
        let root = host.root();
        let a = element_node(&mut host, "a");
        let b = element_node(&mut host, "b");
        host.append_child(&root, &a).expect("append should succeed");
        host.append_child(&root, &b).expect("append should succeed");
        host.insert_before(&root, &b, &a).expect("insert should succeed");
        assert_eq!(host.markup(), "<b></b><a></a>");
    }

    #[test]
    fn removed_nodes_reject_further_calls() {
        let mut host = MemoryHost::new();
        let root = host.root();
        let a = element_node(&mut host, "a");
        host.append_child(&root, &a).expect("append should succeed");
        host.remove_child(&root, &a).expect("remove should succeed");
        assert_eq!(host.live_nodes(), 0);
        assert_eq!(
            host.set_attribute(&a, "id", &"x".into()),
            Err(MemoryHostError::UnknownNode(1))
        );
        assert_eq!(
            host.remove_child(&root, &a),
            Err(MemoryHostError::UnknownNode(1))
        );
    }

    #[test]
    fn injected_failures_trigger_after_budget() {
        let mut host = MemoryHost::new();
        host.fail_after(1);
        let _ = element_node(&mut host, "a");
        assert_eq!(
            host.create_node(HostType::Element("b"), &Attributes::new()),
            Err(MemoryHostError::Injected("createNode"))
        );
    }

    #[test]
    fn handlers_can_be_dispatched_and_unbound() {
        let mut host = MemoryHost::new();
        let button = element_node(&mut host, "button");
        let hits = std::rc::Rc::new(core::cell::Cell::new(0));
        let handler = EventHandler::new({
            let hits = std::rc::Rc::clone(&hits);
            move |_| hits.set(hits.get() + 1)
        });
        host.bind_handler(&button, "click", &handler)
            .expect("bind should succeed");
        assert_eq!(host.dispatch(button, "click", &()), 1);
        host.unbind_handler(&button, "click", &handler)
            .expect("unbind should succeed");
        assert_eq!(host.dispatch(button, "click", &()), 0);
        assert_eq!(hits.get(), 1);
    }
}
