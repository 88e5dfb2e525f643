//! The host-renderer boundary.
//!
//! The core never touches native nodes itself. Commit drives a [`HostRenderer`], which creates,
//! mutates and links whatever the embedding environment renders into: DOM nodes, terminal cells, or
//! the in-memory tree of [`MemoryHost`].

pub mod memory;

use core::fmt::Debug;

pub use memory::{HostCall, MemoryHost, MemoryHostError, MemoryNode};

use crate::describe::{AttrValue, Attributes, EventHandler};

/// Kind of native node to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType<'a> {
    /// An element with a tag name.
    Element(&'a str),
    /// A text node.
    Text,
}

/// Collaborator that owns the native tree.
///
/// Every method is called from commit only, in one uninterrupted pass. A failure in the middle of a
/// commit leaves the native tree partly mutated; implementations that can fail should make their
/// operations transactional on their side.
pub trait HostRenderer {
    /// Handle to a native node. Handles compare equal when they name the same node.
    type Node: Clone + Debug + PartialEq;
    /// Error reported by native operations.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Creates a detached node. Only plain properties are applied here (see
    /// [`Attributes::properties`]); handlers follow through [`Self::bind_handler`].
    ///
    /// # Errors
    ///
    /// Returns an error if the native node cannot be created.
    fn create_node(
        &mut self,
        node_type: HostType<'_>,
        attributes: &Attributes,
    ) -> Result<Self::Node, Self::Error>;

    /// Sets or replaces a property.
    ///
    /// # Errors
    ///
    /// Returns an error if the native node rejects the property.
    fn set_attribute(
        &mut self,
        node: &Self::Node,
        key: &str,
        value: &AttrValue,
    ) -> Result<(), Self::Error>;

    /// Removes a property.
    ///
    /// # Errors
    ///
    /// Returns an error if the native node cannot be updated.
    fn remove_attribute(&mut self, node: &Self::Node, key: &str) -> Result<(), Self::Error>;

    /// Subscribes `handler` to `event`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be registered.
    fn bind_handler(
        &mut self,
        node: &Self::Node,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), Self::Error>;

    /// Removes a subscription previously made with the same handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be removed.
    fn unbind_handler(
        &mut self,
        node: &Self::Node,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), Self::Error>;

    /// Attaches `child` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the nodes cannot be linked.
    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), Self::Error>;

    /// Attaches `child` under `parent` right before `before`. A child that is already attached
    /// somewhere is moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the nodes cannot be linked.
    fn insert_before(
        &mut self,
        parent: &Self::Node,
        child: &Self::Node,
        before: &Self::Node,
    ) -> Result<(), Self::Error>;

    /// Detaches `child` from `parent`; the node is dropped by the host afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if `child` is not attached to `parent`.
    fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), Self::Error>;
}
