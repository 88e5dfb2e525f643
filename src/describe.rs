//! Immutable tree descriptions.
//!
//! A [`Description`] is what callers hand to the renderer: a node type, its attributes and an
//! ordered list of child descriptions. Descriptions never change after construction and are cheap to
//! clone, so the reconciler can keep the ones it has not expanded yet inside fibers.

use alloc::{borrow::Cow, collections::BTreeMap, rc::Rc, string::String, vec::Vec};
use core::{any::Any, fmt};

use crate::hooks::Hooks;

/// Attribute key carrying the value of a text leaf.
pub const TEXT_VALUE_KEY: &str = "nodeValue";

/// Attribute key that is always stripped into the children sequence.
pub const CHILDREN_KEY: &str = "children";

/// Prefix that marks an attribute as an event subscription (`onClick`, `onInput`, ...).
pub const EVENT_PREFIX: &str = "on";

/// Returns `true` when `key` names an event subscription rather than a plain property.
#[must_use]
pub fn is_event(key: &str) -> bool {
    key.len() > EVENT_PREFIX.len() && key.starts_with(EVENT_PREFIX)
}

/// Returns `true` when `value` stored under `key` is an event subscription: a handler under an
/// `on*` key. Every other entry, `online = "yes"` included, is a plain property.
#[must_use]
pub fn is_subscription(key: &str, value: &AttrValue) -> bool {
    is_event(key) && matches!(value, AttrValue::Handler(_))
}

/// Maps an event attribute key to the host event name (`onClick` becomes `click`).
#[must_use]
pub fn event_name(key: &str) -> String {
    key[EVENT_PREFIX.len()..].to_lowercase()
}

/// An opaque event callback. Two handlers are equal only if they are the same allocation.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&dyn Any)>);

impl EventHandler {
    /// Wraps a callback receiving the host's event payload.
    pub fn new(handler: impl Fn(&dyn Any) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    /// Invokes the callback.
    pub fn call(&self, event: &dyn Any) {
        (self.0)(event);
    }

    /// Returns `true` if both handles point to the same callback.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Value stored under an attribute key.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// A string value.
    Text(String),
    /// A numeric value.
    Number(f64),
    /// A boolean flag.
    Bool(bool),
    /// An event subscription.
    Handler(EventHandler),
}

impl AttrValue {
    /// Returns the string payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the handler, if this value is an event subscription.
    #[must_use]
    pub const fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            Self::Handler(handler) => Some(handler),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{value:?}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Handler(_) => f.write_str("<handler>"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<EventHandler> for AttrValue {
    fn from(value: EventHandler) -> Self {
        Self::Handler(value)
    }
}

/// Ordered attribute map of a node. Iteration order is the key order, which keeps host calls
/// deterministic across passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    /// Creates an empty attribute map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts or replaces an attribute, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes an attribute.
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.0.remove(key)
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of attributes, handlers included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over every attribute in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Iterates over plain properties, skipping event subscriptions. A non-handler value under an
    /// `on*` key is a property.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.iter().filter(|(key, value)| !is_subscription(key, value))
    }

    /// Iterates over event subscriptions as `(attribute key, handler)` pairs.
    pub fn handlers(&self) -> impl Iterator<Item = (&str, &EventHandler)> {
        self.iter()
            .filter(|(key, _)| is_event(key))
            .filter_map(|(key, value)| value.as_handler().map(|handler| (key, handler)))
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// What a component function returns.
pub type ComponentResult = anyhow::Result<Description>;

type ComponentFn = dyn Fn(&Attributes, &mut Hooks) -> ComponentResult;

/// A function node: given its attributes, returns the description it expands to.
#[derive(Clone)]
pub struct Component {
    name: Cow<'static, str>,
    render: Rc<ComponentFn>,
}

impl Component {
    /// Creates a component from a render function.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, render: F) -> Self
    where
        F: Fn(&Attributes, &mut Hooks) -> ComponentResult + 'static,
    {
        Self {
            name: name.into(),
            render: Rc::new(render),
        }
    }

    /// The component's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Describes an instance of this component with the given attributes.
    #[must_use]
    pub fn describe(&self, attributes: Attributes) -> Description {
        describe(self.clone(), attributes, Vec::new())
    }

    pub(crate) fn render(
        &self,
        attributes: &Attributes,
        hooks: &mut Hooks,
    ) -> ComponentResult {
        (self.render)(attributes, hooks)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("name", &self.name).finish()
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

/// What kind of node a description (and its fiber) stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeType {
    /// A native node identified by its tag name.
    Host(Cow<'static, str>),
    /// A text leaf; its content lives under [`TEXT_VALUE_KEY`].
    Text,
    /// A component function expanded during the render pass.
    Component(Component),
}

impl NodeType {
    /// Returns `true` for node types that own a host node.
    #[must_use]
    pub const fn is_host(&self) -> bool {
        matches!(self, Self::Host(_) | Self::Text)
    }

    /// Short label used in logs and reports.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Host(tag) => tag,
            Self::Text => "#text",
            Self::Component(component) => component.name(),
        }
    }
}

impl From<&'static str> for NodeType {
    fn from(tag: &'static str) -> Self {
        Self::Host(Cow::Borrowed(tag))
    }
}

impl From<String> for NodeType {
    fn from(tag: String) -> Self {
        Self::Host(Cow::Owned(tag))
    }
}

impl From<Component> for NodeType {
    fn from(component: Component) -> Self {
        Self::Component(component)
    }
}

#[derive(Debug)]
struct DescriptionNode {
    node_type: NodeType,
    attributes: Attributes,
    children: Vec<Description>,
    key: Option<String>,
}

/// Immutable declarative description of one node and its children.
#[derive(Debug, Clone)]
pub struct Description(Rc<DescriptionNode>);

impl Description {
    /// The node type.
    #[must_use]
    pub fn node_type(&self) -> &NodeType {
        &self.0.node_type
    }

    /// Attributes, without the children.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.0.attributes
    }

    /// Ordered child descriptions.
    #[must_use]
    pub fn children(&self) -> &[Description] {
        &self.0.children
    }

    /// Reconciliation key, only consulted by the keyed policy.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.0.key.as_deref()
    }

    /// Returns a copy of this description carrying the given key.
    #[must_use]
    pub fn with_key(self, key: impl Into<String>) -> Self {
        let node = Rc::try_unwrap(self.0).unwrap_or_else(|shared| DescriptionNode {
            node_type: shared.node_type.clone(),
            attributes: shared.attributes.clone(),
            children: shared.children.clone(),
            key: None,
        });
        Self(Rc::new(DescriptionNode {
            key: Some(key.into()),
            ..node
        }))
    }
}

impl From<&str> for Description {
    fn from(value: &str) -> Self {
        text(value)
    }
}

impl From<String> for Description {
    fn from(value: String) -> Self {
        text(value)
    }
}

/// Builds a description. A `children` attribute, if present, is dropped: children only ever come
/// from the `children` argument.
pub fn describe(
    node_type: impl Into<NodeType>,
    mut attributes: Attributes,
    children: Vec<Description>,
) -> Description {
    attributes.remove(CHILDREN_KEY);
    Description(Rc::new(DescriptionNode {
        node_type: node_type.into(),
        attributes,
        children,
        key: None,
    }))
}

/// Builds a text leaf.
pub fn text(value: impl Into<String>) -> Description {
    let mut attributes = Attributes::new();
    attributes.insert(TEXT_VALUE_KEY, AttrValue::Text(value.into()));
    describe(NodeType::Text, attributes, Vec::new())
}

/// Starts a fluent builder for a host element.
pub fn element(tag: impl Into<NodeType>) -> ElementBuilder {
    ElementBuilder {
        node_type: tag.into(),
        attributes: Attributes::new(),
        children: Vec::new(),
        key: None,
    }
}

/// Fluent builder returned by [`element`].
#[derive(Debug)]
#[must_use]
pub struct ElementBuilder {
    node_type: NodeType,
    attributes: Attributes,
    children: Vec<Description>,
    key: Option<String>,
}

impl ElementBuilder {
    /// Sets an attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    /// Subscribes to an event; `on("click", ..)` stores the handler under `onClick`.
    pub fn on(mut self, event: &str, handler: EventHandler) -> Self {
        let mut chars = event.chars();
        let key = chars.next().map_or_else(String::new, |first| {
            let mut key = String::from(EVENT_PREFIX);
            key.extend(first.to_uppercase());
            key.push_str(chars.as_str());
            key
        });
        self.attributes.insert(key, handler);
        self
    }

    /// Sets the reconciliation key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Appends one child.
    pub fn child(mut self, child: impl Into<Description>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Appends several children.
    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Description>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Finishes the description.
    pub fn build(self) -> Description {
        let description = describe(self.node_type, self.attributes, self.children);
        match self.key {
            Some(key) => description.with_key(key),
            None => description,
        }
    }
}

impl From<ElementBuilder> for Description {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_attribute_is_stripped() {
        let mut attributes = Attributes::new();
        attributes.insert("children", "ignored");
        attributes.insert("id", "main");
        let description = describe("div", attributes, vec![text("a")]);
        assert!(!description.attributes().contains_key(CHILDREN_KEY));
        assert_eq!(description.attributes().len(), 1);
        assert_eq!(description.children().len(), 1);
    }

    #[test]
    fn strings_become_text_leaves() {
        let description = element("p").child("hi").build();
        let leaf = &description.children()[0];
        assert_eq!(leaf.node_type(), &NodeType::Text);
        assert_eq!(
            leaf.attributes().get(TEXT_VALUE_KEY).and_then(AttrValue::as_text),
            Some("hi")
        );
    }

    #[test]
    fn event_keys_are_recognized() {
        assert!(is_event("onClick"));
        assert!(!is_event("on"));
        assert!(!is_event("id"));
        assert_eq!(event_name("onClick"), "click");

        let handler = EventHandler::new(|_| {});
        let description = element("button").on("click", handler.clone()).build();
        let handlers: Vec<_> = description.attributes().handlers().collect();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].0, "onClick");
        assert!(handlers[0].1.ptr_eq(&handler));
        assert_eq!(description.attributes().properties().count(), 0);
    }

    #[test]
    fn on_prefixed_values_stay_properties() {
        let description = element("div")
            .attr("online", "yes")
            .attr("onboarding", true)
            .attr("id", "x")
            .build();
        let attributes = description.attributes();
        let keys: Vec<_> = attributes.properties().map(|(key, _)| key).collect();
        assert_eq!(keys, ["id", "onboarding", "online"]);
        assert_eq!(attributes.handlers().count(), 0);
        assert!(!is_subscription("online", &"yes".into()));
        assert!(is_subscription("onClick", &EventHandler::new(|_| {}).into()));
    }

    #[test]
    fn handlers_compare_by_identity() {
        let first = EventHandler::new(|_| {});
        let second = EventHandler::new(|_| {});
        assert_eq!(AttrValue::from(first.clone()), AttrValue::from(first.clone()));
        assert_ne!(AttrValue::from(first), AttrValue::from(second));
    }

    #[test]
    fn component_types_compare_by_function() {
        let a = Component::new("A", |_, _| Ok(text("a")));
        let b = Component::new("A", |_, _| Ok(text("a")));
        assert_eq!(NodeType::from(a.clone()), NodeType::from(a.clone()));
        assert_ne!(NodeType::from(a), NodeType::from(b));
    }

    #[test]
    fn keys_survive_building() {
        let description = element("li").key("row-1").child("x").build();
        assert_eq!(description.key(), Some("row-1"));
        assert_eq!(description.children().len(), 1);
    }
}
