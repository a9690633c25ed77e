//! Declarative render tree and its reconciler
//!
//! A render function builds a fresh [`VNode`] tree from the current snapshot
//! every frame. The [`Reconciler`] diffs it against the previous frame's tree
//! and applies only the differences to a retained output tree through a
//! [`Backend`] (the DOM on `wasm32`, [`MemoryBackend`] elsewhere).

pub mod backend;
pub mod reconcile;

pub use backend::{Backend, MemoryBackend, NodeId, NodeSnapshot};
pub use reconcile::{PatchStats, Reconciler, RetainedNode, patch};

use std::collections::BTreeMap;
use std::rc::Rc;

/// Event handler attached to an element. Two listeners are the same
/// listener only if they are the same `Rc`.
pub type Listener = Rc<dyn Fn()>;

/// A declarative tree node. Values, never mutated once built.
#[derive(Clone)]
pub enum VNode {
    Element(Element),
    Text(String),
}

#[derive(Clone, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub styles: BTreeMap<String, String>,
    pub listeners: BTreeMap<String, Listener>,
    /// `None` entries are skipped by the reconciler
    pub children: Vec<Option<VNode>>,
}

/// Start an element
pub fn h(tag: impl Into<String>) -> Element {
    Element {
        tag: tag.into(),
        ..Default::default()
    }
}

/// Text leaf
pub fn text(content: impl Into<String>) -> VNode {
    VNode::Text(content.into())
}

impl Element {
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Append to the `class` attribute
    pub fn class(mut self, class: impl AsRef<str>) -> Self {
        let class = class.as_ref();
        let merged = match self.attrs.get("class") {
            Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.attrs.insert("class".into(), merged);
        self
    }

    pub fn style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(name.into(), value.into());
        self
    }

    pub fn on(mut self, event: impl Into<String>, listener: impl Fn() + 'static) -> Self {
        self.listeners.insert(event.into(), Rc::new(listener));
        self
    }

    /// Attach an existing listener, keeping its identity across frames
    pub fn on_shared(mut self, event: impl Into<String>, listener: Listener) -> Self {
        self.listeners.insert(event.into(), listener);
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(Some(child.into()));
        self
    }

    /// Conditional child; `None` renders nothing
    pub fn child_opt(mut self, child: Option<impl Into<VNode>>) -> Self {
        self.children.push(child.map(Into::into));
        self
    }

    pub fn children<C: Into<VNode>>(mut self, children: impl IntoIterator<Item = C>) -> Self {
        self.children
            .extend(children.into_iter().map(|c| Some(c.into())));
        self
    }

    /// Children that will actually be rendered
    pub fn rendered_children(&self) -> impl Iterator<Item = &VNode> {
        self.children.iter().flatten()
    }
}

impl From<Element> for VNode {
    fn from(element: Element) -> Self {
        VNode::Element(element)
    }
}

impl From<&str> for VNode {
    fn from(content: &str) -> Self {
        VNode::Text(content.to_string())
    }
}

impl From<String> for VNode {
    fn from(content: String) -> Self {
        VNode::Text(content)
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.tag)
            .field("attrs", &self.attrs)
            .field("styles", &self.styles)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}

impl std::fmt::Debug for VNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VNode::Element(element) => element.fmt(f),
            VNode::Text(content) => f.debug_tuple("Text").field(content).finish(),
        }
    }
}
