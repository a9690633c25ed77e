//! Output tree backends
//!
//! The reconciler never touches an output tree directly; every mutation goes
//! through a [`Backend`]. [`MemoryBackend`] keeps the tree in an arena and is
//! what native builds and tests render into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Listener, VNode};

/// Mutation primitives of a retained output tree
pub trait Backend {
    /// Handle to a live output node
    type Node: Clone;

    fn create_element(&mut self, tag: &str) -> Self::Node;
    fn create_text(&mut self, content: &str) -> Self::Node;
    fn set_text(&mut self, node: &Self::Node, content: &str);
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);
    fn remove_attribute(&mut self, node: &Self::Node, name: &str);
    fn set_style(&mut self, node: &Self::Node, name: &str, value: &str);
    fn remove_style(&mut self, node: &Self::Node, name: &str);
    fn add_listener(&mut self, node: &Self::Node, event: &str, listener: &Listener);
    fn remove_listener(&mut self, node: &Self::Node, event: &str);
    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node);
    fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node);
    fn replace_child(&mut self, parent: &Self::Node, old: &Self::Node, new: &Self::Node);
    /// Current children of `node`, in order
    fn child_nodes(&self, node: &Self::Node) -> Vec<Self::Node>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

enum MemKind {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        styles: BTreeMap<String, String>,
        listeners: BTreeMap<String, Listener>,
    },
    Text(String),
}

struct MemNode {
    kind: MemKind,
    children: Vec<NodeId>,
}

/// Structural view of an output (or declarative) tree, for comparison and
/// serialization. Listeners are reduced to their event names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSnapshot {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        styles: BTreeMap<String, String>,
        listeners: Vec<String>,
        children: Vec<NodeSnapshot>,
    },
    Text(String),
}

impl NodeSnapshot {
    /// The shape a from-scratch construction of `vnode` would have
    pub fn of_vnode(vnode: &VNode) -> Self {
        match vnode {
            VNode::Text(content) => NodeSnapshot::Text(content.clone()),
            VNode::Element(element) => NodeSnapshot::Element {
                tag: element.tag.clone(),
                attrs: element.attrs.clone(),
                styles: element.styles.clone(),
                listeners: element.listeners.keys().cloned().collect(),
                children: element
                    .rendered_children()
                    .map(NodeSnapshot::of_vnode)
                    .collect(),
            },
        }
    }
}

/// Arena-backed output tree.
///
/// Detaching a node through `remove_child` or `replace_child` frees its whole
/// subtree; freed slots are reused by later allocations, so a freed `NodeId`
/// must not be used again.
pub struct MemoryBackend {
    nodes: Vec<MemNode>,
    free: Vec<usize>,
    mutations: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            mutations: 0,
        }
    }

    /// Create a detached container to mount into
    pub fn create_root(&mut self, tag: &str) -> NodeId {
        let id = self.create_element(tag);
        // Mount points are not part of any patch.
        self.mutations -= 1;
        id
    }

    /// Number of mutating calls made so far
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    /// Allocated nodes, attached or not, excluding freed slots
    pub fn live_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            MemKind::Element { tag, .. } => Some(tag),
            MemKind::Text(_) => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            MemKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            MemKind::Text(_) => None,
        }
    }

    pub fn style(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            MemKind::Element { styles, .. } => styles.get(name).map(String::as_str),
            MemKind::Text(_) => None,
        }
    }

    /// Concatenated text of a subtree
    pub fn text_content(&self, node: NodeId) -> String {
        match &self.nodes[node.0].kind {
            MemKind::Text(content) => content.clone(),
            MemKind::Element { .. } => self.nodes[node.0]
                .children
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
        }
    }

    /// First element in document order carrying `class` in its class list
    pub fn find_by_class(&self, root: NodeId, class: &str) -> Option<NodeId> {
        let has_class = self
            .attribute(root, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class));
        if has_class {
            return Some(root);
        }
        self.nodes[root.0]
            .children
            .iter()
            .find_map(|child| self.find_by_class(*child, class))
    }

    /// Invoke the listener bound to `event` on `node`. Returns false if none.
    pub fn dispatch(&self, node: NodeId, event: &str) -> bool {
        let listener = match &self.nodes[node.0].kind {
            MemKind::Element { listeners, .. } => listeners.get(event).cloned(),
            MemKind::Text(_) => None,
        };
        match listener {
            Some(listener) => {
                listener();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, node: NodeId) -> NodeSnapshot {
        let mem = &self.nodes[node.0];
        match &mem.kind {
            MemKind::Text(content) => NodeSnapshot::Text(content.clone()),
            MemKind::Element {
                tag,
                attrs,
                styles,
                listeners,
            } => NodeSnapshot::Element {
                tag: tag.clone(),
                attrs: attrs.clone(),
                styles: styles.clone(),
                listeners: listeners.keys().cloned().collect(),
                children: mem.children.iter().map(|c| self.snapshot(*c)).collect(),
            },
        }
    }

    fn alloc(&mut self, kind: MemKind) -> NodeId {
        self.mutations += 1;
        let node = MemNode {
            kind,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                NodeId(index)
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Return a detached subtree's slots to the free list
    fn release(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = std::mem::replace(
                &mut self.nodes[id.0],
                MemNode {
                    kind: MemKind::Text(String::new()),
                    children: Vec::new(),
                },
            );
            stack.extend(node.children);
            self.free.push(id.0);
        }
    }

    fn element_parts(
        &mut self,
        node: NodeId,
    ) -> Option<(
        &mut BTreeMap<String, String>,
        &mut BTreeMap<String, String>,
        &mut BTreeMap<String, Listener>,
    )> {
        self.mutations += 1;
        match &mut self.nodes[node.0].kind {
            MemKind::Element {
                attrs,
                styles,
                listeners,
                ..
            } => Some((attrs, styles, listeners)),
            MemKind::Text(_) => {
                log::warn!("Element mutation on text node {:?} ignored", node);
                None
            }
        }
    }
}

impl Backend for MemoryBackend {
    type Node = NodeId;

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(MemKind::Element {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            styles: BTreeMap::new(),
            listeners: BTreeMap::new(),
        })
    }

    fn create_text(&mut self, content: &str) -> NodeId {
        self.alloc(MemKind::Text(content.to_string()))
    }

    fn set_text(&mut self, node: &NodeId, content: &str) {
        self.mutations += 1;
        if let MemKind::Text(existing) = &mut self.nodes[node.0].kind {
            *existing = content.to_string();
        }
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) {
        if let Some((attrs, _, _)) = self.element_parts(*node) {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&mut self, node: &NodeId, name: &str) {
        if let Some((attrs, _, _)) = self.element_parts(*node) {
            attrs.remove(name);
        }
    }

    fn set_style(&mut self, node: &NodeId, name: &str, value: &str) {
        if let Some((_, styles, _)) = self.element_parts(*node) {
            styles.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_style(&mut self, node: &NodeId, name: &str) {
        if let Some((_, styles, _)) = self.element_parts(*node) {
            styles.remove(name);
        }
    }

    fn add_listener(&mut self, node: &NodeId, event: &str, listener: &Listener) {
        if let Some((_, _, listeners)) = self.element_parts(*node) {
            listeners.insert(event.to_string(), listener.clone());
        }
    }

    fn remove_listener(&mut self, node: &NodeId, event: &str) {
        if let Some((_, _, listeners)) = self.element_parts(*node) {
            listeners.remove(event);
        }
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.mutations += 1;
        self.nodes[parent.0].children.push(*child);
    }

    fn remove_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.mutations += 1;
        let children = &mut self.nodes[parent.0].children;
        if let Some(index) = children.iter().position(|c| c == child) {
            children.remove(index);
            self.release(*child);
        }
    }

    fn replace_child(&mut self, parent: &NodeId, old: &NodeId, new: &NodeId) {
        self.mutations += 1;
        let children = &mut self.nodes[parent.0].children;
        match children.iter().position(|c| c == old) {
            Some(index) => {
                children[index] = *new;
                self.release(*old);
            }
            None => children.push(*new),
        }
    }

    fn child_nodes(&self, node: &NodeId) -> Vec<NodeId> {
        self.nodes[node.0].children.clone()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("nodes", &self.live_nodes())
            .field("mutations", &self.mutations)
            .finish()
    }
}
