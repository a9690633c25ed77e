//! Tree reconciliation
//!
//! Unkeyed, index-aligned diffing:
//! - different node type or tag: rebuild the subtree in place
//! - same tag: diff attributes, styles and listeners key by key, then children
//! - children: recurse on shared indices, remove surplus old, append surplus new
//!
//! Patching a tree onto an identical tree issues no backend calls at all.
//! Listeners are attached once per (node, event) through a forwarding
//! callback; a new closure for the same event only swaps the slot it reads.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::backend::Backend;
use super::{Element, Listener, VNode};

/// Counts of backend calls issued by one patch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    /// Nodes built from scratch (whole subtrees count every node)
    pub created: usize,
    /// Subtrees rebuilt because the node type or tag changed
    pub replaced: usize,
    pub appended: usize,
    pub removed: usize,
    pub attributes: usize,
    pub styles: usize,
    pub listeners: usize,
    pub texts: usize,
}

impl PatchStats {
    /// Total mutations, excluding node creation
    pub fn mutations(&self) -> usize {
        self.replaced
            + self.appended
            + self.removed
            + self.attributes
            + self.styles
            + self.listeners
            + self.texts
    }

    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.mutations() == 0
    }
}

/// Listener currently behind one attached forwarding callback
type ListenerSlot = Rc<RefCell<Listener>>;

enum Shape {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        styles: BTreeMap<String, String>,
        listeners: BTreeMap<String, ListenerSlot>,
    },
    Text(String),
}

/// Live output node paired with the declaration it currently reflects
pub struct RetainedNode<N> {
    handle: N,
    shape: Shape,
    children: Vec<RetainedNode<N>>,
}

impl<N> RetainedNode<N> {
    pub fn handle(&self) -> &N {
        &self.handle
    }

    pub fn children(&self) -> &[RetainedNode<N>] {
        &self.children
    }

    pub fn is_text(&self) -> bool {
        matches!(self.shape, Shape::Text(_))
    }
}

/// Bring `old` in line with `new` under `parent`, returning the retained node
/// now standing for `new`. With no `old` the tree is built and appended.
pub fn patch<B: Backend>(
    backend: &mut B,
    parent: &B::Node,
    old: Option<RetainedNode<B::Node>>,
    new: &VNode,
    stats: &mut PatchStats,
) -> RetainedNode<B::Node> {
    match old {
        Some(mut retained) => {
            patch_node(backend, parent, &mut retained, new, stats);
            retained
        }
        None => {
            let built = build(backend, new, stats);
            backend.append_child(parent, &built.handle);
            stats.appended += 1;
            built
        }
    }
}

fn build<B: Backend>(backend: &mut B, vnode: &VNode, stats: &mut PatchStats) -> RetainedNode<B::Node> {
    stats.created += 1;
    match vnode {
        VNode::Text(content) => RetainedNode {
            handle: backend.create_text(content),
            shape: Shape::Text(content.clone()),
            children: Vec::new(),
        },
        VNode::Element(element) => {
            let handle = backend.create_element(&element.tag);
            for (name, value) in &element.attrs {
                backend.set_attribute(&handle, name, value);
            }
            for (name, value) in &element.styles {
                backend.set_style(&handle, name, value);
            }
            let mut listeners = BTreeMap::new();
            for (event, listener) in &element.listeners {
                listeners.insert(event.clone(), attach(backend, &handle, event, listener));
            }
            let mut children = Vec::new();
            for child in element.rendered_children() {
                let built = build(backend, child, stats);
                backend.append_child(&handle, &built.handle);
                children.push(built);
            }
            RetainedNode {
                handle,
                shape: Shape::Element {
                    tag: element.tag.clone(),
                    attrs: element.attrs.clone(),
                    styles: element.styles.clone(),
                    listeners,
                },
                children,
            }
        }
    }
}

fn patch_node<B: Backend>(
    backend: &mut B,
    parent: &B::Node,
    retained: &mut RetainedNode<B::Node>,
    new: &VNode,
    stats: &mut PatchStats,
) {
    let same_kind = match (&retained.shape, new) {
        (Shape::Text(_), VNode::Text(_)) => true,
        (Shape::Element { tag, .. }, VNode::Element(element)) => *tag == element.tag,
        _ => false,
    };

    if !same_kind {
        let fresh = build(backend, new, stats);
        backend.replace_child(parent, &retained.handle, &fresh.handle);
        stats.replaced += 1;
        *retained = fresh;
        return;
    }

    let handle = retained.handle.clone();
    match (&mut retained.shape, new) {
        (Shape::Text(current), VNode::Text(content)) => {
            if *current != *content {
                backend.set_text(&handle, content);
                stats.texts += 1;
                *current = content.clone();
            }
        }
        (
            Shape::Element {
                attrs,
                styles,
                listeners,
                ..
            },
            VNode::Element(element),
        ) => {
            stats.attributes += diff_map(attrs, &element.attrs, |name, value| match value {
                Some(value) => backend.set_attribute(&handle, name, value),
                None => backend.remove_attribute(&handle, name),
            });
            stats.styles += diff_map(styles, &element.styles, |name, value| match value {
                Some(value) => backend.set_style(&handle, name, value),
                None => backend.remove_style(&handle, name),
            });
            stats.listeners += diff_listeners(backend, &handle, listeners, &element.listeners);
        }
        _ => unreachable!("node kinds checked above"),
    }

    if let VNode::Element(element) = new {
        patch_children(backend, retained, element, stats);
    }
}

/// Set changed keys, remove vanished ones (`apply(name, None)`).
/// `current` ends equal to `next`.
fn diff_map(
    current: &mut BTreeMap<String, String>,
    next: &BTreeMap<String, String>,
    mut apply: impl FnMut(&str, Option<&str>),
) -> usize {
    let mut count = 0;
    current.retain(|name, _| {
        let keep = next.contains_key(name);
        if !keep {
            apply(name.as_str(), None);
            count += 1;
        }
        keep
    });
    for (name, value) in next {
        if current.get(name) != Some(value) {
            apply(name.as_str(), Some(value.as_str()));
            current.insert(name.clone(), value.clone());
            count += 1;
        }
    }
    count
}

/// Attach a forwarding callback for `event` that calls whatever the
/// returned slot holds at dispatch time
fn attach<B: Backend>(
    backend: &mut B,
    handle: &B::Node,
    event: &str,
    listener: &Listener,
) -> ListenerSlot {
    let slot: ListenerSlot = Rc::new(RefCell::new(Rc::clone(listener)));
    let target = Rc::clone(&slot);
    let forward: Listener = Rc::new(move || {
        // Clone out first: the listener may cause the slot to be swapped.
        let listener = Rc::clone(&*target.borrow());
        listener();
    });
    backend.add_listener(handle, event, &forward);
    slot
}

/// Only events that appear or disappear reach the backend
fn diff_listeners<B: Backend>(
    backend: &mut B,
    handle: &B::Node,
    current: &mut BTreeMap<String, ListenerSlot>,
    next: &BTreeMap<String, Listener>,
) -> usize {
    let mut count = 0;
    current.retain(|event, slot| match next.get(event) {
        Some(incoming) => {
            if !Rc::ptr_eq(&*slot.borrow(), incoming) {
                *slot.borrow_mut() = Rc::clone(incoming);
            }
            true
        }
        None => {
            backend.remove_listener(handle, event);
            count += 1;
            false
        }
    });
    for (event, listener) in next {
        if !current.contains_key(event) {
            current.insert(event.clone(), attach(backend, handle, event, listener));
            count += 1;
        }
    }
    count
}

fn patch_children<B: Backend>(
    backend: &mut B,
    retained: &mut RetainedNode<B::Node>,
    element: &Element,
    stats: &mut PatchStats,
) {
    let handle = retained.handle.clone();
    let next: Vec<&VNode> = element.rendered_children().collect();
    let shared = retained.children.len().min(next.len());

    for (child, vnode) in retained.children.iter_mut().zip(&next) {
        patch_node(backend, &handle, child, vnode, stats);
    }

    for surplus in retained.children.drain(shared..) {
        backend.remove_child(&handle, &surplus.handle);
        stats.removed += 1;
    }

    for vnode in &next[shared..] {
        let built = build(backend, vnode, stats);
        backend.append_child(&handle, &built.handle);
        stats.appended += 1;
        retained.children.push(built);
    }
}

/// Owns the retained tree mounted under a host node
pub struct Reconciler<B: Backend> {
    backend: B,
    mount: B::Node,
    root: Option<RetainedNode<B::Node>>,
}

impl<B: Backend> Reconciler<B> {
    /// `mount` is an existing output node. Whatever it holds stands for the
    /// old tree of the first patch, which replaces it.
    pub fn new(backend: B, mount: B::Node) -> Self {
        Self {
            backend,
            mount,
            root: None,
        }
    }

    /// Reconcile the retained tree with `next`
    pub fn patch(&mut self, next: &VNode) -> PatchStats {
        let mut stats = PatchStats::default();
        if self.root.is_none() {
            for stale in self.backend.child_nodes(&self.mount) {
                self.backend.remove_child(&self.mount, &stale);
                stats.removed += 1;
            }
        }
        let old = self.root.take();
        let root = patch(&mut self.backend, &self.mount, old, next, &mut stats);
        self.root = Some(root);
        stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn mount_point(&self) -> &B::Node {
        &self.mount
    }

    /// Root of the retained tree, once something has been rendered
    pub fn root(&self) -> Option<&RetainedNode<B::Node>> {
        self.root.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::{MemoryBackend, NodeId, NodeSnapshot, h, text};
    use proptest::prelude::*;

    fn mounted() -> Reconciler<MemoryBackend> {
        let mut backend = MemoryBackend::new();
        let mount = backend.create_root("main");
        Reconciler::new(backend, mount)
    }

    fn rendered(reconciler: &Reconciler<MemoryBackend>) -> NodeSnapshot {
        let root: NodeId = *reconciler.root().unwrap().handle();
        reconciler.backend().snapshot(root)
    }

    fn board(invader_x: u32, game_over: bool) -> VNode {
        h("div")
            .class("board")
            .child(
                h("div")
                    .class("invader")
                    .style("left", format!("{}px", invader_x * 20))
                    .style("top", "0px"),
            )
            .child_opt(game_over.then(|| h("div").class("game-over").child("Game Over")))
            .into()
    }

    #[test]
    fn test_identical_patch_is_free() {
        let mut reconciler = mounted();
        reconciler.patch(&board(3, true));
        let before = reconciler.backend().mutation_count();

        let stats = reconciler.patch(&board(3, true));
        assert!(stats.is_empty(), "{stats:?}");
        assert_eq!(reconciler.backend().mutation_count(), before);
    }

    #[test]
    fn test_style_change_touches_one_key() {
        let mut reconciler = mounted();
        reconciler.patch(&board(3, false));

        let stats = reconciler.patch(&board(4, false));
        assert_eq!(stats.styles, 1);
        assert_eq!(stats.mutations(), 1);
        assert_eq!(rendered(&reconciler), NodeSnapshot::of_vnode(&board(4, false)));
    }

    #[test]
    fn test_conditional_child_appends_and_removes() {
        let mut reconciler = mounted();
        reconciler.patch(&board(0, false));

        let stats = reconciler.patch(&board(0, true));
        assert_eq!(stats.appended, 1);
        assert_eq!(stats.created, 2);

        let stats = reconciler.patch(&board(0, false));
        assert_eq!(stats.removed, 1);
        assert_eq!(rendered(&reconciler), NodeSnapshot::of_vnode(&board(0, false)));
    }

    #[test]
    fn test_tag_change_replaces_subtree() {
        let mut reconciler = mounted();
        reconciler.patch(&h("div").child(h("span").child("a")).into());
        let stats = reconciler.patch(&h("div").child(h("p").child("a")).into());
        assert_eq!(stats.replaced, 1);
        assert_eq!(stats.created, 2);

        let root = *reconciler.root().unwrap().handle();
        let child = reconciler.backend().children(root)[0];
        assert_eq!(reconciler.backend().tag(child), Some("p"));
    }

    #[test]
    fn test_root_replacement_swaps_under_mount() {
        let mut reconciler = mounted();
        reconciler.patch(&text("loading"));
        reconciler.patch(&h("section").into());

        let mount = *reconciler.mount_point();
        let children = reconciler.backend().children(mount);
        assert_eq!(children.len(), 1);
        assert_eq!(reconciler.backend().tag(children[0]), Some("section"));
    }

    #[test]
    fn test_text_updates_in_place() {
        let mut reconciler = mounted();
        reconciler.patch(&h("p").child("Score: 1").into());
        let stats = reconciler.patch(&h("p").child("Score: 2").into());
        assert_eq!(stats.texts, 1);
        assert_eq!(stats.created, 0);
    }

    #[test]
    fn test_same_listener_is_not_reattached() {
        let shared: Listener = Rc::new(|| {});
        let view = |l: &Listener| -> VNode { h("button").on_shared("click", l.clone()).into() };

        let mut reconciler = mounted();
        reconciler.patch(&view(&shared));
        assert_eq!(reconciler.patch(&view(&shared)).listeners, 0);
    }

    #[test]
    fn test_fresh_closures_swap_in_place() {
        let clicks = Rc::new(std::cell::RefCell::new(Vec::new()));
        let view = |frame: u32| -> VNode {
            let sink = clicks.clone();
            h("div")
                .child(h("button").on("click", move || sink.borrow_mut().push(frame)))
                .into()
        };

        let mut reconciler = mounted();
        reconciler.patch(&view(1));
        let before = reconciler.backend().mutation_count();
        let stats = reconciler.patch(&view(2));
        assert!(stats.is_empty(), "{stats:?}");
        assert_eq!(reconciler.backend().mutation_count(), before);

        let root = *reconciler.root().unwrap().handle();
        let button = reconciler.backend().children(root)[0];
        assert!(reconciler.backend().dispatch(button, "click"));
        assert_eq!(*clicks.borrow(), vec![2]);
    }

    #[test]
    fn test_listener_added_and_removed_by_event() {
        let mut reconciler = mounted();
        reconciler.patch(&h("button").on("click", || {}).into());

        let stats = reconciler.patch(&h("button").on("click", || {}).on("keydown", || {}).into());
        assert_eq!(stats.listeners, 1);

        let stats = reconciler.patch(&h("button").on("keydown", || {}).into());
        assert_eq!(stats.listeners, 1);
        let button = *reconciler.root().unwrap().handle();
        assert!(!reconciler.backend().dispatch(button, "click"));
        assert!(reconciler.backend().dispatch(button, "keydown"));
    }

    #[test]
    fn test_first_patch_replaces_mount_content() {
        let mut backend = MemoryBackend::new();
        let mount = backend.create_root("main");
        let loading = backend.create_text("Loading...");
        backend.append_child(&mount, &loading);
        let mut reconciler = Reconciler::new(backend, mount);

        let stats = reconciler.patch(&h("section").child("ready").into());
        assert_eq!(stats.removed, 1);
        let children = reconciler.backend().children(mount);
        assert_eq!(children.len(), 1);
        assert_eq!(reconciler.backend().tag(children[0]), Some("section"));
        assert_eq!(reconciler.backend().text_content(mount), "ready");

        // Later patches leave the mount alone.
        let stats = reconciler.patch(&h("section").child("ready").into());
        assert!(stats.is_empty());
    }

    #[test]
    fn test_rebuilt_subtrees_are_freed() {
        let view = |frame: u32| -> VNode {
            let tag = if frame % 2 == 0 { "span" } else { "p" };
            h("div").child(h(tag).child("x")).into()
        };

        let mut reconciler = mounted();
        reconciler.patch(&view(0));
        let live = reconciler.backend().live_nodes();
        for frame in 1..1000 {
            reconciler.patch(&view(frame));
        }
        // mount + div + child + text
        assert_eq!(live, 4);
        assert_eq!(reconciler.backend().live_nodes(), live);
    }

    #[test]
    fn test_dispatch_reaches_current_listener() {
        let clicks = Rc::new(std::cell::Cell::new(0));
        let counter = clicks.clone();
        let mut reconciler = mounted();
        reconciler.patch(
            &h("button")
                .on("click", move || counter.set(counter.get() + 1))
                .into(),
        );

        let button = *reconciler.root().unwrap().handle();
        assert!(reconciler.backend().dispatch(button, "click"));
        assert!(!reconciler.backend().dispatch(button, "keydown"));
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn test_removed_attribute_is_removed() {
        let mut reconciler = mounted();
        reconciler.patch(&h("input").attr("disabled", "true").attr("type", "text").into());
        let stats = reconciler.patch(&h("input").attr("type", "text").into());
        assert_eq!(stats.attributes, 1);

        let root = *reconciler.root().unwrap().handle();
        assert_eq!(reconciler.backend().attribute(root, "disabled"), None);
        assert_eq!(reconciler.backend().attribute(root, "type"), Some("text"));
    }

    fn arb_vnode() -> impl Strategy<Value = VNode> {
        let leaf = prop_oneof![
            "[a-c]{0,3}".prop_map(text),
            prop::sample::select(vec!["div", "span", "p"]).prop_map(|tag| VNode::from(h(tag))),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            (
                prop::sample::select(vec!["div", "span", "p"]),
                prop::collection::btree_map("[xy]", "[0-2]", 0..3),
                prop::collection::btree_map("[lt]", "[0-2]", 0..2),
                prop::collection::btree_set("click|keydown", 0..2),
                prop::collection::vec(prop::option::weighted(0.8, inner), 0..4),
            )
                .prop_map(|(tag, attrs, styles, events, children)| {
                    let listeners = events
                        .into_iter()
                        .map(|event| (event, Rc::new(|| {}) as Listener))
                        .collect();
                    VNode::Element(Element {
                        tag: tag.to_string(),
                        attrs,
                        styles,
                        listeners,
                        children,
                    })
                })
        })
    }

    /// Same tree with every listener replaced by a new closure
    fn rebuild(vnode: &VNode) -> VNode {
        match vnode {
            VNode::Text(content) => text(content.clone()),
            VNode::Element(element) => VNode::Element(Element {
                listeners: element
                    .listeners
                    .keys()
                    .map(|event| (event.clone(), Rc::new(|| {}) as Listener))
                    .collect(),
                children: element
                    .children
                    .iter()
                    .map(|child| child.as_ref().map(rebuild))
                    .collect(),
                ..element.clone()
            }),
        }
    }

    proptest! {
        #[test]
        fn prop_patch_converges_to_fresh_build(a in arb_vnode(), b in arb_vnode()) {
            let mut reconciler = mounted();
            reconciler.patch(&a);
            reconciler.patch(&b);
            prop_assert_eq!(rendered(&reconciler), NodeSnapshot::of_vnode(&b));

            let again = reconciler.patch(&b);
            prop_assert!(again.is_empty(), "{:?}", again);

            // A re-render allocates new closures; still nothing to do.
            let rebuilt = rebuild(&b);
            prop_assert!(reconciler.patch(&rebuilt).is_empty());
        }
    }
}
