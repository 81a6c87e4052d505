// Page document module
//
// This module models the host page as a shared element tree with a
// structural-mutation event stream. It stands in for the live DOM plus its
// mutation observer: the host side inserts parsed HTML and navigates, the
// filter engine queries and toggles visibility.

use indexmap::IndexMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

mod html;

/// Identifier of an element in the document arena.
///
/// Ids are stable for the lifetime of the document; elements are never
/// removed, matching the insertion-only mutation model the filter observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One element of the page.
///
/// `display` is the inline display override: `None` means the stylesheet
/// default (visible), `Some("none")` means hidden. Hydration seeds it from a
/// `style` attribute when one carries a `display` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: IndexMap<String, String>,
    pub text: String,
    pub display: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// A structural selector against a single element.
///
/// Matches on any combination of tag name, one required class, and one
/// required attribute value. This covers the selector shapes the filter
/// needs (`.TimelineItem`, `a.author`, `a[data-hovercard-type="user"]`)
/// without a full selector engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    tag: Option<String>,
    class: Option<String>,
    attr: Option<(String, String)>,
}

impl Marker {
    /// Match any element carrying the class.
    pub fn class(class: &str) -> Self {
        Self {
            tag: None,
            class: Some(class.to_string()),
            attr: None,
        }
    }

    /// Match elements with the tag name and class.
    pub fn tag_class(tag: &str, class: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            class: Some(class.to_string()),
            attr: None,
        }
    }

    /// Match elements with the tag name and an exact attribute value.
    pub fn tag_attr(tag: &str, name: &str, value: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            class: None,
            attr: Some((name.to_string(), value.to_string())),
        }
    }

    /// Check whether a node satisfies every constraint of this marker.
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if node.tag != *tag {
                return false;
            }
        }
        if let Some(class) = &self.class {
            if !node.classes.iter().any(|c| c == class) {
                return false;
            }
        }
        if let Some((name, value)) = &self.attr {
            if node.attrs.get(name) != Some(value) {
                return false;
            }
        }
        true
    }
}

/// Structural change events emitted by the document.
///
/// These are what a mutation observer would deliver: subtree insertions and
/// in-place navigation. Visibility toggles emit nothing, so the filter's
/// own hiding never re-triggers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// New elements were appended; `roots` are the tops of the inserted
    /// subtrees in insertion order.
    SubtreeInserted { roots: Vec<NodeId> },

    /// The page navigated in place without a reload.
    LocationChanged { url: String },
}

struct DocTree {
    nodes: Vec<Node>,
    location: String,
    visible: bool,
}

/// Shared handle to one page's document.
///
/// The tree lives behind `Arc<RwLock<...>>` so the host side and the filter
/// engine can share it within a page context; clones share the same tree and
/// event channel.
///
/// # Usage
///
/// - Host side: [`insert_html()`](Self::insert_html), [`navigate()`](Self::navigate),
///   [`set_visible()`](Self::set_visible)
/// - Filter side: [`select()`](Self::select), [`closest()`](Self::closest),
///   [`set_display()`](Self::set_display), [`subscribe()`](Self::subscribe)
pub struct Document {
    tree: Arc<RwLock<DocTree>>,

    /// Broadcast channel delivering structural mutations to observers.
    events_tx: broadcast::Sender<PageEvent>,
}

impl Document {
    /// Create an empty document with a bare `body` root.
    ///
    /// # Returns
    /// A new Document with an event channel buffer of 100 mutations
    pub fn new(location: &str) -> Self {
        let (events_tx, _) = broadcast::channel(100);
        let root = Node {
            tag: "body".to_string(),
            classes: Vec::new(),
            attrs: IndexMap::new(),
            text: String::new(),
            display: None,
            parent: None,
            children: Vec::new(),
        };
        Self {
            tree: Arc::new(RwLock::new(DocTree {
                nodes: vec![root],
                location: location.to_string(),
                visible: true,
            })),
            events_tx,
        }
    }

    /// Create a document pre-populated from an HTML fragment.
    ///
    /// Initial hydration emits no mutation events: observers attach after
    /// page load, the same way the live page behaves.
    pub fn from_html(location: &str, html: &str) -> Self {
        let document = Self::new(location);
        {
            let mut tree = document.tree.write().unwrap();
            let root = document.root();
            for parsed in html::parse_fragment(html) {
                attach(&mut tree.nodes, root, parsed);
            }
        }
        document
    }

    /// The root element of the document.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Subscribe to structural mutation events.
    ///
    /// Multiple observers can listen simultaneously; re-subscribing restarts
    /// observation after a dropped receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events_tx.subscribe()
    }

    /// Current page URL.
    pub fn location(&self) -> String {
        self.tree.read().unwrap().location.clone()
    }

    /// Rewrite the URL in place and emit [`PageEvent::LocationChanged`].
    pub fn navigate(&self, url: &str) {
        {
            let mut tree = self.tree.write().unwrap();
            tree.location = url.to_string();
        }
        // Ignore send errors - it's OK if no one is listening
        let _ = self.events_tx.send(PageEvent::LocationChanged {
            url: url.to_string(),
        });
    }

    /// Whether the page is currently visible to the user.
    pub fn is_visible(&self) -> bool {
        self.tree.read().unwrap().visible
    }

    /// Toggle page visibility (the `document.hidden` analog).
    pub fn set_visible(&self, visible: bool) {
        self.tree.write().unwrap().visible = visible;
    }

    /// Parse an HTML fragment and append it under `parent`.
    ///
    /// Emits one [`PageEvent::SubtreeInserted`] carrying the roots of the
    /// inserted subtrees.
    ///
    /// # Returns
    /// The ids of the inserted top-level elements, in insertion order.
    pub fn insert_html(&self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let roots = {
            let mut tree = self.tree.write().unwrap();
            html::parse_fragment(html)
                .into_iter()
                .map(|parsed| attach(&mut tree.nodes, parent, parsed))
                .collect::<Vec<_>>()
        };

        if !roots.is_empty() {
            let _ = self.events_tx.send(PageEvent::SubtreeInserted {
                roots: roots.clone(),
            });
        }
        roots
    }

    /// Get a snapshot of one element.
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.tree.read().unwrap().nodes.get(id.0).cloned()
    }

    /// Current inline display override of an element.
    pub fn display(&self, id: NodeId) -> Option<String> {
        self.tree
            .read()
            .unwrap()
            .nodes
            .get(id.0)
            .and_then(|node| node.display.clone())
    }

    /// Set or clear an element's inline display override.
    ///
    /// Emits no mutation event. The observer watches structure, not style,
    /// so hiding an element here does not re-trigger a scan.
    pub fn set_display(&self, id: NodeId, display: Option<String>) {
        let mut tree = self.tree.write().unwrap();
        if let Some(node) = tree.nodes.get_mut(id.0) {
            node.display = display;
        }
    }

    /// True when the element's display override is `none`.
    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.display(id).as_deref() == Some("none")
    }

    /// All elements matching any of the markers, in document order.
    pub fn select(&self, markers: &[Marker]) -> Vec<NodeId> {
        let tree = self.tree.read().unwrap();
        let mut out = Vec::new();
        collect_matches(&tree.nodes, NodeId(0), markers, &mut out);
        out
    }

    /// Descendants of `root` matching any of the markers, in document order.
    ///
    /// `root` itself is excluded, matching scoped query semantics.
    pub fn select_within(&self, root: NodeId, markers: &[Marker]) -> Vec<NodeId> {
        let tree = self.tree.read().unwrap();
        let mut out = Vec::new();
        if let Some(node) = tree.nodes.get(root.0) {
            for &child in &node.children {
                collect_matches(&tree.nodes, child, markers, &mut out);
            }
        }
        out
    }

    /// Nearest element matching any marker, starting at `id` itself and
    /// walking ancestors.
    pub fn closest(&self, id: NodeId, markers: &[Marker]) -> Option<NodeId> {
        let tree = self.tree.read().unwrap();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = tree.nodes.get(node_id.0)?;
            if markers.iter().any(|marker| marker.matches(node)) {
                return Some(node_id);
            }
            current = node.parent;
        }
        None
    }

    /// True when `root` or any descendant matches one of the markers.
    pub fn subtree_matches(&self, root: NodeId, markers: &[Marker]) -> bool {
        let tree = self.tree.read().unwrap();
        subtree_matches_inner(&tree.nodes, root, markers)
    }

    /// Concatenated text of the element's subtree (the `textContent` analog).
    pub fn text_content(&self, id: NodeId) -> String {
        let tree = self.tree.read().unwrap();
        let mut out = String::new();
        collect_text(&tree.nodes, id, &mut out);
        out
    }
}

// Make Document cloneable for sharing between the host side and the filter
impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            events_tx: self.events_tx.clone(),
        }
    }
}

fn attach(nodes: &mut Vec<Node>, parent: NodeId, parsed: html::ParsedNode) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push(Node {
        tag: parsed.tag,
        classes: parsed.classes,
        attrs: parsed.attrs,
        text: parsed.text,
        display: parsed.display,
        parent: Some(parent),
        children: Vec::new(),
    });
    nodes[parent.0].children.push(id);
    for child in parsed.children {
        attach(nodes, id, child);
    }
    id
}

fn collect_matches(nodes: &[Node], id: NodeId, markers: &[Marker], out: &mut Vec<NodeId>) {
    if let Some(node) = nodes.get(id.0) {
        if markers.iter().any(|marker| marker.matches(node)) {
            out.push(id);
        }
        for &child in &node.children {
            collect_matches(nodes, child, markers, out);
        }
    }
}

fn subtree_matches_inner(nodes: &[Node], id: NodeId, markers: &[Marker]) -> bool {
    if let Some(node) = nodes.get(id.0) {
        if markers.iter().any(|marker| marker.matches(node)) {
            return true;
        }
        node.children
            .iter()
            .any(|&child| subtree_matches_inner(nodes, child, markers))
    } else {
        false
    }
}

fn collect_text(nodes: &[Node], id: NodeId, out: &mut String) {
    if let Some(node) = nodes.get(id.0) {
        out.push_str(&node.text);
        for &child in &node.children {
            collect_text(nodes, child, out);
        }
    }
}
