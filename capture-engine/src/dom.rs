//! DOM snapshot model.
//!
//! The engine never touches a live page directly; the host feed delivers
//! immutable snapshots of the document and the engine works on those.
//! Nodes live in an arena indexed by [`NodeId`] so parent/sibling walks
//! (needed by the path resolver) are cheap and borrow-friendly.
//!
//! Two traversal surfaces exist on purpose:
//! - light-DOM children, reachable by ordinary selector queries;
//! - shadow children, reachable only by explicit deep traversal.
//!
//! Several providers render assistant output inside shadow roots, so the
//! asymmetry between the two is load-bearing for extraction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of a node within its document's arena.
pub type NodeId = usize;

/// Computed-style subset relevant to visibility decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: Option<String>,
    pub visibility: Option<String>,
}

impl ComputedStyle {
    /// Whether this style hides the element and its whole subtree.
    pub fn is_hidden(&self) -> bool {
        self.display.as_deref() == Some("none") || self.visibility.as_deref() == Some("hidden")
    }
}

/// Element payload: tag, identity, attributes, and both child lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementData {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: HashMap<String, String>,
    pub style: ComputedStyle,
    /// Light-DOM children in document order.
    pub children: Vec<NodeId>,
    /// Content of an attached shadow root, empty when there is none.
    pub shadow_children: Vec<NodeId>,
}

/// A single node: element or text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// An immutable-once-built document snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    /// The focused element at snapshot time, if any.
    active_element: Option<NodeId>,
}

impl Document {
    /// Create a document with a single root element of the given tag.
    pub fn new(root_tag: &str) -> Self {
        let root = Node {
            parent: None,
            kind: NodeKind::Element(ElementData {
                tag: root_tag.to_ascii_lowercase(),
                ..ElementData::default()
            }),
        };
        Self {
            nodes: vec![root],
            root: 0,
            active_element: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Element payload of `id`, or `None` for text nodes and bad ids.
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.nodes.get(id)?.kind {
            NodeKind::Element(ref el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.parent
    }

    pub fn active_element(&self) -> Option<NodeId> {
        self.active_element
    }

    pub fn set_active_element(&mut self, id: NodeId) {
        if self.element(id).is_some() {
            self.active_element = Some(id);
        }
    }

    /// Append a light-DOM child element under `parent`. Returns the new id.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.push_node(parent, NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            ..ElementData::default()
        }));
        if let Some(NodeKind::Element(el)) = self.kind_mut(parent) {
            el.children.push(id);
        }
        id
    }

    /// Append an element into `host`'s shadow root, creating the root on
    /// first use.
    pub fn append_shadow_element(&mut self, host: NodeId, tag: &str) -> NodeId {
        let id = self.push_node(host, NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            ..ElementData::default()
        }));
        if let Some(NodeKind::Element(el)) = self.kind_mut(host) {
            el.shadow_children.push(id);
        }
        id
    }

    /// Append a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.push_node(parent, NodeKind::Text(text.to_string()));
        if let Some(NodeKind::Element(el)) = self.kind_mut(parent) {
            el.children.push(id);
        }
        id
    }

    pub fn set_id(&mut self, id: NodeId, value: &str) {
        if let Some(NodeKind::Element(el)) = self.kind_mut(id) {
            el.id = Some(value.to_string());
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(NodeKind::Element(el)) = self.kind_mut(id) {
            el.classes.push(class.to_string());
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(NodeKind::Element(el)) = self.kind_mut(id) {
            el.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn attr<'a>(&'a self, id: NodeId, name: &str) -> Option<&'a str> {
        self.element(id)?.attrs.get(name).map(String::as_str)
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) {
        if let Some(NodeKind::Element(el)) = self.kind_mut(id) {
            match property {
                "display" => el.style.display = Some(value.to_string()),
                "visibility" => el.style.visibility = Some(value.to_string()),
                _ => {}
            }
        }
    }

    /// Light-DOM element descendants of `root` in pre-order, excluding
    /// `root` itself. Shadow content is deliberately not visited.
    pub fn descendant_elements(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.element(root) {
            Some(el) => el.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            if let Some(el) = self.element(id) {
                out.push(id);
                stack.extend(el.children.iter().rev().copied());
            }
        }
        out
    }

    /// The light-DOM sibling list that contains `id` (either the parent's
    /// light children or its shadow children).
    pub fn sibling_list(&self, id: NodeId) -> Option<&[NodeId]> {
        let parent = self.parent(id)?;
        let el = self.element(parent)?;
        if el.children.contains(&id) {
            Some(&el.children)
        } else if el.shadow_children.contains(&id) {
            Some(&el.shadow_children)
        } else {
            None
        }
    }

    fn push_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            kind,
        });
        id
    }

    fn kind_mut(&mut self, id: NodeId) -> Option<&mut NodeKind> {
        self.nodes.get_mut(id).map(|n| &mut n.kind)
    }
}
