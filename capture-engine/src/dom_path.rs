//! DOM path resolver.
//!
//! Computes a human-readable CSS-like locator for an element by walking
//! up to the document root. An `id` on any ancestor anchors the path and
//! stops the walk, on the assumption that ids are unique enough to pin
//! everything above them.

use crate::dom::{Document, NodeId};

/// Locator path for `node`, segments joined root-to-leaf with `" > "`.
///
/// Text nodes resolve through their parent element. Always returns a
/// non-empty string for any node attached to `doc`.
pub fn locate(doc: &Document, node: NodeId) -> String {
    let mut current = if doc.element(node).is_some() {
        Some(node)
    } else {
        doc.parent(node)
    };

    let mut stack: Vec<String> = Vec::new();
    while let Some(id) = current {
        let Some(el) = doc.element(id) else {
            break;
        };
        if let Some(elem_id) = &el.id {
            stack.push(format!("{}#{}", el.tag, elem_id));
            break;
        }
        stack.push(format!("{}:nth-of-type({})", el.tag, nth_of_type(doc, id)));
        current = doc.parent(id);
    }
    stack.reverse();
    stack.join(" > ")
}

/// 1-based position of `id` among preceding siblings sharing its tag.
fn nth_of_type(doc: &Document, id: NodeId) -> usize {
    let Some(el) = doc.element(id) else {
        return 1;
    };
    let Some(siblings) = doc.sibling_list(id) else {
        return 1;
    };
    let mut nth = 1;
    for &sibling in siblings {
        if sibling == id {
            break;
        }
        if doc.element(sibling).map(|s| s.tag == el.tag).unwrap_or(false) {
            nth += 1;
        }
    }
    nth
}
