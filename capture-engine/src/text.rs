//! Deep text extraction.
//!
//! Collects visible text from a subtree including shadow roots. Ordinary
//! selector queries stop at shadow boundaries; several providers render
//! assistant output partly or wholly inside shadow trees, so extraction
//! has to walk them explicitly.

use crate::dom::{Document, NodeId, NodeKind};

/// Visible text of the subtree rooted at `root`.
///
/// Pre-order walk: text nodes contribute trimmed content joined with
/// single spaces; elements whose computed style is `display:none` or
/// `visibility:hidden` are skipped together with their entire subtree;
/// shadow children are walked after light-DOM children, in document
/// order. The result is trimmed.
pub fn deep_text(doc: &Document, root: NodeId) -> String {
    let mut parts: Vec<&str> = Vec::new();
    collect(doc, root, &mut parts);
    parts.join(" ")
}

fn collect<'a>(doc: &'a Document, id: NodeId, parts: &mut Vec<&'a str>) {
    let Some(node) = doc.node(id) else {
        return;
    };
    match &node.kind {
        NodeKind::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed);
            }
        }
        NodeKind::Element(el) => {
            if el.style.is_hidden() {
                return;
            }
            for &child in &el.children {
                collect(doc, child, parts);
            }
            for &child in &el.shadow_children {
                collect(doc, child, parts);
            }
        }
    }
}
