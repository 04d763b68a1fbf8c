//! Minimal CSS selector matching over document snapshots.
//!
//! The per-provider rule tables only need a small subset of CSS: tag,
//! `#id`, `.class`, `[attr]`, `[attr=value]`, and the descendant / child
//! combinators. Anything fancier in a live page gets expressed as a
//! fallback chain of simple selectors instead.
//!
//! Queries walk light-DOM descendants only, matching the reach of
//! `querySelectorAll` on a real page. Shadow content is invisible here
//! and only reachable through the deep-text walk.

use crate::dom::{Document, ElementData, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

/// A parsed selector: a chain of compounds joined by combinators.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    /// Leftmost first; the combinator applies between a compound and the
    /// one before it (the first entry's combinator is ignored).
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    /// Parse a selector string. Returns `None` for anything the subset
    /// cannot express; callers treat that as "no matches", never an error.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = Vec::new();
        let mut pending = Combinator::Descendant;
        for token in tokenize(input)? {
            match token {
                Token::Child => {
                    if parts.is_empty() {
                        return None;
                    }
                    pending = Combinator::Child;
                }
                Token::Compound(raw) => {
                    parts.push((pending, parse_compound(&raw)?));
                    pending = Combinator::Descendant;
                }
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(Self { parts })
        }
    }

    /// Whether the element `id` matches the full selector.
    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.matches_from(doc, id, self.parts.len())
    }

    /// Match the first `upto` compounds with the rightmost anchored at `id`.
    fn matches_from(&self, doc: &Document, id: NodeId, upto: usize) -> bool {
        let Some(el) = doc.element(id) else {
            return false;
        };
        let (combinator, compound) = &self.parts[upto - 1];
        if !compound_matches(compound, el) {
            return false;
        }
        if upto == 1 {
            return true;
        }
        match combinator {
            Combinator::Child => match doc.parent(id) {
                Some(parent) => self.matches_from(doc, parent, upto - 1),
                None => false,
            },
            Combinator::Descendant => {
                let mut current = doc.parent(id);
                while let Some(ancestor) = current {
                    if self.matches_from(doc, ancestor, upto - 1) {
                        return true;
                    }
                    current = doc.parent(ancestor);
                }
                false
            }
        }
    }
}

/// All light-DOM descendants of `root` matching `selector`, in document
/// order. An unparseable selector yields no matches.
pub fn query_all(doc: &Document, root: NodeId, selector: &str) -> Vec<NodeId> {
    let Some(parsed) = Selector::parse(selector) else {
        return Vec::new();
    };
    doc.descendant_elements(root)
        .into_iter()
        .filter(|&id| parsed.matches(doc, id))
        .collect()
}

/// Last match in document order, i.e. the most recently appended one.
pub fn query_last(doc: &Document, root: NodeId, selector: &str) -> Option<NodeId> {
    query_all(doc, root, selector).pop()
}

enum Token {
    Child,
    Compound(String),
}

fn tokenize(input: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for ch in input.chars() {
        match ch {
            '[' => {
                in_brackets = true;
                current.push(ch);
            }
            ']' => {
                if !in_brackets {
                    return None;
                }
                in_brackets = false;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_brackets => {
                if !current.is_empty() {
                    tokens.push(Token::Compound(std::mem::take(&mut current)));
                }
            }
            '>' if !in_brackets => {
                if !current.is_empty() {
                    tokens.push(Token::Compound(std::mem::take(&mut current)));
                }
                tokens.push(Token::Child);
            }
            c => current.push(c),
        }
    }
    if in_brackets {
        return None;
    }
    if !current.is_empty() {
        tokens.push(Token::Compound(current));
    }
    Some(tokens)
}

fn parse_compound(raw: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut chars = raw.chars().peekable();
    let mut tag = String::new();
    while let Some(&c) = chars.peek() {
        if c == '#' || c == '.' || c == '[' {
            break;
        }
        tag.push(c);
        chars.next();
    }
    if !tag.is_empty() && tag != "*" {
        compound.tag = Some(tag.to_ascii_lowercase());
    }
    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let name = take_name(&mut chars);
                if name.is_empty() {
                    return None;
                }
                compound.id = Some(name);
            }
            '.' => {
                let name = take_name(&mut chars);
                if name.is_empty() {
                    return None;
                }
                compound.classes.push(name);
            }
            '[' => {
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed || inner.is_empty() {
                    return None;
                }
                let (name, value) = match inner.split_once('=') {
                    Some((n, v)) => (n.trim(), Some(v.trim().trim_matches(|q| q == '"' || q == '\'').to_string())),
                    None => (inner.trim(), None),
                };
                if name.is_empty() {
                    return None;
                }
                compound.attrs.push(AttrTest {
                    name: name.to_string(),
                    value,
                });
            }
            _ => return None,
        }
    }
    if compound == Compound::default() {
        return None;
    }
    Some(compound)
}

fn take_name(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c == '#' || c == '.' || c == '[' {
            break;
        }
        name.push(c);
        chars.next();
    }
    name
}

fn compound_matches(compound: &Compound, el: &ElementData) -> bool {
    if let Some(tag) = &compound.tag {
        if el.tag != *tag {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if el.id.as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    for class in &compound.classes {
        if !el.classes.iter().any(|c| c == class) {
            return false;
        }
    }
    for attr in &compound.attrs {
        match el.attrs.get(&attr.name) {
            Some(actual) => {
                if let Some(expected) = &attr.value {
                    if actual != expected {
                        return false;
                    }
                }
            }
            None => return false,
        }
    }
    true
}
