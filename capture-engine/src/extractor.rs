//! Interaction extraction with signature-based duplicate suppression.
//!
//! Mutation storms call [`InteractionExtractor::try_extract`] far more
//! often than the page produces new output; the signature check is what
//! turns that noise into discrete interaction events. The signature is a
//! 200-character prefix of the output text (configurable). Two distinct
//! long outputs sharing a prefix would be treated as duplicates; that
//! false-negative risk is an accepted tradeoff, not something to fix
//! here by hashing the whole text.

use crate::dom::{Document, NodeId};
use crate::provider::ExtractionRules;
use crate::selector::{query_all, query_last};
use crate::text::deep_text;
use crate::types::{now_iso8601, page_origin, Interaction, InteractionOutput};
use tracing::{debug, trace};

/// An extracted interaction plus the container it came from, so the
/// harvester can scan the same subtree for attachments.
#[derive(Debug, Clone)]
pub struct InteractionDraft {
    pub interaction: Interaction,
    pub output_container: NodeId,
}

/// Stateful extractor; one instance per tab session.
pub struct InteractionExtractor {
    signature_prefix_chars: usize,
    last_output_signature: Option<String>,
}

impl InteractionExtractor {
    pub fn new(signature_prefix_chars: usize) -> Self {
        Self {
            signature_prefix_chars,
            last_output_signature: None,
        }
    }

    /// Forget the last emitted signature, so the next extraction treats
    /// the page as fresh. Called when capture stops or the page reloads.
    pub fn reset(&mut self) {
        self.last_output_signature = None;
    }

    /// Extract the latest interaction from `doc`, or `None` when there is
    /// no non-empty assistant output or it matches the last emitted
    /// signature. An extraction miss is a normal outcome, not an error.
    pub fn try_extract(
        &mut self,
        rules: &ExtractionRules,
        doc: &Document,
        page_url: &str,
    ) -> Option<InteractionDraft> {
        let (container, output_text) = latest_match(doc, &rules.assistant_selectors)?;

        let signature: String = output_text
            .chars()
            .take(self.signature_prefix_chars)
            .collect();
        if self.last_output_signature.as_deref() == Some(signature.as_str()) {
            trace!("output signature unchanged, suppressing emission");
            return None;
        }
        self.last_output_signature = Some(signature);

        let input = latest_match(doc, &rules.user_selectors)
            .map(|(_, text)| text)
            .or_else(|| fallback_input(doc))
            .unwrap_or_default();

        let model_version = rules
            .model_selector
            .as_deref()
            .and_then(|selector| query_last(doc, doc.root(), selector))
            .map(|node| deep_text(doc, node))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        debug!(
            "extracted interaction ({} chars output, model {})",
            output_text.len(),
            model_version
        );

        Some(InteractionDraft {
            interaction: Interaction {
                url: page_origin(page_url),
                input,
                output: InteractionOutput::Text(output_text),
                model_version,
                timestamp: now_iso8601(),
            },
            output_container: container,
        })
    }
}

/// Last DOM match with non-empty deep text across an ordered selector
/// candidate list. A selector whose last match extracts empty falls
/// through to the next candidate.
fn latest_match(doc: &Document, selectors: &[String]) -> Option<(NodeId, String)> {
    for selector in selectors {
        if let Some(node) = query_last(doc, doc.root(), selector) {
            let text = deep_text(doc, node);
            if !text.is_empty() {
                return Some((node, text));
            }
        }
    }
    None
}

/// Fallback prompt source: the focused input/textarea value, or the value
/// of the page's only textarea.
fn fallback_input(doc: &Document) -> Option<String> {
    if let Some(active) = doc.active_element() {
        let el = doc.element(active)?;
        if el.tag == "textarea" || el.tag == "input" {
            return input_value(doc, active);
        }
    }
    let textareas = query_all(doc, doc.root(), "textarea");
    if let [only] = textareas.as_slice() {
        return input_value(doc, *only);
    }
    None
}

fn input_value(doc: &Document, id: NodeId) -> Option<String> {
    if let Some(value) = doc.attr(id, "value") {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    let text = deep_text(doc, id);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
