//! Provider resolution and per-provider extraction rules.
//!
//! A provider is a chat web application whose DOM needs bespoke
//! selectors. The rules are data, not control flow: supporting a new
//! provider means adding a registry entry, never new branching.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Supported chat providers, plus a generic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    ChatGpt,
    Claude,
    Gemini,
    Perplexity,
    Unknown,
}

/// Hostname substring table; first match wins.
const HOST_TABLE: &[(&str, Provider)] = &[
    ("chat.openai.com", Provider::ChatGpt),
    ("chatgpt.com", Provider::ChatGpt),
    ("claude.ai", Provider::Claude),
    ("gemini.google.com", Provider::Gemini),
    ("bard.google.com", Provider::Gemini),
    ("perplexity.ai", Provider::Perplexity),
];

impl Provider {
    /// Resolve a page URL to a provider. Malformed URLs and unrecognized
    /// hosts both resolve to [`Provider::Unknown`].
    pub fn resolve(href: &str) -> Provider {
        let host = match Url::parse(href) {
            Ok(url) => match url.host_str() {
                Some(h) => h.to_ascii_lowercase(),
                None => return Provider::Unknown,
            },
            Err(_) => return Provider::Unknown,
        };
        for (needle, provider) in HOST_TABLE {
            if host.contains(needle) {
                return *provider;
            }
        }
        Provider::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::ChatGpt => "chatgpt",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
            Provider::Perplexity => "perplexity",
            Provider::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the scheduler should watch a provider's page for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStrategy {
    /// Mutation-driven: re-extract on every mutation batch.
    Observe,
    /// Interval polling, for providers whose output lives inside shadow
    /// roots that mutation observation cannot reach.
    Poll,
}

/// Selector tables for one provider.
///
/// Selector lists are ordered most specific first; extraction takes the
/// last DOM match of the first selector that yields non-empty text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRules {
    pub user_selectors: Vec<String>,
    pub assistant_selectors: Vec<String>,
    pub model_selector: Option<String>,
    pub watch: WatchStrategy,
}

/// Registry mapping providers to their extraction rules.
pub struct RuleRegistry {
    rules: HashMap<Provider, ExtractionRules>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        let mut rules = HashMap::new();

        rules.insert(
            Provider::ChatGpt,
            ExtractionRules {
                user_selectors: strings(&[
                    "div[data-message-author-role=user] div.whitespace-pre-wrap",
                    "div[data-message-author-role=user]",
                ]),
                assistant_selectors: strings(&[
                    "div[data-message-author-role=assistant] div.markdown",
                    "div[data-message-author-role=assistant]",
                    "div.agent-turn",
                ]),
                model_selector: Some(
                    "button[data-testid=model-switcher-dropdown-button]".to_string(),
                ),
                watch: WatchStrategy::Observe,
            },
        );

        rules.insert(
            Provider::Claude,
            ExtractionRules {
                user_selectors: strings(&[
                    "div[data-testid=user-message]",
                    "div.font-user-message",
                ]),
                assistant_selectors: strings(&[
                    "div.font-claude-message",
                    "div[data-is-streaming] div.grid",
                ]),
                model_selector: Some("button[data-testid=model-selector-dropdown]".to_string()),
                watch: WatchStrategy::Observe,
            },
        );

        // Gemini keeps most of its message UI inside shadow roots that a
        // body-level mutation observer never sees, hence polling.
        rules.insert(
            Provider::Gemini,
            ExtractionRules {
                user_selectors: strings(&["div.query-text", "user-query"]),
                assistant_selectors: strings(&[
                    "message-content div.markdown",
                    "div.model-response-text",
                    "message-content",
                ]),
                model_selector: Some("div.current-mode-title".to_string()),
                watch: WatchStrategy::Poll,
            },
        );

        rules.insert(
            Provider::Perplexity,
            ExtractionRules {
                user_selectors: strings(&[
                    "div[data-testid=user-query]",
                    "h1.whitespace-pre-line",
                ]),
                assistant_selectors: strings(&["div.prose", "div[dir=auto]"]),
                model_selector: None,
                watch: WatchStrategy::Observe,
            },
        );

        rules.insert(
            Provider::Unknown,
            ExtractionRules {
                user_selectors: Vec::new(),
                assistant_selectors: strings(&["main article", "main", "body"]),
                model_selector: None,
                watch: WatchStrategy::Observe,
            },
        );

        Self { rules }
    }

    /// Rules for a provider; unknown providers get the generic fallback.
    pub fn rules(&self, provider: Provider) -> &ExtractionRules {
        self.rules
            .get(&provider)
            .unwrap_or_else(|| &self.rules[&Provider::Unknown])
    }

    /// Register or replace rules for a provider at runtime.
    pub fn insert(&mut self, provider: Provider, rules: ExtractionRules) {
        self.rules.insert(provider, rules);
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
