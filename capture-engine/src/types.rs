//! Core data types shared across the engine and the coordinator.
//!
//! Field names follow the persisted/wire contract, so serde renames are
//! part of the API here, not cosmetics.

use serde::{Deserialize, Serialize};

/// Identifier of a browser tab.
pub type TabId = i64;

/// One captured prompt/response exchange with provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    /// Origin of the page the interaction was captured on.
    pub url: String,
    /// Latest user prompt; may be empty when none could be located.
    pub input: String,
    /// Assistant output: attachments when any were harvested, else text.
    pub output: InteractionOutput,
    /// Detected model version, `"unknown"` when undetectable.
    pub model_version: String,
    /// ISO-8601 capture time.
    pub timestamp: String,
}

/// Output payload of an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InteractionOutput {
    Text(String),
    Attachments(Vec<Attachment>),
}

impl InteractionOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InteractionOutput::Text(t) => Some(t),
            InteractionOutput::Attachments(_) => None,
        }
    }

    pub fn attachments(&self) -> Option<&[Attachment]> {
        match self {
            InteractionOutput::Text(_) => None,
            InteractionOutput::Attachments(a) => Some(a),
        }
    }
}

/// Media or file reference harvested from an output container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Inlined payload; omitted when the asset exceeded the inline-size
    /// ceiling or could not be fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Attachment {
    pub fn new(kind: AttachmentKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            mime: None,
            data_url: None,
            filename: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    File,
}

/// A raw click-path capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedPath {
    /// CSS-like locator from the path resolver.
    pub path: String,
    pub url: String,
    /// ISO-8601 capture time.
    pub timestamp: String,
    #[serde(rename = "tabId")]
    pub origin_tab_id: OriginTab,
}

/// Tab provenance of a captured path: a tab id, or `"N/A"` when the
/// sender had none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OriginTab {
    Tab(TabId),
    Label(String),
}

impl OriginTab {
    pub fn not_available() -> Self {
        OriginTab::Label("N/A".to_string())
    }
}

/// Entry in the network sniffer's recent-asset cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentAsset {
    pub url: String,
    pub mime: String,
    pub base64: String,
}

/// ISO-8601 timestamp for "now".
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Origin (`scheme://host[:port]`) of a page URL, or the URL unchanged
/// when it cannot be parsed.
pub fn page_origin(href: &str) -> String {
    match url::Url::parse(href) {
        Ok(url) => url.origin().ascii_serialization(),
        Err(_) => href.to_string(),
    }
}
