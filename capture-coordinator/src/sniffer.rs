//! Network asset sniffer.
//!
//! Observes HTTP responses in the active tab through a debugger-style
//! transport, keeps the bodies of asset-like responses (images, PDFs,
//! plain text, zip archives) in a bounded ring, and exposes the ring to
//! the engine's attachment enrichment pass. Observation must never
//! break capture: every failure here is logged and dropped.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use capture_engine::harvest::AssetLookup;
use capture_engine::types::{RecentAsset, TabId};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// Bound on the recent-asset ring.
pub const ASSET_CACHE_CAP: usize = 50;

#[derive(Debug, Error)]
pub enum SnifferError {
    #[error("debugger attach failed: {0}")]
    Attach(String),
    #[error("debugger detach failed: {0}")]
    Detach(String),
    #[error("response body unavailable: {0}")]
    Body(String),
}

/// Response metadata observed on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub url: String,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub resource_type: ResourceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Document,
    Xhr,
    Fetch,
    #[default]
    Other,
}

/// A fetched response body, possibly already base64-encoded by the
/// transport.
#[derive(Debug, Clone)]
pub struct ResponseBody {
    pub body: Vec<u8>,
    pub base64_encoded: bool,
}

/// Debugger operations the sniffer needs from the browser.
#[async_trait]
pub trait DebuggerTransport: Send + Sync {
    async fn attach(&self, tab: TabId) -> Result<(), SnifferError>;
    async fn detach(&self, tab: TabId) -> Result<(), SnifferError>;
    async fn fetch_body(&self, tab: TabId, request_id: &str) -> Result<ResponseBody, SnifferError>;
}

/// Bounded newest-first ring of recently observed assets.
#[derive(Default)]
pub struct AssetCache {
    entries: VecDeque<RecentAsset>,
    cap: usize,
}

impl AssetCache {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
        }
    }

    pub fn push(&mut self, asset: RecentAsset) {
        self.entries.push_front(asset);
        self.entries.truncate(self.cap);
    }

    /// Most recent entry matching `url` exactly.
    pub fn find(&self, url: &str) -> Option<&RecentAsset> {
        self.entries.iter().find(|a| a.url == url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<RecentAsset> {
        self.entries.iter().cloned().collect()
    }
}

/// Shared handle over the cache, usable from the engine's enrichment
/// pass via [`AssetLookup`].
#[derive(Clone)]
pub struct SharedAssets(Arc<Mutex<AssetCache>>);

impl SharedAssets {
    pub fn new(cap: usize) -> Self {
        Self(Arc::new(Mutex::new(AssetCache::new(cap))))
    }

    pub fn push(&self, asset: RecentAsset) {
        if let Ok(mut cache) = self.0.lock() {
            cache.push(asset);
        }
    }

    pub fn snapshot(&self) -> Vec<RecentAsset> {
        match self.0.lock() {
            Ok(cache) => cache.snapshot(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for SharedAssets {
    fn default() -> Self {
        Self::new(ASSET_CACHE_CAP)
    }
}

impl AssetLookup for SharedAssets {
    fn find(&self, url: &str) -> Option<RecentAsset> {
        self.0.lock().ok().and_then(|c| c.find(url).cloned())
    }
}

/// MIME types worth keeping. A trailing `*` matches any suffix.
pub fn default_interest() -> Vec<String> {
    ["image/*", "application/pdf", "text/plain", "application/zip"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => mime.starts_with(prefix),
        None => mime == pattern,
    }
}

/// Attaches to one tab at a time and funnels asset responses into the
/// shared cache.
pub struct NetworkSniffer<D> {
    transport: D,
    assets: SharedAssets,
    interest: Vec<String>,
    attached: Option<TabId>,
}

impl<D: DebuggerTransport> NetworkSniffer<D> {
    pub fn new(transport: D, assets: SharedAssets) -> Self {
        Self::with_interest(transport, assets, default_interest())
    }

    pub fn with_interest(transport: D, assets: SharedAssets, interest: Vec<String>) -> Self {
        Self {
            transport,
            assets,
            interest,
            attached: None,
        }
    }

    pub fn attached_tab(&self) -> Option<TabId> {
        self.attached
    }

    pub fn assets(&self) -> &SharedAssets {
        &self.assets
    }

    /// Attach to `tab`. Re-attaching to the same tab is a no-op; moving
    /// to a different tab detaches from the previous one first.
    pub async fn attach(&mut self, tab: TabId) -> Result<(), SnifferError> {
        if self.attached == Some(tab) {
            return Ok(());
        }
        if let Some(previous) = self.attached.take() {
            if let Err(err) = self.transport.detach(previous).await {
                warn!("sniffer: detach from tab {previous} failed: {err}");
            }
        }
        self.transport.attach(tab).await?;
        debug!("sniffer attached to tab {tab}");
        self.attached = Some(tab);
        Ok(())
    }

    /// Detach from the current tab, if any. Idempotent.
    pub async fn detach(&mut self) -> Result<(), SnifferError> {
        if let Some(tab) = self.attached.take() {
            self.transport.detach(tab).await?;
            debug!("sniffer detached from tab {tab}");
        }
        Ok(())
    }

    /// Handle one observed response. Non-asset responses are ignored;
    /// body-fetch failures are logged and the response is skipped.
    pub async fn on_response(&mut self, meta: ResponseMeta) {
        let Some(tab) = self.attached else {
            return;
        };
        let interesting = self.interest.iter().any(|p| mime_matches(p, &meta.mime))
            || meta.resource_type == ResourceType::Image;
        if !interesting {
            return;
        }
        let body = match self.transport.fetch_body(tab, &meta.request_id).await {
            Ok(body) => body,
            Err(err) => {
                debug!("sniffer: body for {} unavailable: {err}", meta.url);
                return;
            }
        };
        let base64 = if body.base64_encoded {
            match String::from_utf8(body.body) {
                Ok(s) => s,
                Err(_) => {
                    debug!("sniffer: pre-encoded body for {} is not utf-8", meta.url);
                    return;
                }
            }
        } else {
            BASE64.encode(&body.body)
        };
        self.assets.push(RecentAsset {
            url: meta.url,
            mime: meta.mime,
            base64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeDebugger {
        attaches: AtomicU32,
        detaches: AtomicU32,
        body_fails: bool,
    }

    #[async_trait]
    impl DebuggerTransport for FakeDebugger {
        async fn attach(&self, _tab: TabId) -> Result<(), SnifferError> {
            self.attaches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn detach(&self, _tab: TabId) -> Result<(), SnifferError> {
            self.detaches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_body(
            &self,
            _tab: TabId,
            request_id: &str,
        ) -> Result<ResponseBody, SnifferError> {
            if self.body_fails {
                return Err(SnifferError::Body("gone".to_string()));
            }
            Ok(ResponseBody {
                body: format!("body-{request_id}").into_bytes(),
                base64_encoded: false,
            })
        }
    }

    fn meta(id: &str, url: &str, mime: &str) -> ResponseMeta {
        ResponseMeta {
            request_id: id.to_string(),
            url: url.to_string(),
            mime: mime.to_string(),
            resource_type: ResourceType::Other,
        }
    }

    #[tokio::test]
    async fn test_attach_is_idempotent_per_tab() {
        let mut sniffer = NetworkSniffer::new(FakeDebugger::default(), SharedAssets::default());
        sniffer.attach(1).await.unwrap();
        sniffer.attach(1).await.unwrap();
        assert_eq!(sniffer.transport.attaches.load(Ordering::SeqCst), 1);
        assert_eq!(sniffer.attached_tab(), Some(1));
    }

    #[tokio::test]
    async fn test_attach_to_new_tab_detaches_previous() {
        let mut sniffer = NetworkSniffer::new(FakeDebugger::default(), SharedAssets::default());
        sniffer.attach(1).await.unwrap();
        sniffer.attach(2).await.unwrap();
        assert_eq!(sniffer.transport.attaches.load(Ordering::SeqCst), 2);
        assert_eq!(sniffer.transport.detaches.load(Ordering::SeqCst), 1);
        assert_eq!(sniffer.attached_tab(), Some(2));
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let mut sniffer = NetworkSniffer::new(FakeDebugger::default(), SharedAssets::default());
        sniffer.attach(1).await.unwrap();
        sniffer.detach().await.unwrap();
        sniffer.detach().await.unwrap();
        assert_eq!(sniffer.transport.detaches.load(Ordering::SeqCst), 1);
        assert_eq!(sniffer.attached_tab(), None);
    }

    #[tokio::test]
    async fn test_asset_mimes_are_cached_others_ignored() {
        let mut sniffer = NetworkSniffer::new(FakeDebugger::default(), SharedAssets::default());
        sniffer.attach(1).await.unwrap();
        sniffer
            .on_response(meta("r1", "https://cdn/img.png", "image/png"))
            .await;
        sniffer
            .on_response(meta("r2", "https://cdn/doc.pdf", "application/pdf"))
            .await;
        sniffer
            .on_response(meta("r3", "https://api/chat", "application/json"))
            .await;
        let snapshot = sniffer.assets().snapshot();
        assert_eq!(snapshot.len(), 2);
        // Newest first.
        assert_eq!(snapshot[0].url, "https://cdn/doc.pdf");
        assert_eq!(snapshot[1].base64, BASE64.encode(b"body-r1"));
    }

    #[tokio::test]
    async fn test_image_resource_type_cached_regardless_of_mime() {
        let mut sniffer = NetworkSniffer::new(FakeDebugger::default(), SharedAssets::default());
        sniffer.attach(1).await.unwrap();
        let mut m = meta("r1", "https://cdn/blob", "application/octet-stream");
        m.resource_type = ResourceType::Image;
        sniffer.on_response(m).await;
        assert_eq!(sniffer.assets().snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_body_failure_is_skipped() {
        let debugger = FakeDebugger {
            body_fails: true,
            ..Default::default()
        };
        let mut sniffer = NetworkSniffer::new(debugger, SharedAssets::default());
        sniffer.attach(1).await.unwrap();
        sniffer
            .on_response(meta("r1", "https://cdn/img.png", "image/png"))
            .await;
        assert!(sniffer.assets().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_responses_ignored_while_detached() {
        let mut sniffer = NetworkSniffer::new(FakeDebugger::default(), SharedAssets::default());
        sniffer
            .on_response(meta("r1", "https://cdn/img.png", "image/png"))
            .await;
        assert!(sniffer.assets().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_custom_interest_list() {
        let mut sniffer = NetworkSniffer::with_interest(
            FakeDebugger::default(),
            SharedAssets::default(),
            vec!["audio/*".to_string()],
        );
        sniffer.attach(1).await.unwrap();
        sniffer
            .on_response(meta("r1", "https://cdn/a.mp3", "audio/mpeg"))
            .await;
        sniffer
            .on_response(meta("r2", "https://cdn/doc.pdf", "application/pdf"))
            .await;
        let snapshot = sniffer.assets().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].url, "https://cdn/a.mp3");
    }

    #[test]
    fn test_cache_bound() {
        let mut cache = AssetCache::new(50);
        for n in 0..60 {
            cache.push(RecentAsset {
                url: format!("https://cdn/{n}"),
                mime: "image/png".to_string(),
                base64: String::new(),
            });
        }
        assert_eq!(cache.len(), 50);
        assert!(cache.find("https://cdn/59").is_some());
        assert!(cache.find("https://cdn/9").is_none());
    }

    #[test]
    fn test_lookup_through_shared_handle() {
        let assets = SharedAssets::default();
        assets.push(RecentAsset {
            url: "https://cdn/a.png".to_string(),
            mime: "image/png".to_string(),
            base64: "QUJD".to_string(),
        });
        let found = AssetLookup::find(&assets, "https://cdn/a.png").unwrap();
        assert_eq!(found.mime, "image/png");
        assert!(AssetLookup::find(&assets, "https://cdn/b.png").is_none());
    }
}
