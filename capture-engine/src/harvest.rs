//! Attachment harvesting.
//!
//! Scans an assistant-output container for media and file references,
//! inlines small payloads as data URLs, and enriches whatever is left
//! from the network sniffer's recent-asset cache. Every failure on this
//! path degrades to a URL-only attachment; harvesting never surfaces an
//! error to the extraction flow.

use crate::config::EngineConfig;
use crate::dom::{Document, NodeId};
use crate::types::{Attachment, AttachmentKind, RecentAsset};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

/// A fetched asset payload.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
}

/// Seam for fetching asset payloads; the production implementation is
/// [`HttpAssetFetcher`], tests substitute their own.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, FetchError>;
}

/// Credential-less HTTP fetcher.
pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpAssetFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?
            .to_vec();
        Ok(FetchedAsset { bytes, mime })
    }
}

/// Read-only view into the sniffer's recent-asset cache.
pub trait AssetLookup: Send + Sync {
    fn find(&self, url: &str) -> Option<RecentAsset>;
}

/// Harvest attachments from the subtree rooted at `container`.
///
/// Output order is images, videos, audios, files, each group in
/// first-seen document order.
pub async fn harvest(
    doc: &Document,
    container: NodeId,
    fetcher: &dyn AssetFetcher,
    config: &EngineConfig,
) -> Vec<Attachment> {
    let refs = collect_references(doc, container, &config.file_extensions);

    let mut attachments = Vec::with_capacity(
        refs.images.len() + refs.videos.len() + refs.audios.len() + refs.files.len(),
    );
    for url in refs.images {
        attachments.push(inline_image(url, fetcher, config.inline_ceiling_bytes).await);
    }
    for url in refs.videos {
        attachments.push(Attachment::new(AttachmentKind::Video, url));
    }
    for url in refs.audios {
        attachments.push(Attachment::new(AttachmentKind::Audio, url));
    }
    for (url, filename) in refs.files {
        let mut attachment = Attachment::new(AttachmentKind::File, url);
        attachment.filename = Some(filename);
        attachments.push(attachment);
    }
    attachments
}

/// Borrow base64 payloads from the sniffer cache for attachments that
/// could not be inlined directly. This recovers assets the page fetched
/// with credentials the engine cannot use itself.
pub fn enrich_from_recent(attachments: &mut [Attachment], assets: &dyn AssetLookup) {
    for attachment in attachments.iter_mut() {
        if attachment.data_url.is_some() {
            continue;
        }
        if let Some(asset) = assets.find(&attachment.url) {
            attachment.data_url = Some(format!("data:{};base64,{}", asset.mime, asset.base64));
            attachment.mime = Some(asset.mime);
        }
    }
}

#[derive(Default)]
struct MediaRefs {
    images: Vec<String>,
    videos: Vec<String>,
    audios: Vec<String>,
    files: Vec<(String, String)>,
}

fn collect_references(doc: &Document, container: NodeId, extensions: &[String]) -> MediaRefs {
    let mut refs = MediaRefs::default();
    let mut nodes = vec![container];
    nodes.extend(doc.descendant_elements(container));

    for id in nodes {
        let Some(el) = doc.element(id) else {
            continue;
        };
        match el.tag.as_str() {
            "img" | "image" => {
                if let Some(url) = image_source(doc, id) {
                    push_unique(&mut refs.images, url);
                }
            }
            "video" => {
                if let Some(url) = media_source(doc, id) {
                    push_unique(&mut refs.videos, url);
                }
            }
            "audio" => {
                if let Some(url) = media_source(doc, id) {
                    push_unique(&mut refs.audios, url);
                }
            }
            "a" => {
                if let Some(href) = doc.attr(id, "href") {
                    if let Some(filename) = file_candidate(href, extensions) {
                        if !refs.files.iter().any(|(u, _)| u == href) {
                            refs.files.push((href.to_string(), filename));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    refs
}

fn push_unique(list: &mut Vec<String>, url: String) {
    if !list.iter().any(|u| u == &url) {
        list.push(url);
    }
}

/// Image URL resolution order: currentSrc, src, first srcset entry,
/// then the SVG href variants.
fn image_source(doc: &Document, id: NodeId) -> Option<String> {
    for attr in ["currentSrc", "src"] {
        if let Some(url) = doc.attr(id, attr).filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
    }
    if let Some(srcset) = doc.attr(id, "srcset") {
        if let Some(first) = srcset
            .split(',')
            .next()
            .and_then(|entry| entry.split_whitespace().next())
        {
            return Some(first.to_string());
        }
    }
    for attr in ["href", "xlink:href"] {
        if let Some(url) = doc.attr(id, attr).filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
    }
    None
}

/// Video/audio URL: currentSrc, src, or the first nested `<source>`.
fn media_source(doc: &Document, id: NodeId) -> Option<String> {
    for attr in ["currentSrc", "src"] {
        if let Some(url) = doc.attr(id, attr).filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
    }
    for child in doc.descendant_elements(id) {
        if doc.element(child).map(|el| el.tag == "source").unwrap_or(false) {
            if let Some(url) = doc.attr(child, "src").filter(|u| !u.is_empty()) {
                return Some(url.to_string());
            }
        }
    }
    None
}

fn file_candidate(href: &str, extensions: &[String]) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    if !extensions.iter().any(|e| e == &ext) {
        return None;
    }
    let filename = path.rsplit('/').next().unwrap_or(path);
    Some(filename.to_string())
}

async fn inline_image(url: String, fetcher: &dyn AssetFetcher, ceiling: usize) -> Attachment {
    let mut attachment = Attachment::new(AttachmentKind::Image, url.clone());

    // Data URLs pass through unchanged.
    if url.starts_with("data:") {
        attachment.mime = data_url_mime(&url);
        attachment.data_url = Some(url);
        return attachment;
    }

    match fetcher.fetch(&url).await {
        Ok(asset) => {
            let mime = asset
                .mime
                .unwrap_or_else(|| "application/octet-stream".to_string());
            attachment.mime = Some(mime.clone());
            if asset.bytes.len() <= ceiling {
                attachment.data_url = Some(format!(
                    "data:{};base64,{}",
                    mime,
                    BASE64.encode(&asset.bytes)
                ));
            }
        }
        Err(e) => {
            debug!("asset fetch failed for {url}: {e}");
        }
    }
    attachment
}

fn data_url_mime(url: &str) -> Option<String> {
    let rest = url.strip_prefix("data:")?;
    let mime = rest.split([';', ',']).next()?;
    if mime.is_empty() {
        None
    } else {
        Some(mime.to_string())
    }
}
