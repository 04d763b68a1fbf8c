//! Per-tab capture sessions.
//!
//! All per-tab mutable state (provider, extractor signature, scheduler
//! state, latest snapshot) lives in a [`TabSession`] held in a
//! [`SessionRegistry`] keyed by tab id, so tabs cannot interfere with
//! each other. Sessions consume page events from a single driver loop
//! and emit [`EngineMessage`]s over an mpsc channel; a handler finishes
//! before the next event of the same kind is dispatched, which is the
//! no-reentrancy invariant the extraction state relies on.

use crate::config::EngineConfig;
use crate::dom::{Document, NodeId};
use crate::dom_path::locate;
use crate::extractor::InteractionExtractor;
use crate::harvest::{enrich_from_recent, harvest, AssetFetcher, AssetLookup};
use crate::protocol::{EngineMessage, TabCommand, TabReply};
use crate::provider::{ExtractionRules, Provider, RuleRegistry};
use crate::scheduler::ChangeScheduler;
use crate::types::{InteractionOutput, TabId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Events delivered to a tab session by its host page feed.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// A fresh DOM snapshot after a batch of mutations.
    DomUpdated(Document),
    /// A raw click on a node of the current snapshot.
    Clicked { node: NodeId },
    /// Navigation-equivalent event; re-resolves the provider.
    Navigated { url: String },
    /// Poll timer fired.
    Tick,
}

/// One tab's capture session.
pub struct TabSession {
    tab_id: TabId,
    page_url: String,
    provider: Provider,
    rules: ExtractionRules,
    extractor: InteractionExtractor,
    scheduler: ChangeScheduler,
    doc: Option<Document>,
    capturing: bool,
    paused: bool,
    config: EngineConfig,
    registry: Arc<RuleRegistry>,
    fetcher: Arc<dyn AssetFetcher>,
    assets: Arc<dyn AssetLookup>,
    out: mpsc::Sender<EngineMessage>,
}

impl TabSession {
    pub fn new(
        tab_id: TabId,
        page_url: &str,
        config: EngineConfig,
        registry: Arc<RuleRegistry>,
        fetcher: Arc<dyn AssetFetcher>,
        assets: Arc<dyn AssetLookup>,
        out: mpsc::Sender<EngineMessage>,
    ) -> Self {
        let provider = Provider::resolve(page_url);
        let rules = registry.rules(provider).clone();
        let scheduler = ChangeScheduler::new(config.poll_interval());
        let extractor = InteractionExtractor::new(config.signature_prefix_chars);
        info!("tab {tab_id}: session created for {provider} ({page_url})");
        Self {
            tab_id,
            page_url: page_url.to_string(),
            provider,
            rules,
            extractor,
            scheduler,
            doc: None,
            capturing: false,
            paused: false,
            config,
            registry,
            fetcher,
            assets,
            out,
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Poll cadence the driver should use when this session watches by
    /// interval.
    pub fn poll_interval(&self) -> Duration {
        self.scheduler.poll_interval()
    }

    /// Handle a coordinator command. Repeated identical commands are
    /// idempotent because the underlying watcher state is.
    pub fn handle_command(&mut self, command: &TabCommand) -> TabReply {
        match command {
            TabCommand::SetCapturing { value: true } => {
                self.capturing = true;
                self.scheduler.start(self.rules.watch);
                debug!("tab {}: capturing on", self.tab_id);
                TabReply::ok()
            }
            TabCommand::SetCapturing { value: false } => {
                // Teardown is synchronous: after this reply no extraction
                // runs until the next start.
                self.scheduler.stop();
                self.extractor.reset();
                self.capturing = false;
                debug!("tab {}: capturing off", self.tab_id);
                TabReply::ok()
            }
            TabCommand::PauseCapturing => {
                self.pause();
                debug!("tab {}: emission paused", self.tab_id);
                TabReply::ok()
            }
            TabCommand::ResumeCapturing => {
                self.paused = false;
                debug!("tab {}: emission resumed", self.tab_id);
                TabReply::ok()
            }
        }
    }

    /// Suspend emission without detaching watchers; the scheduler keeps
    /// running so a resume picks up the current page state immediately.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub async fn handle_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::DomUpdated(doc) => {
                self.doc = Some(doc);
                if self.capturing && self.scheduler.wants_mutations() {
                    self.extract_and_emit().await;
                }
            }
            PageEvent::Tick => {
                if self.capturing && self.scheduler.wants_ticks() {
                    self.extract_and_emit().await;
                }
            }
            PageEvent::Clicked { node } => {
                if self.capturing {
                    self.emit_click_path(node).await;
                }
            }
            PageEvent::Navigated { url } => {
                self.navigate(&url);
            }
        }
    }

    /// Re-resolve the provider and treat the page as fresh. A restart of
    /// the watcher keeps the new provider's strategy.
    fn navigate(&mut self, url: &str) {
        self.page_url = url.to_string();
        self.provider = Provider::resolve(url);
        self.rules = self.registry.rules(self.provider).clone();
        self.extractor.reset();
        self.doc = None;
        if self.scheduler.stop() {
            self.scheduler.start(self.rules.watch);
        }
        info!("tab {}: navigated to {} ({})", self.tab_id, url, self.provider);
    }

    async fn extract_and_emit(&mut self) {
        if self.paused {
            // Emission is suspended; skipping extraction here keeps the
            // signature untouched so a resume re-emits current output.
            trace!("tab {}: paused, skipping extraction", self.tab_id);
            return;
        }
        let Some(doc) = self.doc.take() else {
            return;
        };
        let draft = self.extractor.try_extract(&self.rules, &doc, &self.page_url);
        if let Some(draft) = draft {
            let mut interaction = draft.interaction;
            let mut attachments = harvest(
                &doc,
                draft.output_container,
                self.fetcher.as_ref(),
                &self.config,
            )
            .await;
            enrich_from_recent(&mut attachments, self.assets.as_ref());
            if !attachments.is_empty() {
                interaction.output = InteractionOutput::Attachments(attachments);
            }
            if self
                .out
                .send(EngineMessage::InteractionCaptured { interaction })
                .await
                .is_err()
            {
                warn!("tab {}: coordinator channel closed", self.tab_id);
            }
        }
        self.doc = Some(doc);
    }

    async fn emit_click_path(&mut self, node: NodeId) {
        let Some(doc) = &self.doc else {
            return;
        };
        let path = locate(doc, node);
        if path.is_empty() {
            return;
        }
        trace!("tab {}: click path {}", self.tab_id, path);
        if self
            .out
            .send(EngineMessage::DomPathFound {
                path,
                url: self.page_url.clone(),
            })
            .await
            .is_err()
        {
            warn!("tab {}: coordinator channel closed", self.tab_id);
        }
    }
}

/// Registry of live tab sessions keyed by tab id.
pub struct SessionRegistry {
    config: EngineConfig,
    rules: Arc<RuleRegistry>,
    fetcher: Arc<dyn AssetFetcher>,
    assets: Arc<dyn AssetLookup>,
    out: mpsc::Sender<EngineMessage>,
    sessions: HashMap<TabId, TabSession>,
}

impl SessionRegistry {
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn AssetFetcher>,
        assets: Arc<dyn AssetLookup>,
        out: mpsc::Sender<EngineMessage>,
    ) -> Self {
        Self {
            config,
            rules: Arc::new(RuleRegistry::new()),
            fetcher,
            assets,
            out,
            sessions: HashMap::new(),
        }
    }

    /// Session for a tab, creating it on first sight of the tab.
    pub fn session(&mut self, tab_id: TabId, page_url: &str) -> &mut TabSession {
        self.sessions.entry(tab_id).or_insert_with(|| {
            TabSession::new(
                tab_id,
                page_url,
                self.config.clone(),
                Arc::clone(&self.rules),
                Arc::clone(&self.fetcher),
                Arc::clone(&self.assets),
                self.out.clone(),
            )
        })
    }

    pub fn get(&mut self, tab_id: TabId) -> Option<&mut TabSession> {
        self.sessions.get_mut(&tab_id)
    }

    /// Drop a closed tab's session and all its state.
    pub fn remove(&mut self, tab_id: TabId) {
        if self.sessions.remove(&tab_id).is_some() {
            debug!("tab {tab_id}: session removed");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
