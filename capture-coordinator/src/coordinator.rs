//! Command dispatch and capture state ownership.
//!
//! The coordinator is the single writer of [`CaptureState`]. It turns
//! control-surface commands into tab deliveries and state transitions,
//! folds engine messages into the histories, and mirrors every mutation
//! into the state store. Tab delivery is the only fallible step in a
//! toggle, so the state flip happens first and is rolled back if the
//! tab never acknowledges.

use crate::bridge::{InboundFrame, OutboundFrame, RelayTransport};
use crate::config::Config;
use crate::forwarder::SessionSink;
use crate::protocol::{UiCommand, UiResponse};
use crate::sniffer::{DebuggerTransport, NetworkSniffer, ResponseMeta, SharedAssets};
use crate::state::{CaptureState, PersistedState};
use crate::store::{keys, StateStore};
use crate::tabs::{TabCommander, TabTransport};
use capture_engine::protocol::EngineMessage;
use capture_engine::types::{now_iso8601, CapturedPath, OriginTab, TabId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct Coordinator<T, D, S> {
    state: CaptureState,
    commander: TabCommander<T>,
    sniffer: NetworkSniffer<D>,
    backend: S,
    store: StateStore,
}

impl<T, D, S> Coordinator<T, D, S>
where
    T: TabTransport,
    D: DebuggerTransport,
    S: SessionSink,
{
    /// Build a coordinator, restoring persisted state from the store.
    pub fn new(
        config: &Config,
        tab_transport: T,
        debugger: D,
        backend: S,
        store: StateStore,
    ) -> Self {
        let cap = config.general.history_cap;
        let assets = SharedAssets::new(cap);
        let persisted = load_persisted(&store);
        if persisted.is_capturing {
            info!("restored an active capture session from the store");
        }
        let state = CaptureState::from_persisted(cap, persisted);
        Self {
            state,
            commander: TabCommander::new(tab_transport),
            sniffer: NetworkSniffer::with_interest(debugger, assets, config.sniffer.mimes.clone()),
            backend,
            store,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn assets(&self) -> SharedAssets {
        self.sniffer.assets().clone()
    }

    /// Handle one control-surface command.
    pub async fn handle_ui(&mut self, command: UiCommand) -> UiResponse {
        match command {
            UiCommand::Start { tab } => self.toggle_capturing(tab, true).await,
            UiCommand::Stop { tab } => self.toggle_capturing(tab, false).await,
            UiCommand::Pause { tab } => {
                self.state.set_paused(true);
                self.persist_flags();
                // The engine must stop extracting too, or the current
                // output's signature gets consumed with no emission and
                // a resume would suppress it as a duplicate.
                self.commander.pause(tab).await;
                UiResponse::ok()
            }
            UiCommand::Resume { tab } => {
                self.state.set_paused(false);
                self.persist_flags();
                // The engine drops nothing while paused, it just stops
                // extracting; a nudge restarts it without a state round
                // trip. Losing the nudge is harmless.
                self.commander.resume(tab).await;
                UiResponse::ok()
            }
            UiCommand::SwitchModel => {
                let moved = self.state.switch_model();
                self.persist_flags();
                self.persist_interactions();
                self.persist_session();
                if moved {
                    debug!("latest interaction moved into the session");
                }
                UiResponse::ok()
            }
            UiCommand::SendSession => self.send_session().await,
        }
    }

    async fn toggle_capturing(&mut self, tab: TabId, value: bool) -> UiResponse {
        let previous = self.state.is_capturing();
        self.state.set_capturing(value);
        match self.commander.set_capturing(tab, value).await {
            Ok(reply) if reply.success => {
                self.persist_flags();
                if value {
                    if let Err(err) = self.sniffer.attach(tab).await {
                        // Capture works without asset sniffing.
                        warn!("sniffer attach failed: {err}");
                    }
                } else if let Err(err) = self.sniffer.detach().await {
                    warn!("sniffer detach failed: {err}");
                }
                info!("capturing {} in tab {tab}", if value { "on" } else { "off" });
                UiResponse::ok()
            }
            Ok(reply) => {
                self.state.set_capturing(previous);
                let message = reply
                    .error
                    .unwrap_or_else(|| "engine refused the command".to_string());
                warn!("tab {tab} refused capture toggle: {message}");
                UiResponse::err(message)
            }
            Err(err) => {
                self.state.set_capturing(previous);
                warn!("capture toggle not delivered to tab {tab}: {err}");
                UiResponse::err(err.to_string())
            }
        }
    }

    async fn send_session(&mut self) -> UiResponse {
        if self.state.session_interactions().is_empty() {
            return UiResponse::err("no session interactions to send");
        }
        let session = self.state.drain_session();
        match self.backend.send_session(&session).await {
            Ok(()) => {
                self.persist_session();
                UiResponse::ok()
            }
            Err(err) => {
                // Keep the session so the operator can retry.
                self.state.restore_session(session);
                warn!("session delivery failed: {err}");
                UiResponse::err(err.to_string())
            }
        }
    }

    /// Handle one message from a tab's engine instance.
    pub fn handle_engine(&mut self, tab: TabId, message: EngineMessage) {
        match message {
            EngineMessage::InteractionCaptured { interaction } => {
                if !self.state.is_capturing() || self.state.is_paused() {
                    debug!("dropping interaction from tab {tab} while inactive");
                    return;
                }
                info!("interaction captured from {} (tab {tab})", interaction.url);
                self.state.record_interaction(interaction);
                self.persist_interactions();
            }
            EngineMessage::DomPathFound { path, url } => {
                if !self.state.is_capturing() {
                    return;
                }
                self.state.record_path(CapturedPath {
                    path,
                    url,
                    timestamp: now_iso8601(),
                    origin_tab_id: OriginTab::Tab(tab),
                });
                self.persist_paths();
            }
        }
    }

    /// Handle one observed network response.
    pub async fn handle_response(&mut self, meta: ResponseMeta) {
        self.sniffer.on_response(meta).await;
        self.persist(keys::RECENT_ASSETS, &self.sniffer.assets().snapshot());
    }

    fn persist_flags(&self) {
        self.persist(keys::IS_CAPTURING, &self.state.is_capturing());
        self.persist(keys::IS_PAUSED, &self.state.is_paused());
    }

    fn persist_interactions(&self) {
        self.persist(keys::LATEST_INTERACTION, &self.state.latest_interaction());
        self.persist(
            keys::INTERACTION_HISTORY,
            &self.state.interaction_history().collect::<Vec<_>>(),
        );
    }

    fn persist_paths(&self) {
        self.persist(keys::LATEST_PATH, &self.state.latest_path());
        self.persist(
            keys::PATH_HISTORY,
            &self.state.path_history().collect::<Vec<_>>(),
        );
    }

    fn persist_session(&self) {
        self.persist(keys::SESSION_INTERACTIONS, &self.state.session_interactions());
    }

    fn persist<V: serde::Serialize>(&self, key: &str, value: &V) {
        // Persistence mirrors in-memory state; a write failure must not
        // abort the command that caused it.
        if let Err(err) = self.store.put(key, value) {
            warn!("state store write for {key} failed: {err}");
        }
    }
}

/// Drive a coordinator from a stream of relay frames.
///
/// Handling a UI command may itself wait on correlated relay replies, so
/// this loop must never be the only router of replies: the relay reader
/// dispatches `Reply` frames to the transport before anything reaches
/// this channel. A stray reply that does arrive here is still routed,
/// but by then its waiter has usually timed out.
pub async fn dispatch_frames<T, D, S>(
    coordinator: &mut Coordinator<T, D, S>,
    inbound: &mut mpsc::UnboundedReceiver<InboundFrame>,
    outbound: &mpsc::UnboundedSender<OutboundFrame>,
    transport: &RelayTransport,
) where
    T: TabTransport,
    D: DebuggerTransport,
    S: SessionSink,
{
    while let Some(frame) = inbound.recv().await {
        match frame {
            InboundFrame::Ui { command } => {
                let response = coordinator.handle_ui(command).await;
                if outbound
                    .send(OutboundFrame::Response { response })
                    .is_err()
                {
                    break;
                }
            }
            InboundFrame::Engine { tab, message } => coordinator.handle_engine(tab, message),
            InboundFrame::Network { meta } => coordinator.handle_response(meta).await,
            InboundFrame::Reply { id, payload } => transport.dispatch_reply(id, payload),
        }
    }
}

fn load_persisted(store: &StateStore) -> PersistedState {
    fn get_or_default<V: serde::de::DeserializeOwned + Default>(
        store: &StateStore,
        key: &str,
    ) -> V {
        match store.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => V::default(),
            Err(err) => {
                warn!("state store read for {key} failed: {err}");
                V::default()
            }
        }
    }

    PersistedState {
        is_capturing: get_or_default(store, keys::IS_CAPTURING),
        is_paused: get_or_default(store, keys::IS_PAUSED),
        latest_interaction: get_or_default(store, keys::LATEST_INTERACTION),
        latest_path: get_or_default(store, keys::LATEST_PATH),
        interaction_history: get_or_default(store, keys::INTERACTION_HISTORY),
        path_history: get_or_default(store, keys::PATH_HISTORY),
        session_interactions: get_or_default(store, keys::SESSION_INTERACTIONS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::ForwardError;
    use crate::sniffer::{ResponseBody, SnifferError};
    use crate::tabs::DeliveryError;
    use async_trait::async_trait;
    use capture_engine::protocol::{TabCommand, TabReply};
    use capture_engine::types::{Interaction, InteractionOutput};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct FakeTabs {
        deliveries: Arc<AtomicU32>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TabTransport for FakeTabs {
        async fn send_command(
            &self,
            tab: TabId,
            _command: TabCommand,
        ) -> Result<TabReply, DeliveryError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DeliveryError::NoReceiver(tab));
            }
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(TabReply::ok())
        }

        async fn inject_engine(&self, tab: TabId) -> Result<(), DeliveryError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DeliveryError::Restricted(tab));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDebugger;

    #[async_trait]
    impl DebuggerTransport for FakeDebugger {
        async fn attach(&self, _tab: TabId) -> Result<(), SnifferError> {
            Ok(())
        }
        async fn detach(&self, _tab: TabId) -> Result<(), SnifferError> {
            Ok(())
        }
        async fn fetch_body(
            &self,
            _tab: TabId,
            _request_id: &str,
        ) -> Result<ResponseBody, SnifferError> {
            Ok(ResponseBody {
                body: b"bytes".to_vec(),
                base64_encoded: false,
            })
        }
    }

    #[derive(Default, Clone)]
    struct FakeBackend {
        fail: Arc<AtomicBool>,
        sent: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SessionSink for FakeBackend {
        async fn send_session(&self, session: &[Interaction]) -> Result<(), ForwardError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ForwardError::Status(502));
            }
            self.sent.fetch_add(session.len() as u32, Ordering::SeqCst);
            Ok(())
        }
    }

    fn coordinator() -> Coordinator<FakeTabs, FakeDebugger, FakeBackend> {
        Coordinator::new(
            &Config::default(),
            FakeTabs::default(),
            FakeDebugger::default(),
            FakeBackend::default(),
            StateStore::open_in_memory().unwrap(),
        )
    }

    fn interaction(input: &str) -> Interaction {
        Interaction {
            url: "https://chat.openai.com".to_string(),
            input: input.to_string(),
            output: InteractionOutput::Text("reply".to_string()),
            model_version: "unknown".to_string(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn captured(input: &str) -> EngineMessage {
        EngineMessage::InteractionCaptured {
            interaction: interaction(input),
        }
    }

    #[tokio::test]
    async fn test_start_records_interactions() {
        let mut coordinator = coordinator();
        let response = coordinator.handle_ui(UiCommand::Start { tab: 1 }).await;
        assert!(response.success);
        assert!(coordinator.state().is_capturing());

        coordinator.handle_engine(1, captured("draw a cat"));
        assert_eq!(coordinator.state().interaction_history().count(), 1);
    }

    #[tokio::test]
    async fn test_interactions_dropped_while_stopped_or_paused() {
        let mut coordinator = coordinator();
        coordinator.handle_engine(1, captured("before start"));
        assert_eq!(coordinator.state().interaction_history().count(), 0);

        coordinator.handle_ui(UiCommand::Start { tab: 1 }).await;
        coordinator.handle_ui(UiCommand::Pause { tab: 1 }).await;
        coordinator.handle_engine(1, captured("while paused"));
        assert_eq!(coordinator.state().interaction_history().count(), 0);

        coordinator.handle_ui(UiCommand::Resume { tab: 1 }).await;
        coordinator.handle_engine(1, captured("after resume"));
        assert_eq!(coordinator.state().interaction_history().count(), 1);
    }

    #[tokio::test]
    async fn test_failed_toggle_rolls_state_back() {
        let mut coordinator = coordinator();
        coordinator
            .commander
            .transport()
            .fail
            .store(true, Ordering::SeqCst);
        let response = coordinator.handle_ui(UiCommand::Start { tab: 1 }).await;
        assert!(!response.success);
        assert!(!coordinator.state().is_capturing());
    }

    #[tokio::test]
    async fn test_dom_path_carries_origin_tab() {
        let mut coordinator = coordinator();
        coordinator.handle_ui(UiCommand::Start { tab: 7 }).await;
        coordinator.handle_engine(
            7,
            EngineMessage::DomPathFound {
                path: "button#send".to_string(),
                url: "https://claude.ai/".to_string(),
            },
        );
        let path = coordinator.state().latest_path().unwrap();
        assert_eq!(path.origin_tab_id, OriginTab::Tab(7));
        assert_eq!(path.path, "button#send");
    }

    #[tokio::test]
    async fn test_switch_model_then_send_session() {
        let mut coordinator = coordinator();
        coordinator.handle_ui(UiCommand::Start { tab: 1 }).await;
        coordinator.handle_engine(1, captured("first prompt"));
        coordinator.handle_ui(UiCommand::SwitchModel).await;
        assert!(coordinator.state().is_paused());
        assert_eq!(coordinator.state().session_interactions().len(), 1);

        coordinator.handle_ui(UiCommand::Resume { tab: 1 }).await;
        coordinator.handle_engine(1, captured("second prompt"));
        coordinator.handle_ui(UiCommand::SwitchModel).await;

        let response = coordinator.handle_ui(UiCommand::SendSession).await;
        assert!(response.success);
        assert_eq!(coordinator.backend.sent.load(Ordering::SeqCst), 2);
        assert!(coordinator.state().session_interactions().is_empty());
    }

    #[tokio::test]
    async fn test_send_empty_session_errors() {
        let mut coordinator = coordinator();
        let response = coordinator.handle_ui(UiCommand::SendSession).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_session() {
        let mut coordinator = coordinator();
        coordinator.handle_ui(UiCommand::Start { tab: 1 }).await;
        coordinator.handle_engine(1, captured("prompt"));
        coordinator.handle_ui(UiCommand::SwitchModel).await;

        coordinator.backend.fail.store(true, Ordering::SeqCst);
        let response = coordinator.handle_ui(UiCommand::SendSession).await;
        assert!(!response.success);
        assert_eq!(coordinator.state().session_interactions().len(), 1);

        coordinator.backend.fail.store(false, Ordering::SeqCst);
        let response = coordinator.handle_ui(UiCommand::SendSession).await;
        assert!(response.success);
        assert!(coordinator.state().session_interactions().is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let mut coordinator = Coordinator::new(
                &Config::default(),
                FakeTabs::default(),
                FakeDebugger::default(),
                FakeBackend::default(),
                StateStore::open(&path).unwrap(),
            );
            coordinator.handle_ui(UiCommand::Start { tab: 1 }).await;
            coordinator.handle_engine(1, captured("persisted prompt"));
            coordinator.handle_ui(UiCommand::SwitchModel).await;
        }
        let coordinator = Coordinator::new(
            &Config::default(),
            FakeTabs::default(),
            FakeDebugger::default(),
            FakeBackend::default(),
            StateStore::open(&path).unwrap(),
        );
        assert!(coordinator.state().is_capturing());
        assert!(coordinator.state().is_paused());
        assert_eq!(coordinator.state().session_interactions().len(), 1);
        assert_eq!(coordinator.state().interaction_history().count(), 1);
    }

    #[tokio::test]
    async fn test_sniffed_assets_are_persisted() {
        let mut coordinator = coordinator();
        coordinator.handle_ui(UiCommand::Start { tab: 1 }).await;
        coordinator
            .handle_response(ResponseMeta {
                request_id: "r1".to_string(),
                url: "https://cdn/a.png".to_string(),
                mime: "image/png".to_string(),
                resource_type: crate::sniffer::ResourceType::Image,
            })
            .await;
        let assets: Vec<capture_engine::types::RecentAsset> = coordinator
            .store
            .get(keys::RECENT_ASSETS)
            .unwrap()
            .unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].url, "https://cdn/a.png");
    }
}
