//! Capture state machine and bounded histories.
//!
//! Stopped ⇄ Capturing with an orthogonal Paused flag. All history
//! buffers are newest-first and hard-capped; insertion evicts from the
//! tail. The type is pure and synchronous so every transition is
//! unit-testable and atomic with respect to the event loop.

use capture_engine::types::{CapturedPath, Interaction};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// Default bound for all capped histories.
pub const DEFAULT_HISTORY_CAP: usize = 50;

pub struct CaptureState {
    is_capturing: bool,
    is_paused: bool,
    latest_interaction: Option<Interaction>,
    latest_path: Option<CapturedPath>,
    interaction_history: VecDeque<Interaction>,
    path_history: VecDeque<CapturedPath>,
    session_interactions: Vec<Interaction>,
    cap: usize,
}

impl CaptureState {
    /// Install-time state: not capturing, not paused, empty session.
    pub fn new(cap: usize) -> Self {
        Self {
            is_capturing: false,
            is_paused: false,
            latest_interaction: None,
            latest_path: None,
            interaction_history: VecDeque::new(),
            path_history: VecDeque::new(),
            session_interactions: Vec::new(),
            cap,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.is_capturing
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn set_capturing(&mut self, value: bool) {
        self.is_capturing = value;
        if !value {
            self.is_paused = false;
        }
    }

    pub fn set_paused(&mut self, value: bool) {
        self.is_paused = value;
    }

    /// Record a captured interaction: update the latest slot and prepend
    /// to the capped history. Independent of the session accumulator.
    pub fn record_interaction(&mut self, interaction: Interaction) {
        self.interaction_history.push_front(interaction.clone());
        self.interaction_history.truncate(self.cap);
        self.latest_interaction = Some(interaction);
    }

    /// Record a captured click path, same bounding rules.
    pub fn record_path(&mut self, path: CapturedPath) {
        self.path_history.push_front(path.clone());
        self.path_history.truncate(self.cap);
        self.latest_path = Some(path);
    }

    /// Attribute the next capture to a different model/session: move the
    /// current latest interaction into the session accumulator, clear the
    /// slot, and force Paused so a stale cross-session interaction is
    /// never silently relayed. Returns whether an interaction moved.
    pub fn switch_model(&mut self) -> bool {
        let moved = match self.latest_interaction.take() {
            Some(interaction) => {
                self.session_interactions.push(interaction);
                true
            }
            None => false,
        };
        self.is_paused = true;
        debug!(
            "switch_model: session now holds {} interactions",
            self.session_interactions.len()
        );
        moved
    }

    /// Drain the accumulated session for sending. The caller only calls
    /// this after a successful delivery; see the coordinator.
    pub fn drain_session(&mut self) -> Vec<Interaction> {
        std::mem::take(&mut self.session_interactions)
    }

    pub fn restore_session(&mut self, interactions: Vec<Interaction>) {
        self.session_interactions = interactions;
    }

    pub fn latest_interaction(&self) -> Option<&Interaction> {
        self.latest_interaction.as_ref()
    }

    pub fn latest_path(&self) -> Option<&CapturedPath> {
        self.latest_path.as_ref()
    }

    pub fn interaction_history(&self) -> impl Iterator<Item = &Interaction> {
        self.interaction_history.iter()
    }

    pub fn path_history(&self) -> impl Iterator<Item = &CapturedPath> {
        self.path_history.iter()
    }

    pub fn session_interactions(&self) -> &[Interaction] {
        &self.session_interactions
    }

    /// Serializable snapshot of the full persisted contract.
    pub fn snapshot(&self) -> StateSnapshot<'_> {
        StateSnapshot {
            is_capturing: self.is_capturing,
            is_paused: self.is_paused,
            latest_interaction: self.latest_interaction.as_ref(),
            latest_path: self.latest_path.as_ref(),
            interaction_history: self.interaction_history.iter().collect(),
            path_history: self.path_history.iter().collect(),
            session_interactions: &self.session_interactions,
        }
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

/// Owned form of the persisted contract, used to rebuild state after a
/// restart.
#[derive(Debug, Default)]
pub struct PersistedState {
    pub is_capturing: bool,
    pub is_paused: bool,
    pub latest_interaction: Option<Interaction>,
    pub latest_path: Option<CapturedPath>,
    pub interaction_history: Vec<Interaction>,
    pub path_history: Vec<CapturedPath>,
    pub session_interactions: Vec<Interaction>,
}

impl CaptureState {
    /// Rebuild state from its persisted form. Histories are re-capped in
    /// case the bound was lowered between runs.
    pub fn from_persisted(cap: usize, persisted: PersistedState) -> Self {
        let mut interaction_history: VecDeque<_> = persisted.interaction_history.into();
        interaction_history.truncate(cap);
        let mut path_history: VecDeque<_> = persisted.path_history.into();
        path_history.truncate(cap);
        Self {
            is_capturing: persisted.is_capturing,
            is_paused: persisted.is_paused,
            latest_interaction: persisted.latest_interaction,
            latest_path: persisted.latest_path,
            interaction_history,
            path_history,
            session_interactions: persisted.session_interactions,
            cap,
        }
    }
}

/// Borrowed view of the persisted key/value contract.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot<'a> {
    pub is_capturing: bool,
    pub is_paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_interaction: Option<&'a Interaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_path: Option<&'a CapturedPath>,
    pub interaction_history: Vec<&'a Interaction>,
    pub path_history: Vec<&'a CapturedPath>,
    pub session_interactions: &'a [Interaction],
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_engine::types::{InteractionOutput, OriginTab};

    fn interaction(n: usize) -> Interaction {
        Interaction {
            url: "https://chat.openai.com".to_string(),
            input: format!("prompt {n}"),
            output: InteractionOutput::Text(format!("reply {n}")),
            model_version: "unknown".to_string(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn path(n: usize) -> CapturedPath {
        CapturedPath {
            path: format!("div:nth-of-type({n})"),
            url: "https://chat.openai.com".to_string(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            origin_tab_id: OriginTab::Tab(1),
        }
    }

    #[test]
    fn test_initial_state() {
        let state = CaptureState::default();
        assert!(!state.is_capturing());
        assert!(!state.is_paused());
        assert!(state.session_interactions().is_empty());
    }

    #[test]
    fn test_history_bound_oldest_evicted() {
        let mut state = CaptureState::new(50);
        for n in 0..60 {
            state.record_interaction(interaction(n));
        }
        let history: Vec<_> = state.interaction_history().collect();
        assert_eq!(history.len(), 50);
        // Newest first; the ten oldest fell off the tail.
        assert_eq!(history[0].input, "prompt 59");
        assert_eq!(history[49].input, "prompt 10");
    }

    #[test]
    fn test_path_history_bound() {
        let mut state = CaptureState::new(50);
        for n in 0..55 {
            state.record_path(path(n));
        }
        assert_eq!(state.path_history().count(), 50);
        assert_eq!(state.latest_path().unwrap().path, "div:nth-of-type(54)");
    }

    #[test]
    fn test_switch_model_with_latest_present() {
        let mut state = CaptureState::default();
        state.set_capturing(true);
        state.record_interaction(interaction(1));

        assert!(state.switch_model());
        assert_eq!(state.session_interactions().len(), 1);
        assert!(state.latest_interaction().is_none());
        assert!(state.is_paused());
    }

    #[test]
    fn test_switch_model_without_latest_still_pauses() {
        let mut state = CaptureState::default();
        assert!(!state.switch_model());
        assert!(state.session_interactions().is_empty());
        assert!(state.is_paused());
    }

    #[test]
    fn test_drain_and_restore_session() {
        let mut state = CaptureState::default();
        state.record_interaction(interaction(1));
        state.switch_model();
        state.record_interaction(interaction(2));
        state.switch_model();

        let drained = state.drain_session();
        assert_eq!(drained.len(), 2);
        assert!(state.session_interactions().is_empty());

        state.restore_session(drained);
        assert_eq!(state.session_interactions().len(), 2);
    }

    #[test]
    fn test_stop_clears_paused() {
        let mut state = CaptureState::default();
        state.set_capturing(true);
        state.set_paused(true);
        state.set_capturing(false);
        assert!(!state.is_paused());
    }

    #[test]
    fn test_from_persisted_recaps_histories() {
        let persisted = PersistedState {
            is_capturing: true,
            is_paused: true,
            interaction_history: (0..10).map(interaction).collect(),
            ..Default::default()
        };
        let state = CaptureState::from_persisted(5, persisted);
        assert!(state.is_capturing());
        assert!(state.is_paused());
        assert_eq!(state.interaction_history().count(), 5);
        // Newest-first order survives, the tail is dropped.
        assert_eq!(state.interaction_history().next().unwrap().input, "prompt 0");
    }

    #[test]
    fn test_snapshot_serializes_contract_keys() {
        let mut state = CaptureState::default();
        state.set_capturing(true);
        state.record_interaction(interaction(1));
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["isCapturing"], true);
        assert_eq!(json["interactionHistory"].as_array().unwrap().len(), 1);
        assert_eq!(json["sessionInteractions"].as_array().unwrap().len(), 0);
    }
}
