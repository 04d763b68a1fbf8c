//! Change-detection scheduling.
//!
//! Per-tab state machine deciding when the extractor re-runs: push
//! (mutation batches) for providers a body-level observer can see, pull
//! (interval polling) for the one that hides behind shadow roots. The
//! machine itself carries no timers; the session loop asks it whether a
//! given trigger should run extraction, which keeps start/stop teardown
//! synchronous.

use crate::provider::WatchStrategy;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching(WatchStrategy),
}

pub struct ChangeScheduler {
    state: WatchState,
    poll_interval: Duration,
}

impl ChangeScheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: WatchState::Idle,
            poll_interval,
        }
    }

    /// Begin watching with the given strategy. Starting while already
    /// watching is a no-op; returns whether the state changed.
    pub fn start(&mut self, strategy: WatchStrategy) -> bool {
        match self.state {
            WatchState::Watching(_) => false,
            WatchState::Idle => {
                debug!("scheduler watching ({strategy:?})");
                self.state = WatchState::Watching(strategy);
                true
            }
        }
    }

    /// Stop watching. Stopping while idle is a no-op; returns whether the
    /// state changed. Teardown is synchronous: after this returns no
    /// trigger will run extraction.
    pub fn stop(&mut self) -> bool {
        match self.state {
            WatchState::Idle => false,
            WatchState::Watching(_) => {
                debug!("scheduler idle");
                self.state = WatchState::Idle;
                true
            }
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn is_watching(&self) -> bool {
        matches!(self.state, WatchState::Watching(_))
    }

    /// Whether a mutation batch should trigger extraction.
    pub fn wants_mutations(&self) -> bool {
        self.state == WatchState::Watching(WatchStrategy::Observe)
    }

    /// Whether a poll tick should trigger extraction.
    pub fn wants_ticks(&self) -> bool {
        self.state == WatchState::Watching(WatchStrategy::Poll)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
