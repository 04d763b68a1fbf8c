//! Delivery of commands to per-tab engine instances.
//!
//! A tab may not have an engine listening yet (fresh navigation, or the
//! page was loaded before capture was turned on). Delivery distinguishes
//! "nobody listening" from every other failure so the commander can
//! inject the engine and retry exactly once.

use async_trait::async_trait;
use capture_engine::protocol::{TabCommand, TabReply};
use capture_engine::types::TabId;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No engine instance is listening in the tab.
    #[error("no receiver in tab {0}")]
    NoReceiver(TabId),
    /// The tab hosts a page scripts cannot run in.
    #[error("tab {0} is restricted")]
    Restricted(TabId),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Browser-side operations the coordinator needs from a tab.
#[async_trait]
pub trait TabTransport: Send + Sync {
    /// Deliver a command to the engine in `tab` and wait for its reply.
    async fn send_command(&self, tab: TabId, command: TabCommand) -> Result<TabReply, DeliveryError>;

    /// Inject the engine script into `tab`.
    async fn inject_engine(&self, tab: TabId) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<T: TabTransport + ?Sized> TabTransport for std::sync::Arc<T> {
    async fn send_command(
        &self,
        tab: TabId,
        command: TabCommand,
    ) -> Result<TabReply, DeliveryError> {
        (**self).send_command(tab, command).await
    }

    async fn inject_engine(&self, tab: TabId) -> Result<(), DeliveryError> {
        (**self).inject_engine(tab).await
    }
}

/// Command delivery with single-shot injection recovery.
pub struct TabCommander<T> {
    transport: T,
}

impl<T: TabTransport> TabCommander<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Toggle capturing in a tab. On [`DeliveryError::NoReceiver`] the
    /// engine is injected and the command retried once; a second miss
    /// means injection cannot reach the page, which is terminal. Any
    /// failure is returned so the caller can roll the coordinator state
    /// back.
    pub async fn set_capturing(&self, tab: TabId, value: bool) -> Result<TabReply, DeliveryError> {
        let command = TabCommand::SetCapturing { value };
        match self.transport.send_command(tab, command.clone()).await {
            Ok(reply) => Ok(reply),
            Err(DeliveryError::NoReceiver(_)) => {
                debug!("tab {tab}: no engine listening, injecting");
                self.transport.inject_engine(tab).await?;
                match self.transport.send_command(tab, command).await {
                    Err(DeliveryError::NoReceiver(_)) => Err(DeliveryError::Restricted(tab)),
                    other => other,
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Pause emission in a tab, fire and forget. Failures are logged
    /// only; the coordinator drops paused interactions regardless.
    pub async fn pause(&self, tab: TabId) {
        if let Err(err) = self
            .transport
            .send_command(tab, TabCommand::PauseCapturing)
            .await
        {
            warn!("tab {tab}: pause not delivered: {err}");
        }
    }

    /// Resume capturing, fire and forget. Failures are logged only; a
    /// tab that was closed since pausing is not an error.
    pub async fn resume(&self, tab: TabId) {
        if let Err(err) = self
            .transport
            .send_command(tab, TabCommand::ResumeCapturing)
            .await
        {
            warn!("tab {tab}: resume not delivered: {err}");
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
