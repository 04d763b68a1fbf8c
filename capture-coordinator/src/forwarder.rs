//! Session delivery to the configured backend endpoint.

use async_trait::async_trait;
use capture_engine::types::{now_iso8601, Interaction};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend rejected session: HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Serialize)]
struct SessionEnvelope<'a> {
    session: &'a [Interaction],
    timestamp: String,
}

/// Destination for completed sessions.
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn send_session(&self, session: &[Interaction]) -> Result<(), ForwardError>;
}

#[async_trait]
impl<S: SessionSink + ?Sized> SessionSink for std::sync::Arc<S> {
    async fn send_session(&self, session: &[Interaction]) -> Result<(), ForwardError> {
        (**self).send_session(session).await
    }
}

/// HTTP client for the session endpoint. Delivery is single-shot; on
/// failure the caller keeps the session and may try again later.
pub struct BackendClient {
    client: reqwest::Client,
    endpoint: String,
}

impl BackendClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SessionSink for BackendClient {
    /// POST the accumulated session as JSON. Only a 2xx response counts
    /// as delivered.
    async fn send_session(&self, session: &[Interaction]) -> Result<(), ForwardError> {
        let envelope = SessionEnvelope {
            session,
            timestamp: now_iso8601(),
        };
        debug!(
            "sending session of {} interactions to {}",
            session.len(),
            self.endpoint
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status(status.as_u16()));
        }
        info!("session delivered ({} interactions)", session.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_engine::types::InteractionOutput;

    #[test]
    fn test_envelope_wire_shape() {
        let session = vec![Interaction {
            url: "https://claude.ai".to_string(),
            input: "hi".to_string(),
            output: InteractionOutput::Text("hello".to_string()),
            model_version: "unknown".to_string(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
        }];
        let envelope = SessionEnvelope {
            session: &session,
            timestamp: "2025-01-02T00:00:00.000Z".to_string(),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["session"].as_array().unwrap().len(), 1);
        assert_eq!(json["timestamp"], "2025-01-02T00:00:00.000Z");
        assert_eq!(json["session"][0]["input"], "hi");
    }
}
