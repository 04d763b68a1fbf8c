//! Bridge between the coordinator and the browser-side relay.
//!
//! Everything the coordinator asks of the browser (deliver a tab
//! command, inject the engine, drive the debugger) travels as an
//! outbound frame carrying a correlation id; the relay answers with a
//! reply frame carrying the same id. Pending requests wait on oneshot
//! channels and time out rather than hang when the relay dies.

use crate::protocol::{UiCommand, UiResponse};
use crate::sniffer::{DebuggerTransport, ResponseBody, ResponseMeta, SnifferError};
use crate::tabs::{DeliveryError, TabTransport};
use async_trait::async_trait;
use capture_engine::protocol::{EngineMessage, TabCommand, TabReply};
use capture_engine::types::TabId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame arriving from the relay.
#[derive(Debug, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum InboundFrame {
    Ui {
        command: UiCommand,
    },
    Engine {
        tab: TabId,
        message: EngineMessage,
    },
    Network {
        meta: ResponseMeta,
    },
    Reply {
        id: u64,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Frame sent to the relay.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutboundFrame {
    Response {
        response: UiResponse,
    },
    TabCommand {
        id: u64,
        tab: TabId,
        command: TabCommand,
    },
    InjectEngine {
        id: u64,
        tab: TabId,
    },
    DebuggerAttach {
        id: u64,
        tab: TabId,
    },
    DebuggerDetach {
        id: u64,
        tab: TabId,
    },
    FetchBody {
        id: u64,
        tab: TabId,
        request_id: String,
    },
}

/// Shape of a reply payload for delivery-style requests.
#[derive(Debug, Deserialize)]
struct DeliveryReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    /// Machine-readable failure class: "noReceiver" or "restricted".
    #[serde(default)]
    code: Option<String>,
}

/// Shape of a reply payload for body fetches.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BodyReply {
    body: String,
    #[serde(default)]
    base64_encoded: bool,
}

/// Correlated request/reply transport over the relay.
#[derive(Clone)]
pub struct RelayTransport {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>,
    next_id: Arc<AtomicU64>,
}

impl RelayTransport {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Route a reply frame to whoever is waiting on its id. Replies for
    /// unknown ids (a request that already timed out) are dropped.
    pub fn dispatch_reply(&self, id: u64, payload: serde_json::Value) {
        let waiter = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&id),
            Err(_) => None,
        };
        match waiter {
            Some(tx) => {
                let _ = tx.send(payload);
            }
            None => warn!("reply for unknown request id {id}"),
        }
    }

    async fn request<F>(&self, build: F) -> Result<serde_json::Value, String>
    where
        F: FnOnce(u64) -> OutboundFrame,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }
        if self.outbound.send(build(id)).is_err() {
            self.forget(id);
            return Err("relay closed".to_string());
        }
        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err("reply channel dropped".to_string()),
            Err(_) => {
                self.forget(id);
                Err("reply timed out".to_string())
            }
        }
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }

    fn delivery_error(tab: TabId, reply: &DeliveryReply) -> DeliveryError {
        match reply.code.as_deref() {
            Some("noReceiver") => DeliveryError::NoReceiver(tab),
            Some("restricted") => DeliveryError::Restricted(tab),
            _ => DeliveryError::Transport(
                reply
                    .error
                    .clone()
                    .unwrap_or_else(|| "delivery failed".to_string()),
            ),
        }
    }
}

#[async_trait]
impl TabTransport for RelayTransport {
    async fn send_command(
        &self,
        tab: TabId,
        command: TabCommand,
    ) -> Result<TabReply, DeliveryError> {
        let payload = self
            .request(|id| OutboundFrame::TabCommand { id, tab, command })
            .await
            .map_err(DeliveryError::Transport)?;
        let reply: DeliveryReply = serde_json::from_value(payload)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        if reply.success {
            Ok(TabReply::ok())
        } else if reply.code.is_some() {
            Err(Self::delivery_error(tab, &reply))
        } else {
            Ok(TabReply {
                success: false,
                error: reply.error,
            })
        }
    }

    async fn inject_engine(&self, tab: TabId) -> Result<(), DeliveryError> {
        let payload = self
            .request(|id| OutboundFrame::InjectEngine { id, tab })
            .await
            .map_err(DeliveryError::Transport)?;
        let reply: DeliveryReply = serde_json::from_value(payload)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        if reply.success {
            Ok(())
        } else {
            Err(Self::delivery_error(tab, &reply))
        }
    }
}

#[async_trait]
impl DebuggerTransport for RelayTransport {
    async fn attach(&self, tab: TabId) -> Result<(), SnifferError> {
        let payload = self
            .request(|id| OutboundFrame::DebuggerAttach { id, tab })
            .await
            .map_err(SnifferError::Attach)?;
        let reply: DeliveryReply =
            serde_json::from_value(payload).map_err(|e| SnifferError::Attach(e.to_string()))?;
        if reply.success {
            Ok(())
        } else {
            Err(SnifferError::Attach(
                reply.error.unwrap_or_else(|| "attach refused".to_string()),
            ))
        }
    }

    async fn detach(&self, tab: TabId) -> Result<(), SnifferError> {
        let payload = self
            .request(|id| OutboundFrame::DebuggerDetach { id, tab })
            .await
            .map_err(SnifferError::Detach)?;
        let reply: DeliveryReply =
            serde_json::from_value(payload).map_err(|e| SnifferError::Detach(e.to_string()))?;
        if reply.success {
            Ok(())
        } else {
            Err(SnifferError::Detach(
                reply.error.unwrap_or_else(|| "detach refused".to_string()),
            ))
        }
    }

    async fn fetch_body(&self, tab: TabId, request_id: &str) -> Result<ResponseBody, SnifferError> {
        let request_id = request_id.to_string();
        let payload = self
            .request(|id| OutboundFrame::FetchBody {
                id,
                tab,
                request_id,
            })
            .await
            .map_err(SnifferError::Body)?;
        let reply: BodyReply =
            serde_json::from_value(payload).map_err(|e| SnifferError::Body(e.to_string()))?;
        // Pre-encoded bodies pass through as-is; the sniffer stores them
        // without re-encoding.
        Ok(ResponseBody {
            body: reply.body.into_bytes(),
            base64_encoded: reply.base64_encoded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wired() -> (RelayTransport, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RelayTransport::new(tx), rx)
    }

    #[tokio::test]
    async fn test_command_reply_correlation() {
        let (transport, mut rx) = wired();
        let responder = transport.clone();
        let task = tokio::spawn(async move {
            let frame = rx.recv().await.unwrap();
            let OutboundFrame::TabCommand { id, tab, .. } = frame else {
                panic!("unexpected frame");
            };
            assert_eq!(tab, 3);
            responder.dispatch_reply(id, serde_json::json!({"success": true}));
        });
        let reply = transport
            .send_command(3, TabCommand::ResumeCapturing)
            .await
            .unwrap();
        assert!(reply.success);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_receiver_code_maps_to_delivery_error() {
        let (transport, mut rx) = wired();
        let responder = transport.clone();
        tokio::spawn(async move {
            if let Some(OutboundFrame::TabCommand { id, .. }) = rx.recv().await {
                responder.dispatch_reply(
                    id,
                    serde_json::json!({"success": false, "code": "noReceiver"}),
                );
            }
        });
        let err = transport
            .send_command(5, TabCommand::SetCapturing { value: true })
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NoReceiver(5)));
    }

    #[tokio::test]
    async fn test_engine_refusal_is_a_reply_not_an_error() {
        let (transport, mut rx) = wired();
        let responder = transport.clone();
        tokio::spawn(async move {
            if let Some(OutboundFrame::TabCommand { id, .. }) = rx.recv().await {
                responder.dispatch_reply(
                    id,
                    serde_json::json!({"success": false, "error": "busy"}),
                );
            }
        });
        let reply = transport
            .send_command(5, TabCommand::SetCapturing { value: true })
            .await
            .unwrap();
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some("busy"));
    }

    #[tokio::test]
    async fn test_closed_relay_fails_fast() {
        let (transport, rx) = wired();
        drop(rx);
        let err = transport
            .send_command(1, TabCommand::ResumeCapturing)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }

    #[tokio::test]
    async fn test_fetch_body_passthrough() {
        let (transport, mut rx) = wired();
        let responder = transport.clone();
        tokio::spawn(async move {
            if let Some(OutboundFrame::FetchBody { id, request_id, .. }) = rx.recv().await {
                assert_eq!(request_id, "r9");
                responder.dispatch_reply(
                    id,
                    serde_json::json!({"body": "QUJD", "base64Encoded": true}),
                );
            }
        });
        let body = transport.fetch_body(2, "r9").await.unwrap();
        assert!(body.base64_encoded);
        assert_eq!(body.body, b"QUJD");
    }

    #[test]
    fn test_inbound_frame_shapes() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"source": "ui", "command": {"action": "start", "tab": 2}}"#,
        )
        .unwrap();
        assert!(matches!(
            frame,
            InboundFrame::Ui {
                command: UiCommand::Start { tab: 2 }
            }
        ));

        let frame: InboundFrame = serde_json::from_str(
            r#"{"source": "engine", "tab": 4, "message": {"action": "domPathFound", "path": "a", "url": "https://x"}}"#,
        )
        .unwrap();
        assert!(matches!(frame, InboundFrame::Engine { tab: 4, .. }));

        let frame: InboundFrame =
            serde_json::from_str(r#"{"source": "reply", "id": 12, "payload": {"success": true}}"#)
                .unwrap();
        assert!(matches!(frame, InboundFrame::Reply { id: 12, .. }));
    }
}
