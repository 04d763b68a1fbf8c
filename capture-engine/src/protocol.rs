//! Tab-scoped message protocol between the engine and the coordinator.
//!
//! The JSON shapes are the contract; the serde renames below are load
//! bearing and must not drift.

use crate::types::Interaction;
use serde::{Deserialize, Serialize};

/// Command delivered to a tab's engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum TabCommand {
    /// `{"action": "SET_CAPTURING", "value": bool}` — expects a reply.
    #[serde(rename = "SET_CAPTURING")]
    SetCapturing { value: bool },
    /// `{"action": "PAUSE_CAPTURING"}` — fire and forget.
    #[serde(rename = "PAUSE_CAPTURING")]
    PauseCapturing,
    /// `{"action": "RESUME_CAPTURING"}` — fire and forget.
    #[serde(rename = "RESUME_CAPTURING")]
    ResumeCapturing,
}

/// Reply to a [`TabCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TabReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Message emitted by a tab's engine instance toward the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum EngineMessage {
    #[serde(rename = "domPathFound")]
    DomPathFound { path: String, url: String },
    #[serde(rename = "interactionCaptured")]
    InteractionCaptured { interaction: Interaction },
}
