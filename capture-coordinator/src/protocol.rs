//! Control-surface protocol: commands from the operator UI and the
//! coordinator's replies.

use serde::{Deserialize, Serialize};

/// Command arriving from the control surface. The `tab` field names the
/// tab the operator is looking at; commands that only touch coordinator
/// state ignore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum UiCommand {
    #[serde(rename = "start")]
    Start { tab: i64 },
    #[serde(rename = "stop")]
    Stop { tab: i64 },
    #[serde(rename = "pause")]
    Pause { tab: i64 },
    #[serde(rename = "resume")]
    Resume { tab: i64 },
    #[serde(rename = "switchModel")]
    SwitchModel,
    #[serde(rename = "sendSession")]
    SendSession,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UiResponse {
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
