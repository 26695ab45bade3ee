//! Wire format of the relay channel.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": {...}}`.

use serde::{Deserialize, Serialize};

/// Frames sent by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    ChatRequest(ChatRequest),
}

/// One chat turn submitted by the composer.
///
/// Absent values are sent as explicit `null`s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base64 image payload, only when the file was not uploaded first.
    #[serde(default)]
    pub image: Option<String>,
    /// Server path of an already uploaded image.
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl ChatRequest {
    pub fn has_attachment(&self) -> bool {
        self.image.is_some() || self.image_url.is_some()
    }
}

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A finished assistant turn, sent to every connection.
    ChatUpdate(ChatUpdate),
    AiThinking { active: bool },
    SysStatus { cpu_temp: String },
    /// Only ever sent to the connection whose request failed.
    ErrorMessage { response: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatUpdate(_) => "chat_update",
            Self::AiThinking { .. } => "ai_thinking",
            Self::SysStatus { .. } => "sys_status",
            Self::ErrorMessage { .. } => "error_message",
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::ErrorMessage {
            response: format!("エラー：{message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUpdate {
    pub user_message: String,
    pub response: String,
    pub voice_url: Option<String>,
    pub launch_url: Option<String>,
    /// Unix time in seconds.
    pub timestamp: f64,
}
