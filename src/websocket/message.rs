//! JSON frame exchanged with the browser extension.
//!
//! The extension in the field still reads the legacy `action`/`data` keys, so
//! outbound commands carry both spellings and inbound replies prefer
//! `result` with `data` as fallback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Command,
    Response,
    Event,
    Ping,
    Pong,
    Ack,
    Connected,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type", default)]
    pub kind: MessageType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Message {
    /// Outbound command frame with both the current and legacy keys filled in
    pub fn command(id: impl Into<String>, action: &str, params: Value) -> Self {
        Self {
            id: id.into(),
            kind: MessageType::Command,
            command: action.to_string(),
            action: action.to_string(),
            data: Some(params.clone()),
            params: Some(params),
            ..Default::default()
        }
    }

    pub fn pong(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MessageType::Pong,
            command: "pong".to_string(),
            ..Default::default()
        }
    }

    pub fn ack(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MessageType::Ack,
            command: "ack".to_string(),
            ..Default::default()
        }
    }

    /// Reply payload: `result` when present, else the legacy `data`
    pub fn payload(&self) -> Option<&Value> {
        self.result.as_ref().or(self.data.as_ref())
    }

    /// Action name of an inbound event, falling back to `command`
    pub fn action_name(&self) -> &str {
        if self.action.is_empty() {
            &self.command
        } else {
            &self.action
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
