use crate::error::transport::TransportError;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// One transport message: a routing key plus an opaque JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub channel: String,
    #[serde(default)]
    pub message: Value,
}

impl Frame {
    pub fn encode(&self) -> Result<WsMessage, TransportError> {
        encode_json(self)
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        decode_json(text)
    }
}

/// First message a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthHandshake {
    pub token: String,
}

/// Host reply to [`AuthHandshake`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthHandshakeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthHandshakeResponse {
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            success: false,
            error: Some(reason.to_string()),
        }
    }
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<WsMessage, TransportError> {
    Ok(WsMessage::text(serde_json::to_string(value)?))
}

pub(crate) fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, TransportError> {
    Ok(serde_json::from_str(text)?)
}
