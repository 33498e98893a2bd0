//! Wire-level vocabulary shared by the dispatcher and the responder.
//!
//! - [`RequestEnvelope`] / [`ResponseEnvelope`]: correlation wrappers around user payloads
//! - [`ErrorObject`] / [`SerializedError`]: errors that cross the process boundary
//! - [`SendOptions`]: per-call tunables
//! - [`ProtocolConfig`]: settings both sides of a pair must agree on
//! - [`ProtocolStats`]: counters for dropped and failed traffic

mod envelope;
mod error_object;
mod options;
mod stats;

pub use envelope::{REQUEST_ID_FIELD, RequestEnvelope, ResponseEnvelope};
pub use error_object::{DEFAULT_ERROR_NAME, ErrorObject, PANIC_ERROR_NAME, SerializedError};
pub use options::SendOptions;
pub use stats::{ProtocolStats, StatsSnapshot};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel every response is funneled through unless configured otherwise.
pub const DEFAULT_RESPONSE_CHANNEL: &str = "__ipc_response__";

/// Settings a dispatcher/responder pair must share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Fixed channel on which all responses travel back to the dispatcher.
    #[serde(default = "default_response_channel")]
    pub response_channel: String,

    /// Timeout applied to requests sent without an explicit one.
    /// `None` keeps such requests pending until answered.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            response_channel: default_response_channel(),
            default_timeout_ms: None,
        }
    }
}

impl ProtocolConfig {
    pub fn with_response_channel(channel: impl Into<String>) -> Self {
        Self {
            response_channel: channel.into(),
            ..Self::default()
        }
    }

    /// Check the settings, returning a human-readable reason on failure.
    pub fn check(&self) -> Result<(), String> {
        check_channel(&self.response_channel)
            .map_err(|reason| format!("response channel {reason}"))?;
        if self.default_timeout_ms == Some(0) {
            return Err("default_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

fn default_response_channel() -> String {
    DEFAULT_RESPONSE_CHANNEL.to_string()
}

/// Channel names are transport routing keys and must be non-empty.
pub fn check_channel(channel: &str) -> Result<(), String> {
    if channel.is_empty() {
        return Err("must be a non-empty string".to_string());
    }
    Ok(())
}

/// JSON type name used in diagnostics.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
