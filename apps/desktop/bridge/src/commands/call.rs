//! `ipc-bridge call`: one request against a running host.

use crate::connection_info::ConnectionInfo;
use crate::error::BridgeError;

use ipc_core::config::BridgeConfig;
use ipc_core::transport::ws::connect_with_retry;
use ipc_core::{RequestDispatcher, SendOptions};

use common::{ErrorLocation, RedactedToken};

use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde_json::Value;

/// Everything `call` needs besides the config.
#[derive(Debug)]
pub struct CallRequest {
    pub channel: String,
    pub payload: Value,
    pub timeout: Option<Duration>,
    pub url: Option<String>,
    pub token: Option<RedactedToken>,
}

impl CallRequest {
    /// Parse the raw CLI payload; absent means `null`.
    pub fn parse_payload(raw: Option<&str>) -> Result<Value, BridgeError> {
        match raw {
            None => Ok(Value::Null),
            Some(raw) => serde_json::from_str(raw).map_err(|e| BridgeError::Bridge {
                message: format!("Payload is not valid JSON: {e}"),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

/// Connect, send the request, and return the response payload.
///
/// The URL and token come from `request` first, then from `connection.json`
/// in `config_dir`.
pub async fn run(
    config: &BridgeConfig,
    config_dir: &Path,
    request: CallRequest,
) -> Result<Value, BridgeError> {
    let CallRequest {
        channel,
        payload,
        timeout,
        url,
        token,
    } = request;

    let (url, token) = match (url, token) {
        (Some(url), Some(token)) => (url, token),
        (url, token) => {
            let info = ConnectionInfo::read(config_dir)?;
            (
                url.unwrap_or_else(|| info.url()),
                token.unwrap_or_else(|| info.auth_token().clone()),
            )
        }
    };

    let connect_timeout = Duration::from_millis(config.transport.connect_timeout_ms);
    let client = connect_with_retry(&url, &token, connect_timeout).await?;
    let dispatcher = RequestDispatcher::new(Arc::new(client.clone()), &client, &config.protocol)?;

    let options = SendOptions { timeout };
    debug!("Calling '{channel}' on {url} with timeout {timeout:?}");
    let result = dispatcher.request(&channel, payload, options).await;

    dispatcher.close();
    client.close();

    Ok(result?)
}
