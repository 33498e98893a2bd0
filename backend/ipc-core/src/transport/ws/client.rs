//! WebSocket client endpoint.

use crate::error::transport::TransportError;
use crate::transport::ws::WsSender;
use crate::transport::ws::frame::{AuthHandshake, AuthHandshakeResponse, Frame, decode_json, encode_json};
use crate::transport::{Delivery, Inbound, Origin, Outbound, SubscriberTable, Subscription};

use common::{ErrorLocation, RedactedToken};

use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use futures_util::StreamExt;
use log::{debug, info, trace, warn};
use serde_json::Value;
use tokio::spawn as TokioSpawn;
use tokio::time::sleep as TokioSleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

/// Authenticated connection to a WebSocket host.
///
/// Sends go to the host; frames the host pushes are routed to subscriptions
/// made through [`Inbound::subscribe`]. Clones share the connection.
#[derive(Debug, Clone)]
pub struct WsClientEndpoint {
    url: Arc<str>,
    sender: WsSender,
    subscribers: Arc<SubscriberTable>,
}

impl WsClientEndpoint {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Send a close frame and end every subscription.
    pub fn close(&self) {
        if self.sender.send_raw(WsMessage::Close(None)).is_err() {
            trace!("Connection to {} already closed", self.url);
        }
        self.subscribers.close();
    }
}

impl Outbound for WsClientEndpoint {
    fn send(&self, channel: &str, message: Value) -> Result<(), TransportError> {
        self.sender.send(channel, message)
    }
}

impl Inbound for WsClientEndpoint {
    fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        if self.sender.is_closed() {
            return Err(TransportError::Closed {
                message: format!("connection to {} is closed", self.url),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(self.subscribers.subscribe(channel))
    }
}

fn parse_ws_url(url: &str) -> Result<Url, TransportError> {
    let parsed = Url::parse(url)?;
    if parsed.scheme() != "ws" {
        return Err(TransportError::Url {
            message: format!("Expected a ws:// URL, got '{url}'"),
            location: ErrorLocation::from(Location::caller()),
        });
    }
    Ok(parsed)
}

/// Connect to `url` and authenticate with `token`.
///
/// # Errors
///
/// - [`TransportError::Url`] - `url` is not a `ws://` URL
/// - [`TransportError::Io`] - connection refused or upgrade failed
/// - [`TransportError::Auth`] - the host rejected the token
/// - [`TransportError::Handshake`] - the host closed before answering
pub async fn connect_ws_client(
    url: &str,
    token: &RedactedToken,
) -> Result<WsClientEndpoint, TransportError> {
    let parsed = parse_ws_url(url)?;

    let (ws_stream, _) = connect_async(parsed.as_str()).await?;
    let (write, mut read) = ws_stream.split();
    let sender = WsSender::spawn(url, write);

    sender.send_raw(encode_json(&AuthHandshake {
        token: token.expose().to_string(),
    })?)?;

    let response: AuthHandshakeResponse = match read.next().await {
        Some(Ok(WsMessage::Text(text))) => decode_json(text.as_str())?,
        Some(Ok(other)) => {
            return Err(TransportError::Handshake {
                message: format!("Expected auth response from {url}, got {other:?}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Some(Err(e)) => return Err(e.into()),
        None => {
            return Err(TransportError::Handshake {
                message: format!("{url} closed the connection during auth"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
    };

    if !response.success {
        return Err(TransportError::Auth {
            message: response
                .error
                .unwrap_or_else(|| "authentication rejected".to_string()),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    info!("Connected to {url}");

    let subscribers = Arc::new(SubscriberTable::new());
    let origin = Origin::new(format!("host@{url}"), Arc::new(sender.clone()));
    let reader_subscribers = Arc::clone(&subscribers);
    let reader_url = url.to_string();

    TokioSpawn(async move {
        while let Some(next) = read.next().await {
            match next {
                Ok(WsMessage::Text(text)) => match Frame::decode(text.as_str()) {
                    Ok(frame) => {
                        let channel = frame.channel;
                        let delivered = reader_subscribers.deliver(Delivery {
                            channel: channel.clone(),
                            message: frame.message,
                            origin: origin.clone(),
                        });
                        if delivered == 0 {
                            debug!("Dropping frame on '{channel}' from {reader_url}: no subscriber");
                        }
                    }
                    Err(e) => warn!("Dropping malformed frame from {reader_url}: {e}"),
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => trace!("Ignoring non-text message from {reader_url}"),
                Err(e) => {
                    warn!("Read from {reader_url} failed: {e}");
                    break;
                }
            }
        }
        reader_subscribers.close();
        info!("Disconnected from {reader_url}");
    });

    Ok(WsClientEndpoint {
        url: url.into(),
        sender,
        subscribers,
    })
}

/// [`connect_ws_client`] with exponential backoff, for hosts that are still
/// starting up. Bad URLs and rejected tokens fail immediately.
pub async fn connect_with_retry(
    url: &str,
    token: &RedactedToken,
    max_elapsed: Duration,
) -> Result<WsClientEndpoint, TransportError> {
    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    loop {
        match connect_ws_client(url, token).await {
            Ok(endpoint) => return Ok(endpoint),
            Err(e @ (TransportError::Auth { .. } | TransportError::Url { .. })) => return Err(e),
            Err(e) => match backoff.next_backoff() {
                Some(duration) => {
                    trace!("Connect to {url} failed ({e}), retrying after {duration:?}");
                    TokioSleep(duration).await;
                }
                None => {
                    warn!("Giving up on {url} after {max_elapsed:?}");
                    return Err(e);
                }
            },
        }
    }
}
