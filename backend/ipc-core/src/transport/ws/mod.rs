//! Localhost WebSocket transport.
//!
//! Carries [`Frame`]s (`{ "channel", "message" }`) as JSON text messages between
//! one host and any number of clients.
//!
//! # Security
//!
//! - The host binds `127.0.0.1` only and drops non-loopback peers
//! - The first client message must be an [`AuthHandshake`] with the host's token
//! - Any handshake failure closes the connection

mod client;
mod frame;
mod handle;
mod host;

pub use client::{WsClientEndpoint, connect_with_retry, connect_ws_client};
pub use frame::{AuthHandshake, AuthHandshakeResponse, Frame};
pub use handle::{WsHostHandle, WsPeer};
pub use host::start_ws_host;

use crate::error::transport::TransportError;
use crate::transport::Outbound;

use common::{ErrorLocation, RedactedToken};

use std::fmt;
use std::fmt::Display;
use std::panic::Location;
use std::sync::Arc;

use const_format::concatcp;
use futures_util::{Sink, SinkExt};
use log::{debug, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

pub const LOOPBACK_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 19876;
pub const DEFAULT_WS_URL: &str = concatcp!("ws://", LOOPBACK_HOST, ":", DEFAULT_PORT);

/// Fresh random handshake token.
pub fn generate_token() -> RedactedToken {
    RedactedToken::new(Uuid::new_v4().simple().to_string())
}

/// Queue-backed writer for one socket. Clones share the socket.
#[derive(Clone)]
pub(crate) struct WsSender {
    label: Arc<str>,
    tx: mpsc::UnboundedSender<WsMessage>,
}

impl WsSender {
    /// Spawn the write task for `sink` and return the queue feeding it.
    pub(crate) fn spawn<S>(label: &str, mut sink: S) -> Self
    where
        S: Sink<WsMessage> + Unpin + Send + 'static,
        S::Error: Display,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        let task_label = label.to_string();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!("Write to {task_label} failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("Writer for {task_label} stopped");
        });
        Self {
            label: label.into(),
            tx,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn send_raw(&self, message: WsMessage) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::Closed {
            message: format!("connection to {} is closed", self.label),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Outbound for WsSender {
    fn send(&self, channel: &str, message: Value) -> Result<(), TransportError> {
        let frame = Frame {
            channel: channel.to_string(),
            message,
        };
        self.send_raw(frame.encode()?)
    }
}

impl fmt::Debug for WsSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSender")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}
