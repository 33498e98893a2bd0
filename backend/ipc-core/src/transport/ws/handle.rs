//! Handle to a running WebSocket host.

use crate::error::transport::TransportError;
use crate::transport::ws::{LOOPBACK_HOST, WsSender};
use crate::transport::{Inbound, Outbound, SubscriberTable, Subscription};

use common::RedactedToken;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use log::info;
use serde_json::Value;
use tokio::sync::watch;

pub(crate) type PeerRegistry = Arc<Mutex<HashMap<u64, WsPeer>>>;

/// An authenticated client connection, usable as an [`Outbound`] route.
///
/// The host uses this to act as a dispatcher towards one specific client.
#[derive(Debug, Clone)]
pub struct WsPeer {
    id: u64,
    addr: SocketAddr,
    sender: WsSender,
}

impl WsPeer {
    pub(crate) fn new(id: u64, addr: SocketAddr, sender: WsSender) -> Self {
        Self { id, addr, sender }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn label(&self) -> &str {
        self.sender.label()
    }
}

impl Outbound for WsPeer {
    fn send(&self, channel: &str, message: Value) -> Result<(), TransportError> {
        self.sender.send(channel, message)
    }
}

/// Handle to a running WebSocket host.
///
/// Returned by [`start_ws_host`](crate::transport::ws::start_ws_host). Every frame
/// any authenticated client sends is routed to the subscriptions made through
/// this handle; each delivery's origin replies to the client that sent it.
///
/// # Lifecycle
///
/// Dropping the handle (or calling [`WsHostHandle::shutdown`]) stops accepting,
/// closes every connection and ends every subscription.
pub struct WsHostHandle {
    local_addr: SocketAddr,
    auth_token: RedactedToken,
    router: Arc<SubscriberTable>,
    peers: PeerRegistry,
    shutdown_tx: watch::Sender<bool>,
}

impl WsHostHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        auth_token: RedactedToken,
        router: Arc<SubscriberTable>,
        peers: PeerRegistry,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            local_addr,
            auth_token,
            router,
            peers,
            shutdown_tx,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound port; differs from the requested one when that was `0`.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn url(&self) -> String {
        format!("ws://{LOOPBACK_HOST}:{}", self.port())
    }

    pub fn auth_token(&self) -> &RedactedToken {
        &self.auth_token
    }

    /// Currently authenticated clients, ordered by connection id.
    pub fn peers(&self) -> Vec<WsPeer> {
        let mut peers: Vec<WsPeer> = self
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        peers.sort_by_key(WsPeer::id);
        peers
    }

    pub fn peer(&self, id: u64) -> Option<WsPeer> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        self.router.close();
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("WebSocket host on {} shut down", self.local_addr);
    }
}

impl Inbound for WsHostHandle {
    fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        Ok(self.router.subscribe(channel))
    }
}

impl Drop for WsHostHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
