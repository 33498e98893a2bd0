//! WebSocket host: accepts clients and routes their frames to subscribers.

use crate::error::transport::TransportError;
use crate::transport::ws::frame::{AuthHandshake, AuthHandshakeResponse, Frame, encode_json};
use crate::transport::ws::handle::{PeerRegistry, WsHostHandle, WsPeer};
use crate::transport::ws::{LOOPBACK_HOST, WsSender, generate_token};
use crate::transport::{Delivery, Origin, SubscriberTable};

use common::{ErrorLocation, RedactedToken};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::Location;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{Stream, StreamExt};
use log::{debug, error, info, trace, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::watch;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

/// Shared state every connection task needs.
#[derive(Clone)]
struct ConnectionContext {
    auth_token: RedactedToken,
    router: Arc<SubscriberTable>,
    peers: PeerRegistry,
    shutdown: watch::Receiver<bool>,
}

/// Start the WebSocket host on `127.0.0.1:<port>`.
///
/// Pass port `0` to let the OS pick one; [`WsHostHandle::port`] reports it.
/// When `auth_token` is `None` a random token is generated and exposed via
/// [`WsHostHandle::auth_token`].
///
/// # Errors
///
/// Returns [`TransportError::Io`] if the port is in use or cannot be bound.
pub async fn start_ws_host(
    port: u16,
    auth_token: Option<RedactedToken>,
) -> Result<WsHostHandle, TransportError> {
    let auth_token = auth_token.unwrap_or_else(|| {
        let token = generate_token();
        info!("Generated transport auth token ({} chars)", token.len());
        token
    });

    let address = format!("{LOOPBACK_HOST}:{port}");
    let listener = TcpListener::bind(&address).await?;
    let local_addr = listener.local_addr()?;

    info!("WebSocket host listening on {local_addr}");

    let router = Arc::new(SubscriberTable::new());
    let peers: PeerRegistry = Arc::new(Mutex::new(HashMap::new()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let context = ConnectionContext {
        auth_token: auth_token.clone(),
        router: Arc::clone(&router),
        peers: Arc::clone(&peers),
        shutdown: shutdown_rx,
    };
    TokioSpawn(accept_loop(listener, context));

    Ok(WsHostHandle::new(
        local_addr,
        auth_token,
        router,
        peers,
        shutdown_tx,
    ))
}

async fn accept_loop(listener: TcpListener, mut context: ConnectionContext) {
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    next_id += 1;
                    info!("Client connecting from {addr}");
                    let id = next_id;
                    let connection_context = context.clone();
                    TokioSpawn(async move {
                        if let Err(e) = handle_connection(stream, addr, id, connection_context).await {
                            error!("Connection {id} from {addr} failed: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Accept failed, host stops listening: {e}");
                    break;
                }
            },
            _ = context.shutdown.changed() => {
                info!("Host stopped accepting connections");
                break;
            }
        }
    }
}

/// Serve one connection: loopback check, handshake, then frame routing.
///
/// # Errors
///
/// - [`TransportError::Handshake`] - WebSocket upgrade failed
/// - [`TransportError::Read`] - socket error while reading
///
/// Authentication failures and malformed frames are logged, not returned.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: u64,
    mut context: ConnectionContext,
) -> Result<(), TransportError> {
    if !addr.ip().is_loopback() {
        warn!("Rejected non-loopback connection from {addr}");
        return Ok(());
    }

    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| TransportError::Handshake {
            message: format!("WebSocket handshake with {addr} failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let (write, mut read) = ws_stream.split();
    let label = format!("client-{id}@{addr}");
    let sender = WsSender::spawn(&label, write);

    if !authenticate(&mut read, &sender, &context.auth_token, addr).await? {
        return Ok(());
    }

    let peer = WsPeer::new(id, addr, sender.clone());
    context
        .peers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, peer.clone());
    let origin = Origin::new(label, Arc::new(peer));

    let result = route_frames(&mut read, &context.router, &origin, &mut context.shutdown).await;

    if *context.shutdown.borrow() {
        let _ = sender.send_raw(WsMessage::Close(None));
    }

    context
        .peers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    info!("Client {addr} disconnected");
    result
}

/// The first message must be a valid [`AuthHandshake`]. Returns whether the
/// connection may continue.
async fn authenticate<S>(
    read: &mut S,
    sender: &WsSender,
    auth_token: &RedactedToken,
    addr: SocketAddr,
) -> Result<bool, TransportError>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    match read.next().await {
        Some(Ok(WsMessage::Text(text))) => {
            let Ok(handshake) = serde_json::from_str::<AuthHandshake>(text.as_str()) else {
                warn!("Client {addr} auth failed: first message was not an auth handshake");
                return Ok(false);
            };
            if auth_token.matches(&handshake.token) {
                info!("Client {addr} authenticated successfully");
                sender.send_raw(encode_json(&AuthHandshakeResponse::accepted())?)?;
                Ok(true)
            } else {
                warn!("Client {addr} auth failed: invalid token");
                sender.send_raw(encode_json(&AuthHandshakeResponse::rejected(
                    "Invalid authentication token",
                ))?)?;
                Ok(false)
            }
        }
        Some(Ok(_)) => {
            warn!("Client {addr} sent non-text first message");
            Ok(false)
        }
        Some(Err(e)) => Err(TransportError::Read {
            message: format!("Error reading first message from {addr}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        }),
        None => {
            warn!("Client {addr} disconnected before sending auth");
            Ok(false)
        }
    }
}

async fn route_frames<S>(
    read: &mut S,
    router: &SubscriberTable,
    origin: &Origin,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), TransportError>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        let next = tokio::select! {
            next = read.next() => next,
            _ = shutdown.changed() => {
                debug!("Closing {} on host shutdown", origin.label());
                return Ok(());
            }
        };

        match next {
            Some(Ok(WsMessage::Text(text))) => match Frame::decode(text.as_str()) {
                Ok(frame) => {
                    let channel = frame.channel;
                    let delivery = Delivery {
                        channel: channel.clone(),
                        message: frame.message,
                        origin: origin.clone(),
                    };
                    if router.deliver(delivery) == 0 {
                        debug!("Dropping frame on '{channel}' from {}: no subscriber", origin.label());
                    }
                }
                Err(e) => warn!("Dropping malformed frame from {}: {e}", origin.label()),
            },
            Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => trace!("Ignoring non-text message from {}", origin.label()),
            Some(Err(e)) => {
                return Err(TransportError::Read {
                    message: format!("Error reading from {}: {e}", origin.label()),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }
}
