//! `ipc-bridge host`: serve the built-in channels over WebSocket.

use crate::connection_info::ConnectionInfo;
use crate::error::BridgeError;
use crate::handlers;

use ipc_core::config::BridgeConfig;
use ipc_core::responder::ResponseResponder;
use ipc_core::transport::ws::{WsHostHandle, start_ws_host};

use common::{ErrorLocation, RedactedToken};

use std::net::SocketAddr;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

/// A running host with its handlers registered and connection info published.
pub struct HostSession {
    handle: Arc<WsHostHandle>,
    responder: ResponseResponder,
    config_dir: PathBuf,
}

impl HostSession {
    /// Bind the host, register the handlers and write `connection.json`.
    ///
    /// Uses `config.transport.port` (`0` picks a free port) and `token`, or a
    /// freshly generated token when `None`.
    pub async fn start(
        config: &BridgeConfig,
        config_dir: &Path,
        token: Option<RedactedToken>,
    ) -> Result<Self, BridgeError> {
        info!("Starting host on port {}", config.transport.port);

        let handle = Arc::new(start_ws_host(config.transport.port, token).await?);
        let responder = ResponseResponder::new(handle.clone(), &config.protocol)?;
        handlers::register(&responder)?;

        ConnectionInfo::new(handle.port(), handle.auth_token().clone()).write(config_dir)?;

        info!(
            "Host ready at {} serving {}",
            handle.url(),
            responder.channels().join(", ")
        );

        Ok(Self {
            handle,
            responder,
            config_dir: config_dir.to_path_buf(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    pub fn url(&self) -> String {
        self.handle.url()
    }

    pub fn auth_token(&self) -> &RedactedToken {
        self.handle.auth_token()
    }

    pub fn channels(&self) -> Vec<String> {
        self.responder.channels()
    }

    pub fn connected_clients(&self) -> usize {
        self.handle.peers().len()
    }

    /// Stop serving, disconnect clients and remove `connection.json`.
    pub fn shutdown(self) {
        let stats = self.responder.stats();
        self.responder.clear();
        self.handle.shutdown();
        ConnectionInfo::remove(&self.config_dir);
        info!(
            "Host stopped after {} request(s) ({} failed, {} malformed)",
            stats.requests_handled, stats.handler_failures, stats.malformed_requests
        );
    }
}

/// Run the host until Ctrl-C.
pub async fn run(config: &BridgeConfig, config_dir: &Path, token: Option<RedactedToken>) -> Result<(), BridgeError> {
    let session = HostSession::start(config, config_dir, token).await?;
    println!("Listening on {}", session.url());

    tokio::signal::ctrl_c().await.map_err(|e| BridgeError::Bridge {
        message: format!("Failed to wait for Ctrl-C: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    info!("Ctrl-C received, shutting down");
    session.shutdown();
    Ok(())
}
