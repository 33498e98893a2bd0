//! Shared setup: a host on a free port with its config dir in a temp folder.

use ipc_bridge::commands::host::HostSession;

use ipc_core::config::BridgeConfig;

use common::RedactedToken;

use tempfile::TempDir;

pub const TEST_AUTH_TOKEN: &str = "bridge-test-token";

/// Config with an OS-assigned port and a short connect window.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.transport.port = 0;
    config.transport.connect_timeout_ms = 2_000;
    config
}

/// Start a host; the returned `TempDir` must outlive the session.
pub async fn start_test_session() -> (HostSession, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let session = HostSession::start(
        &test_config(),
        dir.path(),
        Some(RedactedToken::new(TEST_AUTH_TOKEN)),
    )
    .await
    .expect("Failed to start host session");
    (session, dir)
}
