//! `host` and `call` talking over a real socket.

use crate::helpers::{TEST_AUTH_TOKEN, start_test_session, test_config};

use ipc_bridge::commands::call::{self, CallRequest};
use ipc_bridge::connection_info::{CONNECTION_FILE_NAME, ConnectionInfo};
use ipc_bridge::error::BridgeError;
use ipc_bridge::handlers::{ECHO_CHANNEL, FAIL_CHANNEL, PING_CHANNEL, SLEEP_CHANNEL};

use common::RedactedToken;

use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

fn request(channel: &str, payload: Value) -> CallRequest {
    CallRequest {
        channel: channel.to_string(),
        payload,
        timeout: Some(Duration::from_secs(5)),
        url: None,
        token: None,
    }
}

/// **VALUE**: Verifies a started host publishes where and how to reach it.
///
/// **WHY THIS MATTERS**: `call` without flags relies on this file alone.
#[tokio::test]
async fn given_started_host_when_connection_file_read_then_matches_session() {
    // GIVEN: A running host
    let (session, dir) = start_test_session().await;

    // WHEN: The connection file is read back
    let info = ConnectionInfo::read(dir.path()).expect("connection.json");

    // THEN: It names the bound port and the configured token
    assert_eq!(info.port(), session.local_addr().port());
    assert_eq!(info.url(), session.url());
    assert!(info.auth_token().matches(TEST_AUTH_TOKEN));
    assert_eq!(session.channels().len(), 5);

    session.shutdown();
}

/// **VALUE**: Verifies `call` finds the host through connection.json.
#[tokio::test]
async fn given_running_host_when_call_uses_connection_file_then_gets_response() {
    let (session, dir) = start_test_session().await;

    let response = call::run(&test_config(), dir.path(), request(PING_CHANNEL, json!({ "n": 41 })))
        .await
        .expect("call should succeed");

    assert_eq!(response, json!({ "n": 42 }));
    session.shutdown();
}

/// **VALUE**: Verifies explicit url and token bypass connection.json.
#[tokio::test]
async fn given_explicit_url_and_token_when_called_then_no_connection_file_needed() {
    let (session, _host_dir) = start_test_session().await;
    let empty_dir = TempDir::new().expect("temp dir");
    let mut req = request(ECHO_CHANNEL, json!(["a", 1, null]));
    req.url = Some(session.url());
    req.token = Some(RedactedToken::new(TEST_AUTH_TOKEN));

    let response = call::run(&test_config(), empty_dir.path(), req)
        .await
        .expect("call should succeed");

    assert_eq!(response, json!(["a", 1, null]));
    session.shutdown();
}

/// **VALUE**: Verifies a handler failure reaches the caller as `Remote`.
///
/// **BUG THIS CATCHES**: Remote errors flattened into a generic request error,
/// losing name and code.
#[tokio::test]
async fn given_failing_channel_when_called_then_remote_error_keeps_fields() {
    let (session, dir) = start_test_session().await;

    let result = call::run(&test_config(), dir.path(), request(FAIL_CHANNEL, json!("nope"))).await;

    match result {
        Err(BridgeError::Remote { error }) => {
            assert_eq!(error.name, "DemoError");
            assert_eq!(error.message, "nope");
            assert_eq!(error.code, Some(json!("E_DEMO")));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    session.shutdown();
}

/// **VALUE**: Verifies a call timeout surfaces as a request error.
#[tokio::test]
async fn given_slow_channel_when_timeout_is_short_then_request_error() {
    let (session, dir) = start_test_session().await;
    let mut req = request(SLEEP_CHANNEL, json!({ "ms": 500 }));
    req.timeout = Some(Duration::from_millis(50));

    let result = call::run(&test_config(), dir.path(), req).await;

    assert!(matches!(result, Err(BridgeError::Request { .. })), "got {result:?}");
    session.shutdown();
}

/// **VALUE**: Verifies a wrong token is refused without retries.
#[tokio::test]
async fn given_wrong_token_when_called_then_transport_error() {
    let (session, _host_dir) = start_test_session().await;
    let empty_dir = TempDir::new().expect("temp dir");
    let mut req = request(PING_CHANNEL, json!({ "n": 1 }));
    req.url = Some(session.url());
    req.token = Some(RedactedToken::new("not-the-token"));

    let result = call::run(&test_config(), empty_dir.path(), req).await;

    assert!(matches!(result, Err(BridgeError::Transport { .. })), "got {result:?}");
    session.shutdown();
}

/// **VALUE**: Verifies shutdown unpublishes the host.
///
/// **BUG THIS CATCHES**: A stale connection.json sending later calls to a dead port.
#[tokio::test]
async fn given_running_host_when_shut_down_then_connection_file_removed() {
    let (session, dir) = start_test_session().await;
    assert!(dir.path().join(CONNECTION_FILE_NAME).exists());

    session.shutdown();

    assert!(!dir.path().join(CONNECTION_FILE_NAME).exists());
    let result = call::run(&test_config(), dir.path(), request(PING_CHANNEL, json!({ "n": 1 }))).await;
    assert!(matches!(result, Err(BridgeError::Bridge { .. })), "got {result:?}");
}
