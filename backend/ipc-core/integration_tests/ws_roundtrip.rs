use crate::helpers::{
    TEST_AUTH_TOKEN, register_demo_handlers, start_test_host, test_token, wait_for_peer,
};

use ipc_core::error::{DispatchError, TransportError};
use ipc_core::protocol::ProtocolConfig;
use ipc_core::transport::ws::{connect_with_retry, connect_ws_client, start_ws_host};
use ipc_core::{RequestDispatcher, ResponseResponder, SendOptions};

use common::RedactedToken;

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

/// **VALUE**: Verifies a client can call a handler registered on the host.
///
/// **WHY THIS MATTERS**: This is the renderer -> main direction over a real socket:
/// frames, auth and response routing all have to line up.
#[tokio::test]
async fn given_host_with_handlers_when_client_requests_then_receives_response() {
    // GIVEN: A host serving the demo handlers
    let handle = Arc::new(start_test_host().await);
    let config = ProtocolConfig::default();
    let responder = ResponseResponder::new(handle.clone(), &config).expect("responder");
    register_demo_handlers(&responder);

    // GIVEN: An authenticated client with a dispatcher
    let client = connect_ws_client(&handle.url(), &test_token())
        .await
        .expect("connect");
    let dispatcher =
        RequestDispatcher::new(Arc::new(client.clone()), &client, &config).expect("dispatcher");

    // WHEN: Calling ping and kaboom
    let response = dispatcher
        .request("ping", json!({ "n": 1 }), SendOptions::with_timeout_ms(2_000))
        .await
        .expect("ping");
    let error = dispatcher
        .request("kaboom", Value::Null, SendOptions::with_timeout_ms(2_000))
        .await
        .expect_err("kaboom");

    // THEN: Both settle as they would in-process
    assert_eq!(response, json!({ "n": 2 }));
    assert_eq!(error.remote().map(|e| e.message()), Some("kaboom"));
}

/// **VALUE**: Verifies the host can call handlers registered on one client.
#[tokio::test]
async fn given_client_with_handler_when_host_requests_then_receives_response() {
    // GIVEN: A client serving "window:title"
    let handle = start_test_host().await;
    let config = ProtocolConfig::default();
    let client = connect_ws_client(&handle.url(), &test_token())
        .await
        .expect("connect");
    let responder = ResponseResponder::new(Arc::new(client.clone()), &config).expect("responder");
    responder
        .on("window:title", |_context, _payload, respond| {
            respond.ok(json!("Editor"));
            Ok(())
        })
        .expect("on");

    // WHEN: The host dispatches to that client
    let peer = wait_for_peer(&handle).await;
    let dispatcher =
        RequestDispatcher::new(Arc::new(peer), &handle, &config).expect("host dispatcher");
    let title = dispatcher
        .request("window:title", Value::Null, SendOptions::with_timeout_ms(2_000))
        .await
        .expect("request");

    // THEN: The client's answer comes back
    assert_eq!(title, json!("Editor"));
}

/// **VALUE**: Verifies a wrong token is refused.
///
/// **BUG THIS CATCHES**: Would catch the host accepting any first message as auth.
#[tokio::test]
async fn given_wrong_token_when_connecting_then_auth_error() {
    let handle = start_test_host().await;

    let result = connect_ws_client(&handle.url(), &RedactedToken::new("wrong-token")).await;

    assert!(matches!(result, Err(TransportError::Auth { .. })));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.peers().is_empty());
}

/// **VALUE**: Verifies non-ws URLs fail without touching the network.
#[tokio::test]
async fn given_http_url_when_connecting_then_url_error() {
    let result = connect_ws_client("http://127.0.0.1:1", &test_token()).await;

    assert!(matches!(result, Err(TransportError::Url { .. })));
}

/// **VALUE**: Verifies host shutdown settles the client's outstanding requests.
///
/// **WHY THIS MATTERS**: A host that goes away must not leave callers hanging
/// when they sent without a timeout.
#[tokio::test]
async fn given_pending_request_when_host_shuts_down_then_client_reply_is_closed() {
    let handle = start_test_host().await;
    let config = ProtocolConfig::default();
    let client = connect_ws_client(&handle.url(), &test_token())
        .await
        .expect("connect");
    let dispatcher =
        RequestDispatcher::new(Arc::new(client.clone()), &client, &config).expect("dispatcher");
    wait_for_peer(&handle).await;

    let reply = dispatcher
        .send("unhandled", Value::Null, SendOptions::default())
        .expect("send");
    handle.shutdown();

    let outcome = tokio::time::timeout(Duration::from_secs(2), reply)
        .await
        .expect("reply should settle after shutdown");
    assert!(matches!(outcome, Err(DispatchError::Closed { .. })));
    assert!(handle.peers().is_empty());
}

/// **VALUE**: Verifies retrying connects once the host comes up.
#[tokio::test]
async fn given_host_starting_late_when_connecting_with_retry_then_eventually_connects() {
    // GIVEN: A free port nobody listens on yet
    let port = StdTcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("free port")
        .port();
    let url = format!("ws://127.0.0.1:{port}");

    // WHEN: The host starts 200ms after the client begins retrying
    let host = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        start_ws_host(port, Some(RedactedToken::new(TEST_AUTH_TOKEN)))
            .await
            .expect("late host")
    });
    let client = connect_with_retry(&url, &test_token(), Duration::from_secs(5)).await;
    let handle = host.await.expect("host task");

    // THEN: The client connected
    let client = client.expect("connect with retry");
    assert!(client.is_connected());
    assert_eq!(client.url(), url);
    drop(handle);
}

/// **VALUE**: Verifies retrying does not retry a rejected token.
#[tokio::test]
async fn given_wrong_token_when_connecting_with_retry_then_fails_fast() {
    let handle = start_test_host().await;

    let started = std::time::Instant::now();
    let result =
        connect_with_retry(&handle.url(), &RedactedToken::new("nope"), Duration::from_secs(10)).await;

    assert!(matches!(result, Err(TransportError::Auth { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
}
