//! Test helpers for end-to-end protocol tests.
//!
//! - Dispatcher/responder pairs over the in-process transport
//! - A WebSocket host on an OS-assigned port
//! - Demo handlers shared by several tests

use ipc_core::protocol::ProtocolConfig;
use ipc_core::transport::memory::{MemoryEndpoint, MemoryTransport};
use ipc_core::transport::ws::{WsHostHandle, WsPeer, start_ws_host};
use ipc_core::{ErrorObject, RequestDispatcher, ResponseResponder};

use common::RedactedToken;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

/// Test constants for authentication
pub const TEST_AUTH_TOKEN: &str = "test-token-12345";

/// Dispatcher on the `caller` side, responder on the `serving` side.
pub struct MemoryHarness {
    pub dispatcher: RequestDispatcher,
    pub responder: ResponseResponder,
    pub caller: MemoryEndpoint,
    pub serving: MemoryEndpoint,
}

pub fn memory_harness() -> MemoryHarness {
    memory_harness_with(&ProtocolConfig::default())
}

pub fn memory_harness_with(config: &ProtocolConfig) -> MemoryHarness {
    let (caller, serving) = MemoryTransport::pair("renderer", "main");
    let dispatcher = RequestDispatcher::new(Arc::new(caller.clone()), &caller, config)
        .expect("Failed to create dispatcher");
    let responder = ResponseResponder::new(Arc::new(serving.clone()), config)
        .expect("Failed to create responder");
    MemoryHarness {
        dispatcher,
        responder,
        caller,
        serving,
    }
}

/// `ping`: `{ n }` -> `{ n: n + 1 }`; `kaboom`: always fails.
pub fn register_demo_handlers(responder: &ResponseResponder) {
    responder
        .on("ping", |_context, payload, respond| {
            let n = payload["n"].as_i64().unwrap_or_default();
            respond.ok(json!({ "n": n + 1 }));
            Ok(())
        })
        .expect("Failed to register ping");
    responder
        .on("kaboom", |_context, _payload, _respond| {
            Err(ErrorObject::new("kaboom"))
        })
        .expect("Failed to register kaboom");
}

/// Start a host on an OS-assigned port with [`TEST_AUTH_TOKEN`].
pub async fn start_test_host() -> WsHostHandle {
    start_ws_host(0, Some(RedactedToken::new(TEST_AUTH_TOKEN)))
        .await
        .expect("Failed to start WebSocket host")
}

/// Wait until the host has registered its first authenticated client.
pub async fn wait_for_peer(handle: &WsHostHandle) -> WsPeer {
    for _ in 0..100 {
        if let Some(peer) = handle.peers().into_iter().next() {
            return peer;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("No client registered with the host within 1s");
}

pub fn test_token() -> RedactedToken {
    RedactedToken::new(TEST_AUTH_TOKEN)
}
