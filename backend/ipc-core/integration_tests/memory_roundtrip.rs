use crate::helpers::{memory_harness, memory_harness_with, register_demo_handlers};

use ipc_core::error::{DispatchError, ResponderError};
use ipc_core::protocol::ProtocolConfig;
use ipc_core::transport::Outbound;
use ipc_core::{ErrorObject, RequestDispatcher, ResponseResponder, SendOptions};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{Value, json};

/// **VALUE**: Verifies the basic request/response cycle end to end.
///
/// **WHY THIS MATTERS**: This is the contract every consumer (window management,
/// notifications, database proxying) relies on.
#[tokio::test]
async fn given_ping_handler_when_requested_then_resolves_with_incremented_value() {
    // GIVEN: The demo handlers on the serving side
    let harness = memory_harness();
    register_demo_handlers(&harness.responder);

    // WHEN: Requesting ping { n: 1 }
    let response = harness
        .dispatcher
        .request("ping", json!({ "n": 1 }), SendOptions::default())
        .await
        .expect("ping should succeed");

    // THEN: The handler's answer comes back
    assert_eq!(response, json!({ "n": 2 }));
    assert_eq!(harness.dispatcher.pending_count(), 0);
}

/// **VALUE**: Verifies handler failures reject the call with the same message.
#[tokio::test]
async fn given_failing_handler_when_requested_then_rejects_with_its_message() {
    let harness = memory_harness();
    register_demo_handlers(&harness.responder);

    let error = harness
        .dispatcher
        .request("kaboom", Value::Null, SendOptions::default())
        .await
        .expect_err("kaboom should reject");

    let remote = error.remote().expect("should be a remote error");
    assert_eq!(remote.message(), "kaboom");
    assert_eq!(remote.name(), "Error");
}

/// **VALUE**: Verifies every error field survives the full trip through a handler.
///
/// **BUG THIS CATCHES**: Would catch the responder or the dispatcher dropping
/// `stack`, `code` or `data` on the way.
#[tokio::test]
async fn given_rich_error_when_returned_by_handler_then_caller_sees_identical_error() {
    let harness = memory_harness();
    let original = ErrorObject::named("DatabaseError", "constraint violated")
        .with_stack("at insert (db.rs:10)\nat handler (main.rs:3)")
        .with_code("SQLITE_CONSTRAINT")
        .with_data(json!({ "table": "sessions", "column": "id" }));
    let returned = original.clone();
    harness
        .responder
        .on("db:insert", move |_context, _payload, _respond| Err(returned.clone()))
        .expect("on");

    let error = harness
        .dispatcher
        .request("db:insert", Value::Null, SendOptions::default())
        .await
        .expect_err("must reject");

    assert_eq!(error.remote(), Some(&original));
}

/// **VALUE**: Verifies the timeout fires once and a late answer changes nothing.
///
/// **WHY THIS MATTERS**: A late response must not resurrect or misroute a
/// request that has already been settled.
///
/// **BUG THIS CATCHES**: Would catch the pending entry surviving the timeout, or
/// the late response panicking on a completed reply.
#[tokio::test]
async fn given_slow_handler_when_timeout_elapses_then_late_response_has_no_effect() {
    // GIVEN: A handler that answers after 200ms
    let harness = memory_harness();
    harness
        .responder
        .on("slow", |_context, payload, respond| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                respond.ok(payload);
            });
            Ok(())
        })
        .expect("on");

    // WHEN: Requesting with a 50ms timeout
    let error = harness
        .dispatcher
        .request("slow", json!("late"), SendOptions::with_timeout_ms(50))
        .await
        .expect_err("must time out");
    assert!(error.is_timeout());
    assert_eq!(harness.dispatcher.pending_count(), 0);

    // THEN: The late answer arrives and is dropped as an orphan
    tokio::time::sleep(Duration::from_millis(250)).await;
    let stats = harness.dispatcher.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.orphan_responses, 1);
    assert_eq!(stats.responses_matched, 0);
}

/// **VALUE**: Verifies concurrent requests get unique ids and their own answers.
///
/// **BUG THIS CATCHES**: Would catch id reuse or cross-wired responses under load.
#[tokio::test]
async fn given_many_concurrent_requests_when_answered_then_each_resolves_with_its_own_payload() {
    const REQUESTS: usize = 200;

    let harness = memory_harness();
    harness
        .responder
        .on("echo", |_context, payload, respond| {
            // Answer out of order
            let delay = payload.as_u64().unwrap_or_default() % 7;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                respond.ok(payload);
            });
            Ok(())
        })
        .expect("on");

    let replies: Vec<_> = (0..REQUESTS)
        .map(|n| {
            harness
                .dispatcher
                .send("echo", json!(n), SendOptions::with_timeout_ms(5_000))
                .expect("send")
        })
        .collect();

    let ids: HashSet<String> = replies
        .iter()
        .map(|reply| reply.correlation_id().to_string())
        .collect();
    assert_eq!(ids.len(), REQUESTS);

    let results = join_all(replies).await;
    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result.expect("echo"), json!(n));
    }
    assert_eq!(harness.dispatcher.pending_count(), 0);
}

/// **VALUE**: Verifies a duplicated response is a no-op.
#[tokio::test]
async fn given_duplicate_response_when_delivered_then_first_wins_and_second_is_dropped() {
    let harness = memory_harness();
    let serving = harness.serving.clone();
    harness
        .responder
        .on("dup", move |context, _payload, respond| {
            respond.ok(json!("first"));
            // Replay the exact same envelope straight through the transport
            serving
                .send(
                    "__ipc_response__",
                    json!({ "__requestId": context.correlation_id(), "payload": "second", "error": null }),
                )
                .map_err(|e| ErrorObject::from_error(&e))
        })
        .expect("on");
    register_demo_handlers(&harness.responder);

    let response = harness
        .dispatcher
        .request("dup", Value::Null, SendOptions::default())
        .await
        .expect("dup");
    harness
        .dispatcher
        .request("ping", json!({ "n": 0 }), SendOptions::default())
        .await
        .expect("sync");

    assert_eq!(response, json!("first"));
    assert_eq!(harness.dispatcher.stats().orphan_responses, 1);
}

/// **VALUE**: Verifies the registration lifecycle across real traffic.
#[tokio::test]
async fn given_registration_cycle_when_requests_flow_then_latest_handler_answers() {
    let harness = memory_harness();
    harness
        .responder
        .on("version", |_c, _p, respond| {
            respond.ok(json!(1));
            Ok(())
        })
        .expect("on");

    let duplicate = harness.responder.on("version", |_c, _p, respond| {
        respond.ok(json!(99));
        Ok(())
    });
    assert!(matches!(
        duplicate,
        Err(ResponderError::AlreadyRegistered { .. })
    ));
    let first = harness
        .dispatcher
        .request("version", Value::Null, SendOptions::default())
        .await
        .expect("first");

    harness.responder.off("version").expect("off");
    harness
        .responder
        .on("version", |_c, _p, respond| {
            respond.ok(json!(2));
            Ok(())
        })
        .expect("on after off");
    let second = harness
        .dispatcher
        .request("version", Value::Null, SendOptions::default())
        .await
        .expect("second");

    assert_eq!(first, json!(1));
    assert_eq!(second, json!(2));
}

/// **VALUE**: Verifies a request without an id never reaches the handler.
#[tokio::test]
async fn given_request_without_id_when_sent_raw_then_handler_never_runs() {
    let harness = memory_harness();
    register_demo_handlers(&harness.responder);

    harness
        .caller
        .send("ping", json!({ "payload": { "n": 1 } }))
        .expect("raw send");
    harness
        .dispatcher
        .request("ping", json!({ "n": 5 }), SendOptions::default())
        .await
        .expect("sync");

    let stats = harness.responder.stats();
    assert_eq!(stats.malformed_requests, 1);
    assert_eq!(stats.requests_handled, 1);
}

/// **VALUE**: Verifies both sides can request and respond at the same time.
#[tokio::test]
async fn given_both_sides_serving_when_requesting_each_other_then_both_resolve() {
    let harness = memory_harness();
    register_demo_handlers(&harness.responder);

    let config = ProtocolConfig::default();
    let reverse_dispatcher = RequestDispatcher::new(
        Arc::new(harness.serving.clone()),
        &harness.serving,
        &config,
    )
    .expect("reverse dispatcher");
    let reverse_responder =
        ResponseResponder::new(Arc::new(harness.caller.clone()), &config).expect("reverse responder");
    reverse_responder
        .on("window:title", |_c, _p, respond| {
            respond.ok(json!("Main Window"));
            Ok(())
        })
        .expect("on");

    let (forward, backward) = tokio::join!(
        harness
            .dispatcher
            .request("ping", json!({ "n": 41 }), SendOptions::default()),
        reverse_dispatcher.request("window:title", Value::Null, SendOptions::default()),
    );

    assert_eq!(forward.expect("forward"), json!({ "n": 42 }));
    assert_eq!(backward.expect("backward"), json!("Main Window"));
}

/// **VALUE**: Verifies a custom response channel works when both sides agree.
#[tokio::test]
async fn given_custom_response_channel_when_shared_then_round_trip_succeeds() {
    let config = ProtocolConfig::with_response_channel("app:responses");
    let harness = memory_harness_with(&config);
    register_demo_handlers(&harness.responder);

    let response = harness
        .dispatcher
        .request("ping", json!({ "n": 9 }), SendOptions::default())
        .await
        .expect("ping");

    assert_eq!(response, json!({ "n": 10 }));
    assert_eq!(harness.dispatcher.response_channel(), "app:responses");
    assert_eq!(harness.responder.response_channel(), "app:responses");
}

/// **VALUE**: Verifies dropping the dispatcher settles outstanding replies.
#[tokio::test]
async fn given_outstanding_reply_when_dispatcher_dropped_then_reply_is_closed() {
    let harness = memory_harness();
    harness
        .responder
        .on("never", |_c, _p, _respond| Ok(()))
        .expect("on");

    let reply = harness
        .dispatcher
        .send("never", Value::Null, SendOptions::default())
        .expect("send");
    drop(harness);

    assert!(matches!(reply.await, Err(DispatchError::Closed { .. })));
}
