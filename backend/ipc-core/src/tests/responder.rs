// Unit tests for ResponseResponder registration and request handling

use crate::dispatcher::RequestDispatcher;
use crate::error::{DispatchError, ResponderError};
use crate::protocol::{ErrorObject, PANIC_ERROR_NAME, ProtocolConfig, SendOptions};
use crate::responder::ResponseResponder;
use crate::transport::Outbound;
use crate::transport::memory::{MemoryEndpoint, MemoryTransport};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

struct Harness {
    dispatcher: RequestDispatcher,
    responder: ResponseResponder,
    caller: MemoryEndpoint,
}

fn harness() -> Harness {
    let (caller, serving) = MemoryTransport::pair("caller", "serving");
    let config = ProtocolConfig::default();
    let dispatcher =
        RequestDispatcher::new(Arc::new(caller.clone()), &caller, &config).expect("dispatcher");
    let responder = ResponseResponder::new(Arc::new(serving), &config).expect("responder");
    Harness {
        dispatcher,
        responder,
        caller,
    }
}

fn ok_handler(
    _context: crate::responder::RequestContext,
    payload: Value,
    respond: crate::responder::Respond,
) -> Result<(), ErrorObject> {
    respond.ok(payload);
    Ok(())
}

// ============================================
// REGISTRATION
// ============================================

/// **VALUE**: Verifies one handler per channel and the on/off/on cycle.
///
/// **WHY THIS MATTERS**: A silent overwrite would reroute a channel to whichever
/// subsystem registered last.
///
/// **BUG THIS CATCHES**: Would catch `on` replacing the existing handler, or
/// `off` leaving a stale registration behind.
#[tokio::test]
async fn given_registered_channel_when_registering_again_then_rejected_until_off() {
    let h = harness();
    h.responder.on("ping", ok_handler).expect("first on");

    let duplicate = h.responder.on("ping", ok_handler);
    assert!(matches!(
        duplicate,
        Err(ResponderError::AlreadyRegistered { ref channel, .. }) if channel == "ping"
    ));

    h.responder.off("ping").expect("off");
    assert!(!h.responder.is_registered("ping"));
    h.responder.on("ping", ok_handler).expect("on after off");
    assert!(h.responder.is_registered("ping"));
}

/// **VALUE**: Verifies the error cases of registration bookkeeping.
#[tokio::test]
async fn given_bad_registrations_when_attempted_then_descriptive_errors() {
    let h = harness();

    assert!(matches!(
        h.responder.on("", ok_handler),
        Err(ResponderError::Validation { .. })
    ));
    assert!(matches!(
        h.responder.off("never"),
        Err(ResponderError::NotRegistered { .. })
    ));
}

/// **VALUE**: Verifies `channels` and `clear`.
#[tokio::test]
async fn given_several_handlers_when_cleared_then_all_are_removed() {
    let h = harness();
    for channel in ["b", "c", "a"] {
        h.responder.on(channel, ok_handler).expect("on");
    }

    assert_eq!(h.responder.channels(), vec!["a", "b", "c"]);
    assert_eq!(h.responder.clear(), 3);
    assert!(h.responder.channels().is_empty());
    assert_eq!(h.responder.clear(), 0);
}

/// **VALUE**: Verifies an unregistered channel stops answering.
#[tokio::test]
async fn given_handler_removed_when_requested_then_request_times_out() {
    let h = harness();
    h.responder.on("ping", ok_handler).expect("on");
    h.responder.off("ping").expect("off");

    let result = h
        .dispatcher
        .request("ping", json!(1), SendOptions::with_timeout_ms(50))
        .await;

    assert!(matches!(result, Err(DispatchError::Timeout { .. })));
}

// ============================================
// REQUEST HANDLING
// ============================================

/// **VALUE**: Verifies the handler sees payload and context.
#[tokio::test]
async fn given_handler_when_request_arrives_then_context_describes_it() {
    let h = harness();
    h.responder
        .on("whoami", |context, payload, respond| {
            respond.ok(json!({
                "channel": context.channel(),
                "origin": context.origin().label(),
                "same_id": context.correlation_id() == respond.correlation_id(),
                "payload": payload,
            }));
            Ok(())
        })
        .expect("on");

    let response = h
        .dispatcher
        .request("whoami", json!("hi"), SendOptions::default())
        .await
        .expect("request");

    assert_eq!(
        response,
        json!({ "channel": "whoami", "origin": "caller", "same_id": true, "payload": "hi" })
    );
}

/// **VALUE**: Verifies requests without a valid id never reach the handler.
///
/// **BUG THIS CATCHES**: Would catch the handler running for a request it can
/// never answer.
#[tokio::test]
async fn given_request_without_id_when_received_then_handler_not_invoked() {
    let h = harness();
    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&invocations);
    h.responder
        .on("ping", move |_context, payload, respond| {
            seen.fetch_add(1, Ordering::SeqCst);
            respond.ok(payload);
            Ok(())
        })
        .expect("on");

    // GIVEN: Two malformed requests followed by a real one on the same channel
    h.caller.send("ping", json!({ "payload": 1 })).expect("send");
    h.caller
        .send("ping", json!({ "__requestId": "", "payload": 1 }))
        .expect("send");

    // WHEN: The real one completes
    h.dispatcher
        .request("ping", json!(2), SendOptions::default())
        .await
        .expect("request");

    // THEN: Only the real one reached the handler
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    let stats = h.responder.stats();
    assert_eq!(stats.malformed_requests, 2);
    assert_eq!(stats.requests_handled, 1);
}

/// **VALUE**: Verifies a returned error becomes the rejection.
#[tokio::test]
async fn given_failing_handler_when_requested_then_caller_gets_the_error() {
    let h = harness();
    h.responder
        .on("fail", |_context, _payload, _respond| {
            Err(ErrorObject::named("ValidationError", "kaboom").with_data(json!({ "field": "n" })))
        })
        .expect("on");

    let error = h
        .dispatcher
        .request("fail", Value::Null, SendOptions::default())
        .await
        .expect_err("must reject");

    let remote = error.remote().expect("remote error");
    assert_eq!(remote.name(), "ValidationError");
    assert_eq!(remote.message(), "kaboom");
    assert_eq!(remote.data(), Some(&json!({ "field": "n" })));
    assert_eq!(h.responder.stats().handler_failures, 1);
}

/// **VALUE**: Verifies a panicking handler still answers, and keeps serving.
///
/// **BUG THIS CATCHES**: Would catch a panic killing the listener so every later
/// request on the channel times out.
#[tokio::test]
async fn given_panicking_handler_when_requested_then_rejects_and_listener_survives() {
    let h = harness();
    h.responder
        .on("flaky", |_context, payload, respond| {
            if payload == json!("panic") {
                panic!("handler exploded");
            }
            respond.ok(payload);
            Ok(())
        })
        .expect("on");

    let error = h
        .dispatcher
        .request("flaky", json!("panic"), SendOptions::default())
        .await
        .expect_err("must reject");
    let remote = error.remote().expect("remote error");
    assert_eq!(remote.name(), PANIC_ERROR_NAME);
    assert_eq!(remote.message(), "handler exploded");

    let response = h
        .dispatcher
        .request("flaky", json!("fine"), SendOptions::default())
        .await
        .expect("listener still alive");
    assert_eq!(response, json!("fine"));
}

/// **VALUE**: Verifies a handler may answer later from another task.
#[tokio::test]
async fn given_deferred_handler_when_it_answers_later_then_caller_receives_it() {
    let h = harness();
    h.responder
        .on("later", |_context, payload, respond| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                respond.ok(json!({ "echo": payload }));
            });
            Ok(())
        })
        .expect("on");

    let response = h
        .dispatcher
        .request("later", json!(9), SendOptions::with_timeout_ms(1_000))
        .await
        .expect("request");

    assert_eq!(response, json!({ "echo": 9 }));
}

/// **VALUE**: Verifies repeated answers are sent, counted, and ignored by the caller.
///
/// **BUG THIS CATCHES**: Would catch a second answer resolving some other
/// request or panicking the dispatcher.
#[tokio::test]
async fn given_handler_answering_twice_when_requested_then_first_answer_wins() {
    let h = harness();
    h.responder
        .on("twice", |_context, _payload, respond| {
            respond.ok(json!("first"));
            assert!(respond.has_responded());
            respond.ok(json!("second"));
            Ok(())
        })
        .expect("on");
    h.responder.on("sync", ok_handler).expect("on");

    let response = h
        .dispatcher
        .request("twice", Value::Null, SendOptions::default())
        .await
        .expect("request");
    h.dispatcher
        .request("sync", Value::Null, SendOptions::default())
        .await
        .expect("sync");

    assert_eq!(response, json!("first"));
    assert_eq!(h.responder.stats().repeated_responds, 1);
    assert_eq!(h.dispatcher.stats().orphan_responses, 1);
}

/// **VALUE**: Verifies async handlers resolve, reject and survive panics.
#[tokio::test]
async fn given_async_handler_when_requested_then_output_becomes_response() {
    let h = harness();
    h.responder
        .on_async("async", |_context, payload| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            match payload.as_str() {
                Some("fail") => Err(ErrorObject::new("async kaboom")),
                Some("panic") => panic!("async exploded"),
                _ => Ok(json!({ "got": payload })),
            }
        })
        .expect("on_async");

    let ok = h
        .dispatcher
        .request("async", json!(1), SendOptions::default())
        .await
        .expect("ok");
    let failed = h
        .dispatcher
        .request("async", json!("fail"), SendOptions::default())
        .await
        .expect_err("fail");
    let panicked = h
        .dispatcher
        .request("async", json!("panic"), SendOptions::default())
        .await
        .expect_err("panic");

    assert_eq!(ok, json!({ "got": 1 }));
    assert_eq!(failed.remote().map(ErrorObject::message), Some("async kaboom"));
    assert_eq!(panicked.remote().map(ErrorObject::name), Some(PANIC_ERROR_NAME));
    assert_eq!(h.responder.stats().handler_failures, 2);
}
