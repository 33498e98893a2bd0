// Unit tests for RequestDispatcher against a hand-driven peer

use crate::dispatcher::RequestDispatcher;
use crate::error::{DispatchError, TransportError};
use crate::protocol::{
    DEFAULT_RESPONSE_CHANNEL, ErrorObject, ProtocolConfig, RequestEnvelope, ResponseEnvelope,
    SendOptions,
};
use crate::transport::memory::{MemoryEndpoint, MemoryTransport};
use crate::transport::{Delivery, Inbound, Outbound, SubscriberTable, Subscription};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

fn dispatcher_pair(config: &ProtocolConfig) -> (RequestDispatcher, MemoryEndpoint) {
    let (caller, peer) = MemoryTransport::pair("caller", "peer");
    let dispatcher =
        RequestDispatcher::new(Arc::new(caller.clone()), &caller, config).expect("dispatcher");
    (dispatcher, peer)
}

async fn next_request(subscription: &mut Subscription) -> (RequestEnvelope, Delivery) {
    let delivery = subscription.recv().await.expect("request delivered");
    let envelope = RequestEnvelope::from_value(delivery.message.clone()).expect("valid request");
    (envelope, delivery)
}

fn answer(delivery: &Delivery, envelope: ResponseEnvelope) {
    delivery
        .origin
        .send(DEFAULT_RESPONSE_CHANNEL, envelope.into_value())
        .expect("answer");
}

// ============================================
// VALIDATION
// ============================================

/// **VALUE**: Verifies invalid arguments fail before any I/O or table change.
///
/// **BUG THIS CATCHES**: Would catch a request being transmitted (and leaking a
/// pending entry) for an empty channel or a zero timeout.
#[tokio::test]
async fn given_invalid_arguments_when_sending_then_fails_immediately() {
    // GIVEN: A dispatcher with a peer listening on "ping"
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let mut requests = peer.subscribe("ping").expect("subscribe");

    // WHEN: Sending with an empty channel or zero timeout
    let empty_channel = dispatcher.send("", json!(1), SendOptions::default());
    let zero_timeout = dispatcher.send("ping", json!(1), SendOptions::with_timeout_ms(0));

    // THEN: Both are validation errors and nothing is pending
    assert!(matches!(empty_channel, Err(DispatchError::Validation { .. })));
    assert!(matches!(zero_timeout, Err(DispatchError::Validation { .. })));
    assert_eq!(dispatcher.pending_count(), 0);
    assert_eq!(dispatcher.stats().requests_sent, 0);
    let transmitted = tokio::time::timeout(Duration::from_millis(20), requests.recv()).await;
    assert!(transmitted.is_err(), "nothing may reach the transport");
}

/// **VALUE**: Verifies construction rejects an empty response channel.
#[tokio::test]
async fn given_empty_response_channel_when_constructing_then_fails() {
    let (caller, _peer) = MemoryTransport::pair("caller", "peer");

    let result = RequestDispatcher::new(
        Arc::new(caller.clone()),
        &caller,
        &ProtocolConfig::with_response_channel(""),
    );

    assert!(matches!(result, Err(DispatchError::Validation { .. })));
}

// ============================================
// CORRELATION
// ============================================

/// **VALUE**: Verifies a matching response resolves the reply with its payload.
#[tokio::test]
async fn given_request_when_peer_answers_then_reply_resolves_with_payload() {
    // GIVEN: A peer listening on "ping"
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let mut requests = peer.subscribe("ping").expect("subscribe");

    // WHEN: Sending and answering
    let reply = dispatcher
        .send("ping", json!({ "n": 1 }), SendOptions::default())
        .expect("send");
    let (envelope, delivery) = next_request(&mut requests).await;
    answer(
        &delivery,
        ResponseEnvelope::success(envelope.correlation_id.clone(), json!({ "n": 2 })),
    );

    // THEN: The reply resolves and the entry is gone
    assert_eq!(reply.correlation_id(), envelope.correlation_id);
    assert_eq!(envelope.payload, json!({ "n": 1 }));
    assert_eq!(reply.await.expect("success"), json!({ "n": 2 }));
    assert_eq!(dispatcher.pending_count(), 0);
    assert_eq!(dispatcher.stats().responses_matched, 1);
}

/// **VALUE**: Verifies responses are matched by id, not arrival order.
///
/// **BUG THIS CATCHES**: Would catch a FIFO assumption handing the second
/// answer to the first caller.
#[tokio::test]
async fn given_two_requests_when_answered_in_reverse_then_each_gets_its_own() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let mut requests = peer.subscribe("double").expect("subscribe");

    let first = dispatcher
        .send("double", json!(1), SendOptions::default())
        .expect("send");
    let second = dispatcher
        .send("double", json!(2), SendOptions::default())
        .expect("send");
    assert_ne!(first.correlation_id(), second.correlation_id());

    let (first_envelope, first_delivery) = next_request(&mut requests).await;
    let (second_envelope, second_delivery) = next_request(&mut requests).await;
    answer(
        &second_delivery,
        ResponseEnvelope::success(second_envelope.correlation_id, json!(4)),
    );
    answer(
        &first_delivery,
        ResponseEnvelope::success(first_envelope.correlation_id, json!(2)),
    );

    assert_eq!(first.await.expect("first"), json!(2));
    assert_eq!(second.await.expect("second"), json!(4));
}

/// **VALUE**: Verifies a remote error rejects the call with the rebuilt error.
#[tokio::test]
async fn given_error_response_when_awaited_then_rejects_with_remote_error() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let mut requests = peer.subscribe("fail").expect("subscribe");

    let reply = dispatcher
        .send("fail", Value::Null, SendOptions::default())
        .expect("send");
    let (envelope, delivery) = next_request(&mut requests).await;
    answer(
        &delivery,
        ResponseEnvelope::failure(
            envelope.correlation_id,
            &ErrorObject::named("RangeError", "kaboom").with_code(7),
        ),
    );

    let error = reply.await.expect_err("must reject");
    let remote = error.remote().expect("remote error");
    assert_eq!(remote.name(), "RangeError");
    assert_eq!(remote.message(), "kaboom");
    assert_eq!(remote.code(), Some(&json!(7)));
}

/// **VALUE**: Verifies a response with a malformed error still settles its call.
///
/// **BUG THIS CATCHES**: Would catch the request hanging because its response
/// could not be decoded.
#[tokio::test]
async fn given_malformed_error_field_when_awaited_then_rejects_with_malformed_response() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let mut requests = peer.subscribe("odd").expect("subscribe");

    let reply = dispatcher
        .send("odd", Value::Null, SendOptions::default())
        .expect("send");
    let (envelope, delivery) = next_request(&mut requests).await;
    delivery
        .origin
        .send(
            DEFAULT_RESPONSE_CHANNEL,
            json!({ "__requestId": envelope.correlation_id, "error": 42 }),
        )
        .expect("answer");

    let error = reply.await.expect_err("must reject");
    assert!(matches!(error, DispatchError::MalformedResponse { .. }));
    assert_eq!(dispatcher.stats().malformed_responses, 1);
}

/// **VALUE**: Verifies unknown ids and id-less responses are dropped and counted.
///
/// **WHY THIS MATTERS**: Foreign or late responses must not disturb live
/// requests, and must still be visible for diagnosis.
#[tokio::test]
async fn given_orphan_and_malformed_responses_when_received_then_counted_and_ignored() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let mut requests = peer.subscribe("ping").expect("subscribe");

    // GIVEN: Junk arriving on the response channel ahead of a real answer
    peer.send(
        DEFAULT_RESPONSE_CHANNEL,
        ResponseEnvelope::success("no-such-id", json!(0)).into_value(),
    )
    .expect("send");
    peer.send(DEFAULT_RESPONSE_CHANNEL, json!({ "payload": 1 }))
        .expect("send");
    peer.send(DEFAULT_RESPONSE_CHANNEL, json!("garbage"))
        .expect("send");

    // WHEN: A real round trip completes after the junk
    let reply = dispatcher
        .send("ping", json!(1), SendOptions::default())
        .expect("send");
    let (envelope, delivery) = next_request(&mut requests).await;
    answer(
        &delivery,
        ResponseEnvelope::success(envelope.correlation_id, json!(2)),
    );
    assert_eq!(reply.await.expect("success"), json!(2));

    // THEN: The junk was counted, not matched
    let stats = dispatcher.stats();
    assert_eq!(stats.orphan_responses, 1);
    assert_eq!(stats.malformed_responses, 2);
    assert_eq!(stats.responses_matched, 1);
}

// ============================================
// TIMEOUTS AND TEARDOWN
// ============================================

/// **VALUE**: Verifies an unanswered request times out and leaves no entry.
#[tokio::test]
async fn given_unanswered_request_when_timeout_elapses_then_rejects_with_timeout() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let _requests = peer.subscribe("slow").expect("subscribe");

    let reply = dispatcher
        .send("slow", Value::Null, SendOptions::with_timeout_ms(50))
        .expect("send");

    let error = reply.await.expect_err("must time out");
    assert!(error.is_timeout());
    match error {
        DispatchError::Timeout {
            channel, timeout, ..
        } => {
            assert_eq!(channel, "slow");
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(dispatcher.pending_count(), 0);
    assert_eq!(dispatcher.stats().timeouts, 1);
}

/// **VALUE**: Verifies the configured default timeout applies without options.
#[tokio::test]
async fn given_default_timeout_when_sending_without_options_then_it_applies() {
    let config = ProtocolConfig {
        default_timeout_ms: Some(30),
        ..ProtocolConfig::default()
    };
    let (dispatcher, _peer) = dispatcher_pair(&config);

    let result = dispatcher
        .request("nobody", Value::Null, SendOptions::default())
        .await;

    assert!(matches!(result, Err(DispatchError::Timeout { .. })));
}

/// **VALUE**: Verifies close fails pending requests and later sends.
///
/// **BUG THIS CATCHES**: Would catch callers hanging forever after teardown.
#[tokio::test]
async fn given_pending_request_when_closed_then_rejects_with_closed() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let _requests = peer.subscribe("ping").expect("subscribe");
    let reply = dispatcher
        .send("ping", Value::Null, SendOptions::default())
        .expect("send");

    dispatcher.close();
    dispatcher.close();

    assert!(matches!(reply.await, Err(DispatchError::Closed { .. })));
    assert!(dispatcher.is_closed());
    assert!(matches!(
        dispatcher.send("ping", Value::Null, SendOptions::default()),
        Err(DispatchError::Closed { .. })
    ));
}

/// **VALUE**: Verifies a transport failure is returned and nothing stays pending.
#[tokio::test]
async fn given_closed_transport_when_sending_then_returns_transport_error() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    peer.close();

    let result = dispatcher.send("ping", Value::Null, SendOptions::with_timeout_ms(1_000));

    assert!(matches!(
        result,
        Err(DispatchError::Transport(TransportError::Closed { .. }))
    ));
    assert_eq!(dispatcher.pending_count(), 0);
}

/// Outbound always accepts; inbound ends when `responses` is closed.
struct DeafLink {
    responses: SubscriberTable,
}

impl Outbound for DeafLink {
    fn send(&self, _channel: &str, _message: Value) -> Result<(), TransportError> {
        Ok(())
    }
}

impl Inbound for DeafLink {
    fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        Ok(self.responses.subscribe(channel))
    }
}

/// **VALUE**: Verifies a dispatcher whose response channel ended refuses new requests.
///
/// **WHY THIS MATTERS**: A WebSocket client stops reading when the host closes,
/// while its writer may still accept messages.
///
/// **BUG THIS CATCHES**: Would catch requests being sent into a link that can
/// never answer, leaving untimed replies pending forever.
#[tokio::test]
async fn given_response_channel_ended_when_sending_then_fails_with_closed() {
    // GIVEN: A dispatcher over a link whose outbound side stays open
    let link = Arc::new(DeafLink {
        responses: SubscriberTable::new(),
    });
    let dispatcher = RequestDispatcher::new(link.clone(), link.as_ref(), &ProtocolConfig::default())
        .expect("dispatcher");
    let earlier = dispatcher
        .send("ping", Value::Null, SendOptions::default())
        .expect("send before close");

    // WHEN: Only the response side ends
    link.responses.close();
    let earlier = tokio::time::timeout(Duration::from_secs(1), earlier)
        .await
        .expect("earlier request settles");

    // THEN: The pending request failed and later sends are refused
    assert!(matches!(earlier, Err(DispatchError::Closed { .. })));
    assert!(dispatcher.is_closed());
    assert!(matches!(
        dispatcher.send("ping", Value::Null, SendOptions::default()),
        Err(DispatchError::Closed { .. })
    ));
    assert_eq!(dispatcher.pending_count(), 0);
}

/// **VALUE**: Verifies `send` with a timeout works from a thread outside the runtime.
///
/// **BUG THIS CATCHES**: Would catch the timeout task being spawned on the
/// calling thread's (missing) runtime, which panics.
#[tokio::test]
async fn given_plain_thread_when_sending_with_timeout_then_timeout_still_fires() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let _requests = peer.subscribe("ping").expect("subscribe");
    let dispatcher = Arc::new(dispatcher);

    let sender = Arc::clone(&dispatcher);
    let reply = std::thread::spawn(move || {
        sender.send("ping", Value::Null, SendOptions::with_timeout_ms(50))
    })
    .join()
    .expect("thread")
    .expect("send");

    assert!(matches!(reply.await, Err(DispatchError::Timeout { .. })));
    assert_eq!(dispatcher.stats().timeouts, 1);
}

// ============================================
// TYPED CALLS
// ============================================

#[derive(Debug, Serialize)]
struct AddRequest {
    a: i64,
    b: i64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct AddResponse {
    sum: i64,
}

/// **VALUE**: Verifies typed calls serialize the request and parse the response.
#[tokio::test]
async fn given_typed_call_when_answered_then_response_is_deserialized() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let mut requests = peer.subscribe("math:add").expect("subscribe");

    let responder = tokio::spawn(async move {
        let (envelope, delivery) = next_request(&mut requests).await;
        let a = envelope.payload["a"].as_i64().unwrap_or_default();
        let b = envelope.payload["b"].as_i64().unwrap_or_default();
        answer(
            &delivery,
            ResponseEnvelope::success(envelope.correlation_id, json!({ "sum": a + b })),
        );
    });

    let response: AddResponse = dispatcher
        .call("math:add", &AddRequest { a: 2, b: 3 }, SendOptions::default())
        .await
        .expect("call");
    responder.await.expect("peer task");

    assert_eq!(response, AddResponse { sum: 5 });
}

/// **VALUE**: Verifies a response of the wrong shape is a payload error.
#[tokio::test]
async fn given_typed_call_when_response_has_wrong_shape_then_payload_error() {
    let (dispatcher, peer) = dispatcher_pair(&ProtocolConfig::default());
    let mut requests = peer.subscribe("math:add").expect("subscribe");

    let responder = tokio::spawn(async move {
        let (envelope, delivery) = next_request(&mut requests).await;
        answer(
            &delivery,
            ResponseEnvelope::success(envelope.correlation_id, json!("five")),
        );
    });

    let result: Result<AddResponse, DispatchError> = dispatcher
        .call("math:add", &AddRequest { a: 2, b: 3 }, SendOptions::default())
        .await;
    responder.await.expect("peer task");

    assert!(matches!(result, Err(DispatchError::Payload { .. })));
}
