// Unit tests for error conversion and serialization

use crate::error::BridgeError;

use ipc_core::ErrorObject;
use ipc_core::error::{DispatchError, TransportError};

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

/// **VALUE**: Tests that errors serialize with a variant tag.
///
/// **WHY THIS MATTERS**: `call` prints failures as JSON for scripts to inspect.
///
/// **BUG THIS CATCHES**: Would catch a non-serializable field sneaking into the enum.
#[test]
fn given_bridge_error_when_serialized_then_contains_type_and_message() {
    // GIVEN: A BridgeError
    let err = BridgeError::Request {
        message: String::from("Test"),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN: Serializing to JSON
    let json = serde_json::to_value(&err).expect("Error should be serializable");

    // THEN: Tagged with the variant and carrying the data
    assert_eq!(json["type"], "Request");
    assert_eq!(json["data"]["message"], "Test");
    assert!(json["data"]["location"]["line"].is_number());
}

/// **VALUE**: Verifies remote failures keep their wire form.
///
/// **BUG THIS CATCHES**: Would catch remote errors being flattened to a string,
/// losing `code` and `data`.
#[test]
fn given_remote_dispatch_error_when_converted_then_wire_error_is_kept() {
    let remote = ErrorObject::named("DemoError", "kaboom").with_code("E_DEMO");

    let err = BridgeError::from(DispatchError::Remote(remote));
    let json = serde_json::to_value(&err).expect("serializable");

    assert_eq!(err.to_string(), "Remote Error: DemoError: kaboom");
    assert_eq!(json["type"], "Remote");
    assert_eq!(json["data"]["error"]["code"], "E_DEMO");
}

/// **VALUE**: Verifies local failures map onto the matching variant.
#[test]
fn given_local_dispatch_errors_when_converted_then_map_to_variants() {
    let timeout = BridgeError::from(DispatchError::Timeout {
        channel: "ping".to_string(),
        correlation_id: "abc".to_string(),
        timeout: Duration::from_millis(50),
        location: ErrorLocation::caller(),
    });
    let transport = BridgeError::from(DispatchError::Transport(TransportError::Closed {
        message: "gone".to_string(),
        location: ErrorLocation::caller(),
    }));

    assert!(matches!(timeout, BridgeError::Request { ref message, .. } if message.contains("timed out")));
    assert!(matches!(transport, BridgeError::Transport { ref message, .. } if message.contains("gone")));
}
