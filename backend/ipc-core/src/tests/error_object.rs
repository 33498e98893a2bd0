// Unit tests for ErrorObject wire conversion

use crate::error::{DispatchError, SerializationError};
use crate::protocol::{ErrorObject, PANIC_ERROR_NAME, SerializedError};

use common::ErrorLocation;

use serde_json::{Value, json};

/// **VALUE**: Verifies every field survives serialize -> deserialize.
///
/// **WHY THIS MATTERS**: Callers branch on `name`, `code` and `data` of remote
/// failures. A lossy round trip turns a typed failure into a generic one.
///
/// **BUG THIS CATCHES**: Would catch a field dropped in either direction.
#[test]
fn given_full_error_when_round_tripped_then_all_fields_are_preserved() {
    // GIVEN: An error with every optional field set
    let original = ErrorObject::named("TypeError", "bad input")
        .with_stack("at handler (main.rs:1)")
        .with_code("E_BAD_INPUT")
        .with_data(json!({ "field": "name", "limit": 3 }));

    // WHEN: Projecting to the wire and back
    let wire = original.serialize().into_value();
    let rebuilt = ErrorObject::deserialize(&wire).expect("valid serialized error");

    // THEN: Nothing is lost
    assert_eq!(rebuilt, original);
    assert_eq!(rebuilt.name(), "TypeError");
    assert_eq!(rebuilt.code(), Some(&json!("E_BAD_INPUT")));
}

/// **VALUE**: Verifies `code` and `data` set to `null` stay present.
///
/// **BUG THIS CATCHES**: Would catch an explicit `null` read back as absent,
/// so the rebuilt error differs from the one the handler raised.
#[test]
fn given_null_code_and_data_when_round_tripped_then_both_stay_present() {
    // GIVEN: An error whose code and data are explicitly null
    let original = ErrorObject::new("boom")
        .with_code(Value::Null)
        .with_data(Value::Null);

    // WHEN: Projecting to the wire and back
    let wire = original.serialize().into_value();
    let rebuilt = ErrorObject::deserialize(&wire).expect("valid serialized error");

    // THEN: The nulls survive, and absent keys still read as absent
    assert_eq!(wire["code"], Value::Null);
    assert_eq!(rebuilt, original);
    assert_eq!(rebuilt.code(), Some(&Value::Null));
    assert_eq!(rebuilt.data(), Some(&Value::Null));

    let bare = ErrorObject::deserialize(&json!({ "message": "plain" })).expect("valid");
    assert_eq!(bare.code(), None);
    assert_eq!(bare.data(), None);
}

/// **VALUE**: Verifies defaults for omitted `name` and `stack`.
///
/// **BUG THIS CATCHES**: Would catch a minimal `{ message }` error being rejected.
#[test]
fn given_message_only_when_deserialized_then_name_and_stack_default() {
    let rebuilt = ErrorObject::deserialize(&json!({ "message": "kaboom" })).expect("valid");

    assert_eq!(rebuilt.name(), "Error");
    assert_eq!(rebuilt.message(), "kaboom");
    assert_eq!(rebuilt.stack(), "");
    assert_eq!(rebuilt.code(), None);
    assert_eq!(rebuilt.to_string(), "Error: kaboom");
}

/// **VALUE**: Verifies malformed wire errors are rejected with a description.
///
/// **WHY THIS MATTERS**: A response whose error cannot be rebuilt must reject
/// the call it belongs to, not resolve it with garbage.
#[test]
fn given_malformed_values_when_deserialized_then_fails_with_descriptive_error() {
    // Not an object
    let result = ErrorObject::deserialize(&json!("kaboom"));
    assert!(matches!(
        result,
        Err(SerializationError::NotAnObject { found: "string", .. })
    ));

    // Missing message
    let result = ErrorObject::deserialize(&json!({ "name": "Error" }));
    assert!(matches!(
        result,
        Err(SerializationError::InvalidField { field: "message", .. })
    ));

    // Non-string name
    let result = ErrorObject::deserialize(&json!({ "name": 7, "message": "x" }));
    assert!(matches!(
        result,
        Err(SerializationError::InvalidField { field: "name", .. })
    ));

    // Non-string stack
    let result = ErrorObject::deserialize(&json!({ "message": "x", "stack": ["a"] }));
    let error = result.expect_err("array stack must be rejected");
    assert!(error.to_string().contains("must be a string, got array"));
}

/// **VALUE**: Verifies an empty stack is left off the wire.
#[test]
fn given_error_without_stack_when_serialized_then_stack_is_omitted() {
    let wire = ErrorObject::new("plain").serialize().into_value();

    assert_eq!(wire, json!({ "name": "Error", "message": "plain" }));
}

/// **VALUE**: Verifies a Rust error's source chain becomes the stack.
///
/// **BUG THIS CATCHES**: Would catch handlers returning `from_error` losing the
/// underlying cause that explains the failure.
#[test]
fn given_nested_error_when_converted_then_sources_become_stack() {
    // GIVEN: An error with a source
    let error = DispatchError::MalformedResponse {
        source: SerializationError::NotAnObject {
            found: "number",
            location: ErrorLocation::caller(),
        },
        location: ErrorLocation::caller(),
    };

    // WHEN: Converting it
    let object = ErrorObject::from_error(&error);

    // THEN: Display is the message and the source is on the stack
    assert_eq!(object.name(), "Error");
    assert!(object.message().starts_with("Malformed Response Error"));
    assert!(
        object
            .stack()
            .starts_with("caused by: Serialization Error: expected an object, got number")
    );
}

/// **VALUE**: Verifies panic payloads of both common types become messages.
#[test]
fn given_panic_payloads_when_converted_then_message_is_kept() {
    let from_str = ErrorObject::from_panic(Box::new("boom"));
    let from_string = ErrorObject::from_panic(Box::new(String::from("bang")));
    let from_other = ErrorObject::from_panic(Box::new(42_u8));

    assert_eq!(from_str.name(), PANIC_ERROR_NAME);
    assert_eq!(from_str.message(), "boom");
    assert_eq!(from_string.message(), "bang");
    assert!(from_other.message().contains("non-string"));
}

/// **VALUE**: Verifies the serde form and the value form agree.
#[test]
fn given_serialized_error_json_when_parsed_with_serde_then_matches_object() {
    let serialized: SerializedError =
        serde_json::from_value(json!({ "name": "RangeError", "message": "too big", "code": 416 }))
            .expect("serde parse");

    let object = ErrorObject::from(serialized);

    assert_eq!(object.name(), "RangeError");
    assert_eq!(object.stack(), "");
    assert_eq!(object.code(), Some(&json!(416)));
}
