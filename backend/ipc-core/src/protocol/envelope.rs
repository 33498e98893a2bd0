use crate::error::serialization::SerializationError;
use crate::protocol::error_object::ErrorObject;
use crate::protocol::json_kind;

use common::ErrorLocation;

use std::panic::Location;

use serde_json::{Map, Value};

/// Wire key carrying the correlation id in both directions.
pub const REQUEST_ID_FIELD: &str = "__requestId";

const PAYLOAD_FIELD: &str = "payload";
const ERROR_FIELD: &str = "error";

/// `{ "__requestId": <string>, "payload": <any> }`
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub correlation_id: String,
    pub payload: Value,
}

impl RequestEnvelope {
    pub fn new(correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload,
        }
    }

    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert(
            REQUEST_ID_FIELD.to_string(),
            Value::String(self.correlation_id),
        );
        map.insert(PAYLOAD_FIELD.to_string(), self.payload);
        Value::Object(map)
    }

    /// Validate an inbound request. A missing payload reads as `null`.
    #[track_caller]
    pub fn from_value(value: Value) -> Result<Self, SerializationError> {
        let mut map = into_object(value)?;
        let correlation_id = take_correlation_id(&mut map)?;
        let payload = map.remove(PAYLOAD_FIELD).unwrap_or(Value::Null);
        Ok(Self {
            correlation_id,
            payload,
        })
    }
}

/// `{ "__requestId": <string>, "payload": <any|absent>, "error": <SerializedError|null> }`
///
/// `error` is kept raw until [`ResponseEnvelope::into_outcome`] so that a
/// malformed error still resolves the request it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub correlation_id: String,
    pub payload: Option<Value>,
    pub error: Option<Value>,
}

impl ResponseEnvelope {
    pub fn new(
        correlation_id: impl Into<String>,
        payload: Option<Value>,
        error: Option<&ErrorObject>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload,
            error: error.map(|error| error.serialize().into_value()),
        }
    }

    pub fn success(correlation_id: impl Into<String>, payload: Value) -> Self {
        Self::new(correlation_id, Some(payload), None)
    }

    pub fn failure(correlation_id: impl Into<String>, error: &ErrorObject) -> Self {
        Self::new(correlation_id, None, Some(error))
    }

    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert(
            REQUEST_ID_FIELD.to_string(),
            Value::String(self.correlation_id),
        );
        if let Some(payload) = self.payload {
            map.insert(PAYLOAD_FIELD.to_string(), payload);
        }
        map.insert(ERROR_FIELD.to_string(), self.error.unwrap_or(Value::Null));
        Value::Object(map)
    }

    /// Validate an inbound response. Only the correlation id is checked here.
    #[track_caller]
    pub fn from_value(value: Value) -> Result<Self, SerializationError> {
        let mut map = into_object(value)?;
        let correlation_id = take_correlation_id(&mut map)?;
        let payload = map.remove(PAYLOAD_FIELD);
        let error = map.remove(ERROR_FIELD).filter(|error| !error.is_null());
        Ok(Self {
            correlation_id,
            payload,
            error,
        })
    }

    /// The call result: the error wins when both fields are set; an absent
    /// payload reads as `null`. The outer error reports an `error` field that
    /// is not a valid serialized error.
    pub fn into_outcome(self) -> Result<Result<Value, ErrorObject>, SerializationError> {
        match self.error {
            Some(error) => Ok(Err(ErrorObject::deserialize(&error)?)),
            None => Ok(Ok(self.payload.unwrap_or(Value::Null))),
        }
    }
}

#[track_caller]
fn into_object(value: Value) -> Result<Map<String, Value>, SerializationError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SerializationError::NotAnObject {
            found: json_kind(&other),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

#[track_caller]
fn take_correlation_id(map: &mut Map<String, Value>) -> Result<String, SerializationError> {
    match map.remove(REQUEST_ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        Some(Value::String(_)) => Err(SerializationError::InvalidField {
            field: REQUEST_ID_FIELD,
            message: "must not be empty".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }),
        Some(other) => Err(SerializationError::InvalidField {
            field: REQUEST_ID_FIELD,
            message: format!("must be a string, got {}", json_kind(&other)),
            location: ErrorLocation::from(Location::caller()),
        }),
        None => Err(SerializationError::InvalidField {
            field: REQUEST_ID_FIELD,
            message: "is missing".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}
