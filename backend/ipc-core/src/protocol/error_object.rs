use crate::error::serialization::SerializationError;
use crate::protocol::json_kind;

use common::ErrorLocation;

use std::any::Any;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name given to errors that do not specify one.
pub const DEFAULT_ERROR_NAME: &str = "Error";

/// Name given to errors produced from a panicking handler.
pub const PANIC_ERROR_NAME: &str = "Panic";

const NAME_FIELD: &str = "name";
const MESSAGE_FIELD: &str = "message";
const STACK_FIELD: &str = "stack";
const CODE_FIELD: &str = "code";
const DATA_FIELD: &str = "data";

/// Plain-data projection of an error, as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SerializedError {
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert(NAME_FIELD.to_string(), Value::String(self.name));
        map.insert(MESSAGE_FIELD.to_string(), Value::String(self.message));
        if let Some(stack) = self.stack {
            map.insert(STACK_FIELD.to_string(), Value::String(stack));
        }
        if let Some(code) = self.code {
            map.insert(CODE_FIELD.to_string(), code);
        }
        if let Some(data) = self.data {
            map.insert(DATA_FIELD.to_string(), data);
        }
        Value::Object(map)
    }
}

/// An error that crossed (or is about to cross) the process boundary.
///
/// Handlers fail by returning one of these; dispatchers receive one inside
/// [`DispatchError::Remote`](crate::error::DispatchError::Remote).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    name: String,
    message: String,
    stack: String,
    code: Option<Value>,
    data: Option<Value>,
}

impl ErrorObject {
    /// A generic `Error` with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named(DEFAULT_ERROR_NAME, message)
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: String::new(),
            code: None,
            data: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<Value>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Capture a Rust error: its Display becomes the message and its
    /// `source()` chain becomes the stack, one cause per line.
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut stack = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self::new(error.to_string()).with_stack(stack.join("\n"))
    }

    /// Convert a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "handler panicked with a non-string payload".to_string()
        };
        Self::named(PANIC_ERROR_NAME, message)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Empty when the original error carried no stack.
    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn code(&self) -> Option<&Value> {
        self.code.as_ref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Project to wire form. An empty stack is omitted.
    pub fn serialize(&self) -> SerializedError {
        SerializedError {
            name: self.name.clone(),
            message: self.message.clone(),
            stack: (!self.stack.is_empty()).then(|| self.stack.clone()),
            code: self.code.clone(),
            data: self.data.clone(),
        }
    }

    /// Rebuild an error from its wire form.
    ///
    /// The value must be an object with a string `message`. `name` defaults to
    /// `"Error"` and `stack` to `""` when absent or null; any other type for
    /// those fields is rejected. `code` and `data` are carried through as-is.
    #[track_caller]
    pub fn deserialize(value: &Value) -> Result<Self, SerializationError> {
        let Value::Object(map) = value else {
            return Err(SerializationError::NotAnObject {
                found: json_kind(value),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        let message = match map.get(MESSAGE_FIELD) {
            Some(Value::String(message)) => message.clone(),
            Some(other) => return Err(wrong_type(MESSAGE_FIELD, other)),
            None => {
                return Err(SerializationError::InvalidField {
                    field: MESSAGE_FIELD,
                    message: "is missing".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };
        let name = optional_string(map, NAME_FIELD)?.unwrap_or_else(|| DEFAULT_ERROR_NAME.to_string());
        let stack = optional_string(map, STACK_FIELD)?.unwrap_or_default();

        Ok(Self {
            name,
            message,
            stack,
            code: present(map, CODE_FIELD),
            data: present(map, DATA_FIELD),
        })
    }
}

#[track_caller]
fn optional_string(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, SerializationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(wrong_type(field, other)),
    }
}

/// An explicit `null` is kept; only an absent key is `None`.
fn present(map: &Map<String, Value>, field: &str) -> Option<Value> {
    map.get(field).cloned()
}

#[track_caller]
fn wrong_type(field: &'static str, found: &Value) -> SerializationError {
    SerializationError::InvalidField {
        field,
        message: format!("must be a string, got {}", json_kind(found)),
        location: ErrorLocation::from(Location::caller()),
    }
}

impl From<SerializedError> for ErrorObject {
    fn from(serialized: SerializedError) -> Self {
        Self {
            name: serialized.name,
            message: serialized.message,
            stack: serialized.stack.unwrap_or_default(),
            code: serialized.code,
            data: serialized.data,
        }
    }
}

impl Display for ErrorObject {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        write!(formatter, "{}: {}", self.name, self.message)
    }
}

impl StdError for ErrorObject {}
