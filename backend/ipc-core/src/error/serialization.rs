use common::ErrorLocation;

use thiserror::Error as ThisError;

/// A wire value did not have the shape the protocol requires.
#[derive(Debug, ThisError)]
pub enum SerializationError {
    #[error("Serialization Error: expected an object, got {found} {location}")]
    NotAnObject {
        found: &'static str,
        location: ErrorLocation,
    },

    #[error("Serialization Error: field '{field}' {message} {location}")]
    InvalidField {
        field: &'static str,
        message: String,
        location: ErrorLocation,
    },
}
