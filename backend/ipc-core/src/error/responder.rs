use crate::error::transport::TransportError;

use common::ErrorLocation;

use thiserror::Error as ThisError;

/// Registration-contract violations on the responding side.
///
/// These never cross the process boundary.
#[derive(Debug, ThisError)]
pub enum ResponderError {
    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },

    #[error("Already Registered Error: a handler is already registered for '{channel}' {location}")]
    AlreadyRegistered {
        channel: String,
        location: ErrorLocation,
    },

    #[error("Not Registered Error: no handler is registered for '{channel}' {location}")]
    NotRegistered {
        channel: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
