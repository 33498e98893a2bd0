use crate::error::serialization::SerializationError;
use crate::error::transport::TransportError;
use crate::protocol::ErrorObject;

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use thiserror::Error as ThisError;

/// Failures of a single outgoing request.
///
/// `Validation`, `IdGeneration` and `Transport` are returned by
/// [`RequestDispatcher::send`](crate::dispatcher::RequestDispatcher::send) before
/// anything is awaited. The remaining variants complete a
/// [`PendingReply`](crate::dispatcher::PendingReply).
#[derive(Debug, ThisError)]
pub enum DispatchError {
    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },

    #[error("Timeout Error: request {correlation_id} on '{channel}' timed out after {timeout:?} {location}")]
    Timeout {
        channel: String,
        correlation_id: String,
        timeout: Duration,
        location: ErrorLocation,
    },

    /// The remote handler failed; carries the reconstructed error.
    #[error("Remote Error: {0}")]
    Remote(ErrorObject),

    #[error("Malformed Response Error: {source} {location}")]
    MalformedResponse {
        #[source]
        source: SerializationError,
        location: ErrorLocation,
    },

    #[error("Closed Error: {message} {location}")]
    Closed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Id Generation Error: {message} {location}")]
    IdGeneration {
        message: String,
        location: ErrorLocation,
    },

    #[error("Payload Error: {message} {location}")]
    Payload {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// The remote error, if the handler on the other side failed.
    pub fn remote(&self) -> Option<&ErrorObject> {
        match self {
            DispatchError::Remote(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Timeout { .. })
    }
}

impl From<serde_json::Error> for DispatchError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        DispatchError::Payload {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
