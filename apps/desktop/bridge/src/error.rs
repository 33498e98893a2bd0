use ipc_core::error::{ConfigError, DispatchError, ResponderError, TransportError};
use ipc_core::protocol::SerializedError;

use common::ErrorLocation;

use std::panic::Location;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the bridge binary.
///
/// Serializable so `call` can print failures as JSON; core errors are
/// flattened to their messages, remote errors keep their wire form.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum BridgeError {
    /// Error from this app
    #[error("Bridge Error: {message} {location}")]
    Bridge {
        message: String,
        location: ErrorLocation,
    },

    /// Configuration could not be loaded, validated or saved
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },

    /// Host or client transport failure
    #[error("Transport Error: {message} {location}")]
    Transport {
        message: String,
        location: ErrorLocation,
    },

    /// A request failed locally (timeout, validation, teardown)
    #[error("Request Error: {message} {location}")]
    Request {
        message: String,
        location: ErrorLocation,
    },

    /// The handler on the other side failed
    #[error("Remote Error: {}: {}", .error.name, .error.message)]
    Remote { error: SerializedError },
}

impl From<ConfigError> for BridgeError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        BridgeError::Config {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<TransportError> for BridgeError {
    #[track_caller]
    fn from(error: TransportError) -> Self {
        BridgeError::Transport {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ResponderError> for BridgeError {
    #[track_caller]
    fn from(error: ResponderError) -> Self {
        BridgeError::Bridge {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<DispatchError> for BridgeError {
    #[track_caller]
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Remote(remote) => BridgeError::Remote {
                error: remote.serialize(),
            },
            DispatchError::Transport(transport) => transport.into(),
            other => BridgeError::Request {
                message: other.to_string(),
                location: ErrorLocation::from(Location::caller()),
            },
        }
    }
}
