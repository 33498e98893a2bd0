//! Shared building blocks for the IPC bridge crates.
//!
//! Everything here is dependency-light so both the protocol core and the
//! desktop bridge binary can use it:
//!
//! - [`ErrorLocation`]: call-site capture embedded in every error variant
//! - [`RedactedToken`]: the connection auth token, never printed or serialized

pub mod error;
pub mod redacted_token;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_token::RedactedToken;
