pub mod config;
pub mod dispatch;
pub mod responder;
pub mod serialization;
pub mod transport;

pub use config::ConfigError;
pub use dispatch::DispatchError;
pub use responder::ResponderError;
pub use serialization::SerializationError;
pub use transport::TransportError;
