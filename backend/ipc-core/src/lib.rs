//! Request/response correlation over one-way message channels.
//!
//! A [`RequestDispatcher`](dispatcher::RequestDispatcher) sends requests and
//! awaits their responses; a [`ResponseResponder`](responder::ResponseResponder)
//! serves them. Both run over any transport implementing
//! [`Outbound`](transport::Outbound) / [`Inbound`](transport::Inbound).

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod responder;
pub mod transport;

#[cfg(test)]
mod tests;

pub use dispatcher::{PendingReply, RequestDispatcher};
pub use protocol::{ErrorObject, ProtocolConfig, SendOptions};
pub use responder::{Respond, RequestContext, ResponseResponder};
