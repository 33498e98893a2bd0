use crate::protocol::ErrorObject;
use crate::responder::respond::{RequestContext, Respond};

use serde_json::Value;

/// What a handler returns once it has taken the request.
///
/// `Ok(())` means the handler has answered, or will answer later through its
/// [`Respond`]. `Err` is sent back to the caller as the response error.
pub type HandlerResult = Result<(), ErrorObject>;

/// Serves requests on one channel.
///
/// Implemented for every `Fn(RequestContext, Value, Respond) -> HandlerResult`,
/// so closures can be registered directly.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, context: RequestContext, payload: Value, respond: Respond) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(RequestContext, Value, Respond) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, context: RequestContext, payload: Value, respond: Respond) -> HandlerResult {
        self(context, payload, respond)
    }
}
