use crate::error::transport::TransportError;
use crate::protocol::{ErrorObject, ProtocolStats, ResponseEnvelope};
use crate::transport::Origin;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{trace, warn};
use serde_json::Value;

/// Where a request came from.
#[derive(Debug, Clone)]
pub struct RequestContext {
    channel: String,
    correlation_id: String,
    origin: Origin,
}

impl RequestContext {
    pub(crate) fn new(channel: &str, correlation_id: &str, origin: Origin) -> Self {
        Self {
            channel: channel.to_string(),
            correlation_id: correlation_id.to_string(),
            origin,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Route back to the requester, e.g. to push unrelated messages to it.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

struct RespondInner {
    correlation_id: String,
    channel: String,
    response_channel: Arc<str>,
    origin: Origin,
    calls: AtomicUsize,
    stats: Arc<ProtocolStats>,
}

/// Answers one request.
///
/// Clones answer the same request and may be moved to other tasks. The first
/// answer is the one the caller sees; later ones are still sent, but the
/// caller's dispatcher drops them.
#[derive(Clone)]
pub struct Respond {
    inner: Arc<RespondInner>,
}

impl Respond {
    pub(crate) fn new(
        context: &RequestContext,
        response_channel: Arc<str>,
        stats: Arc<ProtocolStats>,
    ) -> Self {
        Self {
            inner: Arc::new(RespondInner {
                correlation_id: context.correlation_id.clone(),
                channel: context.channel.clone(),
                response_channel,
                origin: context.origin.clone(),
                calls: AtomicUsize::new(0),
                stats,
            }),
        }
    }

    /// Send the response envelope back to the requester. `error` wins over
    /// `result` on the receiving side when both are set.
    pub fn respond(
        &self,
        result: Option<Value>,
        error: Option<&ErrorObject>,
    ) -> Result<(), TransportError> {
        let previous = self.inner.calls.fetch_add(1, Ordering::SeqCst);
        if previous > 0 {
            self.inner.stats.record_repeated_respond();
            warn!(
                "Request {} on '{}' answered {} times",
                self.inner.correlation_id,
                self.inner.channel,
                previous + 1
            );
        }

        let envelope = ResponseEnvelope::new(self.inner.correlation_id.clone(), result, error);
        self.inner
            .origin
            .send(&self.inner.response_channel, envelope.into_value())?;

        trace!(
            "Answered request {} on '{}'",
            self.inner.correlation_id, self.inner.channel
        );
        Ok(())
    }

    /// Answer with a payload, logging a failed send.
    pub fn ok(&self, payload: Value) {
        if let Err(e) = self.respond(Some(payload), None) {
            warn!(
                "Failed to answer request {}: {e}",
                self.inner.correlation_id
            );
        }
    }

    /// Answer with an error, logging a failed send.
    pub fn err(&self, error: &ErrorObject) {
        if let Err(e) = self.respond(None, Some(error)) {
            warn!(
                "Failed to send error for request {}: {e}",
                self.inner.correlation_id
            );
        }
    }

    pub fn has_responded(&self) -> bool {
        self.inner.calls.load(Ordering::SeqCst) > 0
    }

    pub fn correlation_id(&self) -> &str {
        &self.inner.correlation_id
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }
}

impl fmt::Debug for Respond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Respond")
            .field("correlation_id", &self.inner.correlation_id)
            .field("channel", &self.inner.channel)
            .field("origin", &self.inner.origin)
            .field("responded", &self.has_responded())
            .finish()
    }
}
