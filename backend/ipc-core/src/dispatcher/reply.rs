use crate::error::dispatch::DispatchError;

use common::ErrorLocation;

use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

/// Future for the response to one request.
///
/// Resolves to the response payload, or to the [`DispatchError`] that ended
/// the request. Dropping it abandons the result; the pending entry is
/// reclaimed by the response, the timeout, or [`close`](super::RequestDispatcher::close).
#[derive(Debug)]
#[must_use = "the response is lost unless the reply is awaited"]
pub struct PendingReply {
    correlation_id: String,
    channel: String,
    receiver: oneshot::Receiver<Result<Value, DispatchError>>,
}

impl PendingReply {
    pub(crate) fn new(
        correlation_id: String,
        channel: String,
        receiver: oneshot::Receiver<Result<Value, DispatchError>>,
    ) -> Self {
        Self {
            correlation_id,
            channel,
            receiver,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Future for PendingReply {
    type Output = Result<Value, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::Closed {
                message: format!(
                    "request {} on '{}' was dropped by its dispatcher",
                    self.correlation_id, self.channel
                ),
                location: ErrorLocation::from(Location::caller()),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}
