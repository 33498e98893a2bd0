//! Requesting side of the protocol.
//!
//! A [`RequestDispatcher`] turns a fire-and-forget [`Outbound`] into
//! request/response calls. Every request carries a fresh correlation id; the
//! dispatcher listens on the response channel and completes whichever
//! [`PendingReply`] the id belongs to, in any order, exactly once.

pub(crate) mod pending;
mod reply;

pub use reply::PendingReply;

use crate::dispatcher::pending::{PendingTable, random_correlation_id};
use crate::error::dispatch::DispatchError;
use crate::protocol::{
    ProtocolConfig, ProtocolStats, RequestEnvelope, ResponseEnvelope, SendOptions, StatsSnapshot,
    check_channel,
};
use crate::transport::{Inbound, Outbound, Subscription};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, trace, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep as TokioSleep;

struct DispatcherInner {
    outbound: Arc<dyn Outbound>,
    response_channel: String,
    default_timeout: Option<Duration>,
    pending: PendingTable,
    stats: Arc<ProtocolStats>,
    closed: AtomicBool,
    runtime: Handle,
}

/// Sends requests and matches their responses.
///
/// Owns its pending table and response listener; dropping it behaves like
/// [`RequestDispatcher::close`].
pub struct RequestDispatcher {
    inner: Arc<DispatcherInner>,
    intake: JoinHandle<()>,
}

impl RequestDispatcher {
    /// Build a dispatcher sending through `outbound` and reading responses
    /// from `inbound` on `config.response_channel`.
    ///
    /// Must be called inside a tokio runtime. That runtime also drives the
    /// timeouts started by [`send`](Self::send), so `send` may be called from
    /// any thread.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Validation`] - `config` is invalid
    /// - [`DispatchError::Transport`] - the response channel cannot be subscribed
    pub fn new(
        outbound: Arc<dyn Outbound>,
        inbound: &dyn Inbound,
        config: &ProtocolConfig,
    ) -> Result<Self, DispatchError> {
        config.check().map_err(|reason| DispatchError::Validation {
            message: reason,
            location: ErrorLocation::from(Location::caller()),
        })?;

        let runtime = Handle::try_current().map_err(|e| DispatchError::Validation {
            message: format!("dispatcher needs a tokio runtime: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
        let subscription = inbound.subscribe(&config.response_channel)?;
        let inner = Arc::new(DispatcherInner {
            outbound,
            response_channel: config.response_channel.clone(),
            default_timeout: config.default_timeout_ms.map(Duration::from_millis),
            pending: PendingTable::new(),
            stats: Arc::new(ProtocolStats::default()),
            closed: AtomicBool::new(false),
            runtime,
        });
        let intake = inner.runtime.spawn(run_intake(Arc::clone(&inner), subscription));

        debug!("Dispatcher listening for responses on '{}'", config.response_channel);

        Ok(Self { inner, intake })
    }

    /// Send `payload` on `channel` and return a future for the response.
    ///
    /// The timeout is `options.timeout`, falling back to the configured
    /// default; with neither, the request waits until answered or closed.
    ///
    /// # Errors
    ///
    /// Returned before anything is awaited:
    /// - [`DispatchError::Validation`] - empty channel or zero timeout
    /// - [`DispatchError::Closed`] - the dispatcher was closed
    /// - [`DispatchError::IdGeneration`] - no unused correlation id was found
    /// - [`DispatchError::Transport`] - the transport refused the message
    pub fn send(
        &self,
        channel: &str,
        payload: Value,
        options: SendOptions,
    ) -> Result<PendingReply, DispatchError> {
        check_channel(channel).map_err(|reason| DispatchError::Validation {
            message: format!("channel {reason}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
        options.check().map_err(|reason| DispatchError::Validation {
            message: reason,
            location: ErrorLocation::from(Location::caller()),
        })?;

        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed {
                message: format!("dispatcher on '{}' is closed", self.inner.response_channel),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let correlation_id = self
            .inner
            .pending
            .register(channel, reply_tx, random_correlation_id)?;

        if let Some(timeout) = options.timeout.or(self.inner.default_timeout) {
            let timer = spawn_timeout(
                &self.inner.runtime,
                Arc::downgrade(&self.inner),
                correlation_id.clone(),
                channel.to_string(),
                timeout,
            );
            self.inner.pending.attach_timeout(&correlation_id, timer);
        }

        let envelope = RequestEnvelope::new(correlation_id.clone(), payload);
        if let Err(e) = self.inner.outbound.send(channel, envelope.into_value()) {
            self.inner.pending.discard(&correlation_id);
            warn!("Request {correlation_id} on '{channel}' could not be sent: {e}");
            return Err(e.into());
        }

        self.inner.stats.record_request_sent();
        trace!("Sent request {correlation_id} on '{channel}'");

        Ok(PendingReply::new(correlation_id, channel.to_string(), reply_rx))
    }

    /// [`send`](Self::send) and wait for the response.
    pub async fn request(
        &self,
        channel: &str,
        payload: Value,
        options: SendOptions,
    ) -> Result<Value, DispatchError> {
        self.send(channel, payload, options)?.await
    }

    /// Typed [`request`](Self::request): `request` is serialized to the
    /// payload and the response payload is deserialized into `Resp`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Payload`] if either conversion fails, otherwise as
    /// for [`request`](Self::request).
    pub async fn call<Req, Resp>(
        &self,
        channel: &str,
        request: &Req,
        options: SendOptions,
    ) -> Result<Resp, DispatchError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let response = self.request(channel, payload, options).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn response_channel(&self) -> &str {
        &self.inner.response_channel
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop listening for responses and fail every pending request with
    /// [`DispatchError::Closed`]. Later sends fail the same way.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.intake.abort();
        let failed = self.inner.fail_pending("dispatcher closed");
        info!(
            "Dispatcher on '{}' closed ({failed} pending request(s) failed)",
            self.inner.response_channel
        );
    }
}

impl Drop for RequestDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl DispatcherInner {
    fn accept_response(&self, message: Value) {
        let envelope = match ResponseEnvelope::from_value(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.record_malformed_response();
                warn!("Dropping malformed response on '{}': {e}", self.response_channel);
                return;
            }
        };

        let Some(entry) = self.pending.take(&envelope.correlation_id) else {
            self.stats.record_orphan_response();
            debug!(
                "Dropping response {}: no pending request (late, duplicate, or foreign)",
                envelope.correlation_id
            );
            return;
        };

        let correlation_id = envelope.correlation_id.clone();
        let outcome = match envelope.into_outcome() {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(error)) => Err(DispatchError::Remote(error)),
            Err(source) => {
                self.stats.record_malformed_response();
                warn!("Response {correlation_id} carries a malformed error: {source}");
                Err(DispatchError::MalformedResponse {
                    source,
                    location: ErrorLocation::from(Location::caller()),
                })
            }
        };

        self.stats.record_response_matched();
        trace!("Matched response {correlation_id} on '{}'", entry.channel);
        entry.complete(outcome);
    }

    fn fail_pending(&self, reason: &str) -> usize {
        self.pending.fail_all(|correlation_id, channel| DispatchError::Closed {
            message: format!("request {correlation_id} on '{channel}' failed: {reason}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

async fn run_intake(inner: Arc<DispatcherInner>, mut subscription: Subscription) {
    while let Some(delivery) = subscription.recv().await {
        inner.accept_response(delivery.message);
    }

    // Nothing can answer from here on; refuse new requests before failing old ones.
    inner.closed.store(true, Ordering::SeqCst);
    let failed = inner.fail_pending("response channel closed");
    info!(
        "Response channel '{}' closed ({failed} pending request(s) failed)",
        subscription.channel()
    );
}

fn spawn_timeout(
    runtime: &Handle,
    inner: Weak<DispatcherInner>,
    correlation_id: String,
    channel: String,
    timeout: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        TokioSleep(timeout).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let Some(entry) = inner.pending.take(&correlation_id) else {
            return;
        };

        inner.stats.record_timeout();
        warn!("Request {correlation_id} on '{channel}' timed out after {timeout:?}");
        entry.expire(DispatchError::Timeout {
            channel,
            correlation_id,
            timeout,
            location: ErrorLocation::from(Location::caller()),
        });
    })
}
