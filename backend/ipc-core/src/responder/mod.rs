//! Responding side of the protocol.
//!
//! A [`ResponseResponder`] registers at most one [`Handler`] per channel. Each
//! valid request is handed to the handler together with a [`Respond`] that
//! sends the answer back to whoever asked, on the shared response channel.
//!
//! Requests without a usable `__requestId` never reach a handler. Handler
//! errors and panics are sent back as the response error.

mod handler;
mod respond;

pub use handler::{Handler, HandlerResult};
pub use respond::{RequestContext, Respond};

use crate::error::responder::ResponderError;
use crate::protocol::{
    ErrorObject, ProtocolConfig, ProtocolStats, RequestEnvelope, StatsSnapshot, check_channel,
};
use crate::transport::{Inbound, Subscription};

use common::ErrorLocation;

use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, Location, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::spawn as TokioSpawn;
use tokio::task::JoinHandle;

/// Channel-to-handler registry bound to one [`Inbound`].
///
/// Dropping the responder removes all of its registrations.
pub struct ResponseResponder {
    inbound: Arc<dyn Inbound>,
    response_channel: Arc<str>,
    registrations: Mutex<HashMap<String, JoinHandle<()>>>,
    stats: Arc<ProtocolStats>,
}

impl ResponseResponder {
    /// # Errors
    ///
    /// [`ResponderError::Validation`] if `config` is invalid.
    pub fn new(inbound: Arc<dyn Inbound>, config: &ProtocolConfig) -> Result<Self, ResponderError> {
        config.check().map_err(|reason| ResponderError::Validation {
            message: reason,
            location: ErrorLocation::from(Location::caller()),
        })?;

        Ok(Self {
            inbound,
            response_channel: config.response_channel.as_str().into(),
            registrations: Mutex::new(HashMap::new()),
            stats: Arc::new(ProtocolStats::default()),
        })
    }

    /// Register `handler` for `channel`.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ResponderError::Validation`] - empty channel
    /// - [`ResponderError::AlreadyRegistered`] - `channel` already has a handler;
    ///   the existing one is kept
    /// - [`ResponderError::Transport`] - the channel cannot be subscribed
    pub fn on<F>(&self, channel: &str, handler: F) -> Result<(), ResponderError>
    where
        F: Fn(RequestContext, Value, Respond) -> Result<(), ErrorObject> + Send + Sync + 'static,
    {
        self.on_handler(channel, Arc::new(handler))
    }

    /// [`on`](Self::on) for a shared [`Handler`] object.
    pub fn on_handler(&self, channel: &str, handler: Arc<dyn Handler>) -> Result<(), ResponderError> {
        check_channel(channel).map_err(|reason| ResponderError::Validation {
            message: format!("channel {reason}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let mut registrations = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if registrations.contains_key(channel) {
            return Err(ResponderError::AlreadyRegistered {
                channel: channel.to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let subscription = self.inbound.subscribe(channel)?;
        let listener = TokioSpawn(run_listener(
            subscription,
            handler,
            Arc::clone(&self.response_channel),
            Arc::clone(&self.stats),
        ));
        registrations.insert(channel.to_string(), listener);

        info!("Registered handler for '{channel}'");
        Ok(())
    }

    /// Register an async handler whose output is the response.
    ///
    /// Each request runs on its own task; `Ok` becomes the payload, `Err` or
    /// a panic becomes the response error.
    pub fn on_async<F, Fut>(&self, channel: &str, handler: F) -> Result<(), ResponderError>
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        let stats = Arc::clone(&self.stats);
        self.on(channel, move |context, payload, respond| {
            let future = handler(context, payload);
            let stats = Arc::clone(&stats);
            TokioSpawn(async move {
                let error = match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(Ok(payload)) => {
                        respond.ok(payload);
                        return;
                    }
                    Ok(Err(error)) => error,
                    Err(panic) => ErrorObject::from_panic(panic),
                };
                stats.record_handler_failure();
                warn!(
                    "Handler for '{}' failed request {}: {error}",
                    respond.channel(),
                    respond.correlation_id()
                );
                respond.err(&error);
            });
            Ok(())
        })
    }

    /// Remove the handler for `channel`.
    ///
    /// # Errors
    ///
    /// [`ResponderError::NotRegistered`] if `channel` has no handler.
    pub fn off(&self, channel: &str) -> Result<(), ResponderError> {
        let listener = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel);

        match listener {
            Some(listener) => {
                listener.abort();
                info!("Removed handler for '{channel}'");
                Ok(())
            }
            None => Err(ResponderError::NotRegistered {
                channel: channel.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    /// Remove every handler. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let listeners: Vec<JoinHandle<()>> = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, listener)| listener)
            .collect();

        for listener in &listeners {
            listener.abort();
        }
        if !listeners.is_empty() {
            info!("Removed {} handler(s)", listeners.len());
        }
        listeners.len()
    }

    pub fn is_registered(&self, channel: &str) -> bool {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(channel)
    }

    /// Registered channels, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        channels.sort();
        channels
    }

    pub fn response_channel(&self) -> &str {
        &self.response_channel
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for ResponseResponder {
    fn drop(&mut self) {
        self.clear();
    }
}

async fn run_listener(
    mut subscription: Subscription,
    handler: Arc<dyn Handler>,
    response_channel: Arc<str>,
    stats: Arc<ProtocolStats>,
) {
    let channel = subscription.channel().to_string();

    while let Some(delivery) = subscription.recv().await {
        let envelope = match RequestEnvelope::from_value(delivery.message) {
            Ok(envelope) => envelope,
            Err(e) => {
                stats.record_malformed_request();
                warn!(
                    "Dropping malformed request on '{channel}' from {}: {e}",
                    delivery.origin.label()
                );
                continue;
            }
        };

        stats.record_request_handled();
        let context = RequestContext::new(&channel, &envelope.correlation_id, delivery.origin);
        let respond = Respond::new(&context, Arc::clone(&response_channel), Arc::clone(&stats));
        invoke(handler.as_ref(), context, envelope.payload, respond, &stats);
    }

    debug!("Listener for '{channel}' stopped");
}

/// Run the handler, turning an `Err` or a panic into the response error.
fn invoke(
    handler: &dyn Handler,
    context: RequestContext,
    payload: Value,
    respond: Respond,
    stats: &ProtocolStats,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        handler.handle(context, payload, respond.clone())
    }));

    let error = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error,
        Err(panic) => ErrorObject::from_panic(panic),
    };

    stats.record_handler_failure();
    warn!(
        "Handler for '{}' failed request {}: {error}",
        respond.channel(),
        respond.correlation_id()
    );
    respond.err(&error);
}
