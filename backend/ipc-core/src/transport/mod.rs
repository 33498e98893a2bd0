//! One-way message transports.
//!
//! The protocol only needs two primitives from a transport:
//!
//! - [`Outbound::send`]: fire-and-forget a JSON message on a named channel
//! - [`Inbound::subscribe`]: receive every message arriving on a named channel,
//!   each tagged with an [`Origin`] that routes back to its sender
//!
//! Delivery is assumed in-order per channel and at-most-once; there is no
//! built-in correlation. Two implementations ship with the crate:
//! [`memory::MemoryTransport`] (in-process pair) and [`ws`] (localhost WebSocket).

pub mod memory;
pub mod ws;

use crate::error::transport::TransportError;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::trace;
use serde_json::Value;
use tokio::sync::mpsc;

/// Sending half of a one-way channel.
pub trait Outbound: Send + Sync + 'static {
    fn send(&self, channel: &str, message: Value) -> Result<(), TransportError>;
}

/// Receiving half of a one-way channel.
pub trait Inbound: Send + Sync + 'static {
    /// Start receiving messages on `channel`. Dropping the returned
    /// [`Subscription`] unsubscribes.
    fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError>;
}

impl<T: Outbound + ?Sized> Outbound for Arc<T> {
    fn send(&self, channel: &str, message: Value) -> Result<(), TransportError> {
        (**self).send(channel, message)
    }
}

impl<T: Inbound + ?Sized> Inbound for Arc<T> {
    fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        (**self).subscribe(channel)
    }
}

/// Route back to whoever sent a [`Delivery`].
#[derive(Clone)]
pub struct Origin {
    label: Arc<str>,
    route: Arc<dyn Outbound>,
}

impl Origin {
    pub fn new(label: impl Into<Arc<str>>, route: Arc<dyn Outbound>) -> Self {
        Self {
            label: label.into(),
            route,
        }
    }

    /// Human-readable sender name for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn send(&self, channel: &str, message: Value) -> Result<(), TransportError> {
        self.route.send(channel, message)
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin").field("label", &self.label).finish()
    }
}

/// One message as handed to a subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub channel: String,
    pub message: Value,
    pub origin: Origin,
}

/// Stream of deliveries for a single channel.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next delivery, or `None` once the transport side is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// Fan-out table from channel name to live subscriptions.
///
/// Dead subscriptions (receiver dropped) are pruned on the next delivery to
/// their channel.
#[derive(Debug, Default)]
pub struct SubscriberTable {
    channels: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>>,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &str) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(sender);
        Subscription {
            channel: channel.to_string(),
            receiver,
        }
    }

    /// Hand `delivery` to every live subscriber of its channel.
    ///
    /// Returns how many subscribers received it; zero means the message was
    /// dropped.
    pub fn deliver(&self, delivery: Delivery) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = channels.get_mut(&delivery.channel) else {
            return 0;
        };
        senders.retain(|sender| !sender.is_closed());
        let delivered = senders
            .iter()
            .filter(|sender| sender.send(delivery.clone()).is_ok())
            .count();
        if senders.is_empty() {
            channels.remove(&delivery.channel);
        }
        trace!("Delivered message on '{}' to {delivered} subscriber(s)", delivery.channel);
        delivered
    }

    /// Live subscriber count for `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map(|senders| senders.iter().filter(|sender| !sender.is_closed()).count())
            .unwrap_or(0)
    }

    /// End every subscription.
    pub fn close(&self) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
