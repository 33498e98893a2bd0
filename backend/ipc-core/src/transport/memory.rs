//! In-process transport: two endpoints wired back to back.

use crate::error::transport::TransportError;
use crate::transport::{Delivery, Inbound, Origin, Outbound, SubscriberTable, Subscription};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde_json::Value;

#[derive(Debug)]
struct Mailbox {
    label: String,
    subscribers: SubscriberTable,
    closed: AtomicBool,
}

impl Mailbox {
    fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            subscribers: SubscriberTable::new(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Constructor for connected [`MemoryEndpoint`] pairs.
pub struct MemoryTransport;

impl MemoryTransport {
    /// Two endpoints where whatever one sends, the other receives.
    pub fn pair(first: &str, second: &str) -> (MemoryEndpoint, MemoryEndpoint) {
        let first = Mailbox::new(first);
        let second = Mailbox::new(second);
        (
            MemoryEndpoint {
                local: Arc::clone(&first),
                remote: Arc::clone(&second),
            },
            MemoryEndpoint {
                local: second,
                remote: first,
            },
        )
    }
}

/// One side of an in-process pair. Cloning yields another handle to the same side.
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    local: Arc<Mailbox>,
    remote: Arc<Mailbox>,
}

impl MemoryEndpoint {
    pub fn label(&self) -> &str {
        &self.local.label
    }

    /// Stop this side: its subscriptions end and the peer's sends fail.
    pub fn close(&self) {
        self.local.closed.store(true, Ordering::SeqCst);
        self.local.subscribers.close();
        debug!("Memory endpoint '{}' closed", self.local.label);
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.local.subscribers.subscriber_count(channel)
    }

    /// The peer's view of this pair, used as the reply route for deliveries.
    fn reversed(&self) -> MemoryEndpoint {
        MemoryEndpoint {
            local: Arc::clone(&self.remote),
            remote: Arc::clone(&self.local),
        }
    }
}

impl Outbound for MemoryEndpoint {
    fn send(&self, channel: &str, message: Value) -> Result<(), TransportError> {
        if self.local.closed.load(Ordering::SeqCst) || self.remote.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                message: format!(
                    "memory link '{}' -> '{}' is closed",
                    self.local.label, self.remote.label
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let delivery = Delivery {
            channel: channel.to_string(),
            message,
            origin: Origin::new(self.local.label.as_str(), Arc::new(self.reversed())),
        };
        if self.remote.subscribers.deliver(delivery) == 0 {
            debug!(
                "Dropping message on '{channel}' for '{}': no subscriber",
                self.remote.label
            );
        }
        Ok(())
    }
}

impl Inbound for MemoryEndpoint {
    fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        if self.local.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                message: format!("memory endpoint '{}' is closed", self.local.label),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(self.local.subscribers.subscribe(channel))
    }
}
