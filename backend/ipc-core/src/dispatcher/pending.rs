use crate::error::dispatch::DispatchError;

use common::ErrorLocation;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::Location;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How many fresh ids are tried before registration gives up.
pub(crate) const MAX_ID_ATTEMPTS: usize = 8;

pub(crate) type ReplySender = oneshot::Sender<Result<Value, DispatchError>>;

/// One in-flight request.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) channel: String,
    pub(crate) reply: ReplySender,
    timeout: Option<JoinHandle<()>>,
}

impl PendingRequest {
    /// Complete the request. The caller may already have dropped its reply.
    pub(crate) fn complete(self, outcome: Result<Value, DispatchError>) {
        if let Some(timeout) = self.timeout {
            timeout.abort();
        }
        let _ = self.reply.send(outcome);
    }

    /// Complete from inside the timer task, which must not abort itself.
    pub(crate) fn expire(self, error: DispatchError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Correlation id to pending request.
///
/// The lock is only held for map operations, never across an `.await`.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry under an id from `next_id`, drawing again on
    /// collision. Returns the id used.
    #[track_caller]
    pub(crate) fn register(
        &self,
        channel: &str,
        reply: ReplySender,
        mut next_id: impl FnMut() -> String,
    ) -> Result<String, DispatchError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..MAX_ID_ATTEMPTS {
            let correlation_id = next_id();
            if let Entry::Vacant(slot) = entries.entry(correlation_id.clone()) {
                slot.insert(PendingRequest {
                    channel: channel.to_string(),
                    reply,
                    timeout: None,
                });
                return Ok(correlation_id);
            }
        }
        Err(DispatchError::IdGeneration {
            message: format!("no unused correlation id after {MAX_ID_ATTEMPTS} attempts"),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Attach the timer for `correlation_id`. If the entry already completed,
    /// the timer is aborted instead.
    pub(crate) fn attach_timeout(&self, correlation_id: &str, timeout: JoinHandle<()>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(correlation_id) {
            Some(entry) => entry.timeout = Some(timeout),
            None => timeout.abort(),
        }
    }

    pub(crate) fn take(&self, correlation_id: &str) -> Option<PendingRequest> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(correlation_id)
    }

    /// Drop an entry without completing it.
    pub(crate) fn discard(&self, correlation_id: &str) {
        if let Some(timeout) = self.take(correlation_id).and_then(|entry| entry.timeout) {
            timeout.abort();
        }
    }

    /// Complete every entry with the error `make_error` builds for it.
    pub(crate) fn fail_all(&self, mut make_error: impl FnMut(&str, &str) -> DispatchError) -> usize {
        let drained: Vec<(String, PendingRequest)> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        let count = drained.len();
        for (correlation_id, entry) in drained {
            let error = make_error(&correlation_id, &entry.channel);
            entry.complete(Err(error));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn contains(&self, correlation_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(correlation_id)
    }
}

/// Fresh 128-bit random correlation id.
pub(crate) fn random_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
