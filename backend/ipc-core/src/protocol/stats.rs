use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for traffic the protocol handled, dropped, or failed.
///
/// Drops are never escalated to a caller, so these counters (together with
/// the warn-level log lines next to each increment) are how they surface.
#[derive(Debug, Default)]
pub struct ProtocolStats {
    requests_sent: AtomicU64,
    responses_matched: AtomicU64,
    orphan_responses: AtomicU64,
    malformed_responses: AtomicU64,
    timeouts: AtomicU64,
    requests_handled: AtomicU64,
    malformed_requests: AtomicU64,
    handler_failures: AtomicU64,
    repeated_responds: AtomicU64,
}

/// Point-in-time copy of [`ProtocolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests_sent: u64,
    pub responses_matched: u64,
    pub orphan_responses: u64,
    pub malformed_responses: u64,
    pub timeouts: u64,
    pub requests_handled: u64,
    pub malformed_requests: u64,
    pub handler_failures: u64,
    pub repeated_responds: u64,
}

impl ProtocolStats {
    pub(crate) fn record_request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_response_matched(&self) {
        self.responses_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_orphan_response(&self) {
        self.orphan_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_response(&self) {
        self.malformed_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_request_handled(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_request(&self) {
        self.malformed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_repeated_respond(&self) {
        self.repeated_responds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            orphan_responses: self.orphan_responses.load(Ordering::Relaxed),
            malformed_responses: self.malformed_responses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            requests_handled: self.requests_handled.load(Ordering::Relaxed),
            malformed_requests: self.malformed_requests.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            repeated_responds: self.repeated_responds.load(Ordering::Relaxed),
        }
    }
}
