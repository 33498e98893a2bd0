use std::time::Duration;

/// Per-call tunables for [`RequestDispatcher::send`](crate::dispatcher::RequestDispatcher::send).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Give up on the response after this long. Must be positive when set.
    pub timeout: Option<Duration>,
}

impl SendOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self::with_timeout(Duration::from_millis(timeout_ms))
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        match self.timeout {
            Some(timeout) if timeout.is_zero() => Err("timeout must be positive".to_string()),
            _ => Ok(()),
        }
    }
}
