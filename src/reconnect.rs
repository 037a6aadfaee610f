use std::time::Duration;

/// Reconnect budget and exponential backoff for persistent connections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    retry_count: u32,
    max_retry_count: u32,
    initial_delay: Duration,
    max_delay: Duration,
    reconnect_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_retry_count: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            retry_count: 0,
            max_retry_count,
            initial_delay,
            max_delay,
            reconnect_delay: initial_delay,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    /// Delay the next [`backoff`](Self::backoff) call will hand out.
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retry_count
    }

    /// Consumes one retry and returns how long to wait before it.
    ///
    /// The stored delay doubles afterwards, capped at the maximum.
    pub fn backoff(&mut self) -> Duration {
        let delay = self.reconnect_delay;
        self.retry_count = self.retry_count.saturating_add(1);
        self.reconnect_delay = self.reconnect_delay.saturating_mul(2).min(self.max_delay);
        delay
    }

    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.reconnect_delay = self.initial_delay;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(30))
    }
}
