use std::time::Duration;

/// Exponential backoff between delivery attempts.
///
/// After zero-indexed attempt `k` fails, the next attempt waits `unit * 2^k`.
/// The number of attempts is owned by each subscription's `retry_limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    unit: Duration,

    max_delay: Option<Duration>,
}

impl RetryStrategy {
    /// Create a new retry strategy with the given base time unit
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            max_delay: None,
        }
    }

    /// Set maximum delay cap
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay to wait after zero-indexed attempt `attempt` fails
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt);
        let delay = self.unit.saturating_mul(multiplier);

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
