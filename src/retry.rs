use std::time::Duration;

/// Delay strategy between attempts.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryStrategy {
    /// Retry without waiting.
    Immediate,
    /// Wait the same delay before every retry.
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

/// Bounded retry configuration for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 act as 1.
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            strategy: RetryStrategy::Immediate,
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Immediate,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Exponential {
                initial,
                multiplier,
                max,
            },
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match &self.strategy {
            RetryStrategy::Immediate => Duration::ZERO,
            RetryStrategy::Fixed(delay) => *delay,
            RetryStrategy::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = attempt.max(1) - 1;
                let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
                let scaled = initial.as_secs_f64() * multiplier.powi(exponent);
                if !scaled.is_finite() || scaled >= max.as_secs_f64() {
                    return *max;
                }
                Duration::from_secs_f64(scaled.max(0.0))
            }
        }
    }
}
