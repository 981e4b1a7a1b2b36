//! Configuration for the synchronizer.

use revtree_core::Identifier;
use std::time::Duration;
use uuid::Uuid;

/// Configuration of a [`Synchronizer`](crate::Synchronizer).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Actor recorded on local changes executed without an explicit actor.
    pub actor: Option<Identifier>,
    /// Maximum number of pending changes submitted per push batch.
    pub push_batch_size: usize,
    /// Retry behavior of [`Synchronizer::sync_with_retry`](crate::Synchronizer::sync_with_retry).
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default settings and no actor.
    pub fn new() -> Self {
        Self {
            actor: None,
            push_batch_size: 64,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the default actor.
    pub fn with_actor(mut self, actor: Identifier) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Sets the push batch size. Zero is treated as one.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff between sync attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound of any delay before jitter.
    pub max_delay: Duration,
    /// Factor applied to the delay after every attempt.
    pub backoff_multiplier: f64,
    /// Adds up to a quarter of the delay at random.
    pub jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration with `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the number of attempts, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns the wait before attempt number `attempt`, counted from zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(retry) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let factor = if self.jitter { 1.0 + 0.25 * jitter_fraction() } else { 1.0 };
        Duration::from_secs_f64(capped * factor)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Returns a value in `[0, 1)`.
fn jitter_fraction() -> f64 {
    let sample = Uuid::new_v4().as_u128() % 1024;
    f64::from(u16::try_from(sample).unwrap_or(0)) / 1024.0
}
