use crate::config::ReconnectConfig;
use std::time::Duration;
use tracing::{error, info};

/// Recovery action to take after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Retry after a delay
    RetryAfterDelay(Duration),
    /// Give up; the caller decides whether that is fatal
    GiveUp,
}

/// Retry strategy for reopening a device
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts; `None` retries until shutdown
    pub max_attempts: Option<u32>,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default(), true)
    }
}

impl RetryPolicy {
    /// Build the policy from configuration. Without a fatal escalation the
    /// attempt limit would only stall the pipeline, so it becomes unbounded.
    pub fn from_config(config: &ReconnectConfig, fatal_on_exhaustion: bool) -> Self {
        let max_attempts = if fatal_on_exhaustion && config.max_attempts > 0 {
            Some(config.max_attempts)
        } else {
            None
        };

        Self {
            max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential_backoff: config.exponential_backoff,
        }
    }

    /// Retry forever with a fixed delay
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay: delay,
            max_delay: delay,
            exponential_backoff: false,
        }
    }

    /// Calculate delay before retry number `retry_count` (0-based)
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        if !self.exponential_backoff {
            return self.base_delay.min(self.max_delay);
        }

        let factor = 2u32.checked_pow(retry_count.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn tracker(&self) -> RetryTracker<'_> {
        RetryTracker {
            policy: self,
            attempts: 0,
        }
    }
}

/// Counts failed attempts against a policy for one recovery episode
#[derive(Debug)]
pub struct RetryTracker<'a> {
    policy: &'a RetryPolicy,
    attempts: u32,
}

impl RetryTracker<'_> {
    /// Record a failed attempt and decide what to do next
    pub fn record_failure(&mut self, component: &str, details: &str) -> RecoveryAction {
        self.attempts += 1;

        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                error!(
                    "Maximum attempts ({}) exceeded for {}: {}",
                    max, component, details
                );
                return RecoveryAction::GiveUp;
            }
        }

        let delay = self.policy.delay_for(self.attempts - 1);
        match self.policy.max_attempts {
            Some(max) => info!(
                "Scheduling recovery for {} in {:?} (attempt {}/{}): {}",
                component, delay, self.attempts, max, details
            ),
            None => info!(
                "Scheduling recovery for {} in {:?} (attempt {}): {}",
                component, delay, self.attempts, details
            ),
        }

        RecoveryAction::RetryAfterDelay(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
