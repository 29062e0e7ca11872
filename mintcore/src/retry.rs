//! Retry configuration and policies for store-facing coordinators.
//!
//! Version conflicts from the document store are an expected part of
//! normal operation under contention; the coordinators recover from them
//! by re-reading and re-applying. This module holds the shared knobs:
//! how often to retry, how long to back off, and which errors qualify.

use crate::errors::{CoreError, StoreError};
use std::time::Duration;

/// Configuration for read-modify-write retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between retry attempts.
    pub base_delay: Duration,
    /// Maximum delay between retry attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A configuration for high-throughput paths where fast failure is
    /// preferred over persistence.
    pub const fn fast() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
        }
    }

    /// A configuration for fault-tolerant paths where eventual success is
    /// preferred over fast failure.
    pub const fn fault_tolerant() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.5,
        }
    }

    /// Calculates the delay before the next attempt.
    ///
    /// Exponential backoff with ±25% jitter so that concurrent writers
    /// contending on one lot document do not retry in lockstep.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base_delay_ms = self.base_delay.as_millis() as f64;
        let max_delay_ms = self.max_delay.as_millis() as f64;

        let delay = base_delay_ms * self.backoff_multiplier.powi(attempt.try_into().unwrap_or(i32::MAX));
        let delay = delay.min(max_delay_ms);

        let mut rng = rand::rng();
        let jitter = delay * 0.25 * (rng.random::<f64>() - 0.5) * 2.0;
        let final_delay = (delay + jitter).max(0.0).min(max_delay_ms) as u64;

        Duration::from_millis(final_delay)
    }
}

/// Policy defining which errors should trigger a retry.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Only retry on version conflicts.
    #[default]
    ConflictsOnly,
    /// Retry on version conflicts and transient store failures.
    ConflictsAndTransient,
    /// Custom policy with a user-defined predicate.
    Custom(fn(&CoreError) -> bool),
}

impl RetryPolicy {
    /// Determines whether an error should trigger a retry.
    pub fn should_retry(&self, error: &CoreError) -> bool {
        match self {
            Self::ConflictsOnly => matches!(error, CoreError::Conflict { .. }),
            Self::ConflictsAndTransient => error.is_transient(),
            Self::Custom(predicate) => predicate(error),
        }
    }
}

/// Classifies a raw store error for the retry loops: conflicts and
/// transient failures are candidates for another attempt, everything else
/// aborts immediately.
pub(crate) fn store_error_retryable(error: &StoreError, policy: &RetryPolicy) -> bool {
    match error {
        StoreError::VersionConflict { .. } => true,
        StoreError::ConnectionFailed(_) | StoreError::Timeout(_) | StoreError::Unavailable(_) => {
            matches!(policy, RetryPolicy::ConflictsAndTransient)
        }
        _ => false,
    }
}
