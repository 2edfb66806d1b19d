//! Retry policy for directive delivery.

use std::time::Duration;

use crate::config::CoreConfig;
use crate::platform::DeliveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the delay.
    After(Duration),
    /// Give up.
    Terminal,
}

/// Linear backoff: attempt `n` (0-indexed) waits `base_delay * (n + 1)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            max_retries: config.max_delivery_retries,
            base_delay: config.retry_delay(),
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Only "nobody listening yet" and "tab went away" are worth retrying.
    pub fn decide(&self, error: &DeliveryError, attempt: u32) -> RetryDecision {
        if error.is_transient() && attempt < self.max_retries {
            RetryDecision::After(self.backoff(attempt))
        } else {
            RetryDecision::Terminal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TabId;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = policy();
        let err = DeliveryError::NoReceiver(TabId(1));
        assert_eq!(policy.decide(&err, 0), RetryDecision::After(Duration::from_millis(500)));
        assert_eq!(policy.decide(&err, 2), RetryDecision::After(Duration::from_millis(1500)));
        assert_eq!(policy.decide(&err, 3), RetryDecision::Terminal);
    }

    #[test]
    fn test_non_transient_errors_are_terminal() {
        let err = DeliveryError::Other {
            tab: TabId(1),
            message: "boom".into(),
        };
        assert_eq!(policy().decide(&err, 0), RetryDecision::Terminal);
        assert!(matches!(
            policy().decide(&DeliveryError::TabGone(TabId(2)), 0),
            RetryDecision::After(_)
        ));
    }
}
