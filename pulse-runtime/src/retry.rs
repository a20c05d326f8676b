//! Retry policy for failed jobs

use std::time::Duration;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// No retries
    None,

    /// Fixed delay between retries
    Fixed,

    /// Exponential backoff
    Exponential,
}

/// Retry configuration for one job kind
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first run included
    pub max_attempts: u32,

    /// Base delay before a retry
    pub base_delay: Duration,

    /// Upper bound on the delay
    pub max_delay: Duration,

    pub strategy: RetryStrategy,

    /// Multiplier for the exponential strategy
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(600),
            strategy: RetryStrategy::Fixed,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following the given 0-based attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.strategy {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed => self.base_delay,
            RetryStrategy::Exponential => {
                let delay = self.base_delay.as_secs_f64()
                    * self.backoff_multiplier.powi(attempt as i32);
                Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
            }
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts have run
    pub fn should_retry(&self, attempt: u32) -> bool {
        !matches!(self.strategy, RetryStrategy::None) && attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(60));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn none_strategy_never_retries() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::None,
            ..Default::default()
        };
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::Fixed,
            base_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
    }

    #[test]
    fn exponential_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::Exponential,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(30));
    }
}
