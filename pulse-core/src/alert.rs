//! Alert model and delivery seam
//!
//! Engines hand alerts to an [`AlertSink`]; the concrete sink (chat webhook,
//! pager, log) lives outside this workspace. Delivery is best-effort: a
//! failed send is logged and never rolls back database work.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, warn};

/// Severity of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// A single outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl Alert {
    pub fn new(level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attach a key/value detail
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Abstraction for delivering alerts to an external notification channel.
///
/// Implementations should be cheap to clone behind an `Arc` and safe to call
/// concurrently from multiple jobs.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Attempt one delivery of the alert.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel rejects or cannot reach the
    /// destination; the caller decides whether to retry.
    async fn send(&self, alert: &Alert) -> crate::Result<()>;
}

/// Wraps a sink with bounded exponential-backoff redelivery.
///
/// Delivery is attempted at most `max_attempts` times with the delay doubling
/// each attempt. Exhaustion is reported as [`crate::Error::AlertDelivery`];
/// callers on the post-commit path log it and move on.
pub struct RetryingAlertSink<S> {
    inner: S,
    max_attempts: u32,
    initial_delay: Duration,
}

impl<S: AlertSink> RetryingAlertSink<S> {
    pub fn new(inner: S, max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Delay before the retry following `attempt` (0-based), doubling per
    /// attempt.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2_f64.powi(attempt as i32);
        Duration::from_secs_f64(self.initial_delay.as_secs_f64() * multiplier)
    }
}

#[async_trait]
impl<S: AlertSink> AlertSink for RetryingAlertSink<S> {
    async fn send(&self, alert: &Alert) -> crate::Result<()> {
        let mut last_error = String::new();
        for attempt in 0..self.max_attempts {
            match self.inner.send(alert).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %last_error,
                        title = %alert.title,
                        "Alert delivery attempt failed"
                    );
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(self.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        error!(
            title = %alert.title,
            attempts = self.max_attempts,
            error = %last_error,
            "Alert delivery exhausted retries"
        );
        Err(crate::Error::AlertDelivery {
            attempts: self.max_attempts,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl AlertSink for FlakySink {
        async fn send(&self, _alert: &Alert) -> crate::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(())
            } else {
                Err(crate::Error::Validation("sink unavailable".to_string()))
            }
        }
    }

    fn test_alert() -> Alert {
        Alert::new(AlertLevel::Warning, "test", "message").detail("pipeline", "orders")
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let sink = RetryingAlertSink::new(
            FlakySink {
                calls: AtomicU32::new(0),
                succeed_on: 3,
            },
            5,
            Duration::from_millis(10),
        );
        sink.send(&test_alert()).await.unwrap();
        assert_eq!(sink.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_exhaustion() {
        let sink = RetryingAlertSink::new(
            FlakySink {
                calls: AtomicU32::new(0),
                succeed_on: 10,
            },
            3,
            Duration::from_millis(10),
        );
        let err = sink.send(&test_alert()).await.unwrap_err();
        assert!(matches!(err, crate::Error::AlertDelivery { attempts: 3, .. }));
        assert_eq!(sink.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles() {
        let sink = RetryingAlertSink::new(
            FlakySink {
                calls: AtomicU32::new(0),
                succeed_on: 1,
            },
            4,
            Duration::from_secs(1),
        );
        assert_eq!(sink.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(sink.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(sink.delay_for_attempt(2), Duration::from_secs(4));
    }
}
