//! Per-kind job dispatch rate limiting
//!
//! Each [`JobKind`] gets its own token bucket, created lazily on first
//! dispatch. Worker tasks consult the limiter before starting their job and
//! sleep out the shortfall instead of rejecting work.

use crate::job::JobKind;
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type DirectLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-kind dispatch rate limiter
///
/// Quotas come from [`JobPolicy::rate_per_second`]; a kind without a
/// configured quota is never throttled.
///
/// [`JobPolicy::rate_per_second`]: crate::job::JobPolicy::rate_per_second
pub struct KindRateLimiter {
    limiters: Arc<DashMap<JobKind, DirectLimiter>>,
}

impl KindRateLimiter {
    pub fn new() -> Self {
        Self {
            limiters: Arc::new(DashMap::new()),
        }
    }

    /// Check whether a job of `kind` may be dispatched now.
    ///
    /// Returns `Ok(())` when allowed, or the wait until the next slot.
    pub fn check(&self, kind: JobKind, rate_per_second: Option<u32>) -> Result<(), Duration> {
        let Some(rate) = rate_per_second.and_then(NonZeroU32::new) else {
            return Ok(());
        };

        let limiter = self
            .limiters
            .entry(kind)
            .or_insert_with(|| GovernorRateLimiter::direct(Quota::per_second(rate)));

        match limiter.check() {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                warn!(
                    kind = kind.as_str(),
                    limit_per_second = rate.get(),
                    wait_ms = wait.as_millis() as u64,
                    "Job dispatch rate limit exceeded"
                );
                Err(wait)
            }
        }
    }

    /// Block asynchronously until a job of `kind` may be dispatched.
    pub async fn acquire(&self, kind: JobKind, rate_per_second: Option<u32>) {
        loop {
            match self.check(kind, rate_per_second) {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Number of kinds with an active limiter
    pub fn active_limiters_count(&self) -> usize {
        self.limiters.len()
    }
}

impl Default for KindRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_kind_never_throttles() {
        let limiter = KindRateLimiter::new();
        for _ in 0..1000 {
            assert!(limiter.check(JobKind::FreshnessCheck, None).is_ok());
        }
        assert_eq!(limiter.active_limiters_count(), 0);
    }

    #[test]
    fn blocks_over_limit() {
        let limiter = KindRateLimiter::new();
        assert!(limiter.check(JobKind::ClosureRebuild, Some(2)).is_ok());
        assert!(limiter.check(JobKind::ClosureRebuild, Some(2)).is_ok());
        assert!(limiter.check(JobKind::ClosureRebuild, Some(2)).is_err());
    }

    #[test]
    fn kinds_are_isolated() {
        let limiter = KindRateLimiter::new();
        assert!(limiter.check(JobKind::ClosureRebuild, Some(1)).is_ok());
        assert!(limiter.check(JobKind::ClosureRebuild, Some(1)).is_err());

        assert!(limiter.check(JobKind::AnomalyDetection, Some(1)).is_ok());
        assert_eq!(limiter.active_limiters_count(), 2);
    }
}
