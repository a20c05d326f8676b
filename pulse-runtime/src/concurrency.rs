//! Per-kind concurrency control

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Limits how many jobs of one kind run in parallel.
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Acquire a slot, waiting if the kind is saturated
    #[tracing::instrument(
        name = "concurrency.acquire",
        skip(self),
        fields(max_concurrent = %self.max_concurrent, wait_ms = tracing::field::Empty)
    )]
    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        let start = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed unexpectedly");
        tracing::Span::current().record("wait_ms", start.elapsed().as_millis() as u64);
        permit
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_bounded() {
        let limiter = ConcurrencyLimiter::new(2);
        assert_eq!(limiter.available(), 2);

        let _p1 = limiter.acquire().await;
        let _p2 = limiter.acquire().await;
        assert_eq!(limiter.available(), 0);

        drop(_p1);
        assert_eq!(limiter.available(), 1);
    }
}
