//! Mock implementations for testing without real dependencies

use async_trait::async_trait;
use pulse_core::alert::{Alert, AlertSink};
use pulse_lineage::EdgeSource;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Recording alert sink.
///
/// Stores every alert and can be told to fail the first N sends, which is
/// how delivery-retry and best-effort paths are exercised.
#[derive(Default)]
pub struct MockAlertSink {
    sent: Mutex<Vec<Alert>>,
    fail_first: AtomicU32,
    attempts: AtomicU32,
}

impl MockAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` delivery attempts
    pub fn failing_first(n: u32) -> Self {
        Self {
            fail_first: AtomicU32::new(n),
            ..Self::default()
        }
    }

    /// Alerts delivered so far
    pub fn sent(&self) -> Vec<Alert> {
        self.sent.lock().unwrap().clone()
    }

    /// Total delivery attempts, failures included
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertSink for MockAlertSink {
    async fn send(&self, alert: &Alert) -> pulse_core::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first.load(Ordering::SeqCst) {
            return Err(pulse_core::Error::AlertDelivery {
                attempts: attempt + 1,
                message: "mock sink rejected delivery".to_string(),
            });
        }
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// In-memory [`EdgeSource`] over a fixed edge list.
pub struct MemoryEdgeSource {
    edges: Vec<(i64, i64)>,
}

impl MemoryEdgeSource {
    pub fn new(edges: Vec<(i64, i64)>) -> Self {
        Self { edges }
    }
}

#[async_trait]
impl EdgeSource for MemoryEdgeSource {
    async fn edges_from(&mut self, ids: &[i64]) -> pulse_storage::Result<Vec<(i64, i64)>> {
        Ok(self
            .edges
            .iter()
            .copied()
            .filter(|(s, _)| ids.contains(s))
            .collect())
    }

    async fn edges_into(&mut self, ids: &[i64]) -> pulse_storage::Result<Vec<(i64, i64)>> {
        Ok(self
            .edges
            .iter()
            .copied()
            .filter(|(_, t)| ids.contains(t))
            .collect())
    }
}
