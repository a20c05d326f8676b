//! Shared handles for job execution
//!
//! One [`JobContext`] is built at startup and cloned into every worker task.

use pulse_anomaly::detector::AnomalyDetector;
use pulse_checks::freshness::FreshnessChecker;
use pulse_checks::timeliness::TimelinessChecker;
use pulse_core::alert::AlertSink;
use pulse_lineage::ancestry::AncestryEngine;
use pulse_lineage::rebuild::ClosureRebuilder;
use pulse_storage::MetricStore;
use std::sync::Arc;

/// Engines and shared infrastructure handed to running jobs.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<MetricStore>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub rebuilder: Arc<ClosureRebuilder>,
    pub ancestry: Arc<AncestryEngine>,
    pub detector: Arc<AnomalyDetector>,
    pub timeliness: Arc<TimelinessChecker>,
    pub freshness: Arc<FreshnessChecker>,
}

impl JobContext {
    /// Wire every engine against one store and alert sink.
    pub fn new(store: Arc<MetricStore>, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            rebuilder: Arc::new(ClosureRebuilder::new(Arc::clone(&store))),
            ancestry: Arc::new(AncestryEngine::new(Arc::clone(&store))),
            detector: Arc::new(AnomalyDetector::new(
                Arc::clone(&store),
                Arc::clone(&alert_sink),
            )),
            timeliness: Arc::new(TimelinessChecker::new(
                Arc::clone(&store),
                Arc::clone(&alert_sink),
            )),
            freshness: Arc::new(FreshnessChecker::new(
                Arc::clone(&store),
                Arc::clone(&alert_sink),
            )),
            store,
            alert_sink,
        }
    }
}
