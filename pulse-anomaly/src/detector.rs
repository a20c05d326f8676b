//! Anomaly detection orchestration

use crate::baseline::{build_sample, evaluate_rule, RuleOutcome};
use crate::Result;
use chrono::{Duration, Utc};
use pulse_core::{Alert, AlertLevel, AlertSink, MetricField};
use pulse_storage::{MetricStore, NewAnomalyResult};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What the detector did for one execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionSummary {
    pub rules_evaluated: usize,
    pub anomalies: usize,
    pub insufficient_data: usize,
    pub no_variance: usize,
    pub rule_failures: usize,
}

/// Evaluates anomaly rules after an execution ends.
///
/// Duplicate triggers are harmless: result rows are unique per
/// `(rule, execution)` and the flag write is a merge of the same mapping.
#[derive(Clone)]
pub struct AnomalyDetector {
    store: Arc<MetricStore>,
    alert_sink: Arc<dyn AlertSink>,
}

impl AnomalyDetector {
    pub fn new(store: Arc<MetricStore>, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self { store, alert_sink }
    }

    /// Run detection for an ended execution.
    ///
    /// One rule failing to evaluate is logged and skipped; the remaining
    /// rules still run and commit.
    #[instrument(skip(self))]
    pub async fn detect(&self, execution_id: i64) -> Result<DetectionSummary> {
        let current = self.store.get_execution(execution_id).await?;
        let rules = self
            .store
            .active_anomaly_rules(current.pipeline_id)
            .await?;

        let mut summary = DetectionSummary::default();
        if rules.is_empty() {
            debug!(execution_id, "No active anomaly rules for pipeline");
            return Ok(summary);
        }

        let now = Utc::now();
        let max_lookback = rules.iter().map(|r| r.lookback_days).max().unwrap_or(0);
        let mixed_lookbacks = rules.iter().any(|r| r.lookback_days != max_lookback);
        let candidates = self
            .store
            .anomaly_candidates(
                current.pipeline_id,
                current.hour_recorded,
                now - Duration::days(i64::from(max_lookback)),
            )
            .await?;

        let mut results: Vec<NewAnomalyResult> = Vec::new();
        let mut flagged: Vec<MetricField> = Vec::new();
        for rule in &rules {
            let metric = match MetricField::from_str(&rule.metric_field) {
                Ok(metric) => metric,
                Err(e) => {
                    warn!(rule_id = rule.id, error = %e, "Skipping rule with unknown metric");
                    summary.rule_failures += 1;
                    continue;
                }
            };

            let cutoff =
                mixed_lookbacks.then(|| now - Duration::days(i64::from(rule.lookback_days)));
            let sample = build_sample(metric, &candidates, &current, cutoff);
            summary.rules_evaluated += 1;

            match evaluate_rule(rule, &sample) {
                RuleOutcome::InsufficientData { samples, required } => {
                    debug!(
                        rule_id = rule.id,
                        metric = %metric,
                        samples,
                        required,
                        "Insufficient data for baseline"
                    );
                    summary.insufficient_data += 1;
                }
                RuleOutcome::NoVariance => {
                    debug!(rule_id = rule.id, metric = %metric, "Baseline has no variance");
                    summary.no_variance += 1;
                }
                RuleOutcome::MissingCurrentValue => {
                    debug!(rule_id = rule.id, metric = %metric, "Execution has no metric value");
                }
                RuleOutcome::Normal(_) => {}
                RuleOutcome::Anomaly(eval) => {
                    summary.anomalies += 1;
                    flagged.push(metric);
                    results.push(NewAnomalyResult {
                        rule_id: rule.id,
                        pipeline_execution_id: execution_id,
                        violation_value: eval.value,
                        historical_mean: eval.historical_mean,
                        std_deviation_value: eval.std_deviation,
                        z_threshold: rule.z_threshold,
                        threshold_min_value: eval.threshold_min,
                        threshold_max_value: eval.threshold_max,
                        z_score: eval.z_score,
                        context: json!({
                            "pipeline_id": current.pipeline_id,
                            "metric_field": metric.as_str(),
                            "hour_recorded": current.hour_recorded,
                            "sample_size": eval.sample_size,
                            "lookback_days": rule.lookback_days,
                        }),
                    });
                }
            }
        }

        if !results.is_empty() {
            self.store
                .commit_anomaly_results(execution_id, &results, &flagged)
                .await?;
            info!(
                execution_id,
                pipeline_id = current.pipeline_id,
                anomalies = summary.anomalies,
                "Anomalies committed"
            );

            // Post-commit: delivery failure must never roll back the results.
            let alert = Self::build_alert(current.pipeline_id, execution_id, &results);
            if let Err(e) = self.alert_sink.send(&alert).await {
                error!(execution_id, error = %e, "Anomaly alert delivery failed");
            }
        }

        Ok(summary)
    }

    /// One alert aggregating every metric flagged for the execution
    fn build_alert(pipeline_id: i64, execution_id: i64, results: &[NewAnomalyResult]) -> Alert {
        let metrics: Vec<String> = results
            .iter()
            .map(|r| {
                r.context
                    .get("metric_field")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string()
            })
            .collect();

        let mut alert = Alert::new(
            AlertLevel::Warning,
            "Pipeline execution anomaly detected",
            format!(
                "Execution {execution_id} of pipeline {pipeline_id} is anomalous on: {}",
                metrics.join(", ")
            ),
        )
        .detail("pipeline_id", pipeline_id.to_string())
        .detail("execution_id", execution_id.to_string());

        for result in results {
            let metric = result
                .context
                .get("metric_field")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            alert = alert.detail(
                format!("{metric}.z_score"),
                format!("{:.4}", result.z_score),
            );
        }
        alert
    }

    /// Clear flags and delete result rows for the requested metrics.
    ///
    /// Fails with `NotFound` when the execution is missing, belongs to a
    /// different pipeline, or none of the requested metrics is flagged.
    #[instrument(skip(self, metrics))]
    pub async fn unflag(
        &self,
        pipeline_id: i64,
        execution_id: i64,
        metrics: &[MetricField],
    ) -> Result<()> {
        let execution = self.store.get_execution(execution_id).await?;
        if execution.pipeline_id != pipeline_id {
            return Err(crate::Error::NotFound(format!(
                "execution {execution_id} does not belong to pipeline {pipeline_id}"
            )));
        }

        let to_clear: Vec<MetricField> = metrics
            .iter()
            .copied()
            .filter(|m| execution.anomaly_flags.0.is_flagged(*m))
            .collect();
        if to_clear.is_empty() {
            return Err(crate::Error::NotFound(format!(
                "no requested anomaly flags set on execution {execution_id}"
            )));
        }

        let rules = self
            .store
            .rules_for_metrics(pipeline_id, &to_clear)
            .await?;
        let rule_ids: Vec<i64> = rules.iter().map(|r| r.id).collect();

        self.store
            .unflag_execution(execution_id, &rule_ids, &to_clear)
            .await?;
        info!(
            execution_id,
            pipeline_id,
            cleared = to_clear.len(),
            "Anomaly flags cleared"
        );
        Ok(())
    }
}
