//! Per-rule baseline evaluation
//!
//! Pure functions: the detector fetches candidate history once with the
//! widest lookback, then builds and evaluates a baseline per rule.

use chrono::{DateTime, Utc};
use pulse_core::MetricField;
use pulse_storage::{AnomalyRuleModel, ExecutionModel};

/// Baseline values for one rule plus the current execution's metric value.
#[derive(Debug, Clone)]
pub struct BaselineSample {
    pub values: Vec<f64>,
    pub current_value: Option<f64>,
}

/// Build the baseline for one rule from the shared candidate set.
///
/// Excludes the current execution and any execution already flagged for the
/// metric, so prior anomalies cannot poison the baseline. `cutoff` narrows
/// the shared candidate set when rules carry different lookbacks.
pub fn build_sample(
    metric: MetricField,
    candidates: &[ExecutionModel],
    current: &ExecutionModel,
    cutoff: Option<DateTime<Utc>>,
) -> BaselineSample {
    let mut values = Vec::with_capacity(candidates.len());
    for execution in candidates {
        if let (Some(cutoff), Some(end_date)) = (cutoff, execution.end_date) {
            if end_date < cutoff {
                continue;
            }
        }
        if execution.id == current.id {
            continue;
        }
        if execution.anomaly_flags.0.is_flagged(metric) {
            continue;
        }
        if let Some(value) = execution.metric_value(metric) {
            values.push(value);
        }
    }

    BaselineSample {
        values,
        current_value: current.metric_value(metric),
    }
}

/// Computed statistics for an evaluated rule
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: f64,
    pub historical_mean: f64,
    pub std_deviation: f64,
    pub threshold_min: f64,
    pub threshold_max: f64,
    pub z_score: f64,
    pub sample_size: usize,
}

/// Outcome of evaluating one rule against its baseline
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// Fewer baseline samples than the rule requires
    InsufficientData { samples: usize, required: i32 },
    /// Zero variance in the baseline; no detectable anomaly
    NoVariance,
    /// The current execution has no value for the metric
    MissingCurrentValue,
    /// Value inside the band
    Normal(Evaluation),
    /// Value outside the band
    Anomaly(Evaluation),
}

/// Evaluate one rule against its baseline sample.
pub fn evaluate_rule(rule: &AnomalyRuleModel, sample: &BaselineSample) -> RuleOutcome {
    let n = sample.values.len();
    if (n as i64) < i64::from(rule.minimum_executions) {
        return RuleOutcome::InsufficientData {
            samples: n,
            required: rule.minimum_executions,
        };
    }

    let mu = crate::stats::mean(&sample.values);
    let sigma = crate::stats::sample_stdev(&sample.values);
    if sigma == 0.0 {
        return RuleOutcome::NoVariance;
    }

    let Some(value) = sample.current_value else {
        return RuleOutcome::MissingCurrentValue;
    };

    let threshold_min = (mu - rule.z_threshold * sigma).max(0.0);
    let threshold_max = mu + rule.z_threshold * sigma;
    let evaluation = Evaluation {
        value,
        historical_mean: mu,
        std_deviation: sigma,
        threshold_min,
        threshold_max,
        z_score: (value - mu) / sigma,
        sample_size: n,
    };

    if value > threshold_max || value < threshold_min {
        RuleOutcome::Anomaly(evaluation)
    } else {
        RuleOutcome::Normal(evaluation)
    }
}
