//! Threshold configuration and two-level resolution
//!
//! Freshness and timeliness thresholds are a `(number, datepart)` pair
//! configured on the pipeline (child) or inherited from the pipeline type
//! (parent). A pipeline is evaluated with its own config when both fields are
//! set, falls back to the pipeline type when both of its fields are set, and
//! is skipped otherwise.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Granularity of a threshold offset.
///
/// Fixed-length units only; month/year arithmetic is deliberately excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl DatePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Second => "second",
            DatePart::Minute => "minute",
            DatePart::Hour => "hour",
            DatePart::Day => "day",
            DatePart::Week => "week",
        }
    }
}

impl std::fmt::Display for DatePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatePart {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "second" => Ok(DatePart::Second),
            "minute" => Ok(DatePart::Minute),
            "hour" => Ok(DatePart::Hour),
            "day" => Ok(DatePart::Day),
            "week" => Ok(DatePart::Week),
            other => Err(crate::Error::UnknownDatePart(other.to_string())),
        }
    }
}

/// A concrete threshold: `number` units of `datepart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    pub number: i32,
    pub datepart: DatePart,
}

impl ThresholdSpec {
    pub fn new(number: i32, datepart: DatePart) -> Self {
        Self { number, datepart }
    }

    /// The threshold as a chrono duration
    pub fn to_duration(&self) -> Duration {
        let n = i64::from(self.number);
        match self.datepart {
            DatePart::Second => Duration::seconds(n),
            DatePart::Minute => Duration::minutes(n),
            DatePart::Hour => Duration::hours(n),
            DatePart::Day => Duration::days(n),
            DatePart::Week => Duration::weeks(n),
        }
    }
}

/// Which level of the pipeline / pipeline-type hierarchy supplied the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    Child,
    Parent,
}

impl ThresholdSource {
    /// True when the pipeline's own config was used
    pub fn is_child(&self) -> bool {
        matches!(self, ThresholdSource::Child)
    }
}

/// Resolve a threshold through the two-level inheritance rule.
///
/// The child config wins when both of its fields are present; otherwise the
/// parent config is used when both of its fields are present; otherwise the
/// pipeline cannot be evaluated and `None` is returned.
pub fn resolve_threshold(
    child_number: Option<i32>,
    child_datepart: Option<DatePart>,
    parent_number: Option<i32>,
    parent_datepart: Option<DatePart>,
) -> Option<(ThresholdSpec, ThresholdSource)> {
    if let (Some(number), Some(datepart)) = (child_number, child_datepart) {
        return Some((ThresholdSpec::new(number, datepart), ThresholdSource::Child));
    }
    if let (Some(number), Some(datepart)) = (parent_number, parent_datepart) {
        return Some((ThresholdSpec::new(number, datepart), ThresholdSource::Parent));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_config_wins_when_complete() {
        let (spec, source) = resolve_threshold(
            Some(2),
            Some(DatePart::Hour),
            Some(1),
            Some(DatePart::Day),
        )
        .unwrap();
        assert_eq!(spec, ThresholdSpec::new(2, DatePart::Hour));
        assert!(source.is_child());
    }

    #[test]
    fn partial_child_config_falls_back_to_parent() {
        let (spec, source) =
            resolve_threshold(Some(2), None, Some(1), Some(DatePart::Day)).unwrap();
        assert_eq!(spec, ThresholdSpec::new(1, DatePart::Day));
        assert_eq!(source, ThresholdSource::Parent);
    }

    #[test]
    fn no_complete_config_resolves_to_none() {
        assert!(resolve_threshold(None, None, Some(1), None).is_none());
        assert!(resolve_threshold(None, Some(DatePart::Hour), None, None).is_none());
    }

    #[test]
    fn durations() {
        assert_eq!(
            ThresholdSpec::new(90, DatePart::Minute).to_duration(),
            Duration::minutes(90)
        );
        assert_eq!(
            ThresholdSpec::new(2, DatePart::Week).to_duration(),
            Duration::days(14)
        );
    }
}
