//! Personal record model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metric a personal record is tracked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMetric {
    MaxWeight,
    MaxReps,
    #[serde(rename = "max_est_1rm")]
    MaxEstOneRm,
    MaxVolume,
}

impl RecordMetric {
    /// All tracked metric types.
    pub const ALL: [Self; 4] = [
        Self::MaxWeight,
        Self::MaxReps,
        Self::MaxEstOneRm,
        Self::MaxVolume,
    ];

    /// Stable string form used in storage keys and remote payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxWeight => "max_weight",
            Self::MaxReps => "max_reps",
            Self::MaxEstOneRm => "max_est_1rm",
            Self::MaxVolume => "max_volume",
        }
    }
}

impl std::fmt::Display for RecordMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-ever observed value for an (account, exercise, metric) key.
///
/// History is append-only: superseded records stay stored with
/// `is_current = false`; exactly one record per key may be current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecord {
    /// Unique identifier
    pub id: String,
    /// Owning account
    pub account_id: String,
    /// Exercise reference
    pub exercise_id: String,
    /// Metric this record tracks
    pub metric: RecordMetric,
    /// Best observed value
    pub value: f64,
    /// Contributing set (provenance)
    pub set_id: String,
    /// When the contributing set was actually performed (Unix ms)
    pub achieved_at: i64,
    /// Whether this is the current best for its key
    pub is_current: bool,
}

impl PersonalRecord {
    /// Create a new current record for a key.
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        exercise_id: impl Into<String>,
        metric: RecordMetric,
        value: f64,
        set_id: impl Into<String>,
        achieved_at: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            account_id: account_id.into(),
            exercise_id: exercise_id.into(),
            metric,
            value,
            set_id: set_id.into(),
            achieved_at,
            is_current: true,
        }
    }
}

/// Epley estimated one-rep max: `weight * (1 + reps / 30)`.
///
/// A single rep estimates as the weight itself.
#[must_use]
pub fn estimated_one_rep_max(weight: f64, reps: u32) -> f64 {
    if reps <= 1 {
        weight
    } else {
        weight * (1.0 + f64::from(reps) / 30.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_round_trips_through_serde() {
        let json = serde_json::to_string(&RecordMetric::MaxEstOneRm).unwrap();
        assert_eq!(json, "\"max_est_1rm\"");
        let parsed: RecordMetric = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, RecordMetric::MaxEstOneRm);
    }

    #[test]
    fn metric_wire_form_matches_storage_form() {
        // Storage keys and remote URLs use `as_str`; payload fields go
        // through serde. The two must agree for every metric.
        for metric in RecordMetric::ALL {
            let json = serde_json::to_string(&metric).unwrap();
            assert_eq!(json, format!("\"{}\"", metric.as_str()));
        }
    }

    #[test]
    fn metrics_sort_in_declaration_order() {
        let mut metrics = vec![
            RecordMetric::MaxVolume,
            RecordMetric::MaxEstOneRm,
            RecordMetric::MaxReps,
            RecordMetric::MaxWeight,
        ];
        metrics.sort();
        assert_eq!(metrics, RecordMetric::ALL.to_vec());
    }

    #[test]
    fn epley_estimate() {
        assert!((estimated_one_rep_max(225.0, 5) - 262.5).abs() < f64::EPSILON);
        assert!((estimated_one_rep_max(315.0, 1) - 315.0).abs() < f64::EPSILON);
    }

    #[test]
    fn new_record_is_current() {
        let record = PersonalRecord::new("acct", "squat", RecordMetric::MaxWeight, 225.0, "set", 1);
        assert!(record.is_current);
        assert_eq!(record.metric.as_str(), "max_weight");
    }
}
