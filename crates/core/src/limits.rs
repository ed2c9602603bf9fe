//! Hard safe-band evaluation.
//!
//! Pure logic, no model involved. The caller passes the latest values and
//! the configured limits and receives any violations. A value can be both
//! anomalous (per the learned model) and over a hard limit; the health
//! scorer deducts for each independently.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::HardLimit;
use crate::types::MetricId;

/// Severity of a safe-band violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreachLevel {
    /// Value passed the warning level but is still inside `[min, max]`.
    Warning,
    /// Value is outside the hard `[min, max]` band.
    Critical,
}

/// A single safe-band violation.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdBreach {
    pub metric_id: MetricId,
    pub value: f64,
    /// The bound that was violated (min, max, or warning level).
    pub bound: f64,
    pub level: BreachLevel,
}

/// Check the given values against their hard limits.
///
/// Metrics without a configured limit are skipped. Output is ordered by
/// metric id (inherited from the input map).
pub fn evaluate_limits(
    values: &BTreeMap<MetricId, f64>,
    limits: &[HardLimit],
) -> Vec<ThresholdBreach> {
    let limit_map: BTreeMap<&str, &HardLimit> =
        limits.iter().map(|l| (l.metric_id.as_str(), l)).collect();

    let mut breaches = Vec::new();
    for (metric_id, &value) in values {
        let Some(limit) = limit_map.get(metric_id.as_str()) else {
            continue;
        };
        if let Some(breach) = check_limit(metric_id, value, limit) {
            breaches.push(breach);
        }
    }
    breaches
}

/// Evaluate one value against one limit.
pub fn check_limit(metric_id: &str, value: f64, limit: &HardLimit) -> Option<ThresholdBreach> {
    if value > limit.max {
        return Some(ThresholdBreach {
            metric_id: metric_id.to_string(),
            value,
            bound: limit.max,
            level: BreachLevel::Critical,
        });
    }
    if value < limit.min {
        return Some(ThresholdBreach {
            metric_id: metric_id.to_string(),
            value,
            bound: limit.min,
            level: BreachLevel::Critical,
        });
    }
    if let Some(warning) = limit.warning {
        if value > warning {
            return Some(ThresholdBreach {
                metric_id: metric_id.to_string(),
                value,
                bound: warning,
                level: BreachLevel::Warning,
            });
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(metric: &str, min: f64, max: f64, warning: Option<f64>) -> HardLimit {
        HardLimit {
            metric_id: metric.into(),
            min,
            max,
            warning,
        }
    }

    #[test]
    fn value_within_band_is_clean() {
        let values = BTreeMap::from([("t1".to_string(), 70.0)]);
        let breaches = evaluate_limits(&values, &[limit("t1", 0.0, 100.0, Some(80.0))]);
        assert!(breaches.is_empty());
    }

    #[test]
    fn over_max_is_critical() {
        let values = BTreeMap::from([("t1".to_string(), 120.0)]);
        let breaches = evaluate_limits(&values, &[limit("t1", 0.0, 100.0, Some(80.0))]);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].level, BreachLevel::Critical);
        assert_eq!(breaches[0].bound, 100.0);
    }

    #[test]
    fn under_min_is_critical() {
        let values = BTreeMap::from([("p1".to_string(), -2.0)]);
        let breaches = evaluate_limits(&values, &[limit("p1", 0.0, 10.0, None)]);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].level, BreachLevel::Critical);
        assert_eq!(breaches[0].bound, 0.0);
    }

    #[test]
    fn past_warning_level_is_warning() {
        let values = BTreeMap::from([("t1".to_string(), 85.0)]);
        let breaches = evaluate_limits(&values, &[limit("t1", 0.0, 100.0, Some(80.0))]);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].level, BreachLevel::Warning);
    }

    #[test]
    fn unlimited_metrics_are_skipped() {
        let values = BTreeMap::from([("t1".to_string(), 1e9)]);
        assert!(evaluate_limits(&values, &[]).is_empty());
    }
}
