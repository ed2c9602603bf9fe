//! Aggregate device health scoring.
//!
//! Starts every cycle from a baseline of 100 and applies additive,
//! order-independent, individually capped deductions for confirmed
//! anomalies, hard-limit breaches, and forecasts trending toward a breach.
//! The final score clamps to [0, 100] and maps to a coarse tier. Pure:
//! deterministic for identical inputs, no state carried between calls.

use serde::Serialize;

use crate::anomaly::Detection;
use crate::config::{HardLimit, MetricKind};
use crate::error::CoreError;
use crate::forecast::{ForecastResult, Trend};
use crate::limits::{BreachLevel, ThresholdBreach};
use crate::types::{DeviceId, MetricId, Timestamp};
use crate::validation::validate_positive_finite;

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

/// Penalty values and tier cutoffs. All configurable; the defaults follow
/// the operating experience baked into the legacy dashboards, not any
/// derived constants.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Anomaly penalty at the calibrated threshold.
    pub anomaly_penalty_min: f64,
    /// Anomaly penalty cap for scores far beyond the threshold.
    pub anomaly_penalty_max: f64,
    /// How far beyond the threshold (in score units) the anomaly penalty
    /// saturates at its max.
    pub anomaly_severity_saturation: f64,
    /// Fixed penalty per metric outside its hard safe band.
    pub breach_penalty: f64,
    /// Smaller penalty per metric past its warning level (still in band).
    pub warning_penalty: f64,
    /// Penalty per forecast trending toward a hard limit.
    pub trend_penalty: f64,
    /// Scores at or above this are `Healthy`.
    pub healthy_cutoff: u8,
    /// Scores at or above this (but below healthy) are `Watch`.
    pub watch_cutoff: u8,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            anomaly_penalty_min: 10.0,
            anomaly_penalty_max: 20.0,
            anomaly_severity_saturation: 0.25,
            breach_penalty: 15.0,
            warning_penalty: 5.0,
            trend_penalty: 5.0,
            healthy_cutoff: 90,
            watch_cutoff: 70,
        }
    }
}

impl HealthConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.anomaly_penalty_min > self.anomaly_penalty_max {
            return Err(CoreError::Validation(format!(
                "anomaly_penalty_min {} exceeds anomaly_penalty_max {}",
                self.anomaly_penalty_min, self.anomaly_penalty_max
            )));
        }
        if self.watch_cutoff >= self.healthy_cutoff {
            return Err(CoreError::Validation(format!(
                "watch_cutoff {} must be below healthy_cutoff {}",
                self.watch_cutoff, self.healthy_cutoff
            )));
        }
        validate_positive_finite(
            self.anomaly_severity_saturation,
            "anomaly_severity_saturation",
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Coarse severity bucket derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    Healthy,
    Watch,
    Critical,
}

impl HealthTier {
    pub fn from_score(score: u8, config: &HealthConfig) -> Self {
        if score >= config.healthy_cutoff {
            Self::Healthy
        } else if score >= config.watch_cutoff {
            Self::Watch
        } else {
            Self::Critical
        }
    }
}

/// Condition category a deduction (and its advisory) is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionCategory {
    TemperatureAnomaly,
    CurrentAnomaly,
    PressureAnomaly,
    GeneralAnomaly,
    HardLimitBreach,
    TrendingBreach,
}

impl DeductionCategory {
    /// Category for a confirmed anomaly whose dominant metric has the given
    /// kind.
    pub fn for_anomaly(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Temperature => Self::TemperatureAnomaly,
            MetricKind::Current => Self::CurrentAnomaly,
            MetricKind::Pressure => Self::PressureAnomaly,
            MetricKind::Other => Self::GeneralAnomaly,
        }
    }

    /// Advisory ordering class: immediate conditions outrank projected
    /// ones.
    pub fn is_critical_class(self) -> bool {
        !matches!(self, Self::TrendingBreach)
    }
}

/// One contributing deduction.
#[derive(Debug, Clone, Serialize)]
pub struct Deduction {
    pub category: DeductionCategory,
    /// Affected metric, when attributable to a single one.
    pub metric_id: Option<MetricId>,
    pub amount: f64,
}

/// Per-device health for one scoring cycle.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub device_id: DeviceId,
    /// Clamped to [0, 100].
    pub score: u8,
    pub tier: HealthTier,
    pub deductions: Vec<Deduction>,
    /// Metrics whose detection or forecast failed this cycle. Counted as
    /// zero deduction, surfaced so consumers see the gap.
    pub gaps: Vec<String>,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Trending-toward-breach
// ---------------------------------------------------------------------------

/// A rising/falling forecast whose projection crosses a hard limit within
/// the horizon.
#[derive(Debug, Clone, Serialize)]
pub struct TrendingBreach {
    pub metric_id: MetricId,
    /// First projected value past the limit.
    pub projected_value: f64,
    /// The limit bound the projection crosses.
    pub bound: f64,
    pub trend: Trend,
}

/// Find forecasts that are trending toward a hard-limit breach.
///
/// Only rising/falling forecasts count; a stable projection sitting near a
/// limit is the hard-limit check's business, not a trend warning.
pub fn trending_breaches(
    forecasts: &[ForecastResult],
    limits: &[HardLimit],
) -> Vec<TrendingBreach> {
    let mut out = Vec::new();
    for fc in forecasts {
        if fc.trend == Trend::Stable {
            continue;
        }
        let Some(limit) = limits.iter().find(|l| l.metric_id == fc.metric_id) else {
            continue;
        };
        for (_, projected) in &fc.points {
            if *projected > limit.max {
                out.push(TrendingBreach {
                    metric_id: fc.metric_id.clone(),
                    projected_value: *projected,
                    bound: limit.max,
                    trend: fc.trend,
                });
                break;
            }
            if *projected < limit.min {
                out.push(TrendingBreach {
                    metric_id: fc.metric_id.clone(),
                    projected_value: *projected,
                    bound: limit.min,
                    trend: fc.trend,
                });
                break;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score one device cycle.
///
/// `metric_kind` resolves a metric id to its configured kind for anomaly
/// categorization; detections without an anomaly contribute nothing.
pub fn score(
    device_id: &str,
    detections: &[Detection],
    breaches: &[ThresholdBreach],
    trending: &[TrendingBreach],
    gaps: Vec<String>,
    metric_kind: impl Fn(&str) -> MetricKind,
    config: &HealthConfig,
    timestamp: Timestamp,
) -> HealthReport {
    let mut deductions = Vec::new();

    for detection in detections {
        if !detection.is_anomaly {
            continue;
        }
        let dominant = detection.dominant_metric().cloned();
        let kind = dominant
            .as_deref()
            .map(&metric_kind)
            .unwrap_or(MetricKind::Other);
        deductions.push(Deduction {
            category: DeductionCategory::for_anomaly(kind),
            metric_id: dominant,
            amount: anomaly_penalty(detection, config),
        });
    }

    for breach in breaches {
        let amount = match breach.level {
            BreachLevel::Critical => config.breach_penalty,
            BreachLevel::Warning => config.warning_penalty,
        };
        deductions.push(Deduction {
            category: DeductionCategory::HardLimitBreach,
            metric_id: Some(breach.metric_id.clone()),
            amount,
        });
    }

    for tb in trending {
        deductions.push(Deduction {
            category: DeductionCategory::TrendingBreach,
            metric_id: Some(tb.metric_id.clone()),
            amount: config.trend_penalty,
        });
    }

    let total: f64 = deductions.iter().map(|d| d.amount).sum();
    let score = (100.0 - total).clamp(0.0, 100.0).round() as u8;

    HealthReport {
        device_id: device_id.to_string(),
        score,
        tier: HealthTier::from_score(score, config),
        deductions,
        gaps,
        timestamp,
    }
}

/// Anomaly penalty scaled by how far the calibrated score sits beyond the
/// threshold: at the threshold the minimum applies, saturating at the
/// maximum once the score is `anomaly_severity_saturation` beyond it.
fn anomaly_penalty(detection: &Detection, config: &HealthConfig) -> f64 {
    let excess = (detection.threshold - detection.score).max(0.0);
    let severity = (excess / config.anomaly_severity_saturation).clamp(0.0, 1.0);
    config.anomaly_penalty_min
        + (config.anomaly_penalty_max - config.anomaly_penalty_min) * severity
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{DeviationSeverity, MetricContribution};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn now() -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn detection(metric: &str, is_anomaly: bool, score: f64, threshold: f64) -> Detection {
        Detection {
            is_anomaly,
            score,
            threshold,
            per_metric: BTreeMap::from([(
                metric.to_string(),
                MetricContribution {
                    value: 0.0,
                    z_score: 4.0,
                    severity: DeviationSeverity::Severe,
                },
            )]),
        }
    }

    fn breach(metric: &str, level: BreachLevel) -> ThresholdBreach {
        ThresholdBreach {
            metric_id: metric.to_string(),
            value: 120.0,
            bound: 100.0,
            level,
        }
    }

    fn kind_of(_: &str) -> MetricKind {
        MetricKind::Temperature
    }

    #[test]
    fn clean_inputs_score_100_healthy() {
        let report = score(
            "d1",
            &[detection("t1", false, 0.2, 0.0)],
            &[],
            &[],
            vec![],
            kind_of,
            &HealthConfig::default(),
            now(),
        );
        assert_eq!(report.score, 100);
        assert_eq!(report.tier, HealthTier::Healthy);
        assert!(report.deductions.is_empty());
    }

    #[test]
    fn anomaly_near_threshold_takes_minimum_penalty() {
        let config = HealthConfig::default();
        let report = score(
            "d1",
            &[detection("t1", true, -0.001, 0.0)],
            &[],
            &[],
            vec![],
            kind_of,
            &config,
            now(),
        );
        assert_eq!(report.score, 90);
        assert_eq!(report.deductions[0].category, DeductionCategory::TemperatureAnomaly);
    }

    #[test]
    fn anomaly_far_beyond_threshold_saturates_at_max() {
        let config = HealthConfig::default();
        let report = score(
            "d1",
            &[detection("t1", true, -0.6, 0.0)],
            &[],
            &[],
            vec![],
            kind_of,
            &config,
            now(),
        );
        assert_eq!(report.score, 80);
    }

    #[test]
    fn deductions_are_additive_and_score_is_monotonic() {
        let config = HealthConfig::default();
        let base = score("d1", &[], &[], &[], vec![], kind_of, &config, now());

        let one = score(
            "d1",
            &[],
            &[breach("t1", BreachLevel::Critical)],
            &[],
            vec![],
            kind_of,
            &config,
            now(),
        );
        let two = score(
            "d1",
            &[detection("t1", true, -0.6, 0.0)],
            &[breach("t1", BreachLevel::Critical)],
            &[],
            vec![],
            kind_of,
            &config,
            now(),
        );
        assert!(base.score >= one.score);
        assert!(one.score >= two.score);
        // Anomalous and over the hard limit deduct independently.
        assert_eq!(two.score, 100 - 20 - 15);
        assert_eq!(two.tier, HealthTier::Watch);
    }

    #[test]
    fn score_clamps_at_zero() {
        let config = HealthConfig::default();
        let breaches: Vec<_> = (0..10)
            .map(|i| breach(&format!("m{i}"), BreachLevel::Critical))
            .collect();
        let report = score("d1", &[], &breaches, &[], vec![], kind_of, &config, now());
        assert_eq!(report.score, 0);
        assert_eq!(report.tier, HealthTier::Critical);
    }

    #[test]
    fn gaps_are_surfaced_with_zero_deduction() {
        let report = score(
            "d1",
            &[],
            &[],
            &[],
            vec!["t2".to_string()],
            kind_of,
            &HealthConfig::default(),
            now(),
        );
        assert_eq!(report.score, 100);
        assert_eq!(report.gaps, vec!["t2"]);
    }

    #[test]
    fn trending_breach_detection_crosses_limit_within_horizon() {
        let fc = ForecastResult {
            metric_id: "t1".into(),
            points: vec![(now(), 95.0), (now(), 101.0)],
            trend: Trend::Rising,
            confidence: 0.9,
            low_confidence: false,
            slope: 0.1,
        };
        let limit = HardLimit {
            metric_id: "t1".into(),
            min: 0.0,
            max: 100.0,
            warning: None,
        };
        let tbs = trending_breaches(&[fc.clone()], &[limit.clone()]);
        assert_eq!(tbs.len(), 1);
        assert_eq!(tbs[0].projected_value, 101.0);
        assert_eq!(tbs[0].bound, 100.0);

        // A stable forecast never counts as trending.
        let stable = ForecastResult {
            trend: Trend::Stable,
            ..fc
        };
        assert!(trending_breaches(&[stable], &[limit]).is_empty());
    }

    #[test]
    fn config_validation_catches_inverted_ranges() {
        let mut config = HealthConfig::default();
        config.anomaly_penalty_min = 30.0;
        assert!(config.validate().is_err());

        let mut config = HealthConfig::default();
        config.watch_cutoff = 95;
        assert!(config.validate().is_err());
    }
}
