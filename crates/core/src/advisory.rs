//! Maintenance advisory generation.
//!
//! Maps each deduction on a health report to a canned, parameterized
//! recommendation and ranks the result: immediate conditions (hard-limit
//! breaches, confirmed anomalies) before projected ones (trending toward a
//! breach), ties broken by deduction magnitude descending, then metric id,
//! so identical reports always produce identical advisory lists. Purely
//! derived; no side effects.

use serde::Serialize;

use crate::health::{Deduction, DeductionCategory, HealthReport};
use crate::types::{DeviceId, MetricId};

/// One ranked maintenance recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct Advisory {
    pub category: DeductionCategory,
    /// 1 is the most urgent.
    pub priority: u32,
    pub recommendation: String,
    /// Metric the originating deduction was attributed to, if any.
    pub metric_id: Option<MetricId>,
    pub device_id: DeviceId,
}

/// Generate ranked advisories for a health report.
///
/// A report without deductions yields an empty list.
pub fn advise(report: &HealthReport) -> Vec<Advisory> {
    let mut ranked: Vec<&Deduction> = report.deductions.iter().collect();
    ranked.sort_by(|a, b| {
        b.category
            .is_critical_class()
            .cmp(&a.category.is_critical_class())
            .then(b.amount.total_cmp(&a.amount))
            .then(a.metric_id.cmp(&b.metric_id))
    });

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, deduction)| Advisory {
            category: deduction.category,
            priority: i as u32 + 1,
            recommendation: recommendation_text(deduction, &report.device_id),
            metric_id: deduction.metric_id.clone(),
            device_id: report.device_id.clone(),
        })
        .collect()
}

/// Canned template per category, parameterized by metric and device.
fn recommendation_text(deduction: &Deduction, device_id: &str) -> String {
    let metric = deduction
        .metric_id
        .as_deref()
        .unwrap_or("multiple metrics");
    match deduction.category {
        DeductionCategory::TemperatureAnomaly => format!(
            "Temperature anomaly on {metric}: inspect heating elements and the cooling circuit of {device_id}"
        ),
        DeductionCategory::CurrentAnomaly => format!(
            "Motor current anomaly on {metric}: check electrical load and contactor wear on {device_id}"
        ),
        DeductionCategory::PressureAnomaly => format!(
            "Pressure anomaly on {metric}: inspect the pneumatic circuit of {device_id}"
        ),
        DeductionCategory::GeneralAnomaly => format!(
            "Abnormal readings on {metric}: schedule a manual inspection of {device_id}"
        ),
        DeductionCategory::HardLimitBreach => format!(
            "{metric} is outside its safe operating band on {device_id}: intervene before the next production run"
        ),
        DeductionCategory::TrendingBreach => format!(
            "{metric} is trending toward its operating limit on {device_id}: plan corrective maintenance"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthTier;
    use chrono::{TimeZone, Utc};

    fn deduction(category: DeductionCategory, metric: &str, amount: f64) -> Deduction {
        Deduction {
            category,
            metric_id: Some(metric.to_string()),
            amount,
        }
    }

    fn report(deductions: Vec<Deduction>) -> HealthReport {
        let total: f64 = deductions.iter().map(|d| d.amount).sum();
        let score = (100.0 - total).clamp(0.0, 100.0).round() as u8;
        HealthReport {
            device_id: "d1".into(),
            score,
            tier: HealthTier::Healthy,
            deductions,
            gaps: vec![],
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn empty_report_yields_no_advisories() {
        assert!(advise(&report(vec![])).is_empty());
    }

    #[test]
    fn immediate_conditions_outrank_trend_warnings() {
        let advisories = advise(&report(vec![
            deduction(DeductionCategory::TrendingBreach, "t1", 5.0),
            deduction(DeductionCategory::TemperatureAnomaly, "t2", 12.0),
            deduction(DeductionCategory::HardLimitBreach, "t3", 15.0),
        ]));

        assert_eq!(advisories.len(), 3);
        assert_eq!(advisories[0].category, DeductionCategory::HardLimitBreach);
        assert_eq!(advisories[1].category, DeductionCategory::TemperatureAnomaly);
        assert_eq!(advisories[2].category, DeductionCategory::TrendingBreach);
        assert_eq!(
            advisories.iter().map(|a| a.priority).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn equal_magnitude_ties_break_by_metric_id() {
        let advisories = advise(&report(vec![
            deduction(DeductionCategory::HardLimitBreach, "zz", 15.0),
            deduction(DeductionCategory::HardLimitBreach, "aa", 15.0),
        ]));
        assert_eq!(advisories[0].metric_id.as_deref(), Some("aa"));
        assert_eq!(advisories[1].metric_id.as_deref(), Some("zz"));
    }

    #[test]
    fn recommendation_names_metric_and_device() {
        let advisories = advise(&report(vec![deduction(
            DeductionCategory::CurrentAnomaly,
            "ct1",
            12.0,
        )]));
        let text = &advisories[0].recommendation;
        assert!(text.contains("ct1"));
        assert!(text.contains("d1"));
    }
}
