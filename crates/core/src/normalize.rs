//! Record normalization: raw snapshot → typed, unit-scaled observations.
//!
//! The collector hands over a flat `metric id → raw value` mapping per
//! device. Normalization applies each metric's scale factor and tags the
//! result with device, metric, and timestamp. Metric ids the configuration
//! does not know are dropped with a log line, never an error: the config
//! drives detection coverage, not the collector's register list.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::types::{DeviceId, MetricId, Timestamp};

/// One normalized sensor reading. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub device_id: DeviceId,
    pub metric_id: MetricId,
    pub timestamp: Timestamp,
    /// Value after applying the metric's scale factor.
    pub value: f64,
}

/// Convert one raw snapshot into observations for every metric present in
/// both the snapshot and the device's configuration.
///
/// Unknown metric ids and non-finite raw values are skipped and logged.
/// Fails with `ConfigMismatch` only when the device id itself is unknown.
/// Output is sorted by metric id so downstream consumers see a stable
/// order.
pub fn normalize(
    config: &MonitorConfig,
    device_id: &str,
    raw: &HashMap<String, f64>,
    timestamp: Timestamp,
) -> Result<Vec<Observation>, CoreError> {
    let metric_map = config.metric_map(device_id)?;

    let mut observations = Vec::with_capacity(raw.len());
    for (metric_id, raw_value) in raw {
        let Some(definition) = metric_map.get(metric_id.as_str()) else {
            tracing::debug!(
                device_id,
                metric_id = %metric_id,
                "dropping metric absent from configuration"
            );
            continue;
        };
        if !raw_value.is_finite() {
            tracing::warn!(
                device_id,
                metric_id = %metric_id,
                value = raw_value,
                "dropping non-finite raw value"
            );
            continue;
        }
        observations.push(Observation {
            device_id: device_id.to_string(),
            metric_id: metric_id.clone(),
            timestamp,
            value: raw_value * definition.scale_factor,
        });
    }

    observations.sort_by(|a, b| a.metric_id.cmp(&b.metric_id));
    Ok(observations)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, MetricDefinition};
    use chrono::Utc;

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            devices: vec![DeviceConfig {
                device_id: "d1".into(),
                metrics: vec![
                    MetricDefinition {
                        id: "t1".into(),
                        name: "Temp 1".into(),
                        unit: "°C".into(),
                        scale_factor: 0.1,
                        kind: None,
                    },
                    MetricDefinition {
                        id: "ct1".into(),
                        name: "Current 1".into(),
                        unit: "A".into(),
                        scale_factor: 1.0,
                        kind: None,
                    },
                ],
                limits: vec![],
                metric_sets: vec![],
            }],
        }
    }

    #[test]
    fn output_covers_intersection_of_snapshot_and_config() {
        let config = test_config();
        let raw = HashMap::from([
            ("t1".to_string(), 705.0),
            ("ct1".to_string(), 12.5),
            ("unconfigured".to_string(), 1.0),
        ]);
        let obs = normalize(&config, "d1", &raw, Utc::now()).unwrap();
        assert_eq!(obs.len(), 2);
        // Sorted by metric id: ct1 first.
        assert_eq!(obs[0].metric_id, "ct1");
        assert_eq!(obs[0].value, 12.5);
        assert_eq!(obs[1].metric_id, "t1");
        assert!((obs[1].value - 70.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_device_is_config_mismatch() {
        let config = test_config();
        let raw = HashMap::from([("t1".to_string(), 1.0)]);
        let err = normalize(&config, "ghost", &raw, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigMismatch(_)));
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let config = test_config();
        let raw = HashMap::from([
            ("t1".to_string(), f64::NAN),
            ("ct1".to_string(), f64::INFINITY),
        ]);
        let obs = normalize(&config, "d1", &raw, Utc::now()).unwrap();
        assert!(obs.is_empty());
    }

    #[test]
    fn empty_snapshot_yields_empty_output() {
        let config = test_config();
        let obs = normalize(&config, "d1", &HashMap::new(), Utc::now()).unwrap();
        assert!(obs.is_empty());
    }
}
