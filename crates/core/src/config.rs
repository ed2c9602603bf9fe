//! Static metric and device configuration.
//!
//! The roster of devices, their metric definitions, safe-band limits, and
//! the metric sets fed to the anomaly detector are loaded once at process
//! start and treated as read-only for the lifetime of the core. The on-disk
//! format mirrors the PLC point list the collector is configured from: one
//! entry per register with id, display name, unit, and scale factor.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DeviceId, MetricId};
use crate::validation::validate_positive_finite;

// ---------------------------------------------------------------------------
// MetricKind
// ---------------------------------------------------------------------------

/// Coarse physical category of a metric, used for health weighting and
/// advisory wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Temperature,
    Current,
    Pressure,
    Other,
}

impl MetricKind {
    /// Classify a metric from its id and display name when the config does
    /// not state a kind explicitly.
    ///
    /// Matches the naming conventions of the PLC point lists this system
    /// ingests (`*_temp_pv`, `ct1_current`, `chamber_pressure`, ...).
    pub fn classify(id: &str, name: &str) -> Self {
        let haystack = format!("{} {}", id.to_lowercase(), name.to_lowercase());
        if haystack.contains("temp") {
            Self::Temperature
        } else if haystack.contains("current") || haystack.contains("ct") {
            Self::Current
        } else if haystack.contains("press") {
            Self::Pressure
        } else {
            Self::Other
        }
    }
}

// ---------------------------------------------------------------------------
// MetricDefinition
// ---------------------------------------------------------------------------

fn default_scale_factor() -> f64 {
    1.0
}

/// One configured metric on a device. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Unique id within the owning device, e.g. `"left_main_temp_pv"`.
    pub id: MetricId,
    /// Human-readable display name.
    pub name: String,
    /// Engineering unit, e.g. `"°C"` or `"A"`.
    pub unit: String,
    /// Multiplicative factor applied to raw register values. Defaults to 1.0.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    /// Explicit kind; when absent, derived from the id/name.
    #[serde(default)]
    pub kind: Option<MetricKind>,
}

impl MetricDefinition {
    /// Resolved kind: the explicit one if configured, otherwise classified
    /// from the id and name.
    pub fn kind(&self) -> MetricKind {
        self.kind
            .unwrap_or_else(|| MetricKind::classify(&self.id, &self.name))
    }
}

// ---------------------------------------------------------------------------
// HardLimit
// ---------------------------------------------------------------------------

/// Explicit safe band for a metric, independent of the learned model.
///
/// A value outside `[min, max]` is a hard breach; a value beyond `warning`
/// (when set) is a warning-level breach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardLimit {
    pub metric_id: MetricId,
    pub min: f64,
    pub max: f64,
    /// Optional early-warning level below `max`.
    #[serde(default)]
    pub warning: Option<f64>,
}

// ---------------------------------------------------------------------------
// MetricSet
// ---------------------------------------------------------------------------

/// A closed, finite set of metrics trained and scored together as one
/// feature vector.
///
/// Construction validates the set up front so a registry entry can never be
/// built from a malformed or open-ended set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSet {
    pub id: String,
    /// Ordered feature list. Order fixes the feature vector layout.
    pub metrics: Vec<MetricId>,
}

impl MetricSet {
    /// Build a metric set, rejecting empty sets and duplicate members.
    pub fn new(id: impl Into<String>, metrics: Vec<MetricId>) -> Result<Self, CoreError> {
        let id = id.into();
        if metrics.is_empty() {
            return Err(CoreError::Validation(format!(
                "metric set '{id}' must contain at least one metric"
            )));
        }
        let mut seen = HashSet::new();
        for m in &metrics {
            if !seen.insert(m.as_str()) {
                return Err(CoreError::Validation(format!(
                    "metric set '{id}' lists '{m}' more than once"
                )));
            }
        }
        Ok(Self { id, metrics })
    }
}

// ---------------------------------------------------------------------------
// DeviceConfig
// ---------------------------------------------------------------------------

/// All configured metrics, limits, and detector metric sets for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: DeviceId,
    pub metrics: Vec<MetricDefinition>,
    #[serde(default)]
    pub limits: Vec<HardLimit>,
    #[serde(default)]
    pub metric_sets: Vec<MetricSet>,
}

impl DeviceConfig {
    /// Look up a metric definition by id.
    pub fn metric(&self, metric_id: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.id == metric_id)
    }

    /// Look up a hard limit by metric id.
    pub fn limit(&self, metric_id: &str) -> Option<&HardLimit> {
        self.limits.iter().find(|l| l.metric_id == metric_id)
    }
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// The full device roster. Loaded once, read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub devices: Vec<DeviceConfig>,
}

impl MonitorConfig {
    /// Parse a roster from its JSON representation and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a device by id.
    pub fn device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    /// Validate the whole roster: unique device ids, unique metric ids per
    /// device, finite positive scale factors, limits and metric sets that
    /// only reference configured metrics, and coherent limit bounds.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut device_ids = HashSet::new();
        for device in &self.devices {
            if !device_ids.insert(device.device_id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "duplicate device id '{}'",
                    device.device_id
                )));
            }

            let mut metric_ids = HashSet::new();
            for metric in &device.metrics {
                if !metric_ids.insert(metric.id.as_str()) {
                    return Err(CoreError::Validation(format!(
                        "device '{}' defines metric '{}' more than once",
                        device.device_id, metric.id
                    )));
                }
                validate_positive_finite(
                    metric.scale_factor,
                    &format!("scale_factor of '{}'", metric.id),
                )?;
            }

            for limit in &device.limits {
                if !metric_ids.contains(limit.metric_id.as_str()) {
                    return Err(CoreError::Validation(format!(
                        "device '{}' has a limit for unknown metric '{}'",
                        device.device_id, limit.metric_id
                    )));
                }
                if !(limit.min < limit.max) {
                    return Err(CoreError::Validation(format!(
                        "limit for '{}' has min {} >= max {}",
                        limit.metric_id, limit.min, limit.max
                    )));
                }
                if let Some(w) = limit.warning {
                    if !(limit.min..=limit.max).contains(&w) {
                        return Err(CoreError::Validation(format!(
                            "warning level {} for '{}' is outside [min, max]",
                            w, limit.metric_id
                        )));
                    }
                }
            }

            for set in &device.metric_sets {
                // Re-run member validation; hand-built configs may bypass
                // MetricSet::new.
                MetricSet::new(set.id.clone(), set.metrics.clone())?;
                for m in &set.metrics {
                    if !metric_ids.contains(m.as_str()) {
                        return Err(CoreError::Validation(format!(
                            "metric set '{}' on device '{}' references unknown metric '{}'",
                            set.id, device.device_id, m
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Map of metric id to definition for one device, or `ConfigMismatch`
    /// if the device is unknown.
    pub fn metric_map(
        &self,
        device_id: &str,
    ) -> Result<HashMap<&str, &MetricDefinition>, CoreError> {
        let device = self
            .device(device_id)
            .ok_or_else(|| CoreError::ConfigMismatch(format!("device '{device_id}'")))?;
        Ok(device.metrics.iter().map(|m| (m.id.as_str(), m)).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(id: &str, scale: f64) -> MetricDefinition {
        MetricDefinition {
            id: id.to_string(),
            name: id.to_string(),
            unit: "°C".to_string(),
            scale_factor: scale,
            kind: None,
        }
    }

    #[test]
    fn classify_matches_plc_naming_conventions() {
        assert_eq!(
            MetricKind::classify("left_main_temp_pv", "Left main temperature"),
            MetricKind::Temperature
        );
        assert_eq!(
            MetricKind::classify("ct1", "Motor CT1"),
            MetricKind::Current
        );
        assert_eq!(
            MetricKind::classify("chamber_pressure", "Chamber pressure"),
            MetricKind::Pressure
        );
        assert_eq!(
            MetricKind::classify("fan_freq", "Fan frequency"),
            MetricKind::Other
        );
    }

    #[test]
    fn from_json_applies_scale_factor_default() {
        let json = r#"{
            "devices": [{
                "device_id": "d1",
                "metrics": [{"id": "t1", "name": "Temp 1", "unit": "°C"}]
            }]
        }"#;
        let config = MonitorConfig::from_json_str(json).unwrap();
        let m = config.device("d1").unwrap().metric("t1").unwrap();
        assert_eq!(m.scale_factor, 1.0);
        assert_eq!(m.kind(), MetricKind::Temperature);
    }

    #[test]
    fn validate_rejects_duplicate_metric_ids() {
        let config = MonitorConfig {
            devices: vec![DeviceConfig {
                device_id: "d1".into(),
                metrics: vec![metric("t1", 1.0), metric("t1", 0.1)],
                limits: vec![],
                metric_sets: vec![],
            }],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_limit_for_unknown_metric() {
        let config = MonitorConfig {
            devices: vec![DeviceConfig {
                device_id: "d1".into(),
                metrics: vec![metric("t1", 1.0)],
                limits: vec![HardLimit {
                    metric_id: "nope".into(),
                    min: 0.0,
                    max: 100.0,
                    warning: None,
                }],
                metric_sets: vec![],
            }],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn metric_set_rejects_duplicates_and_empty() {
        assert!(MetricSet::new("s", vec![]).is_err());
        assert!(MetricSet::new("s", vec!["a".into(), "a".into()]).is_err());
        assert!(MetricSet::new("s", vec!["a".into(), "b".into()]).is_ok());
    }

    #[test]
    fn validate_rejects_inverted_limit_bounds() {
        let config = MonitorConfig {
            devices: vec![DeviceConfig {
                device_id: "d1".into(),
                metrics: vec![metric("t1", 1.0)],
                limits: vec![HardLimit {
                    metric_id: "t1".into(),
                    min: 100.0,
                    max: 0.0,
                    warning: None,
                }],
                metric_sets: vec![],
            }],
        };
        assert!(config.validate().is_err());
    }
}
