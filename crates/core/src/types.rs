//! Shared identifier and timestamp aliases.

use serde::{Deserialize, Serialize};

/// Stable identifier of a physical controller, e.g. `"ecu1051_1"`.
pub type DeviceId = String;

/// Stable identifier of a configured metric, e.g. `"left_main_temp_pv"`.
pub type MetricId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Composite key for the per-device, per-metric-set model registry.
///
/// Replaces ad-hoc string concatenation as a registry key so that device
/// and metric-set ids can never collide into the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub device_id: DeviceId,
    pub metric_set_id: String,
}

impl ModelKey {
    pub fn new(device_id: impl Into<DeviceId>, metric_set_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            metric_set_id: metric_set_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn model_keys_with_swapped_parts_are_distinct() {
        // "a" + "b_c" and "a_b" + "c" must not collide, unlike a naive
        // concatenated string key.
        let mut map = HashMap::new();
        map.insert(ModelKey::new("a", "b_c"), 1);
        map.insert(ModelKey::new("a_b", "c"), 2);
        assert_eq!(map.len(), 2);
    }
}
