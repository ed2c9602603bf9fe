//! Shared registry of trained anomaly models.
//!
//! One slot per (device id, metric-set id) composite key. A slot holds an
//! immutable model behind an `Arc`; retraining installs a whole new model
//! by swapping the reference under a short write lock. Readers clone the
//! `Arc` and keep scoring against whichever model they obtained; a reader
//! can observe the pre- or post-retrain model, never a partially updated
//! one.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Duration;

use ovenwatch_core::anomaly::{AnomalyModel, Detection, ModelState};
use ovenwatch_core::error::CoreError;
use ovenwatch_core::types::{MetricId, ModelKey, Timestamp};

/// Holder for the current model of one device + metric set.
#[derive(Debug, Default)]
pub struct ModelSlot {
    model: RwLock<Option<Arc<AnomalyModel>>>,
    /// Set by [`ModelSlot::invalidate`]; forces `Stale` until the next
    /// install.
    invalidated: AtomicBool,
}

impl ModelSlot {
    /// The currently installed model, if any. Cheap: clones the `Arc`
    /// under a read lock.
    pub fn current(&self) -> Option<Arc<AnomalyModel>> {
        self.model.read().expect("model slot lock poisoned").clone()
    }

    /// Atomically replace the installed model. Clears any explicit
    /// invalidation. In-flight readers keep their previous `Arc`.
    pub fn install(&self, model: Arc<AnomalyModel>) {
        *self.model.write().expect("model slot lock poisoned") = Some(model);
        self.invalidated.store(false, Ordering::Release);
    }

    /// Mark the installed model stale regardless of its age. The model
    /// stays usable for scoring until a retrain replaces it.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    /// Score an observation vector against the installed model, or
    /// `ModelNotReady` when the slot is still empty.
    pub fn detect(&self, values: &BTreeMap<MetricId, f64>) -> Result<Detection, CoreError> {
        let model = self.current().ok_or(CoreError::ModelNotReady)?;
        model.detect(values)
    }

    /// Lifecycle state relative to the newest data timestamp.
    pub fn state(&self, newest_data: Timestamp, staleness_horizon: Duration) -> ModelState {
        match self.current() {
            None => ModelState::Untrained,
            Some(_) if self.invalidated.load(Ordering::Acquire) => ModelState::Stale,
            Some(model) => model.state(newest_data, staleness_horizon),
        }
    }
}

/// Registry of model slots, keyed by [`ModelKey`].
///
/// Slots are created on first access and never removed; the roster is
/// fixed at process start, so the key space is bounded by configuration.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    slots: RwLock<HashMap<ModelKey, Arc<ModelSlot>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the slot for `key`.
    pub fn slot(&self, key: &ModelKey) -> Arc<ModelSlot> {
        if let Some(slot) = self
            .slots
            .read()
            .expect("registry lock poisoned")
            .get(key)
        {
            return slot.clone();
        }
        self.slots
            .write()
            .expect("registry lock poisoned")
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Number of slots created so far.
    pub fn len(&self) -> usize {
        self.slots.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ovenwatch_core::anomaly::DetectorConfig;
    use ovenwatch_core::config::MetricSet;
    use ovenwatch_core::normalize::Observation;
    use ovenwatch_core::window::ObservationWindow;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn trained_model() -> AnomalyModel {
        let mut w = ObservationWindow::new("d1", Duration::hours(48));
        for i in 0..40 {
            let t = ts(i * 60);
            let obs = vec![Observation {
                device_id: "d1".into(),
                metric_id: "temp".into(),
                timestamp: t,
                value: 70.0 + (i % 5) as f64 * 0.1,
            }];
            w.push(t, &obs).unwrap();
        }
        let set = MetricSet::new("thermal", vec!["temp".into()]).unwrap();
        AnomalyModel::train(&set, &w, &DetectorConfig::default()).unwrap()
    }

    #[test]
    fn empty_slot_is_untrained() {
        let slot = ModelSlot::default();
        assert_eq!(
            slot.state(ts(0), Duration::hours(24)),
            ModelState::Untrained
        );
        assert!(slot.current().is_none());

        let probe = BTreeMap::from([("temp".to_string(), 70.0)]);
        assert!(matches!(
            slot.detect(&probe).unwrap_err(),
            CoreError::ModelNotReady
        ));
    }

    #[test]
    fn install_transitions_to_trained_and_ages_to_stale() {
        let slot = ModelSlot::default();
        let model = trained_model();
        let trained_at = model.trained_at();
        slot.install(Arc::new(model));

        let horizon = Duration::hours(24);
        assert_eq!(
            slot.state(trained_at + Duration::hours(1), horizon),
            ModelState::Trained
        );
        assert_eq!(
            slot.state(trained_at + Duration::hours(25), horizon),
            ModelState::Stale
        );
    }

    #[test]
    fn explicit_invalidation_forces_stale_until_reinstall() {
        let slot = ModelSlot::default();
        let model = trained_model();
        let trained_at = model.trained_at();
        slot.install(Arc::new(model.clone()));

        slot.invalidate();
        let horizon = Duration::hours(24);
        assert_eq!(
            slot.state(trained_at + Duration::hours(1), horizon),
            ModelState::Stale
        );
        // The stale model is still there for in-flight scoring.
        assert!(slot.current().is_some());

        slot.install(Arc::new(model));
        assert_eq!(
            slot.state(trained_at + Duration::hours(1), horizon),
            ModelState::Trained
        );
    }

    #[test]
    fn registry_returns_the_same_slot_per_key() {
        let registry = ModelRegistry::new();
        let key = ModelKey::new("d1", "thermal");
        let a = registry.slot(&key);
        let b = registry.slot(&key);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.slot(&ModelKey::new("d2", "thermal"));
        assert_eq!(registry.len(), 2);
    }
}
