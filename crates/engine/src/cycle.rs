//! Per-device evaluation cycles.
//!
//! An external scheduler (timer loop, task queue, cron) drives one
//! [`EvaluationEngine::evaluate_device`] call per device per interval.
//! Cycles for different devices share nothing but the model registry's
//! per-slot locks, so they run in parallel freely. Within one cycle the
//! detector and the forecaster are independent and joined before health
//! scoring; any per-metric failure degrades into a reported gap instead of
//! aborting the cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use ovenwatch_core::advisory::{advise, Advisory};
use ovenwatch_core::anomaly::{AnomalyModel, Detection, DetectorConfig, ModelState};
use ovenwatch_core::config::{DeviceConfig, MetricKind, MetricSet, MonitorConfig};
use ovenwatch_core::error::CoreError;
use ovenwatch_core::forecast::{forecast, ForecastResult};
use ovenwatch_core::health::{self, HealthConfig, HealthReport, TrendingBreach};
use ovenwatch_core::limits::{evaluate_limits, ThresholdBreach};
use ovenwatch_core::types::{MetricId, ModelKey};
use ovenwatch_core::validation::validate_min_count;
use ovenwatch_core::window::ObservationWindow;

use crate::registry::{ModelRegistry, ModelSlot};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Engine-level tunables, grouping the core configs with the forecast
/// horizon.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub detector: DetectorConfig,
    pub health: HealthConfig,
    /// Future points projected per metric each cycle.
    pub horizon_points: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            health: HealthConfig::default(),
            horizon_points: 10,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.detector.validate()?;
        self.health.validate()?;
        validate_min_count(self.horizon_points, 1, "horizon_points")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything one cycle produced for one device, structured for any
/// presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceEvaluation {
    pub device_id: String,
    /// Detection per metric set, where a trained model was available.
    pub detections: BTreeMap<String, Detection>,
    /// Lifecycle state per metric set after this cycle.
    pub model_states: BTreeMap<String, ModelState>,
    pub forecasts: BTreeMap<MetricId, ForecastResult>,
    pub breaches: Vec<ThresholdBreach>,
    pub trending: Vec<TrendingBreach>,
    pub report: HealthReport,
    pub advisories: Vec<Advisory>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the model registry and runs evaluation cycles against a read-only
/// roster.
pub struct EvaluationEngine {
    config: Arc<MonitorConfig>,
    settings: EngineSettings,
    registry: ModelRegistry,
}

impl EvaluationEngine {
    pub fn new(config: Arc<MonitorConfig>, settings: EngineSettings) -> Result<Self, CoreError> {
        config.validate()?;
        settings.validate()?;
        Ok(Self {
            config,
            settings,
            registry: ModelRegistry::new(),
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Run one evaluation cycle for `device_id` over its current window.
    ///
    /// Fails only when the device id is unknown; every per-metric or
    /// per-model failure is reported as a gap on the health report.
    pub async fn evaluate_device(
        &self,
        device_id: &str,
        window: &ObservationWindow,
    ) -> Result<DeviceEvaluation, CoreError> {
        let device = self
            .config
            .device(device_id)
            .ok_or_else(|| CoreError::ConfigMismatch(format!("device '{device_id}'")))?;

        // Detector and forecaster are independent; join before scoring.
        let (detect_out, forecast_out) = tokio::join!(
            self.run_detections(device, window),
            self.run_forecasts(device, window),
        );
        let (detections, model_states, mut gaps) = detect_out;
        let (forecasts, forecast_gaps) = forecast_out;
        gaps.extend(forecast_gaps);

        let breaches = match window.latest_row() {
            Ok(row) => evaluate_limits(&row.values, &device.limits),
            Err(_) => Vec::new(),
        };

        let forecast_list: Vec<ForecastResult> = forecasts.values().cloned().collect();
        let trending = health::trending_breaches(&forecast_list, &device.limits);

        let detection_list: Vec<Detection> = detections.values().cloned().collect();
        let timestamp = window.newest_timestamp().unwrap_or_else(Utc::now);
        let report = health::score(
            device_id,
            &detection_list,
            &breaches,
            &trending,
            gaps,
            |metric_id| {
                device
                    .metric(metric_id)
                    .map(|m| m.kind())
                    .unwrap_or(MetricKind::Other)
            },
            &self.settings.health,
            timestamp,
        );
        let advisories = advise(&report);

        Ok(DeviceEvaluation {
            device_id: device_id.to_string(),
            detections,
            model_states,
            forecasts,
            breaches,
            trending,
            report,
            advisories,
        })
    }

    /// Train/retrain where due, then score the newest row against every
    /// metric set of the device.
    async fn run_detections(
        &self,
        device: &DeviceConfig,
        window: &ObservationWindow,
    ) -> (
        BTreeMap<String, Detection>,
        BTreeMap<String, ModelState>,
        Vec<String>,
    ) {
        let mut detections = BTreeMap::new();
        let mut states = BTreeMap::new();
        let mut gaps = Vec::new();

        for metric_set in metric_sets_for(device) {
            let key = ModelKey::new(device.device_id.clone(), metric_set.id.clone());
            let slot = self.registry.slot(&key);

            self.ensure_trained(&slot, &metric_set, window, &mut gaps)
                .await;

            let newest = window.newest_timestamp();
            let state = match newest {
                Some(n) => slot.state(n, self.settings.detector.staleness_horizon),
                None => ModelState::Untrained,
            };
            states.insert(metric_set.id.clone(), state);

            match self.score_latest(&slot, &metric_set, window) {
                Ok(detection) => {
                    detections.insert(metric_set.id.clone(), detection);
                }
                // Warm-up; ensure_trained already recorded the gap.
                Err(CoreError::ModelNotReady) => {}
                Err(err) => {
                    tracing::warn!(
                        device_id = %device.device_id,
                        metric_set = %metric_set.id,
                        error = %err,
                        "skipping detection this cycle"
                    );
                    gaps.push(format!("detector {}: {err}", metric_set.id));
                }
            }
        }

        (detections, states, gaps)
    }

    /// Train when untrained, retrain when stale. Training runs on the
    /// blocking pool; the previously installed model keeps serving
    /// concurrent `detect()` calls until the new one is swapped in.
    async fn ensure_trained(
        &self,
        slot: &Arc<ModelSlot>,
        metric_set: &MetricSet,
        window: &ObservationWindow,
        gaps: &mut Vec<String>,
    ) {
        let Some(newest) = window.newest_timestamp() else {
            gaps.push(format!("detector {}: window is empty", metric_set.id));
            return;
        };
        let state = slot.state(newest, self.settings.detector.staleness_horizon);
        if state == ModelState::Trained {
            return;
        }

        let set = metric_set.clone();
        let training_window = window.clone();
        let detector_config = self.settings.detector.clone();
        let trained = tokio::task::spawn_blocking(move || {
            AnomalyModel::train(&set, &training_window, &detector_config)
        })
        .await;

        match trained {
            Ok(Ok(model)) => {
                tracing::info!(
                    metric_set = %metric_set.id,
                    samples = model.sample_count(),
                    "installed anomaly model"
                );
                slot.install(Arc::new(model));
            }
            Ok(Err(err)) if state == ModelState::Untrained => {
                // Expected during warm-up while the window fills.
                tracing::debug!(metric_set = %metric_set.id, error = %err, "training not possible yet");
                gaps.push(format!("detector {}: {err}", metric_set.id));
            }
            Ok(Err(err)) => {
                // Retrain failed; keep scoring against the stale model.
                tracing::warn!(
                    metric_set = %metric_set.id,
                    error = %err,
                    "retrain failed, keeping previous model"
                );
                gaps.push(format!("detector {}: retrain failed: {err}", metric_set.id));
            }
            Err(join_err) => {
                tracing::error!(
                    metric_set = %metric_set.id,
                    error = %join_err,
                    "training task aborted"
                );
                gaps.push(format!("detector {}: training task aborted", metric_set.id));
            }
        }
    }

    /// Score the newest row against the slot's installed model.
    fn score_latest(
        &self,
        slot: &ModelSlot,
        metric_set: &MetricSet,
        window: &ObservationWindow,
    ) -> Result<Detection, CoreError> {
        let row = window.latest_row()?;
        let values: BTreeMap<MetricId, f64> = metric_set
            .metrics
            .iter()
            .filter_map(|m| row.values.get(m).map(|v| (m.clone(), *v)))
            .collect();
        // A set metric absent from the newest row surfaces as
        // IncompleteObservation here; never imputed.
        slot.detect(&values)
    }

    /// Forecast every configured metric of the device.
    async fn run_forecasts(
        &self,
        device: &DeviceConfig,
        window: &ObservationWindow,
    ) -> (BTreeMap<MetricId, ForecastResult>, Vec<String>) {
        let mut forecasts = BTreeMap::new();
        let mut gaps = Vec::new();

        for metric in &device.metrics {
            let series = window.series(&metric.id);
            match forecast(&metric.id, &series, self.settings.horizon_points) {
                Ok(result) => {
                    forecasts.insert(metric.id.clone(), result);
                }
                Err(err) => {
                    tracing::debug!(
                        device_id = %device.device_id,
                        metric_id = %metric.id,
                        error = %err,
                        "skipping forecast this cycle"
                    );
                    gaps.push(format!("forecast {}: {err}", metric.id));
                }
            }
        }

        (forecasts, gaps)
    }
}

/// The device's configured metric sets, or one implicit set spanning all
/// of its metrics when none are configured.
fn metric_sets_for(device: &DeviceConfig) -> Vec<MetricSet> {
    if !device.metric_sets.is_empty() {
        return device.metric_sets.clone();
    }
    let metrics: Vec<MetricId> = device.metrics.iter().map(|m| m.id.clone()).collect();
    match MetricSet::new("all", metrics) {
        Ok(set) => vec![set],
        // A device without metrics has nothing to detect on.
        Err(_) => Vec::new(),
    }
}
