//! Unsupervised anomaly model lifecycle.
//!
//! One [`AnomalyModel`] is trained per device and metric set: features are
//! independently z-scored over the training window, an isolation forest is
//! fit over the scaled rows, and the decision threshold is calibrated so
//! that the configured expected-anomaly-rate fraction of training samples
//! scores below it. A model is immutable after training; retraining
//! produces a whole new model that the owner installs atomically.
//!
//! Score convention follows the decision-function style the calibration is
//! defined against: lower is more anomalous, and an observation is
//! anomalous iff its score falls below the calibrated threshold.

pub mod forest;

use std::collections::BTreeMap;

use chrono::Duration;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::MetricSet;
use crate::error::CoreError;
use crate::types::{MetricId, Timestamp};
use crate::validation::{validate_min_count, validate_unit_range};
use crate::window::ObservationWindow;
use forest::IsolationForest;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Floor applied to per-feature standard deviation to avoid divide-by-zero
/// on constant training features.
pub const STD_FLOOR: f64 = 1e-9;

/// |z| above which a feature is Mild / Moderate / Severe.
pub const Z_MILD: f64 = 1.0;
pub const Z_MODERATE: f64 = 2.0;
pub const Z_SEVERE: f64 = 3.0;

// ---------------------------------------------------------------------------
// DetectorConfig
// ---------------------------------------------------------------------------

/// Tunables for training and staleness.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum complete rows the training window must hold.
    pub min_training_samples: usize,
    /// Fraction of training samples calibrated to score below the anomaly
    /// threshold (the contamination assumption).
    pub expected_anomaly_rate: f64,
    /// Trees in the isolation forest.
    pub tree_count: usize,
    /// Rows subsampled per tree.
    pub subsample_size: usize,
    /// Data age beyond which a trained model is considered stale.
    pub staleness_horizon: Duration,
    /// RNG seed fixed at training time so detection is deterministic.
    pub seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_training_samples: 30,
            expected_anomaly_rate: 0.01,
            tree_count: 100,
            subsample_size: 256,
            staleness_horizon: Duration::hours(24),
            seed: 42,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_min_count(self.min_training_samples, 2, "min_training_samples")?;
        validate_min_count(self.tree_count, 1, "tree_count")?;
        validate_min_count(self.subsample_size, 2, "subsample_size")?;
        validate_unit_range(self.expected_anomaly_rate, "expected_anomaly_rate")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Model state
// ---------------------------------------------------------------------------

/// Lifecycle state of a device + metric-set detector slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// No model trained yet; `detect()` reports `ModelNotReady`.
    Untrained,
    Trained,
    /// Training data has aged past the staleness horizon (or the model was
    /// explicitly invalidated); a retrain is due.
    Stale,
}

// ---------------------------------------------------------------------------
// Feature scaler
// ---------------------------------------------------------------------------

/// Per-feature z-scaling parameters captured from the training window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl FeatureScaler {
    /// Fit means and floored standard deviations over a rectangular matrix.
    fn fit(matrix: &[Vec<f64>]) -> Self {
        let rows = matrix.len() as f64;
        let dims = matrix[0].len();

        let mut means = vec![0.0; dims];
        for row in matrix {
            for (i, v) in row.iter().enumerate() {
                means[i] += v;
            }
        }
        for m in &mut means {
            *m /= rows;
        }

        let mut stds = vec![0.0; dims];
        for row in matrix {
            for (i, v) in row.iter().enumerate() {
                let d = v - means[i];
                stds[i] += d * d;
            }
        }
        for s in &mut stds {
            *s = (*s / rows).sqrt().max(STD_FLOOR);
        }

        Self { means, stds }
    }

    /// Z-score one row.
    fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(i, v)| (v - self.means[i]) / self.stds[i])
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Detection output
// ---------------------------------------------------------------------------

/// Deviation bucket for a single feature, from its |z| against the
/// training distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationSeverity {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl DeviationSeverity {
    pub fn from_z(z: f64) -> Self {
        let a = z.abs();
        if a > Z_SEVERE {
            Self::Severe
        } else if a > Z_MODERATE {
            Self::Moderate
        } else if a > Z_MILD {
            Self::Mild
        } else {
            Self::Normal
        }
    }
}

/// Per-metric breakdown of one detection.
#[derive(Debug, Clone, Serialize)]
pub struct MetricContribution {
    /// Observed (post-scaling) value.
    pub value: f64,
    /// Z-score against the training distribution.
    pub z_score: f64,
    pub severity: DeviationSeverity,
}

/// Result of scoring one observation vector.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub is_anomaly: bool,
    /// Calibrated score; lower is more anomalous.
    pub score: f64,
    /// Decision threshold fixed at training time.
    pub threshold: f64,
    pub per_metric: BTreeMap<MetricId, MetricContribution>,
}

impl Detection {
    /// The metric with the largest |z|, i.e. the dominant contributor.
    pub fn dominant_metric(&self) -> Option<&MetricId> {
        self.per_metric
            .iter()
            .max_by(|a, b| {
                a.1.z_score
                    .abs()
                    .total_cmp(&b.1.z_score.abs())
            })
            .map(|(id, _)| id)
    }
}

// ---------------------------------------------------------------------------
// AnomalyModel
// ---------------------------------------------------------------------------

/// Trained state for one device + metric set. Immutable; replaced, never
/// mutated, on retrain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyModel {
    metric_set: MetricSet,
    scaler: FeatureScaler,
    forest: IsolationForest,
    /// Calibrated decision threshold: scores below it are anomalous.
    threshold: f64,
    /// Timestamp of the newest training sample.
    trained_at: Timestamp,
    /// Complete rows the model was trained on.
    sample_count: usize,
    seed: u64,
}

impl AnomalyModel {
    /// Train a model over the window's complete rows for `metric_set`.
    ///
    /// Fails with `InsufficientData` when fewer than
    /// `config.min_training_samples` complete rows are available, and with
    /// `InvalidWindow` when the window is empty.
    pub fn train(
        metric_set: &MetricSet,
        window: &ObservationWindow,
        config: &DetectorConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let trained_at = window
            .newest_timestamp()
            .ok_or_else(|| CoreError::InvalidWindow("window is empty".to_string()))?;

        let matrix = window.matrix(&metric_set.metrics);
        if matrix.len() < config.min_training_samples {
            return Err(CoreError::InsufficientData {
                needed: config.min_training_samples,
                got: matrix.len(),
            });
        }

        let scaler = FeatureScaler::fit(&matrix);
        let scaled: Vec<Vec<f64>> = matrix.iter().map(|r| scaler.transform(r)).collect();

        let mut rng = StdRng::seed_from_u64(config.seed);
        let forest = IsolationForest::fit(
            &scaled,
            config.tree_count,
            config.subsample_size,
            &mut rng,
        );

        let threshold = calibrate_threshold(&forest, &scaled, config.expected_anomaly_rate);

        tracing::info!(
            metric_set = %metric_set.id,
            samples = matrix.len(),
            threshold,
            "trained anomaly model"
        );

        Ok(Self {
            metric_set: metric_set.clone(),
            scaler,
            forest,
            threshold,
            trained_at,
            sample_count: matrix.len(),
            seed: config.seed,
        })
    }

    /// Score one observation vector against this model.
    ///
    /// The vector must carry exactly the metrics the model was trained on;
    /// missing or extra dimensions fail with `IncompleteObservation` rather
    /// than silently imputing.
    pub fn detect(&self, values: &BTreeMap<MetricId, f64>) -> Result<Detection, CoreError> {
        let expected = self.metric_set.metrics.len();
        if values.len() != expected {
            return Err(CoreError::IncompleteObservation(format!(
                "expected {expected} features for metric set '{}', got {}",
                self.metric_set.id,
                values.len()
            )));
        }

        let mut row = Vec::with_capacity(expected);
        for metric in &self.metric_set.metrics {
            let value = values.get(metric).ok_or_else(|| {
                CoreError::IncompleteObservation(format!(
                    "feature '{metric}' is missing from the observation vector"
                ))
            })?;
            row.push(*value);
        }

        let scaled = self.scaler.transform(&row);
        let score = decision_score(&self.forest, &scaled);

        let per_metric = self
            .metric_set
            .metrics
            .iter()
            .zip(row.iter().zip(scaled.iter()))
            .map(|(metric, (&value, &z))| {
                (
                    metric.clone(),
                    MetricContribution {
                        value,
                        z_score: z,
                        severity: DeviationSeverity::from_z(z),
                    },
                )
            })
            .collect();

        Ok(Detection {
            is_anomaly: score < self.threshold,
            score,
            threshold: self.threshold,
            per_metric,
        })
    }

    /// Trained / Stale relative to the newest data timestamp.
    pub fn state(&self, newest_data: Timestamp, staleness_horizon: Duration) -> ModelState {
        if newest_data - self.trained_at > staleness_horizon {
            ModelState::Stale
        } else {
            ModelState::Trained
        }
    }

    pub fn metric_set(&self) -> &MetricSet {
        &self.metric_set
    }

    pub fn trained_at(&self) -> Timestamp {
        self.trained_at
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Serialize the full trained state to an opaque blob for warm restart.
    pub fn to_snapshot(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Restore a model from [`Self::to_snapshot`] output. Round-trips
    /// exactly: the restored model produces identical `detect()` results.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Decision-function style score: `0.5 - forest score`, so inliers sit
/// above zero and outliers fall below.
fn decision_score(forest: &IsolationForest, scaled_row: &[f64]) -> f64 {
    0.5 - forest.score(scaled_row)
}

/// Calibrate the threshold to the expected-anomaly-rate quantile of the
/// training scores, linearly interpolated between order statistics so the
/// threshold sits between sample scores rather than exactly on the lowest
/// one. Roughly `rate` of the training rows score strictly below it, and a
/// probe at or beyond the most extreme training row still falls under it.
fn calibrate_threshold(forest: &IsolationForest, scaled: &[Vec<f64>], rate: f64) -> f64 {
    let mut scores: Vec<f64> = scaled.iter().map(|r| decision_score(forest, r)).collect();
    scores.sort_by(f64::total_cmp);

    let q = rate * (scores.len() - 1) as f64;
    let lo = q.floor() as usize;
    let hi = q.ceil() as usize;
    let frac = q - lo as f64;
    scores[lo] + (scores[hi] - scores[lo]) * frac
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
