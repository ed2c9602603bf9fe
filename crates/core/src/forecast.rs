//! Short-horizon trend forecasting.
//!
//! Fits an ordinary-least-squares line per metric over the supplied window
//! (elapsed seconds vs. value), classifies the trend, and extrapolates the
//! line at the window's mean sampling interval. Recomputed on every call;
//! nothing is persisted.

use chrono::Duration;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::{MetricId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Trend epsilon as a fraction of the observed value stddev: the fitted
/// change across the window span must exceed this fraction of the stddev to
/// count as rising/falling.
pub const TREND_EPSILON_RATIO: f64 = 0.5;

/// R² below which the forecast is flagged low-confidence. The forecast is
/// still produced; consumers discount it.
pub const MIN_USEFUL_R2: f64 = 0.3;

/// Floor for the stddev used in the trend epsilon, so a perfectly flat
/// series classifies as stable instead of dividing into noise.
const STD_FLOOR: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Direction of the fitted trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// Projection of one metric over the forecast horizon.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub metric_id: MetricId,
    /// Fitted line extrapolated at future offsets spaced by the window's
    /// mean sampling interval.
    pub points: Vec<(Timestamp, f64)>,
    pub trend: Trend,
    /// Coefficient of determination (R²), clamped to [0, 1].
    pub confidence: f64,
    /// True when `confidence` is below [`MIN_USEFUL_R2`].
    pub low_confidence: bool,
    /// Fitted slope in value units per second.
    pub slope: f64,
}

// ---------------------------------------------------------------------------
// Forecasting
// ---------------------------------------------------------------------------

/// Fit and project one metric's series.
///
/// Requires at least two distinct timestamps, otherwise
/// `InsufficientData`. Timestamps must be non-decreasing (`InvalidWindow`
/// otherwise); the series normally comes straight from an
/// `ObservationWindow`, which already guarantees that.
pub fn forecast(
    metric_id: &str,
    series: &[(Timestamp, f64)],
    horizon_points: usize,
) -> Result<ForecastResult, CoreError> {
    let distinct = distinct_timestamps(series)?;
    if distinct < 2 {
        return Err(CoreError::InsufficientData {
            needed: 2,
            got: distinct,
        });
    }

    let t0 = series[0].0;
    let xs: Vec<f64> = series
        .iter()
        .map(|(t, _)| (*t - t0).num_milliseconds() as f64 / 1000.0)
        .collect();
    let ys: Vec<f64> = series.iter().map(|(_, v)| *v).collect();

    let fit = ols(&xs, &ys);

    // Mean sampling interval drives the projection spacing.
    let span = *xs.last().expect("non-empty") - xs[0];
    let mean_interval = span / (series.len() - 1) as f64;

    let last_ts = series.last().expect("non-empty").0;
    let last_x = *xs.last().expect("non-empty");
    let points = (1..=horizon_points)
        .map(|k| {
            let dt = mean_interval * k as f64;
            let ts = last_ts + Duration::milliseconds((dt * 1000.0).round() as i64);
            (ts, fit.intercept + fit.slope * (last_x + dt))
        })
        .collect();

    // Trend: fitted change across the window span, relative to the value
    // stddev. Slope-per-second alone misreads long windows.
    let std = stddev(&ys).max(STD_FLOOR);
    let span_change = fit.slope * span;
    let epsilon = TREND_EPSILON_RATIO * std;
    let trend = if span_change > epsilon {
        Trend::Rising
    } else if span_change < -epsilon {
        Trend::Falling
    } else {
        Trend::Stable
    };

    let confidence = fit.r_squared.clamp(0.0, 1.0);

    Ok(ForecastResult {
        metric_id: metric_id.to_string(),
        points,
        trend,
        confidence,
        low_confidence: confidence < MIN_USEFUL_R2,
        slope: fit.slope,
    })
}

/// Count distinct timestamps, rejecting out-of-order series.
fn distinct_timestamps(series: &[(Timestamp, f64)]) -> Result<usize, CoreError> {
    let mut distinct = 0;
    let mut prev: Option<Timestamp> = None;
    for (t, _) in series {
        match prev {
            Some(p) if *t < p => {
                return Err(CoreError::InvalidWindow(
                    "series timestamps are not monotonic".to_string(),
                ));
            }
            Some(p) if *t == p => {}
            _ => distinct += 1,
        }
        prev = Some(*t);
    }
    Ok(distinct)
}

struct OlsFit {
    slope: f64,
    intercept: f64,
    r_squared: f64,
}

/// Plain least-squares line fit with R².
fn ols(xs: &[f64], ys: &[f64]) -> OlsFit {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    // distinct_timestamps >= 2 guarantees sxx > 0.
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    // R² = 1 - SSE/SST; a constant series fits perfectly.
    let r_squared = if syy == 0.0 {
        1.0
    } else {
        1.0 - (syy - slope * sxy) / syy
    };

    OlsFit {
        slope,
        intercept,
        r_squared,
    }
}

fn stddev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
