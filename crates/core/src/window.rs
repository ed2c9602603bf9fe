//! Sliding observation window.
//!
//! One `ObservationWindow` holds the recent history for a single device as
//! time-ordered rows (one row per snapshot timestamp). It is the training
//! and scoring input for the anomaly detector and the forecaster. Rows are
//! only ever appended at the newest end; rows older than the lookback
//! horizon (and beyond the optional row cap) are evicted FIFO on append.

use std::collections::{BTreeMap, VecDeque};

use chrono::Duration;

use crate::error::CoreError;
use crate::normalize::Observation;
use crate::types::{DeviceId, MetricId, Timestamp};

/// One snapshot row: every metric value observed at a single timestamp.
#[derive(Debug, Clone)]
pub struct WindowRow {
    pub timestamp: Timestamp,
    pub values: BTreeMap<MetricId, f64>,
}

/// Bounded, time-ordered buffer of recent readings for one device.
#[derive(Debug, Clone)]
pub struct ObservationWindow {
    device_id: DeviceId,
    /// Maximum age of a row relative to the newest row.
    horizon: Duration,
    /// Optional hard cap on row count, applied after the horizon.
    max_rows: Option<usize>,
    rows: VecDeque<WindowRow>,
}

impl ObservationWindow {
    /// Create an empty window with the given lookback horizon.
    pub fn new(device_id: impl Into<DeviceId>, horizon: Duration) -> Self {
        Self {
            device_id: device_id.into(),
            horizon,
            max_rows: None,
            rows: VecDeque::new(),
        }
    }

    /// Additionally cap the window at `max_rows` rows.
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn newest_timestamp(&self) -> Option<Timestamp> {
        self.rows.back().map(|r| r.timestamp)
    }

    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.rows.front().map(|r| r.timestamp)
    }

    /// Append one snapshot's observations as a new row.
    ///
    /// All observations must share the row timestamp and belong to this
    /// window's device. Rows must arrive in non-decreasing timestamp order;
    /// an older timestamp is rejected with `InvalidWindow`. Observations at
    /// a timestamp equal to the newest row are merged into that row.
    pub fn push(
        &mut self,
        timestamp: Timestamp,
        observations: &[Observation],
    ) -> Result<(), CoreError> {
        if let Some(newest) = self.newest_timestamp() {
            if timestamp < newest {
                return Err(CoreError::InvalidWindow(format!(
                    "out-of-order row: {timestamp} is older than newest {newest}"
                )));
            }
        }
        for obs in observations {
            if obs.device_id != self.device_id {
                return Err(CoreError::InvalidWindow(format!(
                    "observation for device '{}' pushed into window of '{}'",
                    obs.device_id, self.device_id
                )));
            }
            if obs.timestamp != timestamp {
                return Err(CoreError::InvalidWindow(format!(
                    "observation timestamp {} differs from row timestamp {timestamp}",
                    obs.timestamp
                )));
            }
        }

        let merge = self.newest_timestamp() == Some(timestamp);
        if merge {
            let row = self.rows.back_mut().expect("newest row exists");
            for obs in observations {
                row.values.insert(obs.metric_id.clone(), obs.value);
            }
        } else {
            let mut values = BTreeMap::new();
            for obs in observations {
                values.insert(obs.metric_id.clone(), obs.value);
            }
            self.rows.push_back(WindowRow { timestamp, values });
        }

        self.evict();
        Ok(())
    }

    /// Drop rows older than the horizon (relative to the newest row), then
    /// enforce the row cap.
    fn evict(&mut self) {
        if let Some(newest) = self.newest_timestamp() {
            let cutoff = newest - self.horizon;
            while let Some(front) = self.rows.front() {
                if front.timestamp < cutoff {
                    self.rows.pop_front();
                } else {
                    break;
                }
            }
        }
        if let Some(cap) = self.max_rows {
            while self.rows.len() > cap {
                self.rows.pop_front();
            }
        }
    }

    /// Time series of one metric: every row that carries a value for it.
    pub fn series(&self, metric_id: &str) -> Vec<(Timestamp, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.values.get(metric_id).map(|v| (r.timestamp, *v)))
            .collect()
    }

    /// Feature matrix over `metric_set`: one row per snapshot that carries
    /// a value for *every* metric in the set, in set order. Rows with gaps
    /// are skipped; the detector never trains on imputed values.
    pub fn matrix(&self, metric_set: &[MetricId]) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .filter_map(|r| {
                metric_set
                    .iter()
                    .map(|m| r.values.get(m).copied())
                    .collect::<Option<Vec<f64>>>()
            })
            .collect()
    }

    /// The newest row, or `InvalidWindow` when the window is empty.
    pub fn latest_row(&self) -> Result<&WindowRow, CoreError> {
        self.rows
            .back()
            .ok_or_else(|| CoreError::InvalidWindow("window is empty".to_string()))
    }

    /// Iterate rows oldest-first.
    pub fn rows(&self) -> impl Iterator<Item = &WindowRow> {
        self.rows.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
