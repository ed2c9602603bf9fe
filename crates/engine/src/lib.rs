//! Async evaluation engine on top of `ovenwatch-core`.
//!
//! The core crate is pure and synchronous; this crate adds the runtime
//! pieces around it:
//!
//! - [`registry`]: shared slots holding the trained anomaly model per
//!   device and metric set, replaced atomically on retrain.
//! - [`cycle`]: the per-device evaluation cycle that trains on the
//!   blocking pool, runs detection and forecasting concurrently, and
//!   assembles the health report and advisories.

pub mod cycle;
pub mod registry;

pub use cycle::{DeviceEvaluation, EngineSettings, EvaluationEngine};
pub use registry::{ModelRegistry, ModelSlot};
