//! Error taxonomy for the analytics core.
//!
//! Every failure in this crate is a value returned to the caller; nothing
//! here aborts the process. Per-device and per-metric failures are isolated
//! by the callers (see the engine crate), so a single bad reading or an
//! untrained model never takes down a whole evaluation cycle.

/// Unified error type for the analytics core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A device or metric reference is not present in the loaded
    /// configuration. Fatal for the single call only.
    #[error("unknown device or metric reference: {0}")]
    ConfigMismatch(String),

    /// No trained model is installed yet. A normal, expected state during
    /// warm-up, not a fault.
    #[error("anomaly model is not trained yet")]
    ModelNotReady,

    /// The observation vector does not match the feature set the model was
    /// trained on. The caller must backfill the missing metrics or skip.
    #[error("incomplete observation: {0}")]
    IncompleteObservation(String),

    /// Too few data points for the requested computation.
    #[error("insufficient data: need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// An observation window is empty or its timestamps are not monotonic.
    #[error("invalid observation window: {0}")]
    InvalidWindow(String),

    /// A configuration or parameter value failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A model snapshot blob could not be encoded or decoded.
    #[error("model snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}
