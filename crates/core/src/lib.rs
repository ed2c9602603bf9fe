//! Analytics core for industrial sensor monitoring.
//!
//! Turns periodic controller snapshots (temperatures, motor currents,
//! pressures, electrical metering) into operational intelligence: per-device
//! anomaly verdicts, short-horizon trend forecasts, and an aggregate health
//! score with ranked maintenance advisories.
//!
//! Pure logic, no network or database access. Raw readings arrive already
//! fetched and timestamped; how they were collected (and how the outputs
//! are presented) is the collaborators' business. Data flows one way:
//!
//! ```text
//! normalize → { anomaly detect, forecast } → health score → advisories
//! ```

pub mod advisory;
pub mod anomaly;
pub mod config;
pub mod error;
pub mod forecast;
pub mod health;
pub mod limits;
pub mod normalize;
pub mod types;
pub mod validation;
pub mod window;

pub use error::CoreError;
