//! Detection core for spectrum surveillance.
//!
//! A primary receiver's sweeps are averaged into a noise-floor baseline,
//! deviating bin runs are tracked as frequency ranges, and auxiliary
//! receivers are retuned to each range to corroborate the detection.

pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{CoreError, CoreResult, DetectorConfig, Sweep, SweepGrid};
