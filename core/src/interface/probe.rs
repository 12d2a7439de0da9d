use serde::{Deserialize, Serialize};

/// Failure reported by an auxiliary receiver.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("device {device} i/o failure: {reason}")]
    Io { device: String, reason: String },
    #[error("device {0} is no longer available")]
    Lost(String),
}

/// Auxiliary receiver that can be retuned and asked for a single power reading.
///
/// Both calls may block on hardware latency; callers wrap them with a timeout.
pub trait FrequencyProber: Send {
    fn name(&self) -> &str;
    fn set_frequency(&mut self, hz: f64) -> Result<(), ProbeError>;
    fn measure(&mut self) -> Result<f32, ProbeError>;
}

/// Outcome for one auxiliary slot in a correlation round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "db", rename_all = "snake_case")]
pub enum ProbeReading {
    Level(f32),
    TimedOut,
    Failed,
}

impl ProbeReading {
    pub fn level(&self) -> Option<f32> {
        match self {
            ProbeReading::Level(db) => Some(*db),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProbeReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeReading::Level(db) => write!(f, "{:.1} dBm", db),
            ProbeReading::TimedOut => write!(f, "timeout"),
            ProbeReading::Failed => write!(f, "failed"),
        }
    }
}

/// One complete correlation round: a reading slot per configured device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub timestamp: f64,
    pub center_hz: f64,
    pub readings: Vec<ProbeReading>,
}
