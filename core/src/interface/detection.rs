use crate::interface::probe::ProbeReading;
use crate::prelude::{FrequencyRange, Sign};
use crate::processing::classifier::SignalClass;
use serde::{Deserialize, Serialize};

/// Tracked-range transition reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Refreshed,
    Evicted,
    Correlated,
}

/// Detection record emitted by the engine and the correlation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub kind: EventKind,
    pub range: FrequencyRange,
    pub sign: Sign,
    pub baseline_db: f32,
    pub current_db: f32,
    pub delta_db: f32,
    pub aux: Vec<ProbeReading>,
    pub label: Option<SignalClass>,
    pub count: u32,
    pub persistent: bool,
    pub timestamp: f64,
}

impl DetectionEvent {
    /// Single-line rendering used by the log output.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "[{}] {:?} range {:.3} - {:.3} MHz | delta {:+.1} dB",
            self.sign.symbol(),
            self.kind,
            self.range.start_hz / 1e6,
            self.range.end_hz / 1e6,
            self.delta_db
        );
        if let Some(label) = self.label {
            line.push_str(&format!(" | {}", label));
        }
        if self.persistent {
            line.push_str(" | persistent signal");
        }
        for (idx, reading) in self.aux.iter().enumerate() {
            line.push_str(&format!(" | aux {}: {}", idx + 1, reading));
        }
        line
    }
}
