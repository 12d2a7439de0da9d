pub mod detection;
pub mod probe;
pub mod source;
pub mod store;

pub use detection::{DetectionEvent, EventKind};
pub use probe::{CorrelationResult, FrequencyProber, ProbeError, ProbeReading};
pub use source::SweepSource;
pub use store::{BaselineSnapshot, BaselineStore, JsonBaselineStore};
