pub mod baseline;
pub mod classifier;
pub mod correlation;
pub mod engine;
pub mod history;
pub mod refresher;
pub mod segment;
pub mod tracker;

pub use baseline::{BaselineEstimator, BaselineStatus};
pub use classifier::{classify, SignalClass};
pub use correlation::CorrelationCoordinator;
pub use engine::{CyclePhase, CycleReport, DetectionEngine};
pub use history::HistoryBuffer;
pub use refresher::{Correlator, RefresherHandle};
pub use segment::{Segment, SegmentDetector};
pub use tracker::{RangeKey, RangeTracker, TrackedRange};
