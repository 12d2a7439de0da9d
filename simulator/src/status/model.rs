use sentrycore::interface::DetectionEvent;
use sentrycore::processing::TrackedRange;
use sentrycore::telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Most recent events kept for `/events`.
pub const RECENT_EVENTS: usize = 64;

/// Snapshot served over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusModel {
    pub sweeps: u64,
    pub tracked: Vec<TrackedRange>,
    pub recent_events: VecDeque<DetectionEvent>,
    pub metrics: Metrics,
}

impl StatusModel {
    pub fn push_event(&mut self, event: DetectionEvent) {
        if self.recent_events.len() == RECENT_EVENTS {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event);
    }
}
