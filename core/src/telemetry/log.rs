use crate::interface::detection::DetectionEvent;
use crate::processing::engine::{CyclePhase, CycleReport};
use log::info;

pub struct LogManager;

impl LogManager {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, message: &str) {
        info!("{}", message);
    }

    pub fn record_event(&self, event: &DetectionEvent) {
        info!("{}", event.summary());
    }

    /// Per-sweep summary; emitted even when nothing was flagged.
    pub fn record_cycle(&self, report: &CycleReport) {
        let elapsed = report.elapsed.as_secs_f64();
        match report.phase {
            CyclePhase::Warming { observed, required } => info!(
                "sweep {} took {:.2} s, baseline warm-up {}/{}",
                report.sweep_index, elapsed, observed, required
            ),
            CyclePhase::FillingHistory { held, capacity } => info!(
                "sweep {} took {:.2} s, history {}/{}",
                report.sweep_index, elapsed, held, capacity
            ),
            CyclePhase::Analyzing => {
                let alerts = report.alerts();
                if alerts == 0 {
                    info!(
                        "sweep {} took {:.2} s, no suspicious activity ({} tracked)",
                        report.sweep_index, elapsed, report.tracked
                    );
                } else {
                    info!(
                        "sweep {} took {:.2} s, {} alerts ({} tracked)",
                        report.sweep_index, elapsed, alerts, report.tracked
                    );
                }
            }
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
