use serde::{Deserialize, Serialize};
use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub sweeps: u64,
    pub alerts: u64,
    pub evictions: u64,
    pub correlation_rounds: u64,
    pub probe_timeouts: u64,
    pub probe_failures: u64,
    pub session_resets: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Metrics)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_sweep(&self, alerts: usize, evictions: usize) {
        self.update(|m| {
            m.sweeps += 1;
            m.alerts += alerts as u64;
            m.evictions += evictions as u64;
        });
    }

    pub fn record_round(&self, timeouts: usize, failures: usize) {
        self.update(|m| {
            m.correlation_rounds += 1;
            m.probe_timeouts += timeouts as u64;
            m.probe_failures += failures as u64;
        });
    }

    pub fn record_reset(&self) {
        self.update(|m| m.session_resets += 1);
    }

    pub fn snapshot(&self) -> Metrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            Metrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
