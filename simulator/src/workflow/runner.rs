use crate::generator::probes::SimulatedProbe;
use crate::generator::profile::{SweepClock, SyntheticSweepSource};
use crate::status::bridge::StatusBridge;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use log::{info, warn};
use sentrycore::interface::{DetectionEvent, FrequencyProber, JsonBaselineStore, SweepSource};
use sentrycore::prelude::CoreError;
use sentrycore::processing::{CorrelationCoordinator, Correlator, DetectionEngine, TrackedRange};
use sentrycore::telemetry::{Metrics, MetricsRecorder};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

pub struct WorkflowResult {
    pub sweeps: usize,
    pub session_resets: usize,
    pub detections: Vec<DetectionEvent>,
    pub correlations: Vec<DetectionEvent>,
    pub tracked: Vec<TrackedRange>,
    pub metrics: Metrics,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    fn build_probes(&self, clock: &SweepClock) -> Vec<Box<dyn FrequencyProber>> {
        self.config
            .aux_devices
            .iter()
            .enumerate()
            .filter_map(|(idx, device)| {
                if !device.available {
                    warn!("aux device {} unavailable, correlating without it", device.name);
                    return None;
                }
                let seed = self.config.scenario.seed.wrapping_add(idx as u64 + 1);
                let probe = SimulatedProbe::new(device, &self.config.scenario, clock.clone(), seed);
                Some(Box::new(probe) as Box<dyn FrequencyProber>)
            })
            .collect()
    }

    /// Drives the sweep loop on the calling thread; correlation rounds and
    /// the refresher run on `handle`. Must not be called from inside the
    /// runtime.
    pub fn execute(&self, handle: &Handle, bridge: Option<&StatusBridge>) -> anyhow::Result<WorkflowResult> {
        self.config
            .correlation
            .validate()
            .context("validating correlation timings")?;
        let grid = self.config.scan.grid()?;
        let metrics = Arc::new(MetricsRecorder::new());
        let mut engine = DetectionEngine::new(self.config.detector.clone(), grid)
            .context("creating detection engine")?
            .with_metrics(metrics.clone());
        if let Some(path) = &self.config.baseline_path {
            let store = JsonBaselineStore::new(path);
            let location = store.path().display().to_string();
            engine = engine
                .with_store(Box::new(store))
                .with_context(|| format!("loading baseline from {}", location))?;
        }

        let clock = SweepClock::default();
        let mut source = SyntheticSweepSource::new(&self.config, clock.clone())?;
        let coordinator = CorrelationCoordinator::new(
            self.build_probes(&clock),
            Duration::from_millis(self.config.correlation.probe_timeout_ms),
        )
        .with_metrics(metrics.clone());
        info!(
            "correlating with {} aux devices {:?}, {} ms probe timeout",
            coordinator.device_count(),
            coordinator.device_names(),
            coordinator.timeout().as_millis()
        );

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(
            Correlator::new(Arc::new(coordinator), engine.tracker()).with_events(events_tx),
        );
        let collector_bridge = bridge.cloned();
        let collector = handle.spawn(async move {
            let mut correlations = Vec::new();
            while let Some(event) = events_rx.recv().await {
                info!("{}", event.summary());
                if let Some(bridge) = &collector_bridge {
                    bridge.push_event(event.clone());
                }
                correlations.push(event);
            }
            correlations
        });
        let refresher = correlator.spawn_refresher(
            handle,
            Duration::from_millis(self.config.correlation.refresh_interval_ms),
        );

        let mut sweeps = 0;
        let mut session_resets = 0;
        let mut detections = Vec::new();
        let mut dispatched = Vec::new();
        while let Some(sweep) = source.next_sweep().context("reading sweep")? {
            sweeps += 1;
            let report = match engine.process(&sweep) {
                Ok(report) => report,
                Err(CoreError::ShapeMismatch { expected, actual }) => {
                    warn!("discarding sweep {:?}, session expected {:?}", actual, expected);
                    session_resets += 1;
                    continue;
                }
                Err(err) => return Err(err).context("processing sweep"),
            };

            for key in report.created_keys() {
                dispatched.push(correlator.dispatch(handle, key));
            }
            if let Some(bridge) = bridge {
                for event in &report.events {
                    bridge.push_event(event.clone());
                }
                bridge.publish_tracked(report.sweep_index, engine.tracker().snapshot());
                bridge.publish_metrics(metrics.snapshot());
            }
            detections.extend(report.events);
        }

        handle
            .block_on(async {
                for task in dispatched {
                    task.await.context("on-detection correlation task failed")?;
                }
                refresher.stop().await.context("refresher task failed")
            })?;
        drop(correlator);
        let correlations = handle
            .block_on(collector)
            .context("joining correlation collector")?;

        let tracked = engine.tracker().snapshot();
        let metrics = metrics.snapshot();
        if let Some(bridge) = bridge {
            bridge.publish_tracked(sweeps as u64, tracked.clone());
            bridge.publish_metrics(metrics);
        }
        Ok(WorkflowResult {
            sweeps,
            session_resets,
            detections,
            correlations,
            tracked,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::EmitterConfig;
    use sentrycore::interface::{EventKind, ProbeReading};
    use tempfile::tempdir;
    use tokio::runtime::Builder;

    fn config() -> WorkflowConfig {
        let mut cfg = WorkflowConfig::from_args(2400.0, 2420.0, 5.0, 8);
        cfg.sweep_interval_ms = 0;
        cfg.detector.baseline_sweeps = 2;
        cfg.detector.history_len = 3;
        cfg.correlation.refresh_interval_ms = 50;
        cfg.scenario.emitters = vec![EmitterConfig {
            name: "video".into(),
            center_hz: 2_410e6,
            width_hz: 1e6,
            power_db: -40.0,
            start_sweep: 5,
            stop_sweep: None,
        }];
        cfg
    }

    #[test]
    fn runner_detects_and_correlates_emitter() {
        let runtime = Builder::new_multi_thread().enable_all().build().unwrap();
        let bridge = StatusBridge::new();
        let result = Runner::new(config())
            .execute(runtime.handle(), Some(&bridge))
            .unwrap();

        assert_eq!(result.sweeps, 8);
        assert_eq!(result.session_resets, 0);
        assert!(result
            .detections
            .iter()
            .any(|e| e.kind == EventKind::Created
                && e.range.start_hz <= 2_410e6
                && e.range.end_hz >= 2_410e6));
        assert!(!result.tracked.is_empty());

        let correlated = result
            .correlations
            .iter()
            .find(|e| e.range.start_hz <= 2_410e6 && e.range.end_hz >= 2_410e6)
            .unwrap();
        assert_eq!(correlated.aux.len(), 2);
        assert!(correlated
            .aux
            .iter()
            .all(|r| matches!(r, ProbeReading::Level(_))));
        assert_eq!(result.metrics.sweeps, 8);
        assert_eq!(bridge.snapshot().tracked.len(), result.tracked.len());
    }

    #[test]
    fn zero_refresh_interval_fails_before_sweeping() {
        let runtime = Builder::new_multi_thread().enable_all().build().unwrap();
        let mut cfg = config();
        cfg.correlation.refresh_interval_ms = 0;
        let err = Runner::new(cfg)
            .execute(runtime.handle(), None)
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("refresh_interval_ms"));
    }

    #[test]
    fn unavailable_device_is_left_out_of_readings() {
        let runtime = Builder::new_multi_thread().enable_all().build().unwrap();
        let mut cfg = config();
        cfg.aux_devices[1].available = false;
        let result = Runner::new(cfg).execute(runtime.handle(), None).unwrap();
        assert!(result.correlations.iter().all(|e| e.aux.len() == 1));
    }

    #[test]
    fn baseline_is_persisted_and_reused() {
        let runtime = Builder::new_multi_thread().enable_all().build().unwrap();
        let dir = tempdir().unwrap();
        let mut cfg = config();
        cfg.baseline_path = Some(dir.path().join("baseline.json"));
        cfg.scenario.emitters.clear();
        cfg.sweeps = 3;

        Runner::new(cfg.clone()).execute(runtime.handle(), None).unwrap();
        assert!(dir.path().join("baseline.json").exists());

        let result = Runner::new(cfg).execute(runtime.handle(), None).unwrap();
        assert_eq!(result.sweeps, 3);
        assert!(result.detections.is_empty());
    }
}
