use crate::interface::detection::{DetectionEvent, EventKind};
use crate::interface::store::BaselineStore;
use crate::prelude::{unix_timestamp, CoreError, CoreResult, DetectorConfig, Sweep, SweepGrid};
use crate::processing::baseline::{BaselineEstimator, BaselineStatus};
use crate::processing::history::HistoryBuffer;
use crate::processing::segment::SegmentDetector;
use crate::processing::tracker::{RangeKey, RangeTracker};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use log::warn;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the session stood when a sweep was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Warming { observed: usize, required: usize },
    FillingHistory { held: usize, capacity: usize },
    Analyzing,
}

/// Summary produced for every sweep, including quiet ones.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sweep_index: u64,
    pub phase: CyclePhase,
    pub elapsed: Duration,
    pub events: Vec<DetectionEvent>,
    pub tracked: usize,
}

impl CycleReport {
    /// Created or refreshed ranges this cycle.
    pub fn alerts(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Created | EventKind::Refreshed))
            .count()
    }

    pub fn evictions(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::Evicted)
            .count()
    }

    /// Keys of ranges first seen this cycle and still tracked at its end.
    pub fn created_keys(&self) -> Vec<RangeKey> {
        let evicted: Vec<RangeKey> = self
            .events
            .iter()
            .filter(|e| e.kind == EventKind::Evicted)
            .map(|e| RangeKey::from_range(&e.range))
            .collect();
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::Created)
            .map(|e| RangeKey::from_range(&e.range))
            .filter(|key| !evicted.contains(key))
            .collect()
    }
}

/// Owned per-session detection state: baseline, history and the tracked map.
///
/// `process` runs synchronously on the sweep path and never touches
/// hardware; correlation is left to the caller.
pub struct DetectionEngine {
    config: DetectorConfig,
    grid: SweepGrid,
    baseline: BaselineEstimator,
    history: HistoryBuffer,
    detector: SegmentDetector,
    tracker: Arc<RangeTracker>,
    store: Option<Box<dyn BaselineStore>>,
    session_shape: Option<(usize, usize)>,
    sweeps: u64,
    last_sweep: Option<Instant>,
    logger: LogManager,
    metrics: Arc<MetricsRecorder>,
}

impl DetectionEngine {
    pub fn new(config: DetectorConfig, grid: SweepGrid) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            baseline: BaselineEstimator::new(config.baseline_sweeps, config.baseline_mode),
            history: HistoryBuffer::with_capacity(config.history_len),
            detector: SegmentDetector::from_config(&config),
            tracker: Arc::new(RangeTracker::from_config(&config)),
            store: None,
            session_shape: None,
            sweeps: 0,
            last_sweep: None,
            logger: LogManager::new(),
            metrics: Arc::new(MetricsRecorder::new()),
            config,
            grid,
        })
    }

    /// Attaches a baseline store and resumes from its contents if present.
    pub fn with_store(mut self, store: Box<dyn BaselineStore>) -> CoreResult<Self> {
        if let Some(stored) = store.load()? {
            self.logger.record(&format!(
                "loaded stored baseline {:?}, skipping warm-up",
                stored.dim()
            ));
            self.baseline = BaselineEstimator::from_stored(
                stored,
                self.config.baseline_sweeps,
                self.config.baseline_mode,
            );
        }
        self.store = Some(store);
        Ok(self)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn tracker(&self) -> Arc<RangeTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    pub fn baseline(&self) -> Option<&Sweep> {
        self.baseline.baseline()
    }

    pub fn grid(&self) -> &SweepGrid {
        &self.grid
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs one detection cycle for `sweep`.
    ///
    /// A sweep whose shape differs from the session's resets baseline,
    /// history and tracked ranges, and is reported as `ShapeMismatch`; the
    /// next sweep starts a fresh session.
    pub fn process(&mut self, sweep: &Sweep) -> CoreResult<CycleReport> {
        let now = Instant::now();
        let elapsed = self
            .last_sweep
            .map(|last| now.duration_since(last))
            .unwrap_or_default();
        self.last_sweep = Some(now);
        self.sweeps += 1;

        if sweep.is_empty() {
            return Err(CoreError::EmptySweep);
        }
        self.check_session_shape(sweep.dim())?;

        let view = sweep.view();
        let phase = if !self.baseline.is_ready() {
            match self.baseline.observe(view)? {
                BaselineStatus::Warming { observed, required } => {
                    CyclePhase::Warming { observed, required }
                }
                BaselineStatus::Ready => {
                    self.logger.record("baseline established");
                    self.persist_baseline();
                    CyclePhase::Warming {
                        observed: self.config.baseline_sweeps,
                        required: self.config.baseline_sweeps,
                    }
                }
            }
        } else if !self.history.is_full() {
            self.history.push(view)?;
            CyclePhase::FillingHistory {
                held: self.history.len(),
                capacity: self.history.capacity(),
            }
        } else {
            CyclePhase::Analyzing
        };

        let events = if phase == CyclePhase::Analyzing {
            self.analyze(sweep)?
        } else {
            Vec::new()
        };

        let report = CycleReport {
            sweep_index: self.sweeps,
            phase,
            elapsed,
            events,
            tracked: self.tracker.len(),
        };
        self.metrics
            .record_sweep(report.alerts(), report.evictions());
        for event in &report.events {
            self.logger.record_event(event);
        }
        self.logger.record_cycle(&report);
        Ok(report)
    }

    fn analyze(&mut self, sweep: &Sweep) -> CoreResult<Vec<DetectionEvent>> {
        let dispersion = self
            .history
            .stddev()
            .ok_or_else(|| CoreError::InvalidConfig("history not full".into()))?;
        let baseline = self
            .baseline
            .baseline()
            .ok_or_else(|| CoreError::InvalidConfig("baseline not ready".into()))?;

        let segments = self
            .detector
            .detect(sweep.view(), baseline.view(), dispersion.view())?;
        let events = self
            .tracker
            .apply_cycle(sweep.view(), &segments, &self.grid, unix_timestamp());

        self.history.push(sweep.view())?;
        self.baseline.observe(sweep.view())?;
        Ok(events)
    }

    fn check_session_shape(&mut self, actual: (usize, usize)) -> CoreResult<()> {
        match self.session_shape {
            None => {
                if let Some(expected) = self.baseline.shape() {
                    if expected != actual {
                        warn!(
                            "stored baseline {:?} does not match sweep {:?}, warming up again",
                            expected, actual
                        );
                        self.baseline.reset();
                    }
                }
                self.session_shape = Some(actual);
                Ok(())
            }
            Some(expected) if expected != actual => {
                warn!(
                    "sweep shape changed from {:?} to {:?}, restarting session",
                    expected, actual
                );
                self.reset();
                self.metrics.record_reset();
                Err(CoreError::ShapeMismatch { expected, actual })
            }
            Some(_) => Ok(()),
        }
    }

    fn persist_baseline(&self) {
        if let (Some(store), Some(baseline)) = (&self.store, self.baseline.baseline()) {
            if let Err(err) = store.save(baseline) {
                warn!("could not persist baseline: {}", err);
            }
        }
    }

    /// Drops all session state; the next sweep starts warm-up from scratch.
    pub fn reset(&mut self) {
        self.baseline.reset();
        self.history.reset();
        self.tracker.clear();
        self.session_shape = None;
    }
}
