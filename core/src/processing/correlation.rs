use crate::interface::probe::{CorrelationResult, FrequencyProber, ProbeReading};
use crate::prelude::unix_timestamp;
use crate::telemetry::metrics::MetricsRecorder;
use log::{debug, warn};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;
use tokio::task::JoinSet;

type DeviceHandle = Arc<Mutex<Box<dyn FrequencyProber>>>;

/// Retunes every auxiliary receiver to one frequency and gathers a reading
/// from each, one round at a time.
///
/// Rounds are serialized by `round`; devices inside a round are measured
/// concurrently. Each device sits behind its own mutex, so a measurement
/// abandoned on timeout still finishes before that device is retuned again.
/// A device still busy with such a straggler when the next round starts
/// reports `TimedOut` for that round instead of queueing behind it.
pub struct CorrelationCoordinator {
    devices: Vec<DeviceHandle>,
    names: Vec<String>,
    timeout: Duration,
    round: tokio::sync::Mutex<()>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl CorrelationCoordinator {
    pub fn new(devices: Vec<Box<dyn FrequencyProber>>, timeout: Duration) -> Self {
        let names = devices.iter().map(|d| d.name().to_string()).collect();
        Self {
            devices: devices
                .into_iter()
                .map(|device| Arc::new(Mutex::new(device)))
                .collect(),
            names,
            timeout,
            round: tokio::sync::Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn device_names(&self) -> &[String] {
        &self.names
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one correlation round at `center_hz`.
    ///
    /// Never fails: a device that errors reports `Failed`, one that does not
    /// answer within the timeout reports `TimedOut`, and neither holds up the
    /// others.
    pub async fn correlate(&self, center_hz: f64) -> CorrelationResult {
        let _round = self.round.lock().await;
        let mut readings = vec![ProbeReading::Failed; self.devices.len()];

        let mut tasks = JoinSet::new();
        for (idx, device) in self.devices.iter().enumerate() {
            let device = Arc::clone(device);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let probe = tokio::task::spawn_blocking(move || probe_device(&device, center_hz));
                let reading = match tokio::time::timeout(timeout, probe).await {
                    Ok(Ok(reading)) => reading,
                    Ok(Err(err)) => {
                        warn!("aux {} probe task aborted: {}", idx + 1, err);
                        ProbeReading::Failed
                    }
                    Err(_) => ProbeReading::TimedOut,
                };
                (idx, reading)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Ok((idx, reading)) = joined {
                if reading == ProbeReading::TimedOut {
                    warn!(
                        "aux {} ({}) timed out at {:.3} MHz",
                        idx + 1,
                        self.names[idx],
                        center_hz / 1e6
                    );
                }
                readings[idx] = reading;
            }
        }

        if let Some(metrics) = &self.metrics {
            let timeouts = readings
                .iter()
                .filter(|r| **r == ProbeReading::TimedOut)
                .count();
            let failures = readings
                .iter()
                .filter(|r| **r == ProbeReading::Failed)
                .count();
            metrics.record_round(timeouts, failures);
        }
        debug!(
            "correlation round at {:.3} MHz: {:?}",
            center_hz / 1e6,
            readings
        );

        CorrelationResult {
            timestamp: unix_timestamp(),
            center_hz,
            readings,
        }
    }
}

fn probe_device(device: &Mutex<Box<dyn FrequencyProber>>, center_hz: f64) -> ProbeReading {
    let mut device = match device.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::WouldBlock) => return ProbeReading::TimedOut,
        Err(TryLockError::Poisoned(_)) => return ProbeReading::Failed,
    };
    if let Err(err) = device.set_frequency(center_hz) {
        warn!("{}", err);
        return ProbeReading::Failed;
    }
    match device.measure() {
        Ok(db) => ProbeReading::Level(db),
        Err(err) => {
            warn!("{}", err);
            ProbeReading::Failed
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::interface::probe::ProbeError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    /// Fake receiver that reports `-(tuned MHz)` and counts overlapping retunes.
    pub(crate) struct FakeProbe {
        pub name: String,
        pub delay: Duration,
        pub stall: Option<Duration>,
        pub fixed: Option<f32>,
        pub fail: bool,
        pub busy: Arc<AtomicBool>,
        pub overlaps: Arc<AtomicUsize>,
        pub tuned: f64,
    }

    impl FakeProbe {
        pub(crate) fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                delay: Duration::from_millis(2),
                stall: None,
                fixed: None,
                fail: false,
                busy: Arc::new(AtomicBool::new(false)),
                overlaps: Arc::new(AtomicUsize::new(0)),
                tuned: 0.0,
            }
        }
    }

    impl FrequencyProber for FakeProbe {
        fn name(&self) -> &str {
            &self.name
        }

        fn set_frequency(&mut self, hz: f64) -> Result<(), ProbeError> {
            if self.fail {
                return Err(ProbeError::Io {
                    device: self.name.clone(),
                    reason: "usb transfer failed".into(),
                });
            }
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(self.delay);
            self.tuned = hz;
            self.busy.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn measure(&mut self) -> Result<f32, ProbeError> {
            if let Some(stall) = self.stall {
                std::thread::sleep(stall);
            }
            Ok(self.fixed.unwrap_or(-(self.tuned / 1e6) as f32))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_device_yields_sentinel_without_blocking() {
        let mut responsive = FakeProbe::new("aux-a");
        responsive.fixed = Some(-55.0);
        let mut stalled = FakeProbe::new("aux-b");
        stalled.stall = Some(Duration::from_millis(800));

        let coordinator = CorrelationCoordinator::new(
            vec![Box::new(responsive), Box::new(stalled)],
            Duration::from_millis(50),
        );
        let started = Instant::now();
        let result = coordinator.correlate(2_440e6).await;

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(
            result.readings,
            vec![ProbeReading::Level(-55.0), ProbeReading::TimedOut]
        );
        assert_eq!(result.center_hz, 2_440e6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn busy_device_is_not_queued_behind_a_straggler() {
        let mut stalled = FakeProbe::new("aux-slow");
        stalled.stall = Some(Duration::from_millis(300));
        let overlaps = stalled.overlaps.clone();
        let coordinator = CorrelationCoordinator::new(vec![Box::new(stalled)], Duration::from_millis(30));

        let first = coordinator.correlate(915e6).await;
        let second = coordinator.correlate(916e6).await;
        assert_eq!(first.readings, vec![ProbeReading::TimedOut]);
        assert_eq!(second.readings, vec![ProbeReading::TimedOut]);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rounds_never_overlap_on_a_device() {
        let probes: Vec<FakeProbe> = (0..3).map(|i| FakeProbe::new(&format!("aux-{}", i))).collect();
        let overlaps: Vec<Arc<AtomicUsize>> = probes.iter().map(|p| p.overlaps.clone()).collect();
        let coordinator = Arc::new(CorrelationCoordinator::new(
            probes
                .into_iter()
                .map(|p| Box::new(p) as Box<dyn FrequencyProber>)
                .collect(),
            Duration::from_secs(2),
        ));

        let mut rounds = JoinSet::new();
        for i in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let center = 100e6 + i as f64 * 1e6;
            rounds.spawn(async move { coordinator.correlate(center).await });
        }

        let mut completed = 0;
        while let Some(result) = rounds.join_next().await {
            let result = result.unwrap();
            let expected = -(result.center_hz / 1e6) as f32;
            assert!(result
                .readings
                .iter()
                .all(|r| *r == ProbeReading::Level(expected)));
            completed += 1;
        }
        assert_eq!(completed, 8);
        assert!(overlaps.iter().all(|o| o.load(Ordering::SeqCst) == 0));
    }

    #[tokio::test]
    async fn failing_device_is_reported_as_failed() {
        let mut broken = FakeProbe::new("aux-broken");
        broken.fail = true;
        let metrics = Arc::new(MetricsRecorder::new());
        let coordinator = CorrelationCoordinator::new(
            vec![Box::new(FakeProbe::new("aux-ok")), Box::new(broken)],
            Duration::from_secs(1),
        )
        .with_metrics(metrics.clone());

        let result = coordinator.correlate(433e6).await;
        assert_eq!(result.readings[0], ProbeReading::Level(-433.0));
        assert_eq!(result.readings[1], ProbeReading::Failed);
        assert_eq!(metrics.snapshot().probe_failures, 1);
    }

    #[tokio::test]
    async fn no_devices_means_empty_result() {
        let coordinator = CorrelationCoordinator::new(Vec::new(), Duration::from_millis(10));
        let result = coordinator.correlate(868e6).await;
        assert!(result.readings.is_empty());
        assert_eq!(coordinator.device_count(), 0);
    }
}
