use crate::interface::detection::DetectionEvent;
use crate::processing::correlation::CorrelationCoordinator;
use crate::processing::tracker::{RangeKey, RangeTracker};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

/// Glue between the tracked-range map and the correlation coordinator.
///
/// Used both for on-detection requests from the sweep path and by the
/// periodic refresher; either may correlate the same range, and each merges
/// a whole result into the entry.
pub struct Correlator {
    coordinator: Arc<CorrelationCoordinator>,
    tracker: Arc<RangeTracker>,
    events: Option<mpsc::UnboundedSender<DetectionEvent>>,
}

impl Correlator {
    pub fn new(coordinator: Arc<CorrelationCoordinator>, tracker: Arc<RangeTracker>) -> Self {
        Self {
            coordinator,
            tracker,
            events: None,
        }
    }

    /// Publishes every `Correlated` event on `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<DetectionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn coordinator(&self) -> &Arc<CorrelationCoordinator> {
        &self.coordinator
    }

    /// Correlates one tracked range. `None` if the range is gone before or
    /// after the round.
    pub async fn correlate_range(&self, key: RangeKey) -> Option<DetectionEvent> {
        let center_hz = self.tracker.get(&key)?.range.center_hz();
        let result = self.coordinator.correlate(center_hz).await;
        let event = match self.tracker.apply_correlation(&key, &result) {
            Some(event) => event,
            None => {
                debug!("range {:?} evicted during correlation", key);
                return None;
            }
        };
        if let Some(events) = &self.events {
            let _ = events.send(event.clone());
        }
        Some(event)
    }

    /// Correlates every range tracked at call time; returns how many were merged.
    pub async fn refresh_all(&self) -> usize {
        let mut merged = 0;
        for (key, _) in self.tracker.correlation_targets() {
            if self.correlate_range(key).await.is_some() {
                merged += 1;
            }
        }
        merged
    }

    /// Fire-and-forget correlation for a range the sweep path just flagged.
    pub fn dispatch(self: &Arc<Self>, handle: &Handle, key: RangeKey) -> JoinHandle<Option<DetectionEvent>> {
        let correlator = Arc::clone(self);
        handle.spawn(async move { correlator.correlate_range(key).await })
    }

    /// Starts the periodic refresher on `handle`.
    pub fn spawn_refresher(self: &Arc<Self>, handle: &Handle, period: Duration) -> RefresherHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let correlator = Arc::clone(self);
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("refresher running every {} ms", period.as_millis());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let merged = correlator.refresh_all().await;
                        debug!("refresher merged {} ranges", merged);
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            info!("refresher stopped");
        });
        RefresherHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Owner of a running refresher task.
pub struct RefresherHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Signals the refresher and waits for its current round to finish.
    /// A refresher that died early reports its join error here.
    pub async fn stop(self) -> Result<(), JoinError> {
        let _ = self.stop.send(true);
        self.task.await.map_err(|err| {
            error!("refresher task ended abnormally: {}", err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::detection::EventKind;
    use crate::interface::probe::{FrequencyProber, ProbeReading};
    use crate::prelude::{BinSpan, Sign, SweepGrid};
    use crate::processing::correlation::tests::FakeProbe;
    use crate::processing::segment::Segment;
    use ndarray::{s, Array2};

    fn tracked_setup(probes: Vec<FakeProbe>) -> (Arc<Correlator>, Arc<RangeTracker>, RangeKey) {
        let tracker = Arc::new(RangeTracker::new(10.0, 3));
        let mut sweep = Array2::from_elem((1, 32), -90.0f32);
        sweep.slice_mut(s![0, 10..15]).fill(-50.0);
        let segment = Segment {
            span: BinSpan {
                step: 0,
                start: 10,
                end: 15,
            },
            sign: Sign::Rise,
            baseline_db: -90.0,
            current_db: -50.0,
        };
        let grid = SweepGrid::new(2_400e6, 5e6, 1e6).unwrap();
        tracker.apply_cycle(sweep.view(), &[segment], &grid, 1.0);
        let key = tracker.snapshot()[0].key;

        let coordinator = Arc::new(CorrelationCoordinator::new(
            probes
                .into_iter()
                .map(|p| Box::new(p) as Box<dyn FrequencyProber>)
                .collect(),
            Duration::from_millis(200),
        ));
        let correlator = Arc::new(Correlator::new(coordinator, tracker.clone()));
        (correlator, tracker, key)
    }

    #[tokio::test]
    async fn correlation_lands_in_tracked_entry() {
        let (correlator, tracker, key) = tracked_setup(vec![FakeProbe::new("aux-1")]);
        let event = correlator.correlate_range(key).await.unwrap();

        assert_eq!(event.kind, EventKind::Correlated);
        assert_eq!(event.aux, vec![ProbeReading::Level(-2412.5)]);
        assert_eq!(tracker.get(&key).unwrap().aux, event.aux);
    }

    #[tokio::test]
    async fn evicted_range_is_skipped() {
        let (correlator, tracker, key) = tracked_setup(vec![FakeProbe::new("aux-1")]);
        tracker.evict(&key);
        assert!(correlator.correlate_range(key).await.is_none());
        assert_eq!(correlator.refresh_all().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refresher_and_dispatch_both_publish() {
        let (correlator, tracker, key) = tracked_setup(vec![FakeProbe::new("aux-1")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(
            Correlator::new(correlator.coordinator().clone(), tracker.clone()).with_events(tx),
        );

        let handle = Handle::current();
        let refresher = correlator.spawn_refresher(&handle, Duration::from_millis(20));
        let dispatched = correlator.dispatch(&handle, key).await.unwrap();
        assert!(dispatched.is_some());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Correlated);
        assert_eq!(second.kind, EventKind::Correlated);

        refresher.stop().await.unwrap();
        assert!(tracker.get(&key).unwrap().correlated_at.is_some());
    }

    #[tokio::test]
    async fn dead_refresher_surfaces_on_stop() {
        let (correlator, _, _) = tracked_setup(vec![FakeProbe::new("aux-1")]);
        // A zero period makes the interval timer panic inside the task.
        let refresher = correlator.spawn_refresher(&Handle::current(), Duration::ZERO);
        let err = refresher.stop().await.unwrap_err();
        assert!(err.is_panic());
    }
}
