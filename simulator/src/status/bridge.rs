use crate::status::model::StatusModel;
use log::info;
use sentrycore::interface::DetectionEvent;
use sentrycore::processing::TrackedRange;
use sentrycore::telemetry::Metrics;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use warp::Filter;

/// Shared status published by the sweep loop and served read-only over HTTP.
#[derive(Clone, Default)]
pub struct StatusBridge {
    state: Arc<RwLock<StatusModel>>,
}

impl StatusBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, StatusModel> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn publish_tracked(&self, sweeps: u64, tracked: Vec<TrackedRange>) {
        let mut guard = self.write();
        guard.sweeps = sweeps;
        guard.tracked = tracked;
    }

    pub fn push_event(&self, event: DetectionEvent) {
        self.write().push_event(event);
    }

    pub fn publish_metrics(&self, metrics: Metrics) {
        self.write().metrics = metrics;
    }

    pub fn snapshot(&self) -> StatusModel {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn routes(
        &self,
    ) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let bridge = self.clone();
        let with_bridge = warp::any().map(move || bridge.clone());

        let tracked = warp::path("tracked")
            .and(warp::get())
            .and(with_bridge.clone())
            .map(|bridge: StatusBridge| warp::reply::json(&bridge.snapshot().tracked));
        let events = warp::path("events")
            .and(warp::get())
            .and(with_bridge.clone())
            .map(|bridge: StatusBridge| warp::reply::json(&bridge.snapshot().recent_events));
        let metrics = warp::path("metrics")
            .and(warp::get())
            .and(with_bridge.clone())
            .map(|bridge: StatusBridge| warp::reply::json(&bridge.snapshot().metrics));
        let status = warp::path("status")
            .and(warp::get())
            .and(with_bridge)
            .map(|bridge: StatusBridge| warp::reply::json(&bridge.snapshot()));

        tracked.or(events).or(metrics).or(status)
    }

    /// Serves `/tracked`, `/events`, `/metrics` and `/status` on `addr`.
    pub fn serve(&self, addr: SocketAddr, handle: &Handle) -> JoinHandle<()> {
        info!("status endpoint listening on http://{}", addr);
        handle.spawn(warp::serve(self.routes()).run(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrycore::interface::EventKind;
    use sentrycore::prelude::{FrequencyRange, Sign};

    fn event(count: u32) -> DetectionEvent {
        DetectionEvent {
            kind: EventKind::Created,
            range: FrequencyRange {
                start_hz: 433.0e6,
                end_hz: 433.5e6,
            },
            sign: Sign::Rise,
            baseline_db: -95.0,
            current_db: -50.0,
            delta_db: 45.0,
            aux: Vec::new(),
            label: None,
            count,
            persistent: false,
            timestamp: 1.0,
        }
    }

    #[test]
    fn recent_events_are_bounded() {
        let bridge = StatusBridge::new();
        for count in 0..(crate::status::model::RECENT_EVENTS as u32 + 5) {
            bridge.push_event(event(count));
        }
        let snapshot = bridge.snapshot();
        assert_eq!(snapshot.recent_events.len(), crate::status::model::RECENT_EVENTS);
        assert_eq!(snapshot.recent_events.front().map(|e| e.count), Some(5));
    }

    #[tokio::test]
    async fn routes_serve_published_state() {
        let bridge = StatusBridge::new();
        bridge.push_event(event(1));
        bridge.publish_metrics(Metrics {
            sweeps: 12,
            ..Default::default()
        });
        let routes = bridge.routes();

        let reply = warp::test::request()
            .method("GET")
            .path("/metrics")
            .reply(&routes)
            .await;
        assert_eq!(reply.status(), 200);
        let metrics: Metrics = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(metrics.sweeps, 12);

        let reply = warp::test::request()
            .method("GET")
            .path("/events")
            .reply(&routes)
            .await;
        let events: Vec<DetectionEvent> = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(events.len(), 1);

        let reply = warp::test::request()
            .method("GET")
            .path("/unknown")
            .reply(&routes)
            .await;
        assert_eq!(reply.status(), 404);
    }
}
