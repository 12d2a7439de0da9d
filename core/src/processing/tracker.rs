use crate::interface::detection::{DetectionEvent, EventKind};
use crate::interface::probe::{CorrelationResult, ProbeReading};
use crate::math::stats::StatsHelper;
use crate::prelude::{BinSpan, DetectorConfig, FrequencyRange, Sign, SweepGrid};
use crate::processing::classifier::{classify, SignalClass};
use crate::processing::segment::{span_values, Segment};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// Integer identity of a tracked range, in whole Hz.
///
/// Derived from the grid position of the bin run, never from measured levels,
/// so the same run maps to the same key on every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RangeKey {
    pub start_hz: u64,
    pub end_hz: u64,
}

impl RangeKey {
    pub fn from_range(range: &FrequencyRange) -> Self {
        Self {
            start_hz: range.start_hz.max(0.0).round() as u64,
            end_hz: range.end_hz.max(0.0).round() as u64,
        }
    }
}

/// State kept for one anomalous range while it stays above threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRange {
    pub key: RangeKey,
    pub range: FrequencyRange,
    pub span: BinSpan,
    pub sign: Sign,
    pub baseline_db: f32,
    pub current_db: f32,
    pub aux: Vec<ProbeReading>,
    pub correlated_at: Option<f64>,
    pub updated_at: f64,
    pub count: u32,
    pub label: Option<SignalClass>,
}

impl TrackedRange {
    pub fn delta_db(&self) -> f32 {
        self.current_db - self.baseline_db
    }

    fn event(&self, kind: EventKind, persistent_after: u32, timestamp: f64) -> DetectionEvent {
        DetectionEvent {
            kind,
            range: self.range,
            sign: self.sign,
            baseline_db: self.baseline_db,
            current_db: self.current_db,
            delta_db: self.delta_db(),
            aux: self.aux.clone(),
            label: self.label,
            count: self.count,
            persistent: self.count > persistent_after,
            timestamp,
        }
    }
}

/// Keyed state machine over anomalous ranges, shared between the sweep
/// path and the correlation path.
pub struct RangeTracker {
    entries: Mutex<BTreeMap<RangeKey, TrackedRange>>,
    threshold_db: f32,
    persistent_after: u32,
}

impl RangeTracker {
    pub fn new(threshold_db: f32, persistent_after: u32) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            threshold_db,
            persistent_after,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.threshold_db, config.persistent_after)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<RangeKey, TrackedRange>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates or refreshes an entry for every segment, then re-samples every
    /// entry from `sweep` and evicts those back within threshold of their
    /// baseline. Runs under a single lock acquisition.
    ///
    /// Overlapping steps can report the same range twice in one sweep; only
    /// the first report of a key counts.
    pub fn apply_cycle(
        &self,
        sweep: ArrayView2<f32>,
        segments: &[Segment],
        grid: &SweepGrid,
        now: f64,
    ) -> Vec<DetectionEvent> {
        let mut entries = self.lock();
        let mut events = Vec::with_capacity(segments.len());
        let mut seen = BTreeSet::new();

        for segment in segments {
            let range = grid.span_range(&segment.span);
            let key = RangeKey::from_range(&range);
            if !seen.insert(key) {
                continue;
            }
            match entries.entry(key) {
                Entry::Vacant(slot) => {
                    let tracked = slot.insert(TrackedRange {
                        key,
                        range,
                        span: segment.span,
                        sign: segment.sign,
                        baseline_db: segment.baseline_db,
                        current_db: segment.current_db,
                        aux: Vec::new(),
                        correlated_at: None,
                        updated_at: now,
                        count: 1,
                        label: classify(range.start_hz, range.end_hz),
                    });
                    events.push(tracked.event(EventKind::Created, self.persistent_after, now));
                }
                Entry::Occupied(mut slot) => {
                    let tracked = slot.get_mut();
                    tracked.current_db = segment.current_db;
                    tracked.span = segment.span;
                    tracked.sign = segment.sign;
                    tracked.updated_at = now;
                    tracked.count = tracked.count.saturating_add(1);
                    events.push(tracked.event(EventKind::Refreshed, self.persistent_after, now));
                }
            }
        }

        events.extend(self.evict_settled_locked(&mut entries, sweep, now));
        events
    }

    /// Eviction pass on its own, for entries not reconfirmed this cycle.
    pub fn evict_settled(&self, sweep: ArrayView2<f32>, now: f64) -> Vec<DetectionEvent> {
        let mut entries = self.lock();
        self.evict_settled_locked(&mut entries, sweep, now)
    }

    fn evict_settled_locked(
        &self,
        entries: &mut BTreeMap<RangeKey, TrackedRange>,
        sweep: ArrayView2<f32>,
        now: f64,
    ) -> Vec<DetectionEvent> {
        let (steps, bins) = sweep.dim();
        let mut settled = Vec::new();

        for (key, tracked) in entries.iter_mut() {
            let span = tracked.span;
            if span.step >= steps || span.end > bins || span.is_empty() {
                settled.push(*key);
                continue;
            }
            let level = StatsHelper::robust_level(&span_values(sweep.row(span.step), &span));
            tracked.current_db = level;
            if (level - tracked.baseline_db).abs() < self.threshold_db {
                settled.push(*key);
            }
        }

        settled
            .into_iter()
            .filter_map(|key| entries.remove(&key))
            .map(|tracked| tracked.event(EventKind::Evicted, self.persistent_after, now))
            .collect()
    }

    /// Removes `key` if present; evicting an absent key is a no-op.
    pub fn evict(&self, key: &RangeKey) -> Option<TrackedRange> {
        self.lock().remove(key)
    }

    /// Merges a complete correlation result into the entry, last write wins.
    /// Returns `None` when the range was evicted in the meantime.
    pub fn apply_correlation(
        &self,
        key: &RangeKey,
        result: &CorrelationResult,
    ) -> Option<DetectionEvent> {
        let mut entries = self.lock();
        let tracked = entries.get_mut(key)?;
        tracked.aux = result.readings.clone();
        tracked.correlated_at = Some(result.timestamp);
        Some(tracked.event(EventKind::Correlated, self.persistent_after, result.timestamp))
    }

    /// Keys and center frequencies of every tracked range.
    pub fn correlation_targets(&self) -> Vec<(RangeKey, f64)> {
        self.lock()
            .values()
            .map(|tracked| (tracked.key, tracked.range.center_hz()))
            .collect()
    }

    pub fn get(&self, key: &RangeKey) -> Option<TrackedRange> {
        self.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<TrackedRange> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
