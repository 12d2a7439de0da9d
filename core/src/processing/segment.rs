use crate::math::stats::StatsHelper;
use crate::prelude::{BinSpan, CoreError, CoreResult, DetectorConfig, Sign};
use ndarray::{s, ArrayView1, ArrayView2};

/// Bin run whose level deviates from the baseline by at least the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub span: BinSpan,
    pub sign: Sign,
    pub baseline_db: f32,
    pub current_db: f32,
}

impl Segment {
    pub fn delta_db(&self) -> f32 {
        self.current_db - self.baseline_db
    }
}

/// Finds contiguous runs of deviating bins in each step row.
#[derive(Debug, Clone)]
pub struct SegmentDetector {
    threshold_db: f32,
    ignore_level_db: f32,
    min_bins: usize,
    stddev_max_db: f32,
}

impl SegmentDetector {
    pub fn new(threshold_db: f32, ignore_level_db: f32, min_bins: usize, stddev_max_db: f32) -> Self {
        Self {
            threshold_db,
            ignore_level_db,
            min_bins: min_bins.max(1),
            stddev_max_db,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(
            config.threshold_db,
            config.ignore_level_db,
            config.min_bins,
            config.stddev_max_db,
        )
    }

    pub fn detect(
        &self,
        sweep: ArrayView2<f32>,
        baseline: ArrayView2<f32>,
        dispersion: ArrayView2<f32>,
    ) -> CoreResult<Vec<Segment>> {
        for other in [baseline.dim(), dispersion.dim()] {
            if other != sweep.dim() {
                return Err(CoreError::ShapeMismatch {
                    expected: other,
                    actual: sweep.dim(),
                });
            }
        }

        let mut segments = Vec::new();
        for (step, ((row, base_row), std_row)) in sweep
            .outer_iter()
            .zip(baseline.outer_iter())
            .zip(dispersion.outer_iter())
            .enumerate()
        {
            let delta: Vec<f32> = row
                .iter()
                .zip(base_row.iter())
                .map(|(&current, &base)| current - base)
                .collect();

            let rises = maximal_runs(delta.iter().map(|&d| d >= self.threshold_db));
            let drops = maximal_runs(delta.iter().map(|&d| d <= -self.threshold_db));

            for (runs, sign) in [(rises, Sign::Rise), (drops, Sign::Drop)] {
                for (start, end) in runs {
                    let span = BinSpan { step, start, end };
                    if let Some(segment) = self.evaluate(span, sign, row, base_row, std_row) {
                        segments.push(segment);
                    }
                }
            }
        }
        Ok(segments)
    }

    fn evaluate(
        &self,
        span: BinSpan,
        sign: Sign,
        row: ArrayView1<f32>,
        base_row: ArrayView1<f32>,
        std_row: ArrayView1<f32>,
    ) -> Option<Segment> {
        if span.len() < self.min_bins {
            return None;
        }
        let baseline_db = StatsHelper::robust_level(&span_values(base_row, &span));
        let current_db = StatsHelper::robust_level(&span_values(row, &span));

        if baseline_db < self.ignore_level_db && current_db < self.ignore_level_db {
            return None;
        }
        if StatsHelper::mean(&span_values(std_row, &span)) > self.stddev_max_db {
            return None;
        }
        if (current_db - baseline_db).abs() < self.threshold_db {
            return None;
        }
        Some(Segment {
            span,
            sign,
            baseline_db,
            current_db,
        })
    }
}

pub(crate) fn span_values(row: ArrayView1<f32>, span: &BinSpan) -> Vec<f32> {
    row.slice(s![span.start..span.end]).to_vec()
}

/// Half-open `[start, end)` bounds of every maximal run of `true`.
fn maximal_runs(mask: impl Iterator<Item = bool>) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut open: Option<usize> = None;
    let mut len = 0;
    for (idx, flagged) in mask.enumerate() {
        match (flagged, open) {
            (true, None) => open = Some(idx),
            (false, Some(start)) => {
                runs.push((start, idx));
                open = None;
            }
            _ => {}
        }
        len = idx + 1;
    }
    if let Some(start) = open {
        runs.push((start, len));
    }
    runs
}
