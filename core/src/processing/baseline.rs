use crate::prelude::{BaselineMode, CoreError, CoreResult, Sweep};
use ndarray::{Array2, ArrayView2};

/// Progress of the reference noise floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineStatus {
    Warming { observed: usize, required: usize },
    Ready,
}

/// Averages the first `required` sweeps into the reference noise floor.
///
/// Shape is fixed by the first observation; any later sweep of another
/// shape is rejected rather than truncated.
pub struct BaselineEstimator {
    required: usize,
    mode: BaselineMode,
    shape: Option<(usize, usize)>,
    accum: Option<Array2<f64>>,
    observed: usize,
    baseline: Option<Sweep>,
}

impl BaselineEstimator {
    pub fn new(required: usize, mode: BaselineMode) -> Self {
        Self {
            required: required.max(1),
            mode,
            shape: None,
            accum: None,
            observed: 0,
            baseline: None,
        }
    }

    /// Starts already `Ready` from a previously persisted baseline.
    pub fn from_stored(baseline: Sweep, required: usize, mode: BaselineMode) -> Self {
        let mut estimator = Self::new(required, mode);
        estimator.shape = Some(baseline.dim());
        estimator.observed = estimator.required;
        estimator.baseline = Some(baseline);
        estimator
    }

    pub fn observe(&mut self, sweep: ArrayView2<f32>) -> CoreResult<BaselineStatus> {
        let actual = sweep.dim();
        match self.shape {
            Some(expected) if expected != actual => {
                return Err(CoreError::ShapeMismatch { expected, actual });
            }
            None => self.shape = Some(actual),
            _ => {}
        }

        if let Some(baseline) = self.baseline.as_mut() {
            if let BaselineMode::Exponential { alpha } = self.mode {
                baseline.zip_mut_with(&sweep, |b, &s| *b = (1.0 - alpha) * *b + alpha * s);
            }
            return Ok(BaselineStatus::Ready);
        }

        let accum = self.accum.get_or_insert_with(|| Array2::zeros(actual));
        accum.zip_mut_with(&sweep, |a, &s| *a += f64::from(s));
        self.observed += 1;

        if self.observed < self.required {
            return Ok(BaselineStatus::Warming {
                observed: self.observed,
                required: self.required,
            });
        }

        let count = self.required as f64;
        let baseline = self
            .accum
            .take()
            .map(|sum| sum.mapv(|v| (v / count) as f32))
            .ok_or_else(|| CoreError::InvalidConfig("baseline accumulator missing".into()))?;
        self.baseline = Some(baseline);
        Ok(BaselineStatus::Ready)
    }

    pub fn status(&self) -> BaselineStatus {
        if self.baseline.is_some() {
            BaselineStatus::Ready
        } else {
            BaselineStatus::Warming {
                observed: self.observed,
                required: self.required,
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self) -> Option<&Sweep> {
        self.baseline.as_ref()
    }

    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    pub fn reset(&mut self) {
        self.shape = None;
        self.accum = None;
        self.observed = 0;
        self.baseline = None;
    }
}
