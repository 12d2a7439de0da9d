use crate::prelude::{CoreError, CoreResult};
use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Fixed-depth ring of recent sweeps used for per-bin dispersion.
pub struct HistoryBuffer {
    capacity: usize,
    frames: Option<Array3<f32>>,
    next: usize,
    held: usize,
}

impl HistoryBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            frames: None,
            next: 0,
            held: 0,
        }
    }

    /// Stores `sweep`, overwriting the oldest entry once the ring is full.
    pub fn push(&mut self, sweep: ArrayView2<f32>) -> CoreResult<()> {
        let (steps, bins) = sweep.dim();
        let frames = self
            .frames
            .get_or_insert_with(|| Array3::zeros((self.capacity, steps, bins)));
        let (_, expected_steps, expected_bins) = frames.dim();
        if (expected_steps, expected_bins) != (steps, bins) {
            return Err(CoreError::ShapeMismatch {
                expected: (expected_steps, expected_bins),
                actual: (steps, bins),
            });
        }

        frames.index_axis_mut(Axis(0), self.next).assign(&sweep);
        self.next = (self.next + 1) % self.capacity;
        self.held = (self.held + 1).min(self.capacity);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.held == self.capacity
    }

    pub fn len(&self) -> usize {
        self.held
    }

    pub fn is_empty(&self) -> bool {
        self.held == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Population standard deviation per bin; `None` until the ring is full.
    pub fn stddev(&self) -> Option<Array2<f32>> {
        if !self.is_full() {
            return None;
        }
        self.frames
            .as_ref()
            .map(|frames| frames.std_axis(Axis(0), 0.0))
    }

    pub fn reset(&mut self) {
        self.frames = None;
        self.next = 0;
        self.held = 0;
    }
}
