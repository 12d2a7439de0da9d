use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// One complete scan of the band: `steps × bins` power values in dB.
pub type Sweep = Array2<f32>;

/// How the reference noise floor evolves once warm-up has completed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineMode {
    /// Mean of the warm-up sweeps, never touched again.
    Frozen,
    /// `baseline = (1 - alpha) * baseline + alpha * sweep` after every analyzed sweep.
    Exponential { alpha: f32 },
}

impl Default for BaselineMode {
    fn default() -> Self {
        BaselineMode::Frozen
    }
}

/// Tunables shared by the detection stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub threshold_db: f32,
    pub ignore_level_db: f32,
    pub min_bins: usize,
    pub stddev_max_db: f32,
    pub baseline_sweeps: usize,
    pub history_len: usize,
    pub persistent_after: u32,
    pub baseline_mode: BaselineMode,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_db: 10.0,
            ignore_level_db: -100.0,
            min_bins: 3,
            stddev_max_db: 5.0,
            baseline_sweeps: 5,
            history_len: 10,
            persistent_after: 3,
            baseline_mode: BaselineMode::Frozen,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.threshold_db > 0.0) {
            return Err(CoreError::InvalidConfig(
                "threshold_db must be positive".into(),
            ));
        }
        if self.min_bins == 0 {
            return Err(CoreError::InvalidConfig("min_bins must be at least 1".into()));
        }
        if self.baseline_sweeps == 0 {
            return Err(CoreError::InvalidConfig(
                "baseline_sweeps must be at least 1".into(),
            ));
        }
        if self.history_len == 0 {
            return Err(CoreError::InvalidConfig(
                "history_len must be at least 1".into(),
            ));
        }
        if let BaselineMode::Exponential { alpha } = self.baseline_mode {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(CoreError::InvalidConfig(format!(
                    "exponential baseline alpha {} outside (0, 1]",
                    alpha
                )));
            }
        }
        Ok(())
    }
}

/// Timing for auxiliary receiver correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub probe_timeout_ms: u64,
    pub refresh_interval_ms: u64,
}

impl CorrelationConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.probe_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "probe_timeout_ms must be at least 1".into(),
            ));
        }
        if self.refresh_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "refresh_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 500,
            refresh_interval_ms: 1000,
        }
    }
}

/// Maps sweep coordinates (step, bin) onto absolute frequencies in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub start_hz: f64,
    pub step_hz: f64,
    pub bin_width_hz: f64,
}

impl SweepGrid {
    pub fn new(start_hz: f64, step_hz: f64, bin_width_hz: f64) -> CoreResult<Self> {
        if !(step_hz > 0.0) || !(bin_width_hz > 0.0) {
            return Err(CoreError::InvalidConfig(format!(
                "step ({} Hz) and bin width ({} Hz) must be positive",
                step_hz, bin_width_hz
            )));
        }
        Ok(Self {
            start_hz,
            step_hz,
            bin_width_hz,
        })
    }

    /// Grid for a retuning scan: one step every `step_hz`, `fft_size` bins per step.
    pub fn from_scan(
        start_hz: f64,
        step_hz: f64,
        sample_rate_hz: f64,
        fft_size: usize,
    ) -> CoreResult<Self> {
        if fft_size == 0 {
            return Err(CoreError::InvalidConfig("fft_size must be non-zero".into()));
        }
        Self::new(start_hz, step_hz, sample_rate_hz / fft_size as f64)
    }

    /// Number of steps needed to cover `[start_hz, stop_hz)`.
    pub fn step_count(&self, stop_hz: f64) -> usize {
        if stop_hz <= self.start_hz {
            return 0;
        }
        ((stop_hz - self.start_hz) / self.step_hz) as usize
    }

    pub fn bin_frequency(&self, step: usize, bin: usize) -> f64 {
        self.start_hz + step as f64 * self.step_hz + bin as f64 * self.bin_width_hz
    }

    pub fn span_range(&self, span: &BinSpan) -> FrequencyRange {
        FrequencyRange {
            start_hz: self.bin_frequency(span.step, span.start),
            end_hz: self.bin_frequency(span.step, span.end),
        }
    }
}

/// Half-open bin run `[start, end)` inside one step row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinSpan {
    pub step: usize,
    pub start: usize,
    pub end: usize,
}

impl BinSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Absolute frequency interval in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub start_hz: f64,
    pub end_hz: f64,
}

impl FrequencyRange {
    pub fn center_hz(&self) -> f64 {
        (self.start_hz + self.end_hz) / 2.0
    }

    pub fn width_hz(&self) -> f64 {
        self.end_hz - self.start_hz
    }
}

/// Direction of a deviation relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sign {
    Rise,
    Drop,
}

impl Sign {
    pub fn symbol(&self) -> char {
        match self {
            Sign::Rise => '+',
            Sign::Drop => '-',
        }
    }
}

/// Common error type for the detection core.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("sweep shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("empty sweep")]
    EmptySweep,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("baseline persistence: {0}")]
    Persistence(String),
}

impl From<std::io::Error> for CoreError {
    fn from(value: std::io::Error) -> Self {
        CoreError::Persistence(value.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(value: serde_json::Error) -> Self {
        CoreError::Persistence(value.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Seconds since the Unix epoch, used to stamp readings and events.
pub fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_detector_config_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn exponential_alpha_out_of_range_is_rejected() {
        let config = DetectorConfig {
            baseline_mode: BaselineMode::Exponential { alpha: 1.5 },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_correlation_timings_are_rejected() {
        assert!(CorrelationConfig::default().validate().is_ok());
        let no_refresh = CorrelationConfig {
            refresh_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            no_refresh.validate(),
            Err(CoreError::InvalidConfig(_))
        ));
        let no_timeout = CorrelationConfig {
            probe_timeout_ms: 0,
            ..Default::default()
        };
        assert!(no_timeout.validate().is_err());
    }

    #[test]
    fn grid_maps_step_and_bin_to_hz() {
        let grid = SweepGrid::from_scan(50e6, 5e6, 20e6, 256).unwrap();
        assert_eq!(grid.bin_width_hz, 78_125.0);
        let range = grid.span_range(&BinSpan {
            step: 2,
            start: 10,
            end: 14,
        });
        assert_eq!(range.start_hz, 60e6 + 10.0 * 78_125.0);
        assert_eq!(range.width_hz(), 4.0 * 78_125.0);
        assert_eq!(grid.step_count(6000e6), 1190);
    }

    #[test]
    fn grid_rejects_zero_step() {
        assert!(SweepGrid::new(0.0, 0.0, 1.0).is_err());
    }
}
