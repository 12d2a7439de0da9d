use anyhow::Context;
use sentrycore::prelude::{CorrelationConfig, DetectorConfig, SweepGrid};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Largest number of retune steps a scan may span.
pub const MAX_SCAN_STEPS: usize = 100_000;

/// Frequency plan of the primary receiver, in Hz.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub start_hz: f64,
    pub stop_hz: f64,
    pub step_hz: f64,
    pub sample_rate_hz: f64,
    pub fft_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_hz: 2_400e6,
            stop_hz: 2_500e6,
            step_hz: 5e6,
            sample_rate_hz: 20e6,
            fft_size: 256,
        }
    }
}

impl ScanConfig {
    pub fn grid(&self) -> anyhow::Result<SweepGrid> {
        SweepGrid::from_scan(self.start_hz, self.step_hz, self.sample_rate_hz, self.fft_size)
            .context("building sweep grid")
    }

    pub fn steps(&self) -> anyhow::Result<usize> {
        let grid = self.grid()?;
        let span = (self.stop_hz - grid.start_hz) / grid.step_hz;
        anyhow::ensure!(
            span.is_finite() && span <= MAX_SCAN_STEPS as f64,
            "scan range {} - {} Hz in {} Hz steps exceeds {} steps",
            self.start_hz,
            self.stop_hz,
            self.step_hz,
            MAX_SCAN_STEPS
        );
        let steps = grid.step_count(self.stop_hz);
        anyhow::ensure!(steps > 0, "scan range {} - {} Hz has no steps", self.start_hz, self.stop_hz);
        Ok(steps)
    }
}

/// Synthetic transmitter present during a window of sweeps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmitterConfig {
    pub name: String,
    pub center_hz: f64,
    pub width_hz: f64,
    pub power_db: f32,
    #[serde(default)]
    pub start_sweep: usize,
    #[serde(default)]
    pub stop_sweep: Option<usize>,
}

impl EmitterConfig {
    pub fn active_at(&self, sweep: usize) -> bool {
        sweep >= self.start_sweep && self.stop_sweep.map_or(true, |stop| sweep < stop)
    }

    pub fn covers(&self, hz: f64) -> bool {
        (hz - self.center_hz).abs() <= self.width_hz / 2.0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub noise_floor_db: f32,
    /// FFT frames averaged per step, as a real sweeping receiver does.
    pub frames_per_step: usize,
    pub seed: u64,
    pub emitters: Vec<EmitterConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            noise_floor_db: -95.0,
            frames_per_step: 16,
            seed: 7,
            emitters: vec![EmitterConfig {
                name: "telemetry".into(),
                center_hz: 2_441e6,
                width_hz: 1.5e6,
                power_db: -45.0,
                start_sweep: 20,
                stop_sweep: Some(30),
            }],
        }
    }
}

/// Simulated auxiliary receiver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuxDeviceConfig {
    pub name: String,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub offset_db: f32,
    #[serde(default)]
    pub stalled: bool,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub scan: ScanConfig,
    pub detector: DetectorConfig,
    pub correlation: CorrelationConfig,
    pub scenario: ScenarioConfig,
    pub aux_devices: Vec<AuxDeviceConfig>,
    pub sweeps: usize,
    pub sweep_interval_ms: u64,
    pub baseline_path: Option<PathBuf>,
    pub bind: Option<SocketAddr>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            detector: DetectorConfig::default(),
            correlation: CorrelationConfig::default(),
            scenario: ScenarioConfig::default(),
            aux_devices: vec![
                AuxDeviceConfig {
                    name: "aux-1".into(),
                    latency_ms: 20,
                    offset_db: -6.0,
                    stalled: false,
                    available: true,
                },
                AuxDeviceConfig {
                    name: "aux-2".into(),
                    latency_ms: 35,
                    offset_db: -12.0,
                    stalled: false,
                    available: true,
                },
            ],
            sweeps: 40,
            sweep_interval_ms: 100,
            baseline_path: None,
            bind: None,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .detector
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        config
            .correlation
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(start_mhz: f64, stop_mhz: f64, step_mhz: f64, sweeps: usize) -> Self {
        Self {
            scan: ScanConfig {
                start_hz: start_mhz * 1e6,
                stop_hz: stop_mhz * 1e6,
                step_hz: step_mhz * 1e6,
                ..Default::default()
            },
            sweeps,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrycore::prelude::BaselineMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_converts_mhz() {
        let cfg = WorkflowConfig::from_args(2400.0, 2500.0, 5.0, 12);
        assert_eq!(cfg.scan.start_hz, 2_400e6);
        assert_eq!(cfg.scan.steps().unwrap(), 20);
        assert_eq!(cfg.sweeps, 12);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"sweeps: 8\n\
              detector:\n  threshold_db: 12.0\n  baseline_mode:\n    kind: exponential\n    alpha: 0.1\n\
              aux_devices:\n  - name: north\n    latency_ms: 5\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.sweeps, 8);
        assert_eq!(cfg.detector.threshold_db, 12.0);
        assert_eq!(cfg.detector.min_bins, 3);
        assert_eq!(
            cfg.detector.baseline_mode,
            BaselineMode::Exponential { alpha: 0.1 }
        );
        assert_eq!(cfg.aux_devices.len(), 1);
        assert!(cfg.aux_devices[0].available);
    }

    #[test]
    fn config_load_rejects_invalid_detector() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"detector:\n  min_bins: 0\n").unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }

    #[test]
    fn config_load_rejects_zero_refresh_interval() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"correlation:\n  refresh_interval_ms: 0\n").unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }

    #[test]
    fn oversized_scan_is_rejected() {
        let mut cfg = WorkflowConfig::from_args(1.0, 1e300, 5.0, 1);
        assert!(cfg.scan.steps().is_err());
        cfg.scan.stop_hz = cfg.scan.start_hz + cfg.scan.step_hz * (MAX_SCAN_STEPS + 10) as f64;
        assert!(cfg.scan.steps().is_err());
        cfg.scan.stop_hz = cfg.scan.start_hz + cfg.scan.step_hz * 4.0;
        assert_eq!(cfg.scan.steps().unwrap(), 4);
    }

    #[test]
    fn emitter_window_is_half_open() {
        let emitter = EmitterConfig {
            name: "x".into(),
            center_hz: 433e6,
            width_hz: 1e6,
            power_db: -40.0,
            start_sweep: 3,
            stop_sweep: Some(5),
        };
        assert!(!emitter.active_at(2));
        assert!(emitter.active_at(4));
        assert!(!emitter.active_at(5));
        assert!(emitter.covers(433.4e6));
        assert!(!emitter.covers(434e6));
    }
}
