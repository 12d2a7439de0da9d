use crate::generator::profile::SweepClock;
use crate::workflow::config::{AuxDeviceConfig, EmitterConfig, ScenarioConfig};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sentrycore::interface::{FrequencyProber, ProbeError};
use std::thread;
use std::time::Duration;

/// How long a stalled receiver hangs inside `measure`.
const STALL: Duration = Duration::from_secs(3);

/// Auxiliary receiver that reads the synthetic scenario at its tuned frequency.
pub struct SimulatedProbe {
    name: String,
    emitters: Vec<EmitterConfig>,
    noise_floor_db: f32,
    offset_db: f32,
    latency: Duration,
    stalled: bool,
    clock: SweepClock,
    tuned_hz: Option<f64>,
    rng: StdRng,
}

impl SimulatedProbe {
    pub fn new(device: &AuxDeviceConfig, scenario: &ScenarioConfig, clock: SweepClock, seed: u64) -> Self {
        Self {
            name: device.name.clone(),
            emitters: scenario.emitters.clone(),
            noise_floor_db: scenario.noise_floor_db,
            offset_db: device.offset_db,
            latency: Duration::from_millis(device.latency_ms),
            stalled: device.stalled,
            clock,
            tuned_hz: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl FrequencyProber for SimulatedProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_frequency(&mut self, hz: f64) -> Result<(), ProbeError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ProbeError::Io {
                device: self.name.clone(),
                reason: format!("cannot tune to {} Hz", hz),
            });
        }
        thread::sleep(self.latency);
        self.tuned_hz = Some(hz);
        Ok(())
    }

    fn measure(&mut self) -> Result<f32, ProbeError> {
        let tuned = self
            .tuned_hz
            .ok_or_else(|| ProbeError::Lost(format!("{} measured before tuning", self.name)))?;
        if self.stalled {
            thread::sleep(STALL);
        }
        let sweep = self.clock.current();
        let jitter = self.rng.gen_range(-0.5f32..0.5);
        let level = self
            .emitters
            .iter()
            .filter(|e| e.active_at(sweep) && e.covers(tuned))
            .map(|e| e.power_db + self.offset_db)
            .fold(self.noise_floor_db, f32::max);
        Ok(level + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> ScenarioConfig {
        ScenarioConfig {
            emitters: vec![EmitterConfig {
                name: "rc".into(),
                center_hz: 433.9e6,
                width_hz: 0.2e6,
                power_db: -50.0,
                start_sweep: 0,
                stop_sweep: None,
            }],
            ..Default::default()
        }
    }

    fn device(offset_db: f32) -> AuxDeviceConfig {
        AuxDeviceConfig {
            name: "aux-test".into(),
            latency_ms: 0,
            offset_db,
            stalled: false,
            available: true,
        }
    }

    #[test]
    fn probe_reports_offset_emitter_level() {
        let mut probe = SimulatedProbe::new(&device(-6.0), &scenario(), SweepClock::default(), 1);
        probe.set_frequency(433.9e6).unwrap();
        let level = probe.measure().unwrap();
        assert!((level - -56.0).abs() <= 0.5, "{}", level);
    }

    #[test]
    fn probe_reads_noise_away_from_emitters() {
        let mut probe = SimulatedProbe::new(&device(-6.0), &scenario(), SweepClock::default(), 1);
        probe.set_frequency(868e6).unwrap();
        let level = probe.measure().unwrap();
        assert!((level - -95.0).abs() <= 0.5, "{}", level);
    }

    #[test]
    fn untuned_probe_refuses_to_measure() {
        let mut probe = SimulatedProbe::new(&device(0.0), &scenario(), SweepClock::default(), 1);
        assert!(matches!(probe.measure(), Err(ProbeError::Lost(_))));
        assert!(probe.set_frequency(-1.0).is_err());
    }
}
