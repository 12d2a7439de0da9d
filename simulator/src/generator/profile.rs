use crate::generator::spectrum::{tone, SpectrumHelper};
use crate::workflow::config::{ScenarioConfig, WorkflowConfig};
use anyhow::Context;
use num_complex::Complex32;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use sentrycore::interface::SweepSource;
use sentrycore::prelude::{CoreResult, Sweep, SweepGrid};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Sweep counter shared by the source and the simulated receivers, so both
/// agree on which emitters are on the air.
#[derive(Clone, Default)]
pub struct SweepClock(Arc<AtomicUsize>);

impl SweepClock {
    /// Index of the most recently produced sweep.
    pub fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst).saturating_sub(1)
    }

    fn advance(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Sweep source that synthesises baseband noise plus configured emitters
/// for every step and runs it through a windowed FFT.
pub struct SyntheticSweepSource {
    grid: SweepGrid,
    steps: usize,
    scenario: ScenarioConfig,
    spectrum: SpectrumHelper,
    frames_per_step: usize,
    noise: Normal<f32>,
    rng: StdRng,
    clock: SweepClock,
    remaining: usize,
    interval: Duration,
    produced: usize,
}

impl SyntheticSweepSource {
    pub fn new(config: &WorkflowConfig, clock: SweepClock) -> anyhow::Result<Self> {
        let grid = config.scan.grid()?;
        let steps = config.scan.steps().context("sizing synthetic sweep")?;
        let spectrum = SpectrumHelper::new(config.scan.fft_size);
        let noise_sigma = (spectrum.noise_variance_for(config.scenario.noise_floor_db) / 2.0).sqrt();
        let noise = Normal::new(0.0, noise_sigma)
            .map_err(|err| anyhow::anyhow!("noise floor {} dB: {}", config.scenario.noise_floor_db, err))?;
        Ok(Self {
            grid,
            steps,
            scenario: config.scenario.clone(),
            spectrum,
            frames_per_step: config.scenario.frames_per_step.max(1),
            noise,
            rng: StdRng::seed_from_u64(config.scenario.seed),
            clock,
            remaining: config.sweeps,
            interval: Duration::from_millis(config.sweep_interval_ms),
            produced: 0,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.steps, self.spectrum.size())
    }

    /// Builds sweep `index`; power per bin is averaged over the step's frames.
    pub fn build_sweep(&mut self, index: usize) -> Sweep {
        let (steps, bins) = self.shape();
        let mut sweep = Sweep::zeros((steps, bins));
        for step in 0..steps {
            let mut linear = vec![0.0f32; bins];
            for _ in 0..self.frames_per_step {
                let samples = self.step_samples(step, index);
                for (acc, db) in linear.iter_mut().zip(self.spectrum.power_db(&samples)) {
                    *acc += 10f32.powf(db / 10.0);
                }
            }
            let frames = self.frames_per_step as f32;
            for (cell, acc) in sweep.row_mut(step).iter_mut().zip(linear) {
                *cell = 10.0 * (acc / frames).log10();
            }
        }
        sweep
    }

    fn step_samples(&mut self, step: usize, index: usize) -> Vec<Complex32> {
        let bins = self.spectrum.size();
        let mut samples: Vec<Complex32> = (0..bins)
            .map(|_| {
                Complex32::new(self.noise.sample(&mut self.rng), self.noise.sample(&mut self.rng))
            })
            .collect();

        for emitter in self.scenario.emitters.iter().filter(|e| e.active_at(index)) {
            let amplitude = 10f32.powf(emitter.power_db / 20.0);
            for bin in 0..bins {
                if !emitter.covers(self.grid.bin_frequency(step, bin)) {
                    continue;
                }
                let phase = self.rng.gen_range(0.0..2.0 * PI);
                for (sample, component) in samples.iter_mut().zip(tone(bins, bin, amplitude, phase)) {
                    *sample += component;
                }
            }
        }
        samples
    }
}

impl SweepSource for SyntheticSweepSource {
    fn next_sweep(&mut self) -> CoreResult<Option<Sweep>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.produced > 0 && !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        self.remaining -= 1;
        self.produced += 1;
        let index = self.clock.advance();
        Ok(Some(self.build_sweep(index)))
    }
}
