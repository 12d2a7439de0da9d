use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Hann-windowed FFT that turns one step of baseband samples into per-bin dB.
///
/// Levels are normalised so a tone of amplitude `a` centred on a bin reads
/// `20 * log10(a)` dB.
pub struct SpectrumHelper {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    coherent_gain: f32,
    buffer: Vec<Complex32>,
}

impl SpectrumHelper {
    pub fn new(size: usize) -> Self {
        let size = size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let window: Vec<f32> = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
            .collect();
        let coherent_gain: f32 = window.iter().sum();
        Self {
            fft,
            window,
            coherent_gain,
            buffer: vec![Complex32::zero(); size],
        }
    }

    pub fn size(&self) -> usize {
        self.window.len()
    }

    /// Variance per complex sample that makes white noise read `floor_db`.
    pub fn noise_variance_for(&self, floor_db: f32) -> f32 {
        let energy: f32 = self.window.iter().map(|w| w * w).sum();
        10f32.powf(floor_db / 10.0) * self.coherent_gain * self.coherent_gain / energy
    }

    pub fn power_db(&mut self, samples: &[Complex32]) -> Vec<f32> {
        for ((slot, sample), w) in self.buffer.iter_mut().zip(samples).zip(&self.window) {
            *slot = *sample * *w;
        }
        self.fft.process(&mut self.buffer);
        let gain_sq = self.coherent_gain * self.coherent_gain;
        self.buffer
            .iter()
            .map(|bin| 10.0 * ((bin.norm_sqr() / gain_sq) + 1e-20).log10())
            .collect()
    }
}

/// Complex exponential landing exactly on FFT bin `bin`.
pub fn tone(length: usize, bin: usize, amplitude: f32, phase: f32) -> impl Iterator<Item = Complex32> {
    (0..length).map(move |n| {
        let angle = 2.0 * PI * (bin * n % length) as f32 / length as f32 + phase;
        Complex32::from_polar(amplitude, angle)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectrum_has_one_value_per_bin() {
        let mut helper = SpectrumHelper::new(64);
        let samples = vec![Complex32::zero(); 64];
        assert_eq!(helper.power_db(&samples).len(), 64);
    }

    #[test]
    fn bin_centred_tone_reads_its_amplitude() {
        let mut helper = SpectrumHelper::new(256);
        let samples: Vec<Complex32> = tone(256, 40, 0.01, 0.3).collect();
        let power = helper.power_db(&samples);
        assert!((power[40] - -40.0).abs() < 0.2, "{}", power[40]);
        assert!(power[100] < -100.0);
    }
}
