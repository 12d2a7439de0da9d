/// Width of the sliding window used for robust segment levels.
pub const ROBUST_WINDOW: usize = 3;

pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return f32::NAN;
        }
        samples.iter().sum::<f32>() / samples.len() as f32
    }

    /// Highest mean over any `ROBUST_WINDOW` consecutive values.
    ///
    /// Runs shorter than the window fall back to their plain mean. A lone
    /// spike is diluted by its neighbours while a narrowband carrier a few
    /// bins wide still dominates the window.
    pub fn robust_level(samples: &[f32]) -> f32 {
        if samples.len() < ROBUST_WINDOW {
            return Self::mean(samples);
        }
        let mut window: f32 = samples[..ROBUST_WINDOW].iter().sum();
        let mut best = window;
        for i in ROBUST_WINDOW..samples.len() {
            window += samples[i] - samples[i - ROBUST_WINDOW];
            if window > best {
                best = window;
            }
        }
        best / ROBUST_WINDOW as f32
    }
}
