//! Frame loudness estimation with adaptive noise floor.
//!
//! Keeps a short rolling history of per-frame RMS energies, smooths them
//! with a moving average, and tracks an ambient noise floor as a low
//! percentile of recent non-speech energies. The segmenter owns one of
//! these and decides when the floor may be updated.

use std::collections::VecDeque;

const NOISE_FLOOR_PERCENTILE: f32 = 30.0;
const NOISE_FLOOR_SPAN: usize = 10;
const NOISE_FLOOR_WARMUP: usize = 5;

pub struct EnergyEstimator {
    history: VecDeque<f32>,
    horizon: usize,
    smooth_window: usize,
    noise_floor: f32,
}

impl EnergyEstimator {
    pub fn new(smooth_window: usize, horizon: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(horizon + 1),
            horizon: horizon.max(1),
            smooth_window: smooth_window.max(1),
            noise_floor: 0.01,
        }
    }

    /// Record one frame. Returns `(raw, smoothed)` energy.
    ///
    /// Raw energy is the RMS of the frame. The smoothed value is a moving
    /// average over the last `smooth_window` raw energies; while the history
    /// is shorter than the window the raw value is returned unchanged.
    pub fn push(&mut self, frame: &[f32]) -> (f32, f32) {
        let raw = rms(frame);

        self.history.push_back(raw);
        if self.history.len() > self.horizon {
            self.history.pop_front();
        }

        let smoothed = if self.history.len() >= self.smooth_window {
            let window = self.history.iter().rev().take(self.smooth_window);
            window.sum::<f32>() / self.smooth_window as f32
        } else {
            raw
        };

        (raw, smoothed)
    }

    /// Re-estimate the noise floor from recent energies.
    ///
    /// Callers must only invoke this outside speech so the floor tracks
    /// ambient noise rather than the utterance itself. No-op until enough
    /// history has accumulated.
    pub fn update_noise_floor(&mut self) {
        if self.history.len() <= NOISE_FLOOR_WARMUP {
            return;
        }
        let recent: Vec<f32> = self
            .history
            .iter()
            .rev()
            .take(NOISE_FLOOR_SPAN)
            .copied()
            .collect();
        self.noise_floor = percentile(&recent, NOISE_FLOOR_PERCENTILE);
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.noise_floor = 0.01;
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Linearly interpolated percentile of an unsorted sample, `p` in [0, 100].
fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = p / 100.0 * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(level: f32) -> Vec<f32> {
        vec![level; 160]
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&frame(0.0)), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_constant_frame_is_its_amplitude() {
        let raw = rms(&frame(0.2));
        assert!((raw - 0.2).abs() < 1e-6);
    }

    #[test]
    fn smoothed_equals_raw_until_window_fills() {
        let mut est = EnergyEstimator::new(5, 20);
        for _ in 0..4 {
            let (raw, smoothed) = est.push(&frame(0.1));
            assert_eq!(raw, smoothed);
        }
    }

    #[test]
    fn smoothing_averages_the_last_window() {
        let mut est = EnergyEstimator::new(5, 20);
        for _ in 0..5 {
            est.push(&frame(0.0));
        }
        let (_, smoothed) = est.push(&frame(0.5));
        // window is [0, 0, 0, 0, 0.5]
        assert!((smoothed - 0.1).abs() < 1e-6);
    }

    #[test]
    fn history_is_bounded_by_horizon() {
        let mut est = EnergyEstimator::new(5, 8);
        for _ in 0..100 {
            est.push(&frame(0.3));
        }
        assert_eq!(est.history.len(), 8);
    }

    #[test]
    fn noise_floor_needs_warmup() {
        let mut est = EnergyEstimator::new(5, 20);
        for _ in 0..NOISE_FLOOR_WARMUP {
            est.push(&frame(0.4));
        }
        est.update_noise_floor();
        assert_eq!(est.noise_floor(), 0.01);
    }

    #[test]
    fn noise_floor_tracks_recent_ambient_level() {
        let mut est = EnergyEstimator::new(5, 20);
        for _ in 0..10 {
            est.push(&frame(0.05));
        }
        est.update_noise_floor();
        assert!((est.noise_floor() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [0.0, 1.0];
        assert!((percentile(&values, 30.0) - 0.3).abs() < 1e-6);
        assert_eq!(percentile(&values, 0.0), 0.0);
        assert_eq!(percentile(&values, 100.0), 1.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
