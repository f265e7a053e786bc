use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::engine::dsp::params::SpectralFeatures;
use crate::engine::error::LimiterError;

pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Weight of the previous frame in the per-bin magnitude smoothing.
const SMOOTHING: f32 = 0.3;
/// dB range mapped onto `0..=1` normalized magnitudes.
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;
const LOW_BAND_HZ: f32 = 200.0;

/// Computes [`SpectralFeatures`] from the most recent `fft_size` input
/// samples. Runs on the control side; every buffer is allocated up front so
/// it can be driven from a tight polling loop.
pub struct SpectralAnalyzer {
    sample_rate: f32,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32, fft_size: usize) -> Result<Self, LimiterError> {
        if sample_rate == 0 {
            return Err(LimiterError::InvalidSampleRate(sample_rate));
        }
        if fft_size < 64 || fft_size % 2 != 0 {
            return Err(LimiterError::InvalidFftSize(fft_size));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();

        Ok(Self {
            sample_rate: sample_rate as f32,
            window: blackman(fft_size),
            history: vec![0.0; fft_size],
            write_pos: 0,
            frame: vec![0.0; fft_size],
            smoothed: vec![0.0; fft_size / 2],
            fft,
            spectrum,
            scratch,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.history.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    /// Appends mono samples, keeping only the newest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let len = self.history.len();
        for &s in samples {
            self.history[self.write_pos] = if s.is_finite() { s } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    pub fn analyze(&mut self) -> Result<SpectralFeatures, LimiterError> {
        let len = self.history.len();
        let mut sum_squares = 0.0f32;
        for i in 0..len {
            let s = self.history[(self.write_pos + i) % len];
            sum_squares += s * s;
            self.frame[i] = s * self.window[i];
        }
        let rms = (sum_squares / len as f32).sqrt();

        self.fft
            .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.scratch)?;

        let bins = self.smoothed.len();
        let norm = 1.0 / len as f32;
        let bin_hz = self.sample_rate / (2.0 * bins as f32);
        let low_bins = ((LOW_BAND_HZ * bins as f32) / (self.sample_rate / 2.0)).floor() as usize;

        let mut weighted = 0.0f32;
        let mut total = 0.0f32;
        let mut low = 0.0f32;
        for (k, (smoothed, bin)) in self.smoothed.iter_mut().zip(&self.spectrum).enumerate() {
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * bin.norm() * norm;
            let magnitude = normalized_magnitude(*smoothed);

            weighted += k as f32 * bin_hz * magnitude;
            total += magnitude;
            if k < low_bins {
                low += magnitude;
            }
        }

        Ok(SpectralFeatures {
            centroid_hz: if total > 0.0 { weighted / total } else { 0.0 },
            low_band_energy: low / low_bins.max(1) as f32,
            rms_level: rms.min(1.0),
        })
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }
}

/// Maps a linear magnitude onto `0..=1` across `[MIN_DB, MAX_DB]`.
#[inline]
fn normalized_magnitude(magnitude: f32) -> f32 {
    let db = 20.0 * magnitude.max(1e-12).log10();
    ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0)
}

fn blackman(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / n;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48_000;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn features_of(signal: &[f32]) -> SpectralFeatures {
        let mut analyzer = SpectralAnalyzer::new(SR, DEFAULT_FFT_SIZE).unwrap();
        let mut features = SpectralFeatures::default();
        // let the bin smoothing settle
        for _ in 0..8 {
            analyzer.push_samples(signal);
            features = analyzer.analyze().unwrap();
        }
        features
    }

    #[test]
    fn rejects_bad_sizes() {
        assert!(matches!(SpectralAnalyzer::new(SR, 63), Err(LimiterError::InvalidFftSize(63))));
        assert!(matches!(SpectralAnalyzer::new(SR, 32), Err(LimiterError::InvalidFftSize(32))));
        assert!(SpectralAnalyzer::new(0, 1024).is_err());
    }

    #[test]
    fn silence_has_no_features() {
        let features = features_of(&vec![0.0; DEFAULT_FFT_SIZE]);
        assert_eq!(features, SpectralFeatures::default());
    }

    #[test]
    fn rms_of_a_sine() {
        let features = features_of(&sine(1000.0, 0.5, DEFAULT_FFT_SIZE));
        assert!((features.rms_level - 0.5 / 2f32.sqrt()).abs() < 0.01);
    }

    #[test]
    fn centroid_follows_pitch() {
        let low = features_of(&sine(150.0, 0.5, DEFAULT_FFT_SIZE));
        let high = features_of(&sine(6000.0, 0.5, DEFAULT_FFT_SIZE));
        assert!(low.centroid_hz < high.centroid_hz);
        assert!(high.centroid_hz > 1000.0);
    }

    #[test]
    fn bass_fills_the_low_band() {
        let bass = features_of(&sine(60.0, 0.5, DEFAULT_FFT_SIZE));
        let treble = features_of(&sine(8000.0, 0.5, DEFAULT_FFT_SIZE));
        assert!(bass.low_band_energy > 0.5);
        assert!(bass.low_band_energy > treble.low_band_energy);
    }

    #[test]
    fn reset_forgets_history() {
        let mut analyzer = SpectralAnalyzer::new(SR, 1024).unwrap();
        analyzer.push_samples(&sine(440.0, 0.8, 1024));
        analyzer.analyze().unwrap();
        analyzer.reset();
        assert_eq!(analyzer.analyze().unwrap(), SpectralFeatures::default());
    }
}
