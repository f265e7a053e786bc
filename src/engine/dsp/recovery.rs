use crate::engine::dsp::params::SpectralFeatures;

/// Turns the release floor and the latest spectral features into the
/// per-sample release coefficient. Evaluated once per block.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryModulator {
    sample_rate: f32,
}

impl RecoveryModulator {
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }

    /// Release time in ms, between `min_recovery_ms` and five times that.
    pub fn recovery_ms(min_recovery_ms: f32, features: &SpectralFeatures) -> f32 {
        let freq_factor = (1.0 - features.centroid_hz / 10_000.0).max(0.2);
        let energy_factor = 1.0 + features.low_band_energy * features.rms_level * 5.0;
        (min_recovery_ms * energy_factor * freq_factor).clamp(min_recovery_ms, min_recovery_ms * 5.0)
    }

    /// One-pole coefficient for the release stage.
    pub fn decay(&self, min_recovery_ms: f32, features: &SpectralFeatures) -> f32 {
        let release_secs = Self::recovery_ms(min_recovery_ms, features) / 1000.0;
        let decay = (-1.0 / (release_secs * self.sample_rate)).exp();
        if decay.is_finite() {
            decay.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_features_give_the_floor() {
        let ms = RecoveryModulator::recovery_ms(150.0, &SpectralFeatures::default());
        assert_eq!(ms, 150.0);
    }

    #[test]
    fn bass_heavy_loud_material_recovers_slower() {
        let features = SpectralFeatures {
            centroid_hz: 500.0,
            low_band_energy: 0.9,
            rms_level: 0.6,
        };
        let ms = RecoveryModulator::recovery_ms(100.0, &features);
        // 100 * (1 + 2.7) * 0.95
        assert!((ms - 351.5).abs() < 1e-2);
    }

    #[test]
    fn recovery_never_exceeds_five_times_the_floor() {
        let features = SpectralFeatures {
            centroid_hz: 0.0,
            low_band_energy: 1.0,
            rms_level: 1.0,
        };
        assert_eq!(RecoveryModulator::recovery_ms(20.0, &features), 100.0);
    }

    #[test]
    fn bright_material_is_held_at_the_floor() {
        let features = SpectralFeatures {
            centroid_hz: 15_000.0,
            low_band_energy: 0.2,
            rms_level: 0.2,
        };
        assert_eq!(RecoveryModulator::recovery_ms(50.0, &features), 50.0);
    }

    #[test]
    fn decay_matches_time_constant() {
        let modulator = RecoveryModulator::new(48_000.0);
        let decay = modulator.decay(150.0, &SpectralFeatures::default());
        let expected = (-1.0f32 / (0.15 * 48_000.0)).exp();
        assert!((decay - expected).abs() < 1e-7);
        assert!(decay < 1.0 && decay > 0.999);
    }
}
