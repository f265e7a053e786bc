use crate::engine::dsp::params::SpectralFeatures;

const MIN_HOLD_MS: f32 = 5.0;
const MAX_HOLD_MS: f32 = 200.0;
const HIT_RATIO: f32 = 0.9;
const RATE_SMOOTHING: f32 = 0.9995;

/// Which branch the follower took on the last sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// New peak above the envelope; envelope jumps to it and hold restarts.
    Attack,
    /// Envelope frozen while the hold counter runs down.
    Hold,
    /// One-pole decay toward the current peak.
    Release,
}

/// Everything the follower needs that only changes between blocks.
#[derive(Debug, Clone, Copy)]
pub struct FollowerSettings {
    pub decay: f32,
    pub lookahead_ms: f32,
    pub features: SpectralFeatures,
}

/// Stereo-linked peak follower with instant attack, adaptive hold and
/// adaptive exponential release.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    sample_rate: f32,
    envelope: f32,
    hold_remaining: u32,
    transient_rate: f32,
    stage: EnvelopeStage,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            envelope: 0.0,
            hold_remaining: 0,
            transient_rate: 0.0,
            stage: EnvelopeStage::Release,
        }
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn hold_remaining(&self) -> u32 {
        self.hold_remaining
    }

    pub fn transient_rate(&self) -> f32 {
        self.transient_rate
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Hold length in samples for an attack happening now.
    ///
    /// Never shorter than the lookahead, so gain cannot recover while the
    /// peak that caused it is still inside the delay line.
    pub fn hold_samples(&self, lookahead_ms: f32, features: &SpectralFeatures) -> u32 {
        let density_factor = 1.0 + self.transient_rate * 4.0;
        let low_freq_factor = 1.0 + features.low_band_energy * 3.0;
        let high_freq_factor = (1.0 - features.centroid_hz / 8000.0).max(0.3);

        let hold_ms = (MIN_HOLD_MS * density_factor * low_freq_factor * high_freq_factor)
            .clamp(MIN_HOLD_MS, MAX_HOLD_MS)
            .max(lookahead_ms);

        (hold_ms * 0.001 * self.sample_rate).ceil() as u32
    }

    /// Advances one sample with the linked peak `max(|L|, |R|)` and returns
    /// the new envelope.
    #[inline]
    pub fn next(&mut self, peak: f32, settings: &FollowerSettings) -> f32 {
        let hit = if peak >= self.envelope * HIT_RATIO { 1.0 } else { 0.0 };
        self.transient_rate = self.transient_rate * RATE_SMOOTHING + hit * (1.0 - RATE_SMOOTHING);

        self.stage = if peak > self.envelope {
            EnvelopeStage::Attack
        } else if self.hold_remaining > 0 {
            EnvelopeStage::Hold
        } else {
            EnvelopeStage::Release
        };

        match self.stage {
            EnvelopeStage::Attack => {
                self.envelope = peak;
                self.hold_remaining = self.hold_samples(settings.lookahead_ms, &settings.features);
            }
            EnvelopeStage::Hold => {
                self.hold_remaining -= 1;
            }
            EnvelopeStage::Release => {
                self.envelope = self.envelope * settings.decay + peak * (1.0 - settings.decay);
            }
        }

        self.envelope
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.sample_rate);
    }
}
