use crate::engine::dsp::envelope::{EnvelopeFollower, FollowerSettings};
use crate::engine::dsp::gain_curve::GainCurve;
use crate::engine::dsp::meter::{LevelReport, MeterAggregator};
use crate::engine::dsp::params::{ParamUpdate, Parameters, SpectralFeatures};
use crate::engine::dsp::recovery::RecoveryModulator;
use crate::engine::dsp::ring_delay::RingDelay;
use crate::engine::error::LimiterError;

/// Longest lookahead the ring buffer is sized for.
pub const MAX_LOOKAHEAD_MS: f32 = 20.0;

/// Values derived once at the top of every block.
struct BlockPlan {
    delay_samples: usize,
    curve: GainCurve,
    follower: FollowerSettings,
}

/// Stereo-linked lookahead peak limiter.
///
/// Owned by the thread that renders audio. Parameters and spectral features
/// set between blocks take effect at the start of the next block.
pub struct LimiterEngine {
    sample_rate: f32,
    params: Parameters,
    features: SpectralFeatures,
    delay: RingDelay,
    follower: EnvelopeFollower,
    recovery: RecoveryModulator,
    meter: MeterAggregator,
    pending_report: Option<LevelReport>,
    running: bool,
}

impl LimiterEngine {
    pub fn new(sample_rate: u32) -> Result<Self, LimiterError> {
        Self::with_parameters(sample_rate, Parameters::default())
    }

    pub fn with_parameters(sample_rate: u32, params: Parameters) -> Result<Self, LimiterError> {
        if sample_rate == 0 {
            return Err(LimiterError::InvalidSampleRate(sample_rate));
        }
        let rate = sample_rate as f32;
        let capacity = (rate * MAX_LOOKAHEAD_MS / 1000.0).ceil() as usize;

        Ok(Self {
            sample_rate: rate,
            params,
            features: SpectralFeatures::default(),
            delay: RingDelay::with_capacity(capacity)?,
            follower: EnvelopeFollower::new(rate),
            recovery: RecoveryModulator::new(rate),
            meter: MeterAggregator::new(rate),
            pending_report: None,
            running: true,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    pub fn parameters(&self) -> Parameters {
        self.params
    }

    pub fn spectral_features(&self) -> SpectralFeatures {
        self.features
    }

    pub fn envelope(&self) -> &EnvelopeFollower {
        &self.follower
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Merges the fields present in `update`. Never fails; odd values are
    /// clamped when the next block starts.
    pub fn configure(&mut self, update: &ParamUpdate) {
        self.params.apply(update);
    }

    pub fn set_parameters(&mut self, params: Parameters) {
        self.params = params;
    }

    pub fn push_spectral_features(&mut self, features: SpectralFeatures) {
        self.features = features;
    }

    /// Largest usable delay in samples.
    pub fn max_delay_samples(&self) -> usize {
        self.delay.capacity() - 1
    }

    /// Delay the current parameters put on the dry path.
    pub fn latency_samples(&self) -> usize {
        let lookahead_ms = self.params.sanitized(MAX_LOOKAHEAD_MS).lookahead_ms;
        self.delay_for(lookahead_ms)
    }

    /// Newest level report since the last call; older unread ones are gone.
    pub fn take_report(&mut self) -> Option<LevelReport> {
        self.pending_report.take()
    }

    /// Back to the freshly constructed state, keeping parameters and features.
    pub fn reset(&mut self) {
        self.follower.reset();
        self.delay.clear();
        self.meter.reset();
        self.pending_report = None;
    }

    /// Stops processing. Later blocks produce silence. Safe to repeat.
    pub fn shutdown(&mut self) {
        self.running = false;
    }

    /// Resumes after [`shutdown`](Self::shutdown) from a clean state.
    pub fn start(&mut self) {
        if !self.running {
            self.reset();
            self.running = true;
        }
    }

    /// Processes planar buffers. A missing right input is treated as a copy
    /// of the left one; a missing right output is simply not written.
    pub fn process_planar(
        &mut self,
        input_l: &[f32],
        input_r: Option<&[f32]>,
        output_l: &mut [f32],
        mut output_r: Option<&mut [f32]>,
    ) {
        let frames = planar_frames(input_l, input_r, output_l, output_r.as_deref());

        output_l[frames..].fill(0.0);
        if let Some(r) = output_r.as_deref_mut() {
            r[frames..].fill(0.0);
        }

        if !self.running {
            output_l[..frames].fill(0.0);
            if let Some(r) = output_r.as_deref_mut() {
                r[..frames].fill(0.0);
            }
            return;
        }

        let plan = self.plan_block();
        for i in 0..frames {
            let l = input_l[i];
            let r = input_r.map_or(l, |r| r[i]);
            let (out_l, out_r) = self.process_frame(&plan, l, r);
            output_l[i] = out_l;
            if let Some(out) = output_r.as_deref_mut() {
                out[i] = out_r;
            }
        }
    }

    /// Processes an interleaved buffer in place. Mono is limited on its own;
    /// channels past the second are silenced.
    pub fn process_interleaved(&mut self, samples: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        if !self.running {
            samples.fill(0.0);
            return;
        }

        let plan = self.plan_block();
        for frame in samples.chunks_mut(channels) {
            let l = frame[0];
            let r = if frame.len() > 1 { frame[1] } else { l };
            let (out_l, out_r) = self.process_frame(&plan, l, r);
            frame[0] = out_l;
            if frame.len() > 1 {
                frame[1] = out_r;
                frame[2..].fill(0.0);
            }
        }
    }

    fn plan_block(&self) -> BlockPlan {
        let params = self.params.sanitized(MAX_LOOKAHEAD_MS);
        let features = self.features.sanitized();

        BlockPlan {
            delay_samples: self.delay_for(params.lookahead_ms),
            curve: GainCurve::new(params.threshold_db, params.knee_width_db, params.makeup_gain_db),
            follower: FollowerSettings {
                decay: self.recovery.decay(params.min_recovery_ms, &features),
                lookahead_ms: params.lookahead_ms,
                features,
            },
        }
    }

    fn delay_for(&self, lookahead_ms: f32) -> usize {
        let samples = (lookahead_ms * 0.001 * self.sample_rate).round();
        if samples.is_finite() && samples > 0.0 {
            (samples as usize).min(self.max_delay_samples())
        } else {
            0
        }
    }

    #[inline]
    fn process_frame(&mut self, plan: &BlockPlan, l: f32, r: f32) -> (f32, f32) {
        let l = finite_or_silence(l);
        let r = finite_or_silence(r);

        let peak = l.abs().max(r.abs());
        let envelope = self.follower.next(peak, &plan.follower);
        let gain = plan.curve.gain(envelope);

        self.delay.write(l, r);
        let (delayed_l, delayed_r) = self.delay.read(plan.delay_samples);
        let out = (delayed_l * gain, delayed_r * gain);

        if let Some(report) = self.meter.record((l, r), out) {
            self.pending_report = Some(report);
        }
        out
    }
}

/// Frames a planar call can render: the shortest of the given buffers.
pub(crate) fn planar_frames(
    input_l: &[f32],
    input_r: Option<&[f32]>,
    output_l: &[f32],
    output_r: Option<&[f32]>,
) -> usize {
    [input_r, output_r]
        .into_iter()
        .flatten()
        .fold(input_l.len().min(output_l.len()), |frames, r| frames.min(r.len()))
}

#[inline]
fn finite_or_silence(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dsp::envelope::EnvelopeStage;

    #[test]
    fn zero_sample_rate_is_rejected() {
        assert!(matches!(LimiterEngine::new(0), Err(LimiterError::InvalidSampleRate(0))));
    }

    #[test]
    fn ring_holds_twenty_ms() {
        let engine = LimiterEngine::new(48_000).unwrap();
        assert_eq!(engine.max_delay_samples(), 959);
        assert_eq!(engine.latency_samples(), 72);
    }

    #[test]
    fn lookahead_beyond_capacity_is_clamped() {
        let mut engine = LimiterEngine::new(48_000).unwrap();
        engine.configure(&ParamUpdate::default().lookahead_ms(500.0));
        assert_eq!(engine.latency_samples(), 959);
        engine.configure(&ParamUpdate::default().lookahead_ms(-3.0));
        assert_eq!(engine.latency_samples(), 0);
    }

    #[test]
    fn first_loud_sample_attacks() {
        let mut engine = LimiterEngine::new(48_000).unwrap();
        let mut out = [0.0f32; 1];
        engine.process_planar(&[1.0], Some(&[0.2]), &mut out, None);
        assert_eq!(engine.envelope().envelope(), 1.0);
        assert_eq!(engine.envelope().stage(), EnvelopeStage::Attack);
    }

    #[test]
    fn non_finite_input_is_treated_as_silence() {
        let mut engine = LimiterEngine::new(48_000).unwrap();
        engine.configure(&ParamUpdate::default().lookahead_ms(0.0));
        let input = [f32::NAN, f32::INFINITY, 0.5];
        let mut out = [1.0f32; 3];
        engine.process_planar(&input, None, &mut out, None);
        assert!(out.iter().all(|s| s.is_finite()));
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn interleaved_mono_and_extra_channels() {
        let mut engine = LimiterEngine::new(48_000).unwrap();
        engine.configure(&ParamUpdate::default().lookahead_ms(0.0).makeup_gain_db(0.0));

        let mut mono = [0.1f32; 16];
        engine.process_interleaved(&mut mono, 1);
        assert!((mono[15] - 0.1).abs() < 1e-6);

        let mut quad = [0.1f32; 16];
        engine.process_interleaved(&mut quad, 4);
        for frame in quad.chunks(4) {
            assert!((frame[0] - 0.1).abs() < 1e-6);
            assert!((frame[1] - 0.1).abs() < 1e-6);
            assert_eq!(&frame[2..], &[0.0, 0.0]);
        }
    }

    #[test]
    fn short_outputs_limit_the_frame_count() {
        let mut engine = LimiterEngine::new(48_000).unwrap();
        let input = [0.1f32; 8];
        let mut out_l = [9.0f32; 8];
        let mut out_r = [9.0f32; 4];
        engine.process_planar(&input, Some(&input), &mut out_l, Some(&mut out_r));
        assert_eq!(&out_l[4..], &[0.0; 4]);
    }

    #[test]
    fn shutdown_is_idempotent_and_silent() {
        let mut engine = LimiterEngine::new(48_000).unwrap();
        engine.shutdown();
        engine.shutdown();
        let mut out = [1.0f32; 4];
        engine.process_planar(&[0.5; 4], None, &mut out, None);
        assert_eq!(out, [0.0; 4]);
        assert!(!engine.is_running());
    }

    #[test]
    fn restart_clears_envelope_state() {
        let mut engine = LimiterEngine::new(48_000).unwrap();
        let mut out = [0.0f32; 64];
        engine.process_planar(&[0.9; 64], None, &mut out, None);
        assert!(engine.envelope().envelope() > 0.0);

        engine.shutdown();
        engine.start();
        assert!(engine.is_running());
        assert_eq!(engine.envelope().envelope(), 0.0);
        assert_eq!(engine.envelope().hold_remaining(), 0);
        assert_eq!(engine.envelope().transient_rate(), 0.0);
    }

    #[test]
    fn parameters_survive_reset() {
        let mut engine = LimiterEngine::new(48_000).unwrap();
        engine.configure(&ParamUpdate::default().threshold_db(-1.0));
        engine.reset();
        assert_eq!(engine.parameters().threshold_db, -1.0);
    }
}
