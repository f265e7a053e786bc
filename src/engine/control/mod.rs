mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::buffer::{create_ring, AudioBufferProducer, RingConsumer, RingProducer};
use crate::engine::dsp::limiter::{planar_frames, LimiterEngine};
use crate::engine::dsp::meter::LevelReport;
use crate::engine::dsp::params::{ParamUpdate, Parameters, SpectralFeatures};
use crate::engine::error::LimiterError;
use snapshot::SnapshotCell;

/// How many unread level reports the control side may fall behind by.
const LEVEL_QUEUE_LEN: usize = 16;

/// State shared between the control side and the render thread.
/// Everything in here is read by the render thread without waiting.
struct Shared {
    params: SnapshotCell<5>,
    spectral: SnapshotCell<3>,
    running: AtomicBool,
    reset_requested: AtomicBool,
}

/// The three ends of a limiter, one per thread role.
pub struct LimiterHandles {
    pub control: LimiterControl,
    pub spectral: SpectralFeed,
    pub processor: LimiterProcessor,
}

/// Builds a limiter with default parameters.
pub fn create_limiter(sample_rate: u32) -> Result<LimiterHandles, LimiterError> {
    create_limiter_with(sample_rate, Parameters::default())
}

pub fn create_limiter_with(sample_rate: u32, params: Parameters) -> Result<LimiterHandles, LimiterError> {
    let engine = LimiterEngine::with_parameters(sample_rate, params)?;
    let shared = Arc::new(Shared {
        params: SnapshotCell::new(params.to_array()),
        spectral: SnapshotCell::new(SpectralFeatures::default().to_array()),
        running: AtomicBool::new(true),
        reset_requested: AtomicBool::new(false),
    });
    let (level_tx, level_rx) = create_ring(LEVEL_QUEUE_LEN);

    Ok(LimiterHandles {
        control: LimiterControl {
            shared: shared.clone(),
            params,
            levels: level_rx,
            latest: LevelReport::SILENT,
        },
        spectral: SpectralFeed { shared: shared.clone() },
        processor: LimiterProcessor {
            params_generation: shared.params.generation(),
            spectral_generation: shared.spectral.generation(),
            shared,
            engine,
            levels: level_tx,
            tap: None,
        },
    })
}

/// Control-thread end: parameters, lifecycle and meter readout.
pub struct LimiterControl {
    shared: Arc<Shared>,
    params: Parameters,
    levels: RingConsumer<LevelReport>,
    latest: LevelReport,
}

impl LimiterControl {
    /// Merges `update` into the current parameters and publishes the result.
    /// Takes effect at the start of the next rendered block.
    pub fn configure(&mut self, update: &ParamUpdate) {
        self.params.apply(update);
        self.shared.params.publish(self.params.to_array());
    }

    pub fn parameters(&self) -> Parameters {
        self.params
    }

    pub fn reset(&self) {
        self.shared.reset_requested.store(true, Ordering::Release);
    }

    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    /// Resumes a shut down limiter. State is cleared before the first block.
    pub fn start(&self) {
        if !self.shared.running.load(Ordering::Acquire) {
            // the render thread may never observe the stopped state
            self.shared.reset_requested.store(true, Ordering::Release);
        }
        self.shared.running.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Drains pending reports and returns the newest one, if any arrived.
    pub fn poll_levels(&mut self) -> Option<LevelReport> {
        let report = self.levels.pop_latest();
        if let Some(report) = report {
            self.latest = report;
        }
        report
    }

    /// Last report seen by [`poll_levels`](Self::poll_levels).
    pub fn latest_levels(&self) -> LevelReport {
        self.latest
    }
}

/// Analysis-thread end: publishes spectral features.
pub struct SpectralFeed {
    shared: Arc<Shared>,
}

impl SpectralFeed {
    pub fn push(&mut self, features: SpectralFeatures) {
        self.shared.spectral.publish(features.to_array());
    }
}

/// Render-thread end. Owns the engine; never blocks or allocates while
/// processing.
pub struct LimiterProcessor {
    shared: Arc<Shared>,
    engine: LimiterEngine,
    params_generation: u32,
    spectral_generation: u32,
    levels: RingProducer<LevelReport>,
    tap: Option<AudioBufferProducer>,
}

impl LimiterProcessor {
    /// Mirrors the mono mix of every processed input frame into `tap`.
    pub fn set_analysis_tap(&mut self, tap: AudioBufferProducer) {
        self.tap = Some(tap);
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    pub fn engine(&self) -> &LimiterEngine {
        &self.engine
    }

    /// Rebuilds the engine for a new rate. Allocates; call it off the render
    /// thread, before the stream starts.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), LimiterError> {
        if sample_rate == self.engine.sample_rate() {
            return Ok(());
        }
        let mut engine = LimiterEngine::with_parameters(sample_rate, self.engine.parameters())?;
        engine.push_spectral_features(self.engine.spectral_features());
        if !self.engine.is_running() {
            engine.shutdown();
        }
        self.engine = engine;
        Ok(())
    }

    pub fn process_interleaved(&mut self, samples: &mut [f32], channels: usize) {
        self.sync();
        if let (Some(tap), true) = (self.tap.as_mut(), self.engine.is_running()) {
            if channels > 0 {
                for frame in samples.chunks(channels) {
                    let _ = tap.push(mono_mix(frame[0], frame.get(1).copied()));
                }
            }
        }
        self.engine.process_interleaved(samples, channels);
        self.publish_levels();
    }

    pub fn process_planar(
        &mut self,
        input_l: &[f32],
        input_r: Option<&[f32]>,
        output_l: &mut [f32],
        output_r: Option<&mut [f32]>,
    ) {
        self.sync();
        if let (Some(tap), true) = (self.tap.as_mut(), self.engine.is_running()) {
            let frames = planar_frames(input_l, input_r, output_l, output_r.as_deref());
            for (i, &l) in input_l[..frames].iter().enumerate() {
                let _ = tap.push(mono_mix(l, input_r.map(|r| r[i])));
            }
        }
        self.engine.process_planar(input_l, input_r, output_l, output_r);
        self.publish_levels();
    }

    /// Applies whatever the control side published since the last block.
    fn sync(&mut self) {
        let generation = self.shared.params.generation();
        if generation != self.params_generation {
            if let Some(values) = self.shared.params.read() {
                self.engine.set_parameters(Parameters::from_array(values));
                self.params_generation = generation;
            }
        }

        let generation = self.shared.spectral.generation();
        if generation != self.spectral_generation {
            if let Some(values) = self.shared.spectral.read() {
                self.engine.push_spectral_features(SpectralFeatures::from_array(values));
                self.spectral_generation = generation;
            }
        }

        let running = self.shared.running.load(Ordering::Acquire);
        if running && !self.engine.is_running() {
            self.engine.start();
        } else if !running {
            self.engine.shutdown();
        }

        if self.shared.reset_requested.swap(false, Ordering::AcqRel) {
            self.engine.reset();
        }
    }

    fn publish_levels(&mut self) {
        if let Some(report) = self.engine.take_report() {
            // a full queue means nobody is reading; dropping is fine
            let _ = self.levels.push(report);
        }
    }
}

#[inline]
fn mono_mix(l: f32, r: Option<f32>) -> f32 {
    match r {
        Some(r) => 0.5 * (l + r),
        None => l,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::create_audio_buffer;

    fn block(processor: &mut LimiterProcessor, value: f32, frames: usize) -> Vec<f32> {
        let mut buf = vec![value; frames * 2];
        processor.process_interleaved(&mut buf, 2);
        buf
    }

    #[test]
    fn configure_reaches_the_engine_on_next_block() {
        let LimiterHandles { mut control, mut processor, .. } = create_limiter(48_000).unwrap();
        control.configure(&ParamUpdate::default().lookahead_ms(10.0));
        assert_eq!(processor.engine().parameters().lookahead_ms, 1.5);

        block(&mut processor, 0.0, 16);
        let params = processor.engine().parameters();
        assert_eq!(params.lookahead_ms, 10.0);
        assert_eq!(params.threshold_db, -8.0);
        assert_eq!(control.parameters(), params);
    }

    #[test]
    fn spectral_features_are_replaced_whole() {
        let LimiterHandles { mut spectral, mut processor, .. } = create_limiter(48_000).unwrap();
        let features = SpectralFeatures {
            centroid_hz: 2500.0,
            low_band_energy: 0.4,
            rms_level: 0.2,
        };
        spectral.push(features);
        block(&mut processor, 0.0, 4);
        assert_eq!(processor.engine().spectral_features(), features);
    }

    #[test]
    fn shutdown_and_start_go_through_the_handoff() {
        let LimiterHandles { control, mut processor, .. } = create_limiter(48_000).unwrap();
        block(&mut processor, 0.9, 256);
        assert!(processor.engine().envelope().envelope() > 0.0);

        control.shutdown();
        control.shutdown();
        let out = block(&mut processor, 0.9, 256);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!processor.engine().is_running());

        control.start();
        block(&mut processor, 0.0, 1);
        assert!(processor.engine().is_running());
        assert_eq!(processor.engine().envelope().envelope(), 0.0);
    }

    #[test]
    fn restart_between_two_blocks_still_clears_state() {
        let LimiterHandles { control, mut processor, .. } = create_limiter(48_000).unwrap();
        block(&mut processor, 0.9, 512);
        assert!(processor.engine().envelope().envelope() > 0.89);

        control.shutdown();
        control.start();
        block(&mut processor, 0.0, 1);
        assert!(processor.engine().is_running());
        assert_eq!(processor.engine().envelope().envelope(), 0.0);
        assert_eq!(processor.engine().envelope().hold_remaining(), 0);
    }

    #[test]
    fn actions_queued_between_blocks_apply_together() {
        let LimiterHandles { mut control, mut processor, .. } = create_limiter(48_000).unwrap();
        block(&mut processor, 0.9, 512);

        control.shutdown();
        control.reset();
        control.configure(&ParamUpdate::default().threshold_db(-3.0));
        let out = block(&mut processor, 0.9, 64);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!processor.engine().is_running());
        assert_eq!(processor.engine().parameters().threshold_db, -3.0);
        assert_eq!(processor.engine().envelope().envelope(), 0.0);

        control.start();
        control.configure(&ParamUpdate::default().makeup_gain_db(0.0));
        let out = block(&mut processor, 0.1, 1);
        assert!(processor.engine().is_running());
        // the delay line was cleared, so the first frame reads silence
        assert_eq!(out, vec![0.0, 0.0]);
        assert_eq!(processor.engine().envelope().envelope(), 0.1);
        assert_eq!(processor.engine().parameters().makeup_gain_db, 0.0);
    }

    #[test]
    fn start_while_running_keeps_state() {
        let LimiterHandles { control, mut processor, .. } = create_limiter(48_000).unwrap();
        block(&mut processor, 0.9, 64);
        control.start();
        block(&mut processor, 0.0, 1);
        assert!(processor.engine().envelope().envelope() > 0.8);
    }

    #[test]
    fn reset_request_is_consumed_once() {
        let LimiterHandles { control, mut processor, .. } = create_limiter(48_000).unwrap();
        block(&mut processor, 0.9, 64);
        control.reset();
        let out = block(&mut processor, 0.0, 256);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!control.shared.reset_requested.load(Ordering::Acquire));
    }

    #[test]
    fn levels_arrive_on_the_control_side() {
        let LimiterHandles { mut control, mut processor, .. } = create_limiter(48_000).unwrap();
        assert_eq!(control.poll_levels(), None);
        assert_eq!(control.latest_levels(), LevelReport::SILENT);

        block(&mut processor, 0.0, 768 * 3);
        assert_eq!(control.poll_levels(), Some(LevelReport::SILENT));

        block(&mut processor, 0.5, 768);
        let report = control.poll_levels().unwrap();
        assert!((report.in_l + 6.0206).abs() < 1e-3);
        assert_eq!(control.latest_levels(), report);
    }

    #[test]
    fn level_queue_overflow_drops_reports_without_blocking() {
        let LimiterHandles { mut control, mut processor, .. } = create_limiter(48_000).unwrap();
        for _ in 0..(LEVEL_QUEUE_LEN * 3) {
            block(&mut processor, 0.25, 768);
        }
        assert!(control.poll_levels().is_some());
        assert_eq!(control.poll_levels(), None);
    }

    #[test]
    fn tap_receives_mono_mix() {
        let LimiterHandles { mut processor, .. } = create_limiter(48_000).unwrap();
        let (tap, mut tap_rx) = create_audio_buffer(64);
        processor.set_analysis_tap(tap);

        let mut buf = [0.2f32, 0.4, 0.6, 0.8];
        processor.process_interleaved(&mut buf, 2);
        assert_eq!(tap_rx.occupied_len(), 2);
        assert!((tap_rx.pop().unwrap() - 0.3).abs() < 1e-6);
        assert!((tap_rx.pop().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn planar_tap_only_sees_rendered_frames() {
        let LimiterHandles { mut processor, .. } = create_limiter(48_000).unwrap();
        let (tap, mut tap_rx) = create_audio_buffer(64);
        processor.set_analysis_tap(tap);

        let left = [0.2f32; 8];
        let right = [0.4f32; 3];
        let mut out_l = [0.0f32; 8];
        let mut out_r = [0.0f32; 8];
        processor.process_planar(&left, Some(&right), &mut out_l, Some(&mut out_r));
        assert_eq!(tap_rx.occupied_len(), 3);
        assert!((tap_rx.pop().unwrap() - 0.3).abs() < 1e-6);

        let mut short_out = [0.0f32; 5];
        processor.process_planar(&left, None, &mut short_out, None);
        assert_eq!(tap_rx.occupied_len(), 2 + 5);
    }

    #[test]
    fn sample_rate_change_keeps_parameters() {
        let LimiterHandles { mut control, mut processor, .. } = create_limiter(44_100).unwrap();
        control.configure(&ParamUpdate::default().threshold_db(-2.0));
        block(&mut processor, 0.0, 4);
        processor.set_sample_rate(96_000).unwrap();
        assert_eq!(processor.sample_rate(), 96_000);
        assert_eq!(processor.engine().parameters().threshold_db, -2.0);
        assert_eq!(processor.engine().max_delay_samples(), 1919);
    }
}
