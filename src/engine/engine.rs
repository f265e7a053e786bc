use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::buffer::{create_audio_buffer, AudioBufferConsumer, AudioBufferProducer};
use crate::engine::clock::{Clock, PlaybackState};
use crate::engine::control::{create_limiter_with, LimiterControl, LimiterHandles, SpectralFeed};
use crate::engine::decoder::{remix_into, AudioDecoder, symphonia_decoder::SymphoniaDecoder};
use crate::engine::dsp::meter::LevelReport;
use crate::engine::dsp::params::{ParamUpdate, Parameters};
use crate::engine::dsp::resampler::Resampler;
use crate::engine::dsp::spectral::{SpectralAnalyzer, DEFAULT_FFT_SIZE};
use crate::engine::output::{AudioOutput, RenderState, output_manager::OutputManager};

/// Rate assumed until the output device reports its own.
const DEFAULT_SAMPLE_RATE: u32 = 44100;
/// Samples between two spectral analyses, roughly one display frame.
const ANALYSIS_HOP: usize = 768;
const ANALYSIS_TAP_LEN: usize = DEFAULT_FFT_SIZE * 4;
const RESAMPLER_CHUNK: usize = 1024;
/// Minimum free queue space before the decoder produces another packet.
const DECODE_HEADROOM: usize = 4096;

enum DecoderCommand {
    Seek(f64),
    Stop,
}

/// File player with the limiter in the device callback.
///
/// Three threads besides the caller: the decoder filling the sample queue,
/// the device callback draining it through the limiter, and the analysis
/// thread turning the limiter's input tap into spectral features.
pub struct AudioEngine {
    clock: Arc<Clock>,
    output: Box<dyn AudioOutput>,
    producer: Option<AudioBufferProducer>,
    decode_thread: Option<JoinHandle<AudioBufferProducer>>,
    is_decoding: Arc<AtomicBool>,
    command_tx: Option<Sender<DecoderCommand>>,
    limiter: LimiterControl,
    analysis_thread: Option<JoinHandle<()>>,
    analysis_running: Arc<AtomicBool>,
}

impl AudioEngine {
    pub fn new(params: Parameters) -> Result<Self, Box<dyn std::error::Error>> {
        let clock = Arc::new(Clock::new(DEFAULT_SAMPLE_RATE));

        // one second of stereo audio
        let (producer, consumer) = create_audio_buffer(DEFAULT_SAMPLE_RATE as usize * 2);

        let LimiterHandles { control, spectral, mut processor } =
            create_limiter_with(DEFAULT_SAMPLE_RATE, params)?;
        let (tap_tx, tap_rx) = create_audio_buffer(ANALYSIS_TAP_LEN);
        processor.set_analysis_tap(tap_tx);

        let output = Box::new(OutputManager::new(RenderState::new(consumer, processor), clock.clone()));

        let analysis_running = Arc::new(AtomicBool::new(true));
        let analysis_thread = {
            let clock = clock.clone();
            let running = analysis_running.clone();
            thread::Builder::new()
                .name("spectral-analysis".into())
                .spawn(move || run_analysis(tap_rx, spectral, clock, running))?
        };

        Ok(Self {
            clock,
            output,
            producer: Some(producer),
            decode_thread: None,
            is_decoding: Arc::new(AtomicBool::new(false)),
            command_tx: None,
            limiter: control,
            analysis_thread: Some(analysis_thread),
            analysis_running,
        })
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        self.stop();

        let decoder: Box<dyn AudioDecoder> = Box::new(SymphoniaDecoder::new(path)?);
        let producer = self.producer.take().ok_or("Producer already in use or missing")?;

        let (tx, rx) = mpsc::channel();
        self.command_tx = Some(tx);

        self.is_decoding.store(true, Ordering::SeqCst);
        self.clock.set_eos(false);
        self.clock.set_sample_pos(0);

        let job = DecodeJob {
            decoder,
            producer,
            clock: self.clock.clone(),
            is_decoding: self.is_decoding.clone(),
            commands: rx,
        };
        let handle = thread::Builder::new()
            .name("decoder".into())
            .spawn(move || job.run())?;

        self.decode_thread = Some(handle);
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.clock.set_state(PlaybackState::Playing);
        self.output.start()?;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.clock.set_state(PlaybackState::Paused);
        self.output.pause()?;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.clock.set_state(PlaybackState::Stopped);
        let _ = self.output.stop();

        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(DecoderCommand::Stop);
        }

        self.is_decoding.store(false, Ordering::SeqCst);
        if let Some(handle) = self.decode_thread.take() {
            match handle.join() {
                Ok(producer) => self.producer = Some(producer),
                Err(_) => log::error!("Decode thread panicked; playback cannot be restarted"),
            }
        }

        self.clock.set_sample_pos(0);
        self.clock.signal_clear_buffer();
        self.limiter.reset();
    }

    pub fn seek(&mut self, time_secs: f64) {
        let sample_pos = (time_secs * self.clock.get_sample_rate() as f64 * self.clock.get_channels() as f64) as u64;
        self.clock.set_sample_pos(sample_pos);
        self.clock.signal_clear_buffer();

        if let Some(tx) = &self.command_tx {
            let _ = tx.send(DecoderCommand::Seek(time_secs));
        }
    }

    pub fn get_time_secs(&self) -> f64 {
        self.clock.get_time_secs()
    }

    /// Playback ran to the end of the file.
    pub fn is_finished(&self) -> bool {
        self.clock.is_eos() && self.clock.get_state() == PlaybackState::Stopped
    }

    pub fn configure(&mut self, update: &ParamUpdate) {
        self.limiter.configure(update);
    }

    pub fn parameters(&self) -> Parameters {
        self.limiter.parameters()
    }

    /// Latest meter reading; stays at the last value if reports stopped.
    pub fn levels(&mut self) -> LevelReport {
        self.limiter.poll_levels();
        self.limiter.latest_levels()
    }

    pub fn limiter(&mut self) -> &mut LimiterControl {
        &mut self.limiter
    }

    pub fn tick(&mut self) {
        self.output.tick();
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
        self.limiter.shutdown();
        self.output.shutdown();
        self.analysis_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.analysis_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Everything the decode thread owns. Hands the producer back on exit so
/// the next `load` can reuse the queue.
struct DecodeJob {
    decoder: Box<dyn AudioDecoder>,
    producer: AudioBufferProducer,
    clock: Arc<Clock>,
    is_decoding: Arc<AtomicBool>,
    commands: Receiver<DecoderCommand>,
}

impl DecodeJob {
    fn run(mut self) -> AudioBufferProducer {
        let source_rate = self.decoder.sample_rate();
        let source_channels = self.decoder.channels();
        let mut output_format = (0, 0);
        let mut resampler: Option<Resampler> = None;
        let mut resampled = Vec::new();
        let mut remixed = Vec::new();

        'decode: while self.is_decoding.load(Ordering::Relaxed) {
            while let Ok(cmd) = self.commands.try_recv() {
                match cmd {
                    DecoderCommand::Seek(time) => self.seek(time, &mut resampler),
                    DecoderCommand::Stop => break 'decode,
                }
            }

            let current_format = (self.clock.get_sample_rate(), self.clock.get_channels());
            if current_format != output_format {
                let (rate, channels) = current_format;
                log::info!(
                    "Decoder output {} Hz/{} ch -> {} Hz/{} ch",
                    source_rate, source_channels, rate, channels
                );
                output_format = current_format;
                resampler = if rate != source_rate {
                    match Resampler::new(source_rate, rate, source_channels, RESAMPLER_CHUNK) {
                        Ok(r) => Some(r),
                        Err(e) => {
                            log::error!("Cannot resample {} Hz -> {} Hz: {}", source_rate, rate, e);
                            break 'decode;
                        }
                    }
                } else {
                    None
                };
                self.clock.signal_clear_buffer();
            }

            if self.producer.vacant_len() < DECODE_HEADROOM {
                thread::sleep(Duration::from_millis(10));
                continue;
            }

            resampled.clear();
            remixed.clear();
            let Some(samples) = self.decoder.next_block() else {
                if let Some(r) = &mut resampler {
                    if let Err(e) = r.flush_into(&mut resampled) {
                        log::warn!("Resampler flush failed: {}", e);
                    }
                    remix_into(&resampled, source_channels, output_format.1, &mut remixed);
                    self.producer.push_slice(&remixed);
                }
                log::info!("End of stream");
                self.clock.set_eos(true);
                break 'decode;
            };

            let source: &[f32] = match &mut resampler {
                Some(r) => {
                    if let Err(e) = r.process_into(samples, &mut resampled) {
                        log::error!("Resampling error: {}", e);
                        break 'decode;
                    }
                    &resampled
                }
                None => samples,
            };
            remix_into(source, source_channels, output_format.1, &mut remixed);

            let mut pushed = 0;
            while pushed < remixed.len() {
                if !self.is_decoding.load(Ordering::Relaxed) {
                    break 'decode;
                }
                if let Ok(cmd) = self.commands.try_recv() {
                    match cmd {
                        DecoderCommand::Seek(time) => {
                            self.seek(time, &mut resampler);
                            continue 'decode;
                        }
                        DecoderCommand::Stop => break 'decode,
                    }
                }

                pushed += self.producer.push_slice(&remixed[pushed..]);
                if pushed < remixed.len() {
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }

        self.is_decoding.store(false, Ordering::SeqCst);
        self.producer
    }

    fn seek(&mut self, time: f64, resampler: &mut Option<Resampler>) {
        if self.decoder.seek(time) {
            if let Some(r) = resampler {
                r.reset();
            }
            self.clock.set_eos(false);
        }
        self.clock.signal_clear_buffer();
    }
}

/// Feeds the limiter's input tap through a [`SpectralAnalyzer`] and
/// publishes the result every [`ANALYSIS_HOP`] samples.
fn run_analysis(
    mut tap: AudioBufferConsumer,
    mut feed: SpectralFeed,
    clock: Arc<Clock>,
    running: Arc<AtomicBool>,
) {
    let mut analyzer: Option<SpectralAnalyzer> = None;
    let mut block = vec![0.0f32; ANALYSIS_HOP];
    let mut since_last = 0;

    while running.load(Ordering::Relaxed) {
        let rate = clock.get_sample_rate();
        if analyzer.as_ref().map(|a| a.sample_rate()) != Some(rate) {
            analyzer = match SpectralAnalyzer::new(rate, DEFAULT_FFT_SIZE) {
                Ok(a) => Some(a),
                Err(e) => {
                    log::error!("Spectral analysis disabled: {}", e);
                    return;
                }
            };
            since_last = 0;
        }
        let Some(active) = analyzer.as_mut() else {
            return;
        };

        let n = tap.pop_slice(&mut block);
        if n == 0 {
            thread::sleep(Duration::from_millis(5));
            continue;
        }

        active.push_samples(&block[..n]);
        since_last += n;
        if since_last >= ANALYSIS_HOP {
            since_last = 0;
            match active.analyze() {
                Ok(features) => {
                    log::trace!("Spectral features {:?}", features);
                    feed.push(features);
                }
                Err(e) => log::warn!("Spectral analysis failed: {}", e),
            }
        }
    }
}
