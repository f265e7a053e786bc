use std::path::Path;

use crate::engine::decoder::{remix_into, AudioDecoder, symphonia_decoder::SymphoniaDecoder};
use crate::engine::dsp::limiter::LimiterEngine;
use crate::engine::dsp::meter::LevelReport;
use crate::engine::dsp::params::Parameters;
use crate::engine::dsp::spectral::{SpectralAnalyzer, DEFAULT_FFT_SIZE};

/// What an offline render produced.
#[derive(Debug, Clone, Copy)]
pub struct RenderSummary {
    pub frames: u64,
    pub sample_rate: u32,
    pub channels: usize,
    /// Loudest value of each meter field over the whole file.
    pub peak: LevelReport,
}

/// Runs `input` through the limiter and writes 32-bit float WAV to `output`.
///
/// Sources with more than two channels keep the front pair. The lookahead
/// delay is compensated, so the output lines up with the input and has the
/// same length.
pub fn render_file(
    input: &Path,
    output: &Path,
    params: Parameters,
    block_frames: usize,
) -> Result<RenderSummary, Box<dyn std::error::Error>> {
    let mut decoder = SymphoniaDecoder::new(input)?;
    let sample_rate = decoder.sample_rate();
    let source_channels = decoder.channels();
    let channels = source_channels.clamp(1, 2);

    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let writer = hound::WavWriter::create(output, spec)?;

    let limiter = LimiterEngine::with_parameters(sample_rate, params)?;
    let latency = limiter.latency_samples();
    let mut renderer = OfflineRenderer {
        limiter,
        analyzer: SpectralAnalyzer::new(sample_rate, DEFAULT_FFT_SIZE)?,
        writer,
        channels,
        skip: latency * channels,
        mono: Vec::with_capacity(block_frames),
        peak: LevelReport::SILENT,
        written: 0,
    };

    let block_len = block_frames.max(1) * channels;
    let mut pending = Vec::with_capacity(block_len * 2);
    while let Some(samples) = decoder.next_block() {
        remix_into(samples, source_channels, channels, &mut pending);
        let full = pending.len() / block_len * block_len;
        for block in pending[..full].chunks_mut(block_len) {
            renderer.process(block)?;
        }
        pending.drain(..full);
    }
    if !pending.is_empty() {
        renderer.process(&mut pending)?;
    }

    // push the remaining lookahead out of the delay line
    let mut tail = vec![0.0f32; latency * channels];
    if !tail.is_empty() {
        renderer.process(&mut tail)?;
    }

    let summary = RenderSummary {
        frames: renderer.written / channels as u64,
        sample_rate,
        channels,
        peak: renderer.peak,
    };
    renderer.writer.finalize()?;

    log::info!("Rendered {} frames to {}", summary.frames, output.display());
    Ok(summary)
}

struct OfflineRenderer {
    limiter: LimiterEngine,
    analyzer: SpectralAnalyzer,
    writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    channels: usize,
    /// Leading samples still to drop for delay compensation.
    skip: usize,
    mono: Vec<f32>,
    peak: LevelReport,
    written: u64,
}

impl OfflineRenderer {
    fn process(&mut self, block: &mut [f32]) -> Result<(), Box<dyn std::error::Error>> {
        self.mono.clear();
        self.mono.extend(
            block
                .chunks(self.channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
        self.analyzer.push_samples(&self.mono);
        self.limiter.push_spectral_features(self.analyzer.analyze()?);

        self.limiter.process_interleaved(block, self.channels);
        if let Some(report) = self.limiter.take_report() {
            log::trace!("Levels {:?}", report);
            self.peak = self.peak.max(report);
        }

        let dropped = self.skip.min(block.len());
        self.skip -= dropped;
        for &sample in &block[dropped..] {
            self.writer.write_sample(sample)?;
        }
        self.written += (block.len() - dropped) as u64;
        Ok(())
    }
}
