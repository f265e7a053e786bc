use rubato::{Resampler as RubatoResampler, Fft, FixedSync};
use audioadapter_buffers::direct::SequentialSliceOfVecs;

/// Converts interleaved decoder output to the device rate in fixed chunks.
///
/// Leftover frames that do not fill a chunk wait for the next call.
pub struct Resampler {
    resampler: Fft<f32>,
    channels: usize,
    chunk_size: usize,
    pending: Vec<f32>,
    planar_in: Vec<Vec<f32>>,
    planar_out: Vec<Vec<f32>>,
}

impl Resampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: usize,
        chunk_size: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let resampler = Fft::<f32>::new(
            source_sample_rate as usize,
            target_sample_rate as usize,
            chunk_size,
            2,
            channels,
            FixedSync::Input,
        )?;
        let out_len = resampler.output_frames_next();

        Ok(Self {
            resampler,
            channels,
            chunk_size,
            pending: Vec::with_capacity(chunk_size * channels * 2),
            planar_in: vec![vec![0.0; chunk_size]; channels],
            planar_out: vec![vec![0.0; out_len]; channels],
        })
    }

    /// Resamples `input` and appends the interleaved result to `output`.
    pub fn process_into(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<(), Box<dyn std::error::Error>> {
        self.pending.extend_from_slice(input);

        let chunk_samples = self.chunk_size * self.channels;
        let mut consumed = 0;
        while self.pending.len() - consumed >= chunk_samples {
            let chunk = &self.pending[consumed..consumed + chunk_samples];
            for (i, frame) in chunk.chunks_exact(self.channels).enumerate() {
                for (ch, &sample) in frame.iter().enumerate() {
                    self.planar_in[ch][i] = sample;
                }
            }
            consumed += chunk_samples;

            let out_len = self.resampler.output_frames_next();
            for channel in self.planar_out.iter_mut() {
                if channel.len() < out_len {
                    channel.resize(out_len, 0.0);
                }
            }

            let input_adapter = SequentialSliceOfVecs::new(&self.planar_in, self.channels, self.chunk_size)?;
            let mut output_adapter = SequentialSliceOfVecs::new_mut(&mut self.planar_out, self.channels, out_len)?;
            self.resampler.process_into_buffer(&input_adapter, &mut output_adapter, None)?;

            output.reserve(out_len * self.channels);
            for i in 0..out_len {
                for ch in 0..self.channels {
                    output.push(self.planar_out[ch][i]);
                }
            }
        }
        self.pending.drain(..consumed);

        Ok(())
    }

    /// Pads the remaining partial chunk with silence and pushes it through.
    pub fn flush_into(&mut self, output: &mut Vec<f32>) -> Result<(), Box<dyn std::error::Error>> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let remaining_frames = self.pending.len() / self.channels;
        let padding = (self.chunk_size - remaining_frames) * self.channels;
        self.pending.resize(self.pending.len() + padding, 0.0);

        self.process_into(&[], output)
    }

    /// Drops buffered input and filter state, e.g. after a seek.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.resampler.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_chunks_wait_for_more_input() {
        let mut resampler = Resampler::new(44_100, 48_000, 2, 1024).unwrap();
        let mut out = Vec::new();
        resampler.process_into(&vec![0.0; 200], &mut out).unwrap();
        assert!(out.is_empty());

        resampler.flush_into(&mut out).unwrap();
        assert!(!out.is_empty());
        assert_eq!(out.len() % 2, 0);
    }

    #[test]
    fn upsampling_produces_more_frames() {
        let mut resampler = Resampler::new(24_000, 48_000, 1, 512).unwrap();
        let mut out = Vec::new();
        resampler.process_into(&vec![0.25; 512 * 8], &mut out).unwrap();
        assert!(out.len() > 512 * 8);
    }
}
