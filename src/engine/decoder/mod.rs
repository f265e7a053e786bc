pub mod symphonia_decoder;

pub trait AudioDecoder: Send {
    /// Decodes the next packet into interleaved f32 samples.
    /// Returns `None` at the end of the stream or on an unrecoverable error.
    fn next_block(&mut self) -> Option<&[f32]>;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> usize;

    /// Seeks to `time_secs`. Returns `false` if the format refused.
    fn seek(&mut self, time_secs: f64) -> bool;

    /// Total duration in seconds, if the container states it.
    fn duration(&self) -> Option<f64>;
}

/// Appends `input` (interleaved, `from` channels) to `output` with `to`
/// channels. Mono is spread to every output channel, a mono target gets the
/// average, anything else copies the shared channels and zero-fills the rest.
pub fn remix_into(input: &[f32], from: usize, to: usize, output: &mut Vec<f32>) {
    if from == 0 || to == 0 {
        return;
    }
    if from == to {
        output.extend_from_slice(input);
        return;
    }

    output.reserve(input.len() / from * to);
    for frame in input.chunks_exact(from) {
        if from == 1 {
            output.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                output.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }
}
