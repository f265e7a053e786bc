pub mod cpal_backend;
pub mod output_manager;

use crate::engine::buffer::AudioBufferConsumer;
use crate::engine::control::LimiterProcessor;

/// Frames rendered per limiter call inside the device callback.
pub const RENDER_CHUNK_FRAMES: usize = 1024;

/// Everything the device callback owns while a stream is alive.
///
/// Lives in a slot shared with [`output_manager::OutputManager`] so it
/// survives a device reconnect.
pub struct RenderState {
    pub consumer: AudioBufferConsumer,
    pub processor: LimiterProcessor,
    scratch: Vec<f32>,
}

impl RenderState {
    pub fn new(consumer: AudioBufferConsumer, processor: LimiterProcessor) -> Self {
        Self {
            consumer,
            processor,
            scratch: Vec::new(),
        }
    }

    /// Sizes the scratch block for `channels`. Allocates; not for the callback.
    pub fn prepare(&mut self, channels: usize) {
        self.scratch.clear();
        self.scratch.resize(RENDER_CHUNK_FRAMES * channels.max(1), 0.0);
    }

    /// Pulls up to `total` samples from the queue into the scratch
    /// block, runs the limiter over them and hands each chunk to `emit`.
    /// Returns how many queued samples were consumed.
    pub fn render(&mut self, total: usize, channels: usize, mut emit: impl FnMut(usize, &[f32])) -> usize {
        let channels = channels.max(1);
        let chunk_len = (self.scratch.len() / channels) * channels;
        if chunk_len == 0 {
            return 0;
        }

        let mut offset = 0;
        let mut consumed = 0;
        while offset < total {
            let len = chunk_len.min(total - offset);
            let chunk = &mut self.scratch[..len];
            let read = self.consumer.pop_slice(chunk);
            chunk[read..].fill(0.0);
            self.processor.process_interleaved(chunk, channels);
            emit(offset, chunk);

            consumed += read;
            offset += len;
        }
        consumed
    }
}

pub trait AudioOutput {
    /// Starts the audio output stream.
    fn start(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// Pauses the audio output stream.
    fn pause(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// Stops the audio output stream.
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// `false` once the device errored out or the default device changed.
    fn is_healthy(&self) -> bool;

    /// Releases the device.
    fn shutdown(&mut self);

    /// Periodic housekeeping from the control thread.
    fn tick(&mut self);
}
