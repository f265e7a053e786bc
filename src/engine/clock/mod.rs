use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Represents the current playback state of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl From<u8> for PlaybackState {
    fn from(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }
}

/// Timing and stream-format authority shared by the decode thread, the
/// output callback and the control thread. Atomics only, so the output
/// callback can read it without waiting.
pub struct Clock {
    /// Interleaved samples delivered to the device.
    sample_pos: AtomicU64,
    /// Device sample rate.
    sample_rate: AtomicU32,
    /// Device channel count.
    channels: AtomicU8,
    state: AtomicU8,
    /// Set by a seek; the output callback drops queued audio once.
    clear_buffer: AtomicBool,
    /// The decoder has pushed its last sample.
    end_of_stream: AtomicBool,
}

impl Clock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_pos: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            channels: AtomicU8::new(2),
            state: AtomicU8::new(PlaybackState::Stopped as u8),
            clear_buffer: AtomicBool::new(false),
            end_of_stream: AtomicBool::new(false),
        }
    }

    pub fn get_sample_pos(&self) -> u64 {
        self.sample_pos.load(Ordering::Relaxed)
    }

    pub fn set_sample_pos(&self, pos: u64) {
        self.sample_pos.store(pos, Ordering::SeqCst);
    }

    /// Advances the position after the output layer rendered a block.
    pub fn increment_samples(&self, amount: u64) {
        if self.get_state() == PlaybackState::Playing {
            self.sample_pos.fetch_add(amount, Ordering::Relaxed);
        }
    }

    pub fn get_time_secs(&self) -> f64 {
        let pos = self.get_sample_pos() as f64;
        let rate = self.get_sample_rate() as f64;
        let channels = self.get_channels() as f64;
        if rate > 0.0 && channels > 0.0 {
            pos / (rate * channels)
        } else {
            0.0
        }
    }

    pub fn get_state(&self) -> PlaybackState {
        PlaybackState::from(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::SeqCst);
    }

    pub fn get_sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn set_channels(&self, channels: u16) {
        self.channels.store(channels.min(u8::MAX as u16) as u8, Ordering::SeqCst);
    }

    pub fn get_channels(&self) -> usize {
        self.channels.load(Ordering::Relaxed) as usize
    }

    pub fn signal_clear_buffer(&self) {
        self.clear_buffer.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once per [`signal_clear_buffer`](Self::signal_clear_buffer).
    pub fn take_clear_buffer(&self) -> bool {
        self.clear_buffer.swap(false, Ordering::AcqRel)
    }

    pub fn set_eos(&self, eos: bool) {
        self.end_of_stream.store(eos, Ordering::SeqCst);
    }

    pub fn is_eos(&self) -> bool {
        self.end_of_stream.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_only_advances_while_playing() {
        let clock = Clock::new(48_000);
        clock.increment_samples(96_000);
        assert_eq!(clock.get_sample_pos(), 0);

        clock.set_state(PlaybackState::Playing);
        clock.increment_samples(96_000);
        assert!((clock.get_time_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn clear_request_is_taken_once() {
        let clock = Clock::new(44_100);
        clock.signal_clear_buffer();
        assert!(clock.take_clear_buffer());
        assert!(!clock.take_clear_buffer());
    }
}
