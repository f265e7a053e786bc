use thiserror::Error;

/// Errors raised while building the limiter or its analysis stage.
///
/// Nothing on the per-block processing path returns these; they only come
/// out of constructors and the control-side spectral analyzer.
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("failed to allocate {what} ({len} samples)")]
    Allocation { what: &'static str, len: usize },

    #[error("invalid FFT size {0}: must be even and at least 64")]
    InvalidFftSize(usize),

    #[error("FFT failed: {0}")]
    Fft(#[from] realfft::FftError),
}
