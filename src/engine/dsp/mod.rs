pub mod envelope;
pub mod gain_curve;
pub mod limiter;
pub mod meter;
pub mod params;
pub mod recovery;
pub mod resampler;
pub mod ring_delay;
pub mod spectral;
