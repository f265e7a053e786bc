pub mod engine;

pub use engine::control::{create_limiter, LimiterControl, LimiterHandles, LimiterProcessor, SpectralFeed};
pub use engine::dsp::limiter::LimiterEngine;
pub use engine::dsp::meter::LevelReport;
pub use engine::dsp::params::{ParamUpdate, Parameters, SpectralFeatures};
pub use engine::error::LimiterError;
