pub mod buffer;
pub mod clock;
pub mod control;
pub mod decoder;
pub mod dsp;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod error;
pub mod output;
pub mod render;
