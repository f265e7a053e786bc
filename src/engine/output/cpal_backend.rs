use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use crate::engine::clock::{Clock, PlaybackState};
use crate::engine::output::{AudioOutput, RenderState};

/// Render state slot shared between the control thread and the callback.
/// The callback only ever `try_lock`s it.
pub type RenderSlot = Arc<Mutex<Option<RenderState>>>;

pub struct CpalBackend {
    stream: Stream,
    device_id: String,
    is_healthy: Arc<AtomicBool>,
}

impl CpalBackend {
    pub fn new(render: RenderSlot, clock: Arc<Clock>) -> Result<Self, Box<dyn std::error::Error>> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or("No output device available")?;
        let device_id = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        clock.set_sample_rate(config.sample_rate);
        clock.set_channels(config.channels);

        {
            // no stream is attached to the slot while a backend is being built
            let mut guard = render.lock().map_err(|_| "render state poisoned")?;
            if let Some(state) = guard.as_mut() {
                state.processor.set_sample_rate(config.sample_rate)?;
                state.prepare(config.channels as usize);
            }
        }

        log::info!(
            "Output device '{}': {} Hz, {} ch, {:?}",
            device_id,
            config.sample_rate,
            config.channels,
            sample_format
        );

        let is_healthy = Arc::new(AtomicBool::new(true));
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, render, clock, is_healthy.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, render, clock, is_healthy.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, render, clock, is_healthy.clone())?,
            other => return Err(format!("Unsupported sample format {:?}", other).into()),
        };

        Ok(Self {
            stream,
            device_id,
            is_healthy,
        })
    }
}

impl AudioOutput for CpalBackend {
    fn start(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.stream.play()?;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.stream.pause()?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let _ = self.stream.pause();
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        if !self.is_healthy.load(Ordering::SeqCst) {
            return false;
        }
        let host = cpal::default_host();
        if let Some(device) = host.default_output_device() {
            if let Ok(name) = device.name() {
                if name != self.device_id {
                    log::info!("Default output changed from '{}' to '{}'", self.device_id, name);
                    return false;
                }
            }
        }
        true
    }

    fn shutdown(&mut self) {
        let _ = self.stream.pause();
    }

    fn tick(&mut self) {}
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    render: RenderSlot,
    clock: Arc<Clock>,
    is_healthy: Arc<AtomicBool>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| match render.try_lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(state) => process_audio(data, state, &clock, channels),
                None => data.fill(T::EQUILIBRIUM),
            },
            Err(_) => data.fill(T::EQUILIBRIUM),
        },
        move |err| {
            is_healthy.store(false, Ordering::SeqCst);
            log::error!("Output stream error: {}", err);
        },
        None,
    )
}

fn process_audio<T: Sample + FromSample<f32>>(
    data: &mut [T],
    state: &mut RenderState,
    clock: &Clock,
    channels: usize,
) {
    if clock.take_clear_buffer() {
        state.consumer.clear();
    }

    if clock.get_state() != PlaybackState::Playing {
        data.fill(T::EQUILIBRIUM);
        return;
    }

    let total = data.len();
    let consumed = state.render(total, channels, |offset, chunk| {
        for (out, &sample) in data[offset..offset + chunk.len()].iter_mut().zip(chunk) {
            *out = T::from_sample(sample);
        }
    });

    clock.increment_samples(consumed as u64);

    if consumed == 0 && clock.is_eos() {
        clock.set_state(PlaybackState::Stopped);
    }
}
