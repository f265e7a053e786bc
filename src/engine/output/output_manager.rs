use std::sync::{Arc, Mutex};
use crate::engine::clock::{Clock, PlaybackState};
use crate::engine::output::cpal_backend::{CpalBackend, RenderSlot};
use crate::engine::output::{AudioOutput, RenderState};

type OutputResult = Result<(), Box<dyn std::error::Error>>;

/// Owns the render slot and swaps the cpal stream underneath it when the
/// device goes away or the system default changes. The limiter keeps its
/// parameters across a swap; its engine is rebuilt only if the new device
/// runs at another rate.
pub struct OutputManager {
    backend: Option<CpalBackend>,
    render: RenderSlot,
    clock: Arc<Clock>,
    reconnects: u32,
}

impl OutputManager {
    pub fn new(render: RenderState, clock: Arc<Clock>) -> Self {
        let mut manager = Self {
            backend: None,
            render: Arc::new(Mutex::new(Some(render))),
            clock,
            reconnects: 0,
        };
        if let Err(e) = manager.open_backend() {
            log::warn!("No audio output yet: {}", e);
        }
        manager
    }

    fn open_backend(&mut self) -> OutputResult {
        let backend = CpalBackend::new(self.render.clone(), self.clock.clone())?;
        self.backend = Some(backend);
        Ok(())
    }

    /// Drops an unhealthy stream and opens the current default device,
    /// resuming playback if the clock says we were playing.
    fn replace_backend(&mut self) {
        if let Some(mut stale) = self.backend.take() {
            stale.shutdown();
        }
        match self.open_backend() {
            Ok(()) => {
                self.reconnects += 1;
                log::info!(
                    "Output reopened at {} Hz/{} ch (reconnect #{})",
                    self.clock.get_sample_rate(),
                    self.clock.get_channels(),
                    self.reconnects
                );
                if self.clock.get_state() == PlaybackState::Playing {
                    if let Err(e) = self.start() {
                        log::warn!("Could not resume after reconnect: {}", e);
                    }
                }
            }
            Err(e) => log::debug!("Output still unavailable: {}", e),
        }
    }
}

impl AudioOutput for OutputManager {
    fn start(&mut self) -> OutputResult {
        if self.backend.is_none() {
            self.open_backend()?;
        }
        self.backend
            .as_mut()
            .ok_or("No audio backend available")?
            .start()
    }

    fn pause(&mut self) -> OutputResult {
        self.backend.as_mut().map_or(Ok(()), |b| b.pause())
    }

    fn stop(&mut self) -> OutputResult {
        self.backend.as_mut().map_or(Ok(()), |b| b.stop())
    }

    fn is_healthy(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_healthy())
    }

    fn shutdown(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.shutdown();
        }
    }

    fn tick(&mut self) {
        if !self.is_healthy() {
            self.replace_backend();
        }
    }
}
