// Licensed under the Apache-2.0 license

use crate::control::{Adau1761, DEFAULT_SAMPLE_RATE, DEFAULT_VOLUME, MAX_VOLUME};
use crate::error::CodecError;
use crate::fifo::RegisterChannel;
use crate::pll::PllDivisors;
use fpga_dma::{BufferHandle, DmaDevice, DmaError, TransferEngine, TransferMode, TransferRequest};
use log::{debug, info};
use std::sync::Arc;

/// Called on the DMA notification context once a buffer has been played to
/// the end. Not called for a stopped playback.
pub type PlaybackDone = Box<dyn FnOnce() + Send>;

/// Plays PCM buffers through the codec, one at a time.
pub struct CodecPlaybackEngine {
    codec: Adau1761,
    engine: TransferEngine,
    sample_rate: u32,
    volume: u8,
}

impl CodecPlaybackEngine {
    pub fn new(
        channel: Box<dyn RegisterChannel>,
        device: Arc<dyn DmaDevice>,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            codec: Adau1761::new(channel),
            engine: TransferEngine::open(device, TransferMode::OneWay)?,
            sample_rate: DEFAULT_SAMPLE_RATE,
            volume: DEFAULT_VOLUME,
        })
    }

    pub fn init(&mut self) -> Result<(), CodecError> {
        self.codec.init(self.sample_rate, self.volume)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_busy()
    }

    /// Allocates a DMA buffer for samples. A zero-sized request yields `None`.
    pub fn request_buffer(&self, size: usize) -> Result<Option<BufferHandle>, CodecError> {
        Ok(self.engine.allocate(size)?)
    }

    pub fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), CodecError> {
        self.engine
            .pool()
            .write(buffer, offset, data)
            .map_err(unknown_buffer)
    }

    pub fn lookup_buffer(&self, buffer: BufferHandle) -> Option<usize> {
        self.engine.pool().lookup(buffer)
    }

    /// Frees a buffer, stopping playback first if it is the one being played.
    pub fn release_buffer(&self, buffer: BufferHandle) -> Result<(), CodecError> {
        self.engine.release(buffer).map_err(unknown_buffer)
    }

    /// Starts playing `buffer` at `sample_rate`. Whatever was playing is
    /// stopped and its buffer freed. The buffer is freed by the engine once
    /// played; `on_complete` runs after that.
    ///
    /// A rate change reprograms the PLL and blocks until it locks. An
    /// unsupported rate is rejected before anything is stopped.
    pub fn play(
        &mut self,
        buffer: BufferHandle,
        sample_rate: u32,
        on_complete: PlaybackDone,
    ) -> Result<(), CodecError> {
        let size = self.lookup_buffer(buffer).ok_or(CodecError::UnknownBuffer)?;

        if sample_rate != self.sample_rate {
            PllDivisors::for_rate(sample_rate)?;
            info!("Switching sample rate {} -> {} Hz", self.sample_rate, sample_rate);
            self.codec.set_sample_rate(sample_rate)?;
            self.sample_rate = sample_rate;
        }

        self.engine.stop_transfer();
        self.engine.start_transfer(TransferRequest {
            tx: buffer,
            rx: None,
            completion: Box::new(move |_| on_complete()),
        })?;
        debug!("Playing {} bytes at {} Hz", size, sample_rate);
        Ok(())
    }

    /// Stops playback and frees the buffer being played. Returns whether
    /// anything was playing.
    pub fn stop(&self) -> bool {
        self.engine.stop_transfer()
    }

    /// Moves the volume by `delta`, clamped to `0..=MAX_VOLUME`, and returns
    /// the new volume.
    pub fn set_relative_volume(&mut self, delta: i32) -> Result<u8, CodecError> {
        let volume = (self.volume as i32 + delta).clamp(0, MAX_VOLUME as i32) as u8;
        self.codec.set_volume(volume)?;
        self.volume = volume;
        debug!("Volume set to {}", volume);
        Ok(volume)
    }
}

fn unknown_buffer(err: DmaError) -> CodecError {
    match err {
        DmaError::UnknownBuffer => CodecError::UnknownBuffer,
        other => CodecError::Dma(other),
    }
}
