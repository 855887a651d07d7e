// Licensed under the Apache-2.0 license

//! Playback through the ADAU1761 codec on the FPGA board.
//!
//! The codec is controlled over SPI, bridged by an AXI-stream FIFO character
//! device, and fed with PCM samples over I2S by a one-way AXI DMA device.

mod control;
mod error;
mod fifo;
mod model_emulated;
mod playback;
mod pll;
pub mod registers;

pub use control::{Adau1761, DEFAULT_SAMPLE_RATE, DEFAULT_VOLUME, MAX_VOLUME};
pub use error::CodecError;
pub use fifo::{CommandFifo, RegisterChannel, CHIP_ADDR, CMD_FIFO_DEVICE};
pub use model_emulated::{EmulatedAdau1761, EmulatedI2sSink};
pub use playback::{CodecPlaybackEngine, PlaybackDone};
pub use pll::PllDivisors;

/// DMA device index of the I2S output in the device tree.
pub const I2S_DMA_INDEX: u32 = 3;
