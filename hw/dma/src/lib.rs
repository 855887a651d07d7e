// Licensed under the Apache-2.0 license

//! DMA plumbing shared by the FPGA peripherals.
//!
//! A [`DmaDevice`] is the driver seam: one AXI DMA character device with its
//! TX/RX channels, contiguous memory allocator and per-channel completion
//! notifications. On top of it sit the [`DmaBufferPool`], which owns every
//! buffer allocated from a device, and the [`TransferEngine`], which tracks
//! the single in-flight transfer of a channel pair.

mod device;
mod engine;
mod error;
#[cfg(feature = "fpga")]
mod model_axidma;
mod model_emulated;
mod pool;

pub use device::{ChannelId, CompletionCallback, DmaAddr, DmaDevice};
pub use engine::{
    Completion, TransferCompletion, TransferEngine, TransferMode, TransferRequest, TransferSlot,
};
pub use error::DmaError;
#[cfg(feature = "fpga")]
pub use model_axidma::AxiDmaDevice;
pub use model_emulated::{EmulatedDmaDevice, StreamPeripheral, DEFAULT_EMULATED_CAPACITY};
pub use pool::{BufferHandle, DmaBufferPool};
