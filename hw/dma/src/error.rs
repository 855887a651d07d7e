// Licensed under the Apache-2.0 license

use crate::device::ChannelId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DmaError {
    #[error("Failed to initialize DMA device {index}: {reason}")]
    DeviceInit { index: u32, reason: String },
    #[error("DMA engine is busy with another transfer")]
    Busy,
    #[error("Failed to allocate {size} bytes of DMA memory")]
    Allocation { size: usize },
    #[error("Buffer is not tracked by this pool")]
    UnknownBuffer,
    #[error("Driver refused to start transfer on channel {channel}: {reason}")]
    TransferFailure { channel: ChannelId, reason: String },
    #[error("Access of {len} bytes at offset {offset} exceeds buffer of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
}
