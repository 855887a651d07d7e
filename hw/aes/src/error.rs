// Licensed under the Apache-2.0 license

use fpga_dma::DmaError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AesError {
    #[error(transparent)]
    Dma(#[from] DmaError),
    #[error("Output buffer too small: {needed} bytes needed, {capacity} available")]
    OutputTooSmall { needed: usize, capacity: usize },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to map config register at {addr:#x}: {source}")]
    Map {
        addr: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("Receive buffer was reclaimed before its contents could be delivered")]
    ReceiveBufferLost,
    #[error("Transfer was cancelled")]
    Cancelled,
}

impl AesError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| AesError::Io { path, source }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, AesError::Dma(DmaError::Busy))
    }
}
