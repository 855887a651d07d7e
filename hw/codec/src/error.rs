// Licensed under the Apache-2.0 license

use fpga_dma::DmaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("Codec command channel error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Dma(#[from] DmaError),
    #[error("Buffer is not owned by the playback engine")]
    UnknownBuffer,
}
