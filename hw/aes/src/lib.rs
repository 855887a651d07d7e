// Licensed under the Apache-2.0 license

//! Driver for the AES-128 cores on the FPGA fabric.
//!
//! Each direction (cipher and decipher) is a separate core behind its own AXI
//! DMA device, so encryption and decryption can run at the same time. A core
//! consumes a key block followed by the text on its input stream and returns
//! the transformed text on its output stream.

mod cipher;
mod config;
mod error;
mod key;
mod model_emulated;

pub use cipher::{Aes, AesChannel, AesDelivery, AesOutput, CipherDirection, PendingCipher};
pub use config::{
    KeyLoadGuard, KeyLoadRegister, MmioConfigRegister, AES_BASE_ADDR, CIPHER_CFG_REG_OFFSET,
    DECIPHER_CFG_REG_OFFSET, KEY_LOAD_ASSERT, KEY_LOAD_DEASSERT,
};
pub use error::AesError;
pub use key::{aligned_size, checked_aligned_size, AesKey, AES_KEY_WIDTH, AES_TEXT_WIDTH};
pub use model_emulated::EmulatedAesCore;

/// DMA device index of the cipher core in the device tree.
pub const CIPHER_DMA_INDEX: u32 = 1;
/// DMA device index of the decipher core in the device tree.
pub const DECIPHER_DMA_INDEX: u32 = 2;
