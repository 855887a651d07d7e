// Licensed under the Apache-2.0 license

use crate::cipher::CipherDirection;
use crate::config::{KeyLoadRegister, KEY_LOAD_ASSERT};
use crate::key::{AES_KEY_WIDTH, AES_TEXT_WIDTH};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use fpga_dma::StreamPeripheral;
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct CoreState {
    key_load_armed: bool,
    key: [u8; AES_KEY_WIDTH],
    config_writes: Vec<u32>,
}

/// Software model of one AES-128 core.
///
/// Writing [`KEY_LOAD_ASSERT`] to the config register arms key loading: the
/// first 16 bytes of the next input stream are latched as the key. The rest
/// of the stream is processed block by block in ECB mode.
///
/// Clones share state, so one clone can act as the config register while
/// another sits behind the emulated DMA device.
#[derive(Clone)]
pub struct EmulatedAesCore {
    direction: CipherDirection,
    latency: Duration,
    state: Arc<Mutex<CoreState>>,
}

impl EmulatedAesCore {
    pub fn new(direction: CipherDirection) -> Self {
        Self {
            direction,
            latency: Duration::ZERO,
            state: Arc::new(Mutex::new(CoreState::default())),
        }
    }

    /// Delays every transfer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every value written to the config register so far.
    pub fn config_writes(&self) -> Vec<u32> {
        self.state.lock().unwrap().config_writes.clone()
    }

    pub fn latched_key(&self) -> [u8; AES_KEY_WIDTH] {
        self.state.lock().unwrap().key
    }
}

impl KeyLoadRegister for EmulatedAesCore {
    fn write(&self, value: u32) {
        let mut state = self.state.lock().unwrap();
        state.config_writes.push(value);
        if value == KEY_LOAD_ASSERT {
            state.key_load_armed = true;
        }
    }
}

impl StreamPeripheral for EmulatedAesCore {
    fn transfer(&mut self, tx: &[u8], rx_len: usize) -> Vec<u8> {
        let mut state = self.state.lock().unwrap();
        let mut text = tx;
        if state.key_load_armed && text.len() >= AES_KEY_WIDTH {
            state.key.copy_from_slice(&text[..AES_KEY_WIDTH]);
            state.key_load_armed = false;
            text = &text[AES_KEY_WIDTH..];
            debug!("AES {:?} core latched a new key", self.direction);
        }

        let core = Aes128::new(GenericArray::from_slice(&state.key));
        let mut output = Vec::with_capacity(rx_len);
        for chunk in text.chunks(AES_TEXT_WIDTH) {
            let mut block = [0u8; AES_TEXT_WIDTH];
            block[..chunk.len()].copy_from_slice(chunk);
            let block_ref = GenericArray::from_mut_slice(&mut block);
            match self.direction {
                CipherDirection::Encrypt => core.encrypt_block(block_ref),
                CipherDirection::Decrypt => core.decrypt_block(block_ref),
            }
            output.extend_from_slice(&block);
        }
        output.resize(rx_len, 0);
        output
    }

    fn drain_time(&self, _len: usize) -> Duration {
        self.latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KEY_LOAD_DEASSERT;

    #[test]
    fn test_key_is_latched_only_when_armed() {
        let mut core = EmulatedAesCore::new(CipherDirection::Encrypt);
        let mut stream = vec![0x11; AES_KEY_WIDTH];
        stream.extend_from_slice(&[0u8; 16]);

        // not armed: the whole stream is text
        let out = core.transfer(&stream, 32);
        assert_eq!(core.latched_key(), [0u8; 16]);
        assert_eq!(out.len(), 32);

        core.write(KEY_LOAD_ASSERT);
        core.write(KEY_LOAD_DEASSERT);
        let out = core.transfer(&stream, 16);
        assert_eq!(core.latched_key(), [0x11; 16]);
        assert_eq!(out.len(), 16);
        assert_eq!(core.config_writes(), vec![KEY_LOAD_ASSERT, KEY_LOAD_DEASSERT]);
    }

    #[test]
    fn test_cipher_cores_are_inverse() {
        let key = [0x42u8; AES_KEY_WIDTH];
        let plain: Vec<u8> = (0..48u8).collect();

        let mut enc = EmulatedAesCore::new(CipherDirection::Encrypt);
        enc.write(KEY_LOAD_ASSERT);
        let ciphertext = enc.transfer(&[&key[..], &plain[..]].concat(), plain.len());
        assert_ne!(ciphertext, plain);

        let mut dec = EmulatedAesCore::new(CipherDirection::Decrypt);
        dec.write(KEY_LOAD_ASSERT);
        let decrypted = dec.transfer(&[&key[..], &ciphertext[..]].concat(), plain.len());
        assert_eq!(decrypted, plain);
    }
}
