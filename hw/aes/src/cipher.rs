// Licensed under the Apache-2.0 license

use crate::config::{KeyLoadGuard, KeyLoadRegister};
use crate::error::AesError;
use crate::key::{checked_aligned_size, AesKey, AES_KEY_WIDTH, AES_TEXT_WIDTH};
use fpga_dma::{DmaDevice, TransferCompletion, TransferEngine, TransferMode};
use log::{debug, info};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherDirection {
    Encrypt,
    Decrypt,
}

/// Where the output text of a transfer goes.
#[derive(Debug)]
pub enum AesOutput {
    /// Overwrite this file with the output.
    File(PathBuf),
    /// Copy the output into this buffer. Its length is the capacity and must
    /// hold the block-aligned output.
    Buffer(Vec<u8>),
}

/// A delivered output.
#[derive(Debug, PartialEq, Eq)]
pub enum AesDelivery {
    File(PathBuf),
    Buffer(Vec<u8>),
}

/// A started transfer. The hardware notification only completes the
/// underlying one-shot channel; delivery to the output happens on the thread
/// that waits.
pub struct PendingCipher {
    completion: Receiver<TransferCompletion>,
    output: Option<AesOutput>,
    aligned_len: usize,
}

impl PendingCipher {
    /// Length of the output text.
    pub fn aligned_len(&self) -> usize {
        self.aligned_len
    }

    /// Blocks until the transfer finishes. There is no timeout.
    pub fn wait(mut self) -> Result<AesDelivery, AesError> {
        match self.completion.recv() {
            Ok(completion) => self.deliver(completion),
            Err(_) => Err(AesError::Cancelled),
        }
    }

    /// Waits up to `timeout`. Returns `None` if the transfer is still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<AesDelivery, AesError>> {
        match self.completion.recv_timeout(timeout) {
            Ok(completion) => Some(self.deliver(completion)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(AesError::Cancelled)),
        }
    }

    fn deliver(&mut self, completion: TransferCompletion) -> Result<AesDelivery, AesError> {
        let data = completion.rx_data.ok_or(AesError::ReceiveBufferLost)?;
        match self.output.take().ok_or(AesError::Cancelled)? {
            AesOutput::File(path) => {
                fs::write(&path, &data).map_err(AesError::io(&path))?;
                debug!("Wrote {} bytes to {}", data.len(), path.display());
                Ok(AesDelivery::File(path))
            }
            AesOutput::Buffer(mut buffer) => {
                buffer[..data.len()].copy_from_slice(&data);
                Ok(AesDelivery::Buffer(buffer))
            }
        }
    }
}

/// Input and block-aligned output length of a file, if key block and text
/// can be addressed on this target.
fn staged_lengths(file_len: u64) -> Option<(usize, usize)> {
    let input_len = usize::try_from(file_len).ok()?;
    let aligned_len = checked_aligned_size(file_len, AES_TEXT_WIDTH)?;
    aligned_len.checked_add(AES_KEY_WIDTH)?;
    Some((input_len, aligned_len))
}

/// One AES core and the two-way DMA engine feeding it.
pub struct AesChannel {
    direction: CipherDirection,
    engine: TransferEngine,
    config: Box<dyn KeyLoadRegister>,
}

impl AesChannel {
    pub fn new(
        direction: CipherDirection,
        device: Arc<dyn DmaDevice>,
        config: Box<dyn KeyLoadRegister>,
    ) -> Result<Self, AesError> {
        let engine = TransferEngine::open(device, TransferMode::TwoWay)?;
        info!("AES {:?} channel ready", direction);
        Ok(Self {
            direction,
            engine,
            config,
        })
    }

    pub fn direction(&self) -> CipherDirection {
        self.direction
    }

    pub fn is_busy(&self) -> bool {
        self.engine.is_busy()
    }

    /// Streams `key` followed by the contents of `input`, zero-padded to the
    /// block size, through the core.
    ///
    /// Fails with a busy error while another transfer on this core is staged
    /// or running. Every error is returned before the hardware is started,
    /// with all staged buffers released.
    pub fn transfer(
        &self,
        key: &AesKey,
        input: &Path,
        output: AesOutput,
    ) -> Result<PendingCipher, AesError> {
        let mut slot = self.engine.reserve()?;

        let file_len = fs::metadata(input).map_err(AesError::io(input))?.len();
        let (input_len, aligned_len) = staged_lengths(file_len).ok_or_else(|| {
            AesError::io(input)(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{file_len} bytes do not fit in DMA memory"),
            ))
        })?;
        if let AesOutput::Buffer(buffer) = &output {
            if buffer.len() < aligned_len {
                return Err(AesError::OutputTooSmall {
                    needed: aligned_len,
                    capacity: buffer.len(),
                });
            }
        }

        let tx = slot.allocate(AES_KEY_WIDTH + aligned_len)?;
        let rx = slot.allocate(aligned_len)?;
        slot.pool().write(tx, 0, &key.to_bytes())?;

        {
            let _key_load = KeyLoadGuard::assert(&*self.config);
            let mut text = Vec::with_capacity(aligned_len);
            File::open(input)
                .and_then(|file| file.take(input_len as u64).read_to_end(&mut text))
                .map_err(AesError::io(input))?;
            slot.pool().write(tx, AES_KEY_WIDTH, &text)?;
            slot.pool()
                .fill(tx, AES_KEY_WIDTH + text.len(), aligned_len - text.len(), 0)?;
        }

        let (sender, completion) = mpsc::sync_channel(1);
        slot.start_two_way(
            tx,
            rx,
            Box::new(move |done| {
                let _ = sender.send(done);
            }),
        )?;
        debug!(
            "AES {:?}: started {} byte transfer of {}",
            self.direction,
            aligned_len,
            input.display()
        );

        Ok(PendingCipher {
            completion,
            output: Some(output),
            aligned_len,
        })
    }

    /// Force-stops the running transfer. Its waiter sees
    /// [`AesError::Cancelled`].
    pub fn cancel(&self) -> bool {
        self.engine.stop_transfer()
    }
}

/// Both AES cores.
pub struct Aes {
    cipher: AesChannel,
    decipher: AesChannel,
}

impl Aes {
    pub fn new(cipher: AesChannel, decipher: AesChannel) -> Self {
        Self { cipher, decipher }
    }

    pub fn channel(&self, direction: CipherDirection) -> &AesChannel {
        match direction {
            CipherDirection::Encrypt => &self.cipher,
            CipherDirection::Decrypt => &self.decipher,
        }
    }

    pub fn encrypt_file(
        &self,
        key: &AesKey,
        input: &Path,
        output: AesOutput,
    ) -> Result<PendingCipher, AesError> {
        self.cipher.transfer(key, input, output)
    }

    pub fn decrypt_file(
        &self,
        key: &AesKey,
        input: &Path,
        output: AesOutput,
    ) -> Result<PendingCipher, AesError> {
        self.decipher.transfer(key, input, output)
    }

    pub fn cancel(&self, direction: CipherDirection) -> bool {
        self.channel(direction).cancel()
    }

    pub fn is_busy(&self, direction: CipherDirection) -> bool {
        self.channel(direction).is_busy()
    }
}
