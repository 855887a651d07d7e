// Licensed under the Apache-2.0 license

use log::trace;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use zerocopy::IntoBytes;

/// AXI-stream FIFO bridging to the codec's SPI port.
pub const CMD_FIFO_DEVICE: &str = "/dev/axis_fifo_0x43c10000";

/// SPI chip address of the codec.
pub const CHIP_ADDR: u8 = 0;

/// Byte-addressed register access to the codec.
pub trait RegisterChannel: Send {
    /// Writes `data` to consecutive bytes starting at `addr`. Multi-byte
    /// registers are given most significant byte first.
    fn write(&mut self, addr: u16, data: &[u8]) -> io::Result<()>;

    fn read(&mut self, addr: u16, len: usize) -> io::Result<Vec<u8>>;
}

/// SPI commands framed onto the AXI-stream FIFO.
///
/// Every byte of a command travels in its own 32-bit word:
/// `[chip << 1 | r/w, addr hi, addr lo, data...]`. The FIFO answers with one
/// word per command word; the data bytes are the low bytes of the trailing
/// words.
pub struct CommandFifo<T> {
    port: T,
    chip_addr: u8,
}

impl CommandFifo<File> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let port = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::new(port))
    }
}

impl<T: Read + Write> CommandFifo<T> {
    pub fn new(port: T) -> Self {
        Self {
            port,
            chip_addr: CHIP_ADDR,
        }
    }

    fn command(&mut self, addr: u16, len: usize, data: Option<&[u8]>) -> io::Result<Vec<u8>> {
        let mut words: Vec<u32> = Vec::with_capacity(len + 3);
        words.push(((self.chip_addr as u32) << 1) | data.is_none() as u32);
        words.push((addr >> 8) as u32);
        words.push((addr & 0xFF) as u32);
        match data {
            Some(data) => words.extend(data.iter().map(|b| *b as u32)),
            None => words.resize(len + 3, 0),
        }
        self.port.write_all(words.as_bytes())?;
        self.port.flush()?;

        let mut response = Vec::with_capacity(len);
        for i in 0..words.len() {
            let mut word = 0u32;
            self.port.read_exact(word.as_mut_bytes())?;
            if i >= 3 {
                response.push((word & 0xFF) as u8);
            }
        }
        trace!(
            "spi {} {:#06x}: {:02x?} -> {:02x?}",
            if data.is_some() { "write" } else { "read" },
            addr,
            data,
            response
        );
        Ok(response)
    }
}

impl<T: Read + Write + Send> RegisterChannel for CommandFifo<T> {
    fn write(&mut self, addr: u16, data: &[u8]) -> io::Result<()> {
        self.command(addr, data.len(), Some(data)).map(|_| ())
    }

    fn read(&mut self, addr: u16, len: usize) -> io::Result<Vec<u8>> {
        self.command(addr, len, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Records what was written and answers each word with its index.
    #[derive(Default)]
    struct Port {
        written: Vec<u8>,
        responses: VecDeque<u8>,
    }

    impl Write for Port {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            for i in 0..buf.len() / 4 {
                self.responses
                    .extend((0xA0u32 + i as u32).to_ne_bytes());
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for Port {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.responses.len());
            for b in buf.iter_mut().take(n) {
                *b = self.responses.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_write_framing() {
        let mut fifo = CommandFifo::new(Port::default());
        RegisterChannel::write(&mut fifo, 0x4002, &[0x06, 0x59, 0x04, 0xF5, 0x19, 0x01]).unwrap();
        assert_eq!(
            words(&fifo.port.written),
            vec![0x00, 0x40, 0x02, 0x06, 0x59, 0x04, 0xF5, 0x19, 0x01]
        );
        assert!(fifo.port.responses.is_empty());
    }

    #[test]
    fn test_read_framing_returns_trailing_bytes() {
        let mut fifo = CommandFifo::new(Port::default());
        let data = RegisterChannel::read(&mut fifo, 0x4023, 2).unwrap();
        assert_eq!(words(&fifo.port.written), vec![0x01, 0x40, 0x23, 0, 0]);
        assert_eq!(data, vec![0xA3, 0xA4]);
    }

    #[test]
    fn test_short_response_is_an_error() {
        struct Mute;
        impl Write for Mute {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        impl Read for Mute {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Ok(0)
            }
        }
        let mut fifo = CommandFifo::new(Mute);
        let err = RegisterChannel::read(&mut fifo, 0x4000, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
