// Licensed under the Apache-2.0 license

use crate::registers::{
    HP_LEFT_VOL, HP_VOLUME_MASK, HP_VOLUME_SHIFT, PLL_CONTROL, PLL_ENABLE, PLL_LOCK,
};
use fpga_dma::StreamPeripheral;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct CodecState {
    registers: HashMap<u16, Vec<u8>>,
    pending: Vec<u8>,
    responses: VecDeque<u8>,
    lock_after: u32,
    polls_until_lock: u32,
    pll_programs: u32,
    pll_polls: u32,
    reads: u32,
}

impl CodecState {
    fn execute(&mut self, words: &[u32]) {
        let is_read = words[0] & 1 != 0;
        let addr = (((words[1] & 0xFF) << 8) | (words[2] & 0xFF)) as u16;
        let data: Vec<u8> = words[3..].iter().map(|w| (*w & 0xFF) as u8).collect();

        let answer = if is_read {
            self.reads += 1;
            self.read_register(addr, data.len())
        } else {
            self.write_register(addr, data);
            vec![0; words.len() - 3]
        };
        for word in words[..3]
            .iter()
            .map(|w| w & 0xFF)
            .chain(answer.iter().map(|b| *b as u32))
        {
            self.responses.extend(word.to_ne_bytes());
        }
    }

    fn write_register(&mut self, addr: u16, data: Vec<u8>) {
        if addr == PLL_CONTROL && data.last().is_some_and(|b| b & PLL_ENABLE != 0) {
            self.pll_programs += 1;
            self.polls_until_lock = self.lock_after;
        }
        self.registers.insert(addr, data);
    }

    fn read_register(&mut self, addr: u16, len: usize) -> Vec<u8> {
        let mut value = self.registers.get(&addr).cloned().unwrap_or_default();
        value.resize(len, 0);
        if addr == PLL_CONTROL && len > 0 {
            self.pll_polls += 1;
            let enabled = value[len - 1] & PLL_ENABLE != 0;
            if enabled && self.polls_until_lock == 0 {
                value[len - 1] |= PLL_LOCK;
            } else if self.polls_until_lock > 0 {
                self.polls_until_lock -= 1;
            }
        }
        value
    }
}

/// Software model of the ADAU1761 control port behind its command FIFO.
///
/// Speaks the FIFO word protocol of [`crate::CommandFifo`]. The PLL reports
/// lock after a configurable number of status polls. Clones share state.
#[derive(Clone, Default)]
pub struct EmulatedAdau1761 {
    state: Arc<Mutex<CodecState>>,
}

impl EmulatedAdau1761 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unlocked status reads before the PLL reports lock.
    pub fn with_lock_after(self, polls: u32) -> Self {
        self.state.lock().unwrap().lock_after = polls;
        self
    }

    pub fn register(&self, addr: u16) -> Option<Vec<u8>> {
        self.state.lock().unwrap().registers.get(&addr).cloned()
    }

    /// Times the PLL was enabled with new divisors.
    pub fn pll_programs(&self) -> u32 {
        self.state.lock().unwrap().pll_programs
    }

    pub fn pll_polls(&self) -> u32 {
        self.state.lock().unwrap().pll_polls
    }

    pub fn reads(&self) -> u32 {
        self.state.lock().unwrap().reads
    }

    /// Volume field of the left headphone register.
    pub fn headphone_volume(&self) -> Option<u8> {
        self.register(HP_LEFT_VOL)
            .and_then(|v| v.last().copied())
            .map(|v| (v >> HP_VOLUME_SHIFT) & HP_VOLUME_MASK)
    }
}

impl Write for EmulatedAdau1761 {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.pending.extend_from_slice(buf);
        if state.pending.len() % 4 == 0 && state.pending.len() >= 12 {
            let words: Vec<u32> = state
                .pending
                .chunks_exact(4)
                .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            state.pending.clear();
            state.execute(&words);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for EmulatedAdau1761 {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        let n = buf.len().min(state.responses.len());
        for (dst, src) in buf.iter_mut().zip(state.responses.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

/// I2S output behind the playback DMA. Records every byte played.
#[derive(Clone, Default)]
pub struct EmulatedI2sSink {
    played: Arc<Mutex<Vec<u8>>>,
    latency: Duration,
}

impl EmulatedI2sSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays the end of every playback by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn played(&self) -> Vec<u8> {
        self.played.lock().unwrap().clone()
    }
}

impl StreamPeripheral for EmulatedI2sSink {
    fn transfer(&mut self, tx: &[u8], _rx_len: usize) -> Vec<u8> {
        self.played.lock().unwrap().extend_from_slice(tx);
        Vec::new()
    }

    fn drain_time(&self, _len: usize) -> Duration {
        self.latency
    }
}
