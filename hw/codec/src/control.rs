// Licensed under the Apache-2.0 license

use crate::error::CodecError;
use crate::fifo::RegisterChannel;
use crate::pll::PllDivisors;
use crate::registers::*;
use log::{debug, info};
use std::thread;
use std::time::Duration;

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const DEFAULT_VOLUME: u8 = 32;
pub const MAX_VOLUME: u8 = 63;

const PLL_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Register-level control of the ADAU1761.
pub struct Adau1761 {
    channel: Box<dyn RegisterChannel>,
}

impl Adau1761 {
    pub fn new(channel: Box<dyn RegisterChannel>) -> Self {
        Self { channel }
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), CodecError> {
        self.channel.write(addr, &[value])?;
        Ok(())
    }

    fn read_byte(&mut self, addr: u16) -> Result<u8, CodecError> {
        let data = self.channel.read(addr, 1)?;
        Ok(data.last().copied().unwrap_or(0))
    }

    /// Brings the codec up on the I2S playback path.
    pub fn init(&mut self, sample_rate: u32, volume: u8) -> Result<(), CodecError> {
        // three reads latch the control port into SPI mode
        for _ in 0..3 {
            self.channel.read(CLOCK_CONTROL, 1)?;
        }

        self.set_sample_rate(sample_rate)?;

        // PLL as clock source, core clock 1024 x fs
        self.write_byte(CLOCK_CONTROL, 0x0F)?;
        // everything but ALC and the dejitter blocks
        self.write_byte(CLOCK_ENABLE_0, 0x4B)?;
        self.write_byte(CLOCK_ENABLE_1, 0x03)?;
        // codec drives LRCLK and BCLK
        self.write_byte(SERIAL_PORT_0, 0x01)?;

        self.write_byte(PLAYBACK_MONO_OUTPUT_CONTROL, 0x00)?;
        self.write_byte(SERIAL_INPUT_ROUTE_CONTROL, 0x01)?;
        self.write_byte(PLAYBACK_POWER_MANAGEMENT, 0x03)?;
        self.write_byte(DAC_CONTROL_0, 0x03)?;
        self.write_byte(PLAY_MIXER_LEFT_0, 0x21)?;
        self.write_byte(PLAY_MIXER_RIGHT_0, 0x41)?;
        self.write_byte(HP_LEFT_VOL, 0x03)?;
        self.write_byte(HP_RIGHT_VOL, 0x03)?;

        self.set_volume(volume)?;
        info!("ADAU1761 initialized at {} Hz, volume {}", sample_rate, volume);
        Ok(())
    }

    /// Reprograms the PLL for `sample_rate` and blocks until it reports lock.
    /// There is no timeout.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), CodecError> {
        let pll = PllDivisors::for_rate(sample_rate)?;

        self.channel.write(PLL_CONTROL, &pll.to_bytes(false))?;
        self.channel.write(PLL_CONTROL, &pll.to_bytes(true))?;

        let mut polls = 0u32;
        loop {
            let status = self.channel.read(PLL_CONTROL, 6)?;
            polls += 1;
            if status.last().is_some_and(|b| b & PLL_LOCK != 0) {
                break;
            }
            thread::sleep(PLL_POLL_INTERVAL);
        }
        debug!("PLL locked for {} Hz after {} polls", sample_rate, polls);
        Ok(())
    }

    /// Sets both headphone volumes, keeping their enable bits.
    pub fn set_volume(&mut self, volume: u8) -> Result<(), CodecError> {
        for reg in [HP_LEFT_VOL, HP_RIGHT_VOL] {
            let current = self.read_byte(reg)?;
            let value = ((volume & HP_VOLUME_MASK) << HP_VOLUME_SHIFT) | (current & 0x03);
            self.write_byte(reg, value)?;
        }
        Ok(())
    }
}
