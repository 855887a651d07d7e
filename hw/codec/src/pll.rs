// Licensed under the Apache-2.0 license

use crate::error::CodecError;
use crate::registers::PLL_ENABLE;

/// Fractional PLL divisors for a 13 MHz MCLK.
///
/// The PLL output is `MCLK / X * (R + N / M)`, which has to equal
/// `1024 * fs`. See the ADAU1761 data sheet, p. 28.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllDivisors {
    pub x: u16,
    pub r: u16,
    pub m: u16,
    pub n: u16,
}

const PLL_TABLE: &[(u32, PllDivisors)] = &[
    (
        44100,
        PllDivisors {
            x: 1,
            r: 3,
            m: 8125,
            n: 3849,
        },
    ),
    (
        48000,
        PllDivisors {
            x: 1,
            r: 3,
            m: 1625,
            n: 1269,
        },
    ),
];

impl PllDivisors {
    pub fn for_rate(sample_rate: u32) -> Result<Self, CodecError> {
        PLL_TABLE
            .iter()
            .find(|(rate, _)| *rate == sample_rate)
            .map(|(_, divisors)| *divisors)
            .ok_or(CodecError::UnsupportedSampleRate(sample_rate))
    }

    pub fn supported_rates() -> impl Iterator<Item = u32> {
        PLL_TABLE.iter().map(|(rate, _)| *rate)
    }

    pub fn control_word(&self, enable: bool) -> u16 {
        (self.r << 11) | ((self.x - 1) << 9) | (1 << 8) | if enable { PLL_ENABLE as u16 } else { 0 }
    }

    /// The 6-byte PLL control register contents.
    pub fn to_bytes(&self, enable: bool) -> [u8; 6] {
        let m = self.m.to_be_bytes();
        let n = self.n.to_be_bytes();
        let control = self.control_word(enable).to_be_bytes();
        [m[0], m[1], n[0], n[1], control[0], control[1]]
    }
}
