// Licensed under the Apache-2.0 license

//! ADAU1761 control register addresses used by the driver.
//!
//! See the ADAU1761 data sheet, register map on p. 51.

/// Clock control.
/// - Bit 3: CLKSRC (1 = PLL)
/// - Bits 2:1: INFREQ (core clock = 1024 × fs when 0b11)
/// - Bit 0: COREN
pub const CLOCK_CONTROL: u16 = 0x4000;

/// PLL control, 6 bytes: M, N, then the control word.
/// - Control bits 14:11: R
/// - Control bits 10:9: X
/// - Control bit 8: fractional mode
/// - Control bit 1: lock (read only)
/// - Control bit 0: PLL enable
pub const PLL_CONTROL: u16 = 0x4002;

/// Serial port 0. Bit 0 selects master mode.
pub const SERIAL_PORT_0: u16 = 0x4015;

/// Left playback mixer.
/// - Bit 6: right DAC unmute
/// - Bit 5: left DAC unmute
/// - Bit 0: mixer enable
pub const PLAY_MIXER_LEFT_0: u16 = 0x401C;

/// Right playback mixer, same layout as the left one.
pub const PLAY_MIXER_RIGHT_0: u16 = 0x401E;

/// Left headphone volume.
/// - Bits 7:2: volume
/// - Bit 1: unmute
/// - Bit 0: headphone enable
pub const HP_LEFT_VOL: u16 = 0x4023;

/// Right headphone volume, same layout as the left one.
pub const HP_RIGHT_VOL: u16 = 0x4024;

pub const PLAYBACK_MONO_OUTPUT_CONTROL: u16 = 0x4027;

/// Bits 1:0 enable the right and left playback channels.
pub const PLAYBACK_POWER_MANAGEMENT: u16 = 0x4029;

/// Bits 1:0 enable the right and left DACs.
pub const DAC_CONTROL_0: u16 = 0x402A;

/// Routes serial input channels to the DACs.
pub const SERIAL_INPUT_ROUTE_CONTROL: u16 = 0x40F2;

pub const CLOCK_ENABLE_0: u16 = 0x40F9;
pub const CLOCK_ENABLE_1: u16 = 0x40FA;

/// Lock flag in the last byte of [`PLL_CONTROL`].
pub const PLL_LOCK: u8 = 0x02;
/// Enable flag in the last byte of [`PLL_CONTROL`].
pub const PLL_ENABLE: u8 = 0x01;

/// Volume field of the headphone registers.
pub const HP_VOLUME_SHIFT: u8 = 2;
pub const HP_VOLUME_MASK: u8 = 0x3F;
