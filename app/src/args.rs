// Licensed under the Apache-2.0 license

use clap::Parser;
use clap_num::maybe_hex;
use fpga_aes::{AesKey, AES_BASE_ADDR, AES_KEY_WIDTH, CIPHER_DMA_INDEX, DECIPHER_DMA_INDEX};
use fpga_codec::{CMD_FIFO_DEVICE, I2S_DMA_INDEX};
use log::LevelFilter;
use std::path::PathBuf;

/// Key used when none is given, as 32 hex digits, one 32-bit word after the
/// other.
pub const DEFAULT_KEY: &str = "FFFFFFFF00000000AAAAAAAACCCCCCCC";

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, name = "AES Music Player")]
pub struct PlayerArgs {
    /// Directory with the WAV files to browse
    pub directory: PathBuf,

    /// Use software models of the FPGA peripherals
    #[arg(long, default_value_t = false)]
    pub emulated: bool,

    /// Log level written to stderr
    #[arg(long, default_value_t = LevelFilter::Off)]
    pub log_level: LevelFilter,

    /// AES key as 32 hex digits
    #[arg(long, value_parser = parse_key, default_value = DEFAULT_KEY)]
    pub key: AesKey,

    /// DMA device index of the cipher core
    #[arg(long, default_value_t = CIPHER_DMA_INDEX)]
    pub cipher_dma: u32,

    /// DMA device index of the decipher core
    #[arg(long, default_value_t = DECIPHER_DMA_INDEX)]
    pub decipher_dma: u32,

    /// DMA device index of the I2S output
    #[arg(long, default_value_t = I2S_DMA_INDEX)]
    pub i2s_dma: u32,

    /// Physical address of the AES config registers
    #[arg(long, value_parser = maybe_hex::<u64>, default_value_t = AES_BASE_ADDR)]
    pub aes_base_addr: u64,

    /// Character device of the codec command FIFO
    #[arg(long, default_value = CMD_FIFO_DEVICE)]
    pub codec_fifo: PathBuf,
}

pub fn parse_key(s: &str) -> Result<AesKey, String> {
    let bytes = hex::decode(s).map_err(|e| format!("invalid key: {e}"))?;
    let bytes: [u8; AES_KEY_WIDTH] = bytes
        .try_into()
        .map_err(|_| format!("key must be {} hex digits", AES_KEY_WIDTH * 2))?;
    let mut words = [0u32; AES_KEY_WIDTH / 4];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(AesKey(words))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_key() {
        assert_eq!(
            parse_key(DEFAULT_KEY).unwrap(),
            AesKey([0xFFFF_FFFF, 0x0000_0000, 0xAAAA_AAAA, 0xCCCC_CCCC])
        );
    }

    #[test]
    fn test_bad_keys() {
        assert!(parse_key("xyz").is_err());
        assert!(parse_key("FFFF").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = PlayerArgs::parse_from(["aes-player", "/music"]);
        assert_eq!(args.directory, PathBuf::from("/music"));
        assert!(!args.emulated);
        assert_eq!(args.log_level, LevelFilter::Off);
        assert_eq!(args.aes_base_addr, 0x43C0_0000);
        assert_eq!(args.i2s_dma, 3);
        assert_eq!(args.codec_fifo, PathBuf::from(CMD_FIFO_DEVICE));
    }

    #[test]
    fn test_hex_overrides() {
        let args = PlayerArgs::parse_from([
            "aes-player",
            "--emulated",
            "--aes-base-addr",
            "0x40000000",
            "--log-level",
            "debug",
            "/music",
        ]);
        assert!(args.emulated);
        assert_eq!(args.aes_base_addr, 0x4000_0000);
        assert_eq!(args.log_level, LevelFilter::Debug);
    }
}
