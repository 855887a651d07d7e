// Licensed under the Apache-2.0 license

//! Assembles the AES cores and the codec, on the board or emulated.

use crate::args::PlayerArgs;
use anyhow::Context;
use fpga_aes::{Aes, AesChannel, CipherDirection, EmulatedAesCore};
use fpga_codec::{CodecPlaybackEngine, CommandFifo, EmulatedAdau1761, EmulatedI2sSink};
use fpga_dma::EmulatedDmaDevice;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// How long an emulated playback lasts.
pub const EMULATED_PLAYBACK_TIME: Duration = Duration::from_secs(3);
/// Status polls before the emulated PLL locks.
const EMULATED_PLL_LOCK_POLLS: u32 = 2;

pub struct Hardware {
    pub aes: Aes,
    /// Initialized playback engine.
    pub playback: CodecPlaybackEngine,
}

impl Hardware {
    pub fn from_args(args: &PlayerArgs) -> anyhow::Result<Self> {
        if args.emulated {
            return Self::emulated(args, EMULATED_PLAYBACK_TIME);
        }
        Self::fpga(args)
    }

    /// Software models wired up under the device indices of `args`.
    pub fn emulated(args: &PlayerArgs, playback_time: Duration) -> anyhow::Result<Self> {
        let cipher = EmulatedAesCore::new(CipherDirection::Encrypt);
        let decipher = EmulatedAesCore::new(CipherDirection::Decrypt);
        let aes = Aes::new(
            AesChannel::new(
                CipherDirection::Encrypt,
                Arc::new(EmulatedDmaDevice::new(args.cipher_dma, cipher.clone())),
                Box::new(cipher),
            )?,
            AesChannel::new(
                CipherDirection::Decrypt,
                Arc::new(EmulatedDmaDevice::new(args.decipher_dma, decipher.clone())),
                Box::new(decipher),
            )?,
        );

        let codec = EmulatedAdau1761::new().with_lock_after(EMULATED_PLL_LOCK_POLLS);
        let sink = EmulatedI2sSink::new().with_latency(playback_time);
        let mut playback = CodecPlaybackEngine::new(
            Box::new(CommandFifo::new(codec)),
            Arc::new(EmulatedDmaDevice::new(args.i2s_dma, sink).tx_only()),
        )?;
        playback.init().context("initializing emulated codec")?;
        info!("Using emulated hardware");
        Ok(Self { aes, playback })
    }

    #[cfg(feature = "fpga")]
    fn fpga(args: &PlayerArgs) -> anyhow::Result<Self> {
        use fpga_aes::{MmioConfigRegister, CIPHER_CFG_REG_OFFSET, DECIPHER_CFG_REG_OFFSET};
        use fpga_dma::AxiDmaDevice;

        let aes = Aes::new(
            AesChannel::new(
                CipherDirection::Encrypt,
                Arc::new(AxiDmaDevice::open(args.cipher_dma)?),
                Box::new(MmioConfigRegister::map(args.aes_base_addr, CIPHER_CFG_REG_OFFSET)?),
            )?,
            AesChannel::new(
                CipherDirection::Decrypt,
                Arc::new(AxiDmaDevice::open(args.decipher_dma)?),
                Box::new(MmioConfigRegister::map(
                    args.aes_base_addr,
                    DECIPHER_CFG_REG_OFFSET,
                )?),
            )?,
        );

        let fifo = CommandFifo::open(&args.codec_fifo)
            .with_context(|| format!("opening {}", args.codec_fifo.display()))?;
        let mut playback =
            CodecPlaybackEngine::new(Box::new(fifo), Arc::new(AxiDmaDevice::open(args.i2s_dma)?))?;
        playback.init().context("initializing ADAU1761")?;
        info!("Using FPGA hardware");
        Ok(Self { aes, playback })
    }

    #[cfg(not(feature = "fpga"))]
    fn fpga(_args: &PlayerArgs) -> anyhow::Result<Self> {
        anyhow::bail!("built without the `fpga` feature; run with --emulated")
    }
}
