// Licensed under the Apache-2.0 license

//! Minimal RIFF/WAVE reader producing 16-bit PCM for the codec.

use thiserror::Error;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, KnownLayout};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
/// Offset of the sub-format GUID inside an extensible fmt chunk.
const EXTENSIBLE_SUBFORMAT_OFFSET: usize = 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WavError {
    #[error("not a RIFF/WAVE file")]
    NotWave,
    #[error("missing {0} chunk")]
    MissingChunk(&'static str),
    #[error("truncated {0} chunk")]
    Truncated(&'static str),
    #[error("unsupported sample format {0:#06x}")]
    UnsupportedFormat(u16),
    #[error("unsupported sample width of {0} bits")]
    UnsupportedBitDepth(u16),
    #[error("file declares no channels")]
    NoChannels,
}

#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RiffHeader {
    id: [u8; 4],
    size: U32,
    format: [u8; 4],
}

#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct ChunkHeader {
    id: [u8; 4],
    size: U32,
}

#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct FmtChunk {
    format_tag: U16,
    channels: U16,
    sample_rate: U32,
    byte_rate: U32,
    block_align: U16,
    bits_per_sample: U16,
}

/// A parsed WAVE image borrowing its sample data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wav<'a> {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    data: &'a [u8],
}

impl<'a> Wav<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, WavError> {
        let (riff, mut rest) = RiffHeader::read_from_prefix(bytes).map_err(|_| WavError::NotWave)?;
        if &riff.id != b"RIFF" || &riff.format != b"WAVE" {
            return Err(WavError::NotWave);
        }

        let mut format = None;
        let mut data = None;
        while let Ok((header, body)) = ChunkHeader::read_from_prefix(rest) {
            let size = header.size.get() as usize;
            // the last chunk is allowed to be cut short
            let chunk = &body[..size.min(body.len())];
            match &header.id {
                b"fmt " => format = Some(parse_format(chunk)?),
                b"data" => data = Some(chunk),
                _ => {}
            }
            if data.is_some() && format.is_some() {
                break;
            }
            let advance = size.saturating_add(size & 1);
            rest = body.get(advance..).unwrap_or_default();
        }

        let (channels, sample_rate, bits_per_sample) =
            format.ok_or(WavError::MissingChunk("fmt"))?;
        let data = data.ok_or(WavError::MissingChunk("data"))?;
        let frame_len = channels as usize * (bits_per_sample as usize / 8);
        Ok(Self {
            channels,
            sample_rate,
            bits_per_sample,
            data: &data[..data.len() - data.len() % frame_len],
        })
    }

    fn sample_width(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    pub fn frames(&self) -> usize {
        self.data.len() / (self.sample_width() * self.channels as usize)
    }

    /// Size in bytes of the samples once converted to 16 bits.
    pub fn pcm16_len(&self) -> usize {
        self.frames() * self.channels as usize * 2
    }

    /// Interleaved signed 16-bit little-endian samples.
    pub fn to_pcm16(&self) -> Vec<u8> {
        let width = self.sample_width();
        let mut out = Vec::with_capacity(self.pcm16_len());
        for sample in self.data.chunks_exact(width) {
            let value: [u8; 2] = match width {
                1 => (((sample[0] as i16) - 128) << 8).to_le_bytes(),
                // keep the two most significant bytes
                _ => [sample[width - 2], sample[width - 1]],
            };
            out.extend_from_slice(&value);
        }
        out
    }
}

fn parse_format(chunk: &[u8]) -> Result<(u16, u32, u16), WavError> {
    let (fmt, _) = FmtChunk::read_from_prefix(chunk).map_err(|_| WavError::Truncated("fmt"))?;

    let mut tag = fmt.format_tag.get();
    if tag == WAVE_FORMAT_EXTENSIBLE {
        let (sub, _) = U16::read_from_prefix(
            chunk
                .get(EXTENSIBLE_SUBFORMAT_OFFSET..)
                .ok_or(WavError::Truncated("fmt"))?,
        )
        .map_err(|_| WavError::Truncated("fmt"))?;
        tag = sub.get();
    }
    if tag != WAVE_FORMAT_PCM {
        return Err(WavError::UnsupportedFormat(tag));
    }

    let bits = fmt.bits_per_sample.get();
    if !matches!(bits, 8 | 16 | 24 | 32) {
        return Err(WavError::UnsupportedBitDepth(bits));
    }
    let channels = fmt.channels.get();
    if channels == 0 {
        return Err(WavError::NoChannels);
    }
    Ok((channels, fmt.sample_rate.get(), bits))
}

/// Builds a canonical 44-byte header PCM file. Used by tests and demos.
pub fn encode_pcm(channels: u16, sample_rate: u32, bits_per_sample: u16, data: &[u8]) -> Vec<u8> {
    let block_align = channels * (bits_per_sample / 8);
    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_16_bit_stereo() {
        let samples: Vec<u8> = (0..16).collect();
        let image = encode_pcm(2, 44100, 16, &samples);
        let wav = Wav::parse(&image).unwrap();
        assert_eq!(wav.channels, 2);
        assert_eq!(wav.sample_rate, 44100);
        assert_eq!(wav.frames(), 4);
        assert_eq!(wav.pcm16_len(), 16);
        assert_eq!(wav.to_pcm16(), samples);
    }

    #[test]
    fn test_trailing_padding_is_ignored() {
        let mut image = encode_pcm(1, 48000, 16, &[1, 2, 3, 4]);
        image.extend_from_slice(&[0; 12]);
        let wav = Wav::parse(&image).unwrap();
        assert_eq!(wav.to_pcm16(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let image = encode_pcm(1, 48000, 16, &[9, 9]);
        // splice an odd-sized LIST chunk between fmt and data
        let mut spliced = image[..36].to_vec();
        spliced.extend_from_slice(b"LIST");
        spliced.extend_from_slice(&3u32.to_le_bytes());
        spliced.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0x00]);
        spliced.extend_from_slice(&image[36..]);
        let wav = Wav::parse(&spliced).unwrap();
        assert_eq!(wav.to_pcm16(), vec![9, 9]);
    }

    #[test]
    fn test_sample_width_conversion() {
        let wav = encode_pcm(1, 48000, 8, &[0x80, 0xFF, 0x00]);
        assert_eq!(
            Wav::parse(&wav).unwrap().to_pcm16(),
            vec![0x00, 0x00, 0x00, 0x7F, 0x00, 0x80]
        );

        let wav = encode_pcm(1, 48000, 24, &[0x11, 0x22, 0x33]);
        assert_eq!(Wav::parse(&wav).unwrap().to_pcm16(), vec![0x22, 0x33]);

        let wav = encode_pcm(1, 48000, 32, &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(Wav::parse(&wav).unwrap().to_pcm16(), vec![0x33, 0x44]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(Wav::parse(b"not a wav"), Err(WavError::NotWave));
        assert_eq!(Wav::parse(&[0; 64]), Err(WavError::NotWave));

        let mut image = encode_pcm(1, 48000, 16, &[0, 0]);
        image[20] = 0x03;
        assert_eq!(Wav::parse(&image), Err(WavError::UnsupportedFormat(3)));

        let image = encode_pcm(1, 48000, 12, &[0, 0]);
        assert_eq!(Wav::parse(&image), Err(WavError::UnsupportedBitDepth(12)));

        let image = encode_pcm(1, 48000, 16, &[]);
        assert_eq!(
            Wav::parse(&image[..36]),
            Err(WavError::MissingChunk("data"))
        );
    }

    #[test]
    fn test_oversized_chunk_ends_the_walk() {
        let image = encode_pcm(1, 48000, 16, &[1, 2]);
        let mut broken = image[..12].to_vec();
        broken.extend_from_slice(b"JUNK");
        broken.extend_from_slice(&u32::MAX.to_le_bytes());
        broken.extend_from_slice(&image[12..]);
        assert_eq!(Wav::parse(&broken), Err(WavError::MissingChunk("fmt")));
    }
}
