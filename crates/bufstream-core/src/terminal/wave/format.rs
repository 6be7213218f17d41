//! PCM format detection and the RIFF/WAVE header.

use bytes::BufMut;

use crate::error::{Error, Result};
use crate::message::{dmux_flags, DmuxChunk};

/// Sample layout flags for QuickTime `twos`/`lpcm` audio.
pub mod pcm_flags {
    pub const FLOAT: u32 = 0x01;
    pub const BIG_ENDIAN: u32 = 0x02;
    pub const SIGNED: u32 = 0x04;
    pub const PACKED: u32 = 0x08;
    pub const ALIGNED_HIGH: u32 = 0x10;
    pub const NON_INTERLEAVED: u32 = 0x20;
    pub const NON_MIXABLE: u32 = 0x40;
}

const DEFAULT_QT_FLAGS: u32 = pcm_flags::BIG_ENDIAN | pcm_flags::SIGNED | pcm_flags::PACKED;

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

/// Size of the RIFF, fmt and data chunk headers.
pub const WAVE_HEADER_SIZE: usize = 44;

/// Framing of the incoming PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEncoding {
    DvdLpcm,
    HdmvLpcm,
    Aes302M,
    Aes331M,
    Aes382M,
    Twos,
    QtPcm,
}

/// Everything needed to write the header and convert frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub encoding: PcmEncoding,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// [`pcm_flags`], meaningful for `Twos` and `QtPcm`.
    pub flags: u32,
}

fn hdmv_bits(code: u8) -> Result<u16> {
    match code {
        0 => Ok(16),
        1 => Ok(20),
        2 => Ok(24),
        other => Err(Error::format(format!("invalid sample size code {other}"))),
    }
}

impl PcmFormat {
    /// Detect the format from the 8 byte tag an encoder puts in front of its
    /// first unit (`LPCM`, `HDMV` or `AES3` plus two format bytes).
    pub fn from_tag(tag: &[u8]) -> Result<Self> {
        Self::tag_format(tag)?.checked()
    }

    /// Detect the format from a demuxer chunk's flags and info bytes.
    ///
    /// QuickTime `lpcm` carries its rate, depth and channel count verbatim,
    /// so formats whose byte rate does not fit the header are refused here.
    pub fn from_chunk(chunk: &DmuxChunk) -> Result<Self> {
        Self::chunk_format(chunk)?.checked()
    }

    fn checked(self) -> Result<Self> {
        if self.channels == 0 || self.sample_rate == 0 || self.bits_per_sample == 0 {
            return Err(Error::format(format!(
                "empty PCM format: {} channels, {} Hz, {} bit",
                self.channels, self.sample_rate, self.bits_per_sample
            )));
        }
        if self.byte_rate().is_none() {
            return Err(Error::format(format!(
                "byte rate of {} Hz x {} bytes per frame overflows",
                self.sample_rate,
                self.block_align()
            )));
        }
        Ok(self)
    }

    fn tag_format(tag: &[u8]) -> Result<Self> {
        if tag.len() < 6 {
            return Err(Error::format("PCM tag too short"));
        }
        let (b4, b5) = (tag[4], tag[5]);
        match &tag[..4] {
            b"LPCM" => Ok(Self {
                encoding: PcmEncoding::DvdLpcm,
                channels: u16::from((b4 & 0x1C) >> 2) + 1,
                sample_rate: if b4 & 0x01 != 0 { 96_000 } else { 48_000 },
                bits_per_sample: 16,
                flags: 0,
            }),
            b"HDMV" if b4 == 13 => {
                let sample_rate = match b5 & 0x60 {
                    0x00 => 48_000,
                    0x20 => 96_000,
                    0x40 => 192_000,
                    _ => return Err(Error::format("invalid HDMV sample rate")),
                };
                Ok(Self {
                    encoding: PcmEncoding::HdmvLpcm,
                    channels: u16::from(b5 & 0x07) + 1,
                    sample_rate,
                    bits_per_sample: hdmv_bits((b5 & 0x18) >> 3)?,
                    flags: 0,
                })
            }
            b"AES3" => {
                let encoding = match b4 {
                    10 => PcmEncoding::Aes302M,
                    11 => PcmEncoding::Aes331M,
                    12 => PcmEncoding::Aes382M,
                    other => return Err(Error::format(format!("unknown AES3 variant {other}"))),
                };
                Ok(Self {
                    encoding,
                    channels: u16::from(b5 & 0x07) + 1,
                    sample_rate: 48_000,
                    bits_per_sample: hdmv_bits((b5 & 0x18) >> 3)?,
                    flags: 0,
                })
            }
            _ => Err(Error::unsupported("unrecognized PCM tag")),
        }
    }

    fn chunk_format(chunk: &DmuxChunk) -> Result<Self> {
        let info = |i: usize| chunk.info_byte(i);
        let flags = chunk.flags;

        if flags & dmux_flags::DVD_LPCM != 0 {
            let bits_per_sample = match (info(5) & 0xC0) >> 6 {
                1 => 20,
                2 => 24,
                _ => 16,
            };
            return Ok(Self {
                encoding: PcmEncoding::DvdLpcm,
                channels: u16::from(info(5) & 0x07) + 1,
                sample_rate: if info(5) & 0x30 != 0 { 96_000 } else { 48_000 },
                bits_per_sample,
                flags: 0,
            });
        }
        if flags & dmux_flags::HDMV_LPCM != 0 {
            let bits_per_sample = match (info(3) & 0xC0) >> 6 {
                2 => 20,
                3 => 24,
                _ => 16,
            };
            let channels = match info(2) >> 4 {
                4..=7 => 4,
                8 | 9 => 6,
                10 | 11 => 8,
                _ => 2,
            };
            let sample_rate = match info(2) & 0x0F {
                4 => 96_000,
                5 => 192_000,
                _ => 48_000,
            };
            return Ok(Self {
                encoding: PcmEncoding::HdmvLpcm,
                channels,
                sample_rate,
                bits_per_sample,
                flags: 0,
            });
        }
        if flags & dmux_flags::AES3_302M != 0 {
            let bits_per_sample = match (info(3) & 0x30) >> 4 {
                1 => 20,
                2 => 24,
                _ => 16,
            };
            return Ok(Self {
                encoding: PcmEncoding::Aes302M,
                channels: (u16::from((info(2) & 0xC0) >> 6) + 1) << 1,
                sample_rate: 48_000,
                bits_per_sample,
                flags: 0,
            });
        }
        if flags & dmux_flags::AES3_331M != 0 {
            return Ok(Self {
                encoding: PcmEncoding::Aes331M,
                channels: info(3).count_ones() as u16,
                sample_rate: 48_000,
                bits_per_sample: 24,
                flags: 0,
            });
        }
        if flags & dmux_flags::AES3_382M != 0 {
            return Ok(Self {
                encoding: PcmEncoding::Aes382M,
                channels: u16::from(info(1)),
                sample_rate: if info(2) != 0 { 96_000 } else { 48_000 },
                bits_per_sample: u16::from(info(0)),
                flags: 0,
            });
        }
        if flags & dmux_flags::TWOS_LPCM != 0 {
            let qt_flags = if chunk.info.len() >= 7 {
                u32::from_be_bytes([info(3), info(4), info(5), info(6)])
            } else {
                DEFAULT_QT_FLAGS
            };
            return Ok(Self {
                encoding: PcmEncoding::Twos,
                channels: u16::from(info(1)),
                sample_rate: if info(2) != 0 { 96_000 } else { 48_000 },
                bits_per_sample: u16::from(info(0)),
                flags: qt_flags,
            });
        }
        if flags & dmux_flags::QT_PCM != 0 {
            let qt_flags = if chunk.info.len() >= 10 {
                u32::from_be_bytes([info(6), info(7), info(8), info(9)])
            } else {
                DEFAULT_QT_FLAGS
            };
            return Ok(Self {
                encoding: PcmEncoding::QtPcm,
                channels: u16::from(info(1)),
                sample_rate: u32::from_be_bytes([info(2), info(3), info(4), info(5)]),
                bits_per_sample: u16::from(info(0)),
                flags: qt_flags,
            });
        }
        Err(Error::unsupported(format!(
            "demuxer chunk flags 0x{flags:08X} carry no PCM format"
        )))
    }

    pub fn is_float(&self) -> bool {
        self.flags & pcm_flags::FLOAT != 0
    }

    pub fn is_big_endian(&self) -> bool {
        self.flags & pcm_flags::BIG_ENDIAN != 0
    }

    pub fn is_signed(&self) -> bool {
        self.flags & pcm_flags::SIGNED != 0
    }

    /// Bytes per sample frame across all channels.
    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bits_per_sample.div_ceil(8))
    }

    /// Bytes per second, `None` when it does not fit the header field.
    pub fn byte_rate(&self) -> Option<u32> {
        self.sample_rate.checked_mul(u32::from(self.block_align()))
    }

    fn audio_format(&self) -> u16 {
        if self.encoding == PcmEncoding::QtPcm && self.is_float() {
            WAVE_FORMAT_IEEE_FLOAT
        } else {
            WAVE_FORMAT_PCM
        }
    }

    /// The 44 byte header for a file holding `data_len` bytes of samples.
    pub fn header(&self, data_len: u32) -> Vec<u8> {
        let block_align = self.block_align();
        let mut buf = Vec::with_capacity(WAVE_HEADER_SIZE);
        buf.put_slice(b"RIFF");
        buf.put_u32_le(36u32.saturating_add(data_len));
        buf.put_slice(b"WAVE");
        buf.put_slice(b"fmt ");
        buf.put_u32_le(16);
        buf.put_u16_le(self.audio_format());
        buf.put_u16_le(self.channels);
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(self.byte_rate().unwrap_or(u32::MAX));
        buf.put_u16_le(block_align);
        buf.put_u16_le(self.bits_per_sample);
        buf.put_slice(b"data");
        buf.put_u32_le(data_len);
        buf
    }
}
