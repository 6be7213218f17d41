//! Conversion of interleaved little-endian WAV samples into container frames.
//!
//! This is the inverse of the writer's transcoder: every unit produced here
//! converts back to the WAV samples it came from.

use super::format::PcmEncoding;
use crate::error::{Error, Result};

/// Bytes of the per-frame header in HDMV, 302M and 331M units.
pub(crate) const FRAME_HEADER: usize = 4;

/// Length of the tag in front of the first unit.
pub(crate) const TAG_SIZE: usize = 8;

/// Frame sizes repeat with this period (29.97 and 59.94 Hz).
pub(crate) const CYCLE: usize = 5;

/// AES3 channel status blocks span this many samples.
const AES3_BLOCK: usize = 192;

/// Frame rate code used when the caller passes zero (29.97 Hz).
pub const DEFAULT_FRAME_RATE_CODE: u8 = 4;

/// The `fmt ` chunk of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

/// Audio samples per video frame for AES3 output.
fn aes3_samples(frame_rate_code: u8) -> Result<[usize; CYCLE]> {
    Ok(match frame_rate_code {
        1 => [2002; CYCLE],
        2 => [2000; CYCLE],
        3 => [1920; CYCLE],
        4 => [1602, 1601, 1602, 1601, 1602],
        5 => [1600; CYCLE],
        6 => [960; CYCLE],
        7 => [801, 801, 800, 801, 801],
        8 => [800; CYCLE],
        other => return Err(Error::format(format!("invalid frame rate code {other}"))),
    })
}

fn size_code(bits: u16) -> u8 {
    match bits {
        20 => 1,
        24 => 2,
        _ => 0,
    }
}

fn reverse_into(width: usize, input: &[u8], out: &mut Vec<u8>) {
    for group in input.chunks_exact(width) {
        out.extend(group.iter().rev());
    }
}

/// Frame layout for one target encoding.
#[derive(Debug)]
pub(crate) struct Reframer {
    encoding: PcmEncoding,
    channels: usize,
    bits: u16,
    sample_rate: u32,
    frame_rate_code: u8,
    samples: [usize; CYCLE],
}

impl Reframer {
    pub fn new(encoding: PcmEncoding, wav: WavFormat, frame_rate_code: u8) -> Result<Self> {
        let channels = usize::from(wav.channels);
        let bits = wav.bits_per_sample;
        let rate = wav.sample_rate;
        if !(1..=8).contains(&channels) {
            return Err(Error::format(format!("{channels} channels, expected 1 to 8")));
        }
        let frame_rate_code = match frame_rate_code {
            0 => DEFAULT_FRAME_RATE_CODE,
            code => code,
        };
        let bad_rate = || Error::unsupported(format!("{rate} Hz {encoding:?} output"));
        let bad_bits = || Error::unsupported(format!("{bits} bit {encoding:?} output"));
        let odd_channels = || Error::format(format!("{encoding:?} needs an even channel count, got {channels}"));

        let samples = match encoding {
            PcmEncoding::DvdLpcm => {
                if bits != 16 {
                    return Err(bad_bits());
                }
                if channels > 2 {
                    return Err(Error::format(format!("DVD LPCM carries 1 or 2 channels, got {channels}")));
                }
                match rate {
                    48_000 => [80; CYCLE],
                    96_000 => [160; CYCLE],
                    _ => return Err(bad_rate()),
                }
            }
            PcmEncoding::HdmvLpcm => {
                if channels % 2 != 0 {
                    return Err(odd_channels());
                }
                if !matches!(bits, 16 | 20 | 24) {
                    return Err(bad_bits());
                }
                match rate {
                    48_000 => [240; CYCLE],
                    96_000 => [480; CYCLE],
                    192_000 => [960; CYCLE],
                    _ => return Err(bad_rate()),
                }
            }
            PcmEncoding::Aes302M | PcmEncoding::Aes331M | PcmEncoding::Aes382M => {
                if encoding == PcmEncoding::Aes302M && channels % 2 != 0 {
                    return Err(odd_channels());
                }
                let depths: &[u16] = if encoding == PcmEncoding::Aes331M {
                    &[20, 24]
                } else {
                    &[16, 20, 24]
                };
                if !depths.contains(&bits) {
                    return Err(bad_bits());
                }
                if rate != 48_000 {
                    return Err(bad_rate());
                }
                aes3_samples(frame_rate_code)?
            }
            PcmEncoding::Twos | PcmEncoding::QtPcm => {
                return Err(Error::unsupported(format!("{encoding:?} output from a WAV file")));
            }
        };
        Ok(Self {
            encoding,
            channels,
            bits,
            sample_rate: rate,
            frame_rate_code,
            samples,
        })
    }

    fn sample_width(&self) -> usize {
        if self.bits == 16 {
            2
        } else {
            3
        }
    }

    /// WAV bytes per sample frame across all channels.
    pub fn wav_block_align(&self) -> usize {
        self.channels * self.sample_width()
    }

    /// WAV bytes consumed by frame `k` of the cycle.
    pub fn wav_frame_len(&self, k: usize) -> usize {
        self.samples[k % CYCLE] * self.wav_block_align()
    }

    /// Bytes of unit `k` of the cycle, header included.
    pub fn unit_len(&self, k: usize) -> usize {
        let samples = self.samples[k % CYCLE];
        match self.encoding {
            PcmEncoding::HdmvLpcm => FRAME_HEADER + samples * self.wav_block_align(),
            PcmEncoding::Aes302M => {
                let pair = match self.bits {
                    16 => 5,
                    20 => 6,
                    _ => 7,
                };
                FRAME_HEADER + samples * (self.channels / 2) * pair
            }
            PcmEncoding::Aes331M => FRAME_HEADER + samples * 8 * 4,
            _ => samples * self.wav_block_align(),
        }
    }

    /// Bytes still to come for `data_left` WAV bytes, starting at frame `k`.
    /// A trailing partial frame is padded to a whole unit.
    pub fn output_len(&self, data_left: u64, k: usize) -> u64 {
        let cycle_in: u64 = (0..CYCLE).map(|i| self.wav_frame_len(i) as u64).sum();
        let cycle_out: u64 = (0..CYCLE).map(|i| self.unit_len(i) as u64).sum();
        let mut total = data_left / cycle_in * cycle_out;
        let mut left = data_left % cycle_in;
        let mut k = k;
        while left > 0 {
            total += self.unit_len(k) as u64;
            left = left.saturating_sub(self.wav_frame_len(k) as u64);
            k = (k + 1) % CYCLE;
        }
        total
    }

    /// The tag announcing the format in front of the first unit.
    pub fn tag(&self) -> [u8; TAG_SIZE] {
        let size = size_code(self.bits);
        let channels = ((self.channels - 1) & 0x07) as u8;
        match self.encoding {
            PcmEncoding::DvdLpcm => {
                let rate = u8::from(self.sample_rate == 96_000);
                // dynamic range control byte as an encoder sends it
                [b'L', b'P', b'C', b'M', rate | size << 5 | channels << 2, 0x80, 0, 0]
            }
            PcmEncoding::HdmvLpcm => {
                let rate = match self.sample_rate {
                    48_000 => 0x00,
                    96_000 => 0x20,
                    _ => 0x40,
                };
                [b'H', b'D', b'M', b'V', 13, rate | size << 3 | channels, 0, 0]
            }
            _ => {
                let variant = match self.encoding {
                    PcmEncoding::Aes302M => 10,
                    PcmEncoding::Aes331M => 11,
                    _ => 12,
                };
                let rate = (self.frame_rate_code - 1) << 5;
                [b'A', b'E', b'S', b'3', variant, rate | size << 3 | channels, 0, 0]
            }
        }
    }

    /// Convert frame `k` of the cycle. `wav` holds exactly
    /// [`Self::wav_frame_len`] bytes.
    pub fn frame(&self, k: usize, wav: &[u8], out: &mut Vec<u8>) {
        out.clear();
        match self.encoding {
            PcmEncoding::DvdLpcm => reverse_into(2, wav, out),
            PcmEncoding::HdmvLpcm => {
                out.extend(self.hdmv_header(wav.len()));
                reverse_into(self.sample_width(), wav, out);
            }
            PcmEncoding::Aes302M => self.aes3_302m(wav, out),
            PcmEncoding::Aes331M => self.aes3_331m(k, wav, out),
            PcmEncoding::Aes382M => self.aes3_382m(wav, out),
            PcmEncoding::Twos | PcmEncoding::QtPcm => {}
        }
    }

    fn hdmv_header(&self, len: usize) -> [u8; FRAME_HEADER] {
        let layout: u8 = match self.channels {
            2 => 3,
            4 => 4,
            6 => 8,
            _ => 10,
        };
        let rate: u8 = match self.sample_rate {
            48_000 => 1,
            96_000 => 4,
            _ => 5,
        };
        let bits: u8 = match self.bits {
            16 => 1,
            20 => 2,
            _ => 3,
        };
        [(len >> 8) as u8, len as u8, layout << 4 | rate, bits << 6]
    }

    /// SMPTE 302M: bit-reversed samples, one subframe pair per channel pair.
    fn aes3_302m(&self, wav: &[u8], out: &mut Vec<u8>) {
        let pairs = ((self.channels - 1) >> 1) as u8;
        out.extend([0, 0, pairs << 6, size_code(self.bits) << 4]);
        let width = self.sample_width();
        for (s, sample) in wav.chunks_exact(self.wav_block_align()).enumerate() {
            let first = s % AES3_BLOCK == 0;
            for pair in sample.chunks_exact(2 * width) {
                let r = |i: usize| pair[i].reverse_bits();
                let w = |i: usize| u32::from(r(i));
                match self.bits {
                    16 => {
                        let flags = if first { 0x0090_0008 } else { 0x0080_0008 };
                        let v = (w(2) << 12) | (w(3) << 4) | flags;
                        out.extend([r(0), r(1)]);
                        out.extend(&v.to_be_bytes()[1..]);
                    }
                    20 => {
                        let a = (w(0) << 20) | (w(1) << 12) | (w(2) << 4) | if first { 9 } else { 8 };
                        let b = (w(3) << 20) | (w(4) << 12) | (w(5) << 4) | 8;
                        out.extend(&a.to_be_bytes()[1..]);
                        out.extend(&b.to_be_bytes()[1..]);
                    }
                    _ => {
                        let flags = if first { 0x9000_0008 } else { 0x8000_0008 };
                        let v = (w(3) << 20) | (w(4) << 12) | (w(5) << 4) | flags;
                        out.extend([r(0), r(1), r(2)]);
                        out.extend(v.to_be_bytes());
                    }
                }
            }
        }
        let len = out.len() - FRAME_HEADER;
        out[0] = (len >> 8) as u8;
        out[1] = len as u8;
    }

    /// SMPTE 331M: eight 32-bit subframes per sample, unused channels zeroed.
    fn aes3_331m(&self, k: usize, wav: &[u8], out: &mut Vec<u8>) {
        let seq = if matches!(self.frame_rate_code, 4 | 7) {
            (k % CYCLE + 1) as u8
        } else {
            0
        };
        let samples = self.samples[k % CYCLE];
        let mask = ((1u16 << self.channels) - 1) as u8;
        out.extend([seq, samples as u8, (samples >> 8) as u8, mask]);
        for (s, sample) in wav.chunks_exact(self.wav_block_align()).enumerate() {
            let first = s % AES3_BLOCK == 0;
            for j in 0..8u32 {
                let at = j as usize * 3;
                let Some(w) = sample.get(at..at + 3) else {
                    out.extend([0; 4]);
                    continue;
                };
                let v = u32::from_be_bytes([w[0], w[1], w[2], 0]);
                let mut v = ((v & 0x0F0F_0F00) << 4) | ((v & 0xF0F0_F000) >> 12) | (j << 24);
                if first && j == 0 {
                    v |= 0x0800_0000;
                }
                out.extend(v.to_be_bytes());
            }
        }
    }

    /// SMPTE 382M: one contiguous block per channel.
    fn aes3_382m(&self, wav: &[u8], out: &mut Vec<u8>) {
        let width = self.sample_width();
        let stride = self.wav_block_align();
        for c in 0..self.channels {
            for sample in wav.chunks_exact(stride) {
                out.extend(&sample[c * width..(c + 1) * width]);
            }
        }
    }
}
