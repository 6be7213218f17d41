//! Per-format conversion of framed PCM into little-endian interleaved PCM.
//!
//! Each function fills `out` and returns the number of bytes ready to be
//! written. Incomplete trailing groups are dropped.

use super::format::{PcmEncoding, PcmFormat};

/// Bytes carried by an encoder's per-frame header for HDMV, 302M and 331M.
const FRAME_HEADER: usize = 4;

/// Conversion state that survives between frames.
#[derive(Debug, Default)]
pub(crate) struct Transcoder {
    /// Output buffer; the 382M demuxer path interleaves into it across calls.
    pub out: Vec<u8>,
}

impl Transcoder {
    /// Convert one frame. `channel` is the AES3 channel of a 382M demuxer
    /// chunk. Returns the number of bytes in `self.out` to write.
    pub fn convert(&mut self, fmt: &PcmFormat, encoder_mode: bool, channel: usize, input: &[u8]) -> usize {
        let bits = fmt.bits_per_sample;
        let channels = usize::from(fmt.channels);
        let out = &mut self.out;
        match fmt.encoding {
            PcmEncoding::DvdLpcm => dvd_lpcm(bits, channels, input, out),
            PcmEncoding::HdmvLpcm => hdmv_lpcm(bits, skip_header(encoder_mode, input), out),
            PcmEncoding::Aes302M => aes3_302m(bits, skip_header(encoder_mode, input), out),
            PcmEncoding::Aes331M => aes3_331m(channels, skip_header(encoder_mode, input), out),
            PcmEncoding::Aes382M if encoder_mode => aes3_382m_blocks(bits, channels, input, out),
            PcmEncoding::Aes382M => aes3_382m_channel(bits, channels, channel, input, out),
            PcmEncoding::Twos | PcmEncoding::QtPcm => {
                if fmt.is_float() {
                    if fmt.is_big_endian() {
                        float_be(bits, input, out)
                    } else {
                        copy(input, out)
                    }
                } else if bits == 8 {
                    // signed 8-bit takes the offset path, unsigned is copied
                    if fmt.is_signed() {
                        int_le(bits, input, out)
                    } else {
                        int_be(bits, input, out)
                    }
                } else if fmt.is_big_endian() {
                    int_be(bits, input, out)
                } else {
                    int_le(bits, input, out)
                }
            }
        }
    }
}

fn skip_header(encoder_mode: bool, input: &[u8]) -> &[u8] {
    if encoder_mode {
        input.get(FRAME_HEADER..).unwrap_or_default()
    } else {
        input
    }
}

fn copy(input: &[u8], out: &mut Vec<u8>) -> usize {
    out.clear();
    out.extend_from_slice(input);
    out.len()
}

/// Reverse the byte order of every `width` byte group.
fn reverse_groups(width: usize, input: &[u8], out: &mut Vec<u8>) -> usize {
    out.clear();
    for group in input.chunks_exact(width) {
        out.extend(group.iter().rev());
    }
    out.len()
}

/// DVD LPCM: samples come in pairs per channel, high 16 bits first, with the
/// low bits of both samples packed after them.
fn dvd_lpcm(bits: u16, channels: usize, input: &[u8], out: &mut Vec<u8>) -> usize {
    match bits {
        16 => reverse_groups(2, input, out),
        20 | 24 if channels > 0 => {
            out.clear();
            let low_bytes = if bits == 20 { channels } else { 2 * channels };
            let group = 4 * channels + low_bytes;
            for g in input.chunks_exact(group) {
                let (high, low) = g.split_at(4 * channels);
                for sample in 0..2 {
                    for c in 0..channels {
                        let hi = &high[sample * 2 * channels + c * 2..];
                        let k = sample * channels + c;
                        let lo = if bits == 20 {
                            let byte = low[k / 2];
                            if k % 2 == 0 {
                                byte >> 4
                            } else {
                                byte & 0x0F
                            }
                        } else {
                            low[k]
                        };
                        out.extend([lo, hi[1], hi[0]]);
                    }
                }
            }
            out.len()
        }
        _ => {
            out.clear();
            0
        }
    }
}

fn hdmv_lpcm(bits: u16, input: &[u8], out: &mut Vec<u8>) -> usize {
    match bits {
        16 => reverse_groups(2, input, out),
        20 | 24 => reverse_groups(3, input, out),
        _ => {
            out.clear();
            0
        }
    }
}

fn be24(b: &[u8]) -> u32 {
    u32::from(b[0]) << 16 | u32::from(b[1]) << 8 | u32::from(b[2])
}

fn rev(v: u32) -> u8 {
    (v as u8).reverse_bits()
}

/// SMPTE 302M: AES3 subframe pairs with bit-reversed samples.
fn aes3_302m(bits: u16, input: &[u8], out: &mut Vec<u8>) -> usize {
    out.clear();
    match bits {
        16 => {
            for g in input.chunks_exact(5) {
                let v = be24(&g[2..5]);
                out.extend([rev(u32::from(g[0])), rev(u32::from(g[1])), rev(v >> 12), rev(v >> 4)]);
            }
        }
        20 => {
            for g in input.chunks_exact(6) {
                for half in [&g[0..3], &g[3..6]] {
                    let v = be24(half);
                    out.extend([rev((v & 0x00F0_0000) >> 20), rev(v >> 12), rev(v >> 4)]);
                }
            }
        }
        24 => {
            for g in input.chunks_exact(7) {
                let v = u32::from_be_bytes([g[3], g[4], g[5], g[6]]);
                out.extend([
                    rev(u32::from(g[0])),
                    rev(u32::from(g[1])),
                    rev(u32::from(g[2])),
                    rev((v & 0x0FF0_0000) >> 20),
                    rev(v >> 12),
                    rev(v >> 4),
                ]);
            }
        }
        _ => {}
    }
    out.len()
}

/// SMPTE 331M: eight 32-bit subframes per sample, 24 bits of audio in each.
fn aes3_331m(channels: usize, input: &[u8], out: &mut Vec<u8>) -> usize {
    out.clear();
    for element in input.chunks_exact(32) {
        for (k, sub) in element.chunks_exact(4).enumerate() {
            if k >= channels {
                break;
            }
            let v = u32::from_be_bytes([sub[0], sub[1], sub[2], sub[3]]);
            let v = ((v & 0xF0F0_F000) >> 4) | ((v & 0x000F_0F0F) << 12);
            let [b0, b1, b2, _] = v.to_be_bytes();
            out.extend([b0, b1, b2]);
        }
    }
    out.len()
}

/// SMPTE 382M from a demuxer: one channel per chunk, interleaved into the
/// output until the last channel arrives.
fn aes3_382m_channel(bits: u16, channels: usize, channel: usize, input: &[u8], out: &mut Vec<u8>) -> usize {
    let width = match bits {
        16 => 2,
        20 | 24 => 3,
        _ => return 0,
    };
    if channel >= channels {
        return 0;
    }
    let stride = channels * width;
    let samples = input.len() / width;
    let needed = stride * samples;
    if out.len() < needed {
        out.resize(needed, 0);
    }
    for (s, sample) in input.chunks_exact(width).enumerate() {
        let at = s * stride + channel * width;
        out[at..at + width].copy_from_slice(sample);
    }
    if channel == channels - 1 {
        needed
    } else {
        0
    }
}

/// SMPTE 382M from an encoder: one block per channel in a single frame.
fn aes3_382m_blocks(bits: u16, channels: usize, input: &[u8], out: &mut Vec<u8>) -> usize {
    out.clear();
    let width = match bits {
        16 => 2,
        20 | 24 => 3,
        _ => return 0,
    };
    if channels == 0 {
        return 0;
    }
    let per_channel = input.len() / channels;
    let samples = per_channel / width;
    let stride = channels * width;
    out.resize(stride * samples, 0);
    for c in 0..channels {
        let block = &input[c * per_channel..c * per_channel + samples * width];
        for (s, sample) in block.chunks_exact(width).enumerate() {
            let at = s * stride + c * width;
            out[at..at + width].copy_from_slice(sample);
        }
    }
    out.len()
}

fn int_be(bits: u16, input: &[u8], out: &mut Vec<u8>) -> usize {
    match bits {
        8 => copy(input, out),
        16 => reverse_groups(2, input, out),
        20 | 24 => reverse_groups(3, input, out),
        32 => reverse_groups(4, input, out),
        _ => {
            out.clear();
            0
        }
    }
}

fn int_le(bits: u16, input: &[u8], out: &mut Vec<u8>) -> usize {
    if bits == 8 {
        out.clear();
        out.extend(input.iter().map(|b| b.wrapping_add(128)));
        return out.len();
    }
    copy(input, out)
}

fn float_be(bits: u16, input: &[u8], out: &mut Vec<u8>) -> usize {
    match bits {
        32 => reverse_groups(4, input, out),
        64 => reverse_groups(8, input, out),
        _ => {
            out.clear();
            0
        }
    }
}
