use anyhow::{Context, Result};
use bufstream_core::message::{dmux_flags, DmuxChunk};
use bufstream_core::terminal::wave::{pcm_flags, PcmFormat};
use bufstream_core::{write_all, ByteChannel, Message, WaveChannel};
use std::path::Path;

use super::{open_input, pump};
use crate::cli::PcmInput;

/// Largest unit handed to the WAV writer at once.
const MAX_UNIT_SIZE: usize = 64 * 1024;

/// Layout of the raw samples being wrapped.
#[derive(Debug, Clone, Copy)]
pub struct RawPcm {
    pub input: PcmInput,
    pub bits: u8,
    pub channels: u8,
    pub rate: u32,
    pub little_endian: bool,
}

impl RawPcm {
    fn flags(&self) -> u32 {
        let mut flags = pcm_flags::SIGNED | pcm_flags::PACKED;
        if !self.little_endian {
            flags |= pcm_flags::BIG_ENDIAN;
        }
        flags
    }

    /// The demuxer chunk describing one unit of these samples.
    fn chunk(&self, length: usize) -> Result<DmuxChunk> {
        let flags = self.flags().to_be_bytes();
        let (format_flag, info) = match self.input {
            PcmInput::Twos => {
                let high_rate = match self.rate {
                    48_000 => 0,
                    96_000 => 1,
                    other => anyhow::bail!("twos input supports 48000 or 96000 Hz, not {}", other),
                };
                let mut info = vec![self.bits, self.channels, high_rate];
                info.extend_from_slice(&flags);
                (dmux_flags::TWOS_LPCM, info)
            }
            PcmInput::Qt => {
                let mut info = vec![self.bits, self.channels];
                info.extend_from_slice(&self.rate.to_be_bytes());
                info.extend_from_slice(&flags);
                (dmux_flags::QT_PCM, info)
            }
        };
        Ok(DmuxChunk {
            length: i32::try_from(length)?,
            flags: format_flag | dmux_flags::UNIT_START,
            info,
            ..DmuxChunk::default()
        })
    }

    fn frame_size(&self) -> usize {
        usize::from(self.bits).div_ceil(8) * usize::from(self.channels)
    }
}

/// Wrap raw PCM from `input` into a WAV file at `output`.
pub fn run(input: &Path, output: &Path, pcm: RawPcm, buffer_size: usize, chunk_size: usize) -> Result<PcmFormat> {
    if pcm.bits == 0 || pcm.channels == 0 {
        anyhow::bail!("Bits per sample and channel count must be non-zero");
    }
    let frame = pcm.frame_size();
    let unit_size = (buffer_size / 2).min(MAX_UNIT_SIZE) / frame * frame;
    if unit_size == 0 {
        anyhow::bail!("PCM buffer of {} bytes cannot hold a {} byte frame", buffer_size, frame);
    }

    let mut source = open_input(input, chunk_size)?;
    let mut wave = WaveChannel::with_buffer_size(output, buffer_size)
        .with_context(|| format!("Failed to create output: {:?}", output))?;

    let pumped = pump(&mut source, unit_size, |unit| {
        write_all(&mut wave, unit)?;
        wave.message(0, &mut Message::DmuxChunk(pcm.chunk(unit.len())?))?;
        Ok(())
    });
    if let Err(e) = pumped {
        if let Err(abort) = wave.close_discarding_pending() {
            tracing::warn!("Failed to abandon WAV output: {}", abort);
        }
        return Err(e);
    }

    let format = wave
        .format()
        .copied()
        .context("Input holds no samples")?;
    let data_bytes = wave.data_bytes();
    wave.close()?;

    tracing::info!(
        "Wrote {} sample bytes to {:?} ({} ch, {} Hz, {} bit)",
        data_bytes,
        output,
        format.channels,
        format.sample_rate,
        format.bits_per_sample
    );
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bufstream_core::Error;

    fn u32_at(data: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(data[at..at + 4].try_into().unwrap())
    }

    fn twos(little_endian: bool) -> RawPcm {
        RawPcm {
            input: PcmInput::Twos,
            bits: 16,
            channels: 2,
            rate: 48_000,
            little_endian,
        }
    }

    #[test]
    fn test_big_endian_twos_is_swapped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.raw");
        let output = dir.path().join("out.wav");
        std::fs::write(&input, [0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04]).unwrap();

        let format = run(&input, &output, twos(false), 1024, 64).unwrap();
        assert_eq!((format.channels, format.sample_rate), (2, 48_000));

        let data = std::fs::read(&output).unwrap();
        assert_eq!(&data[..4], b"RIFF");
        assert_eq!(u32_at(&data, 4), 36 + 8);
        assert_eq!(u32_at(&data, 40), 8);
        assert_eq!(&data[44..], &[1, 0, 2, 0, 3, 0, 4, 0]);
    }

    #[test]
    fn test_units_span_several_reads() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.raw");
        let output = dir.path().join("out.wav");
        let samples: Vec<u8> = (0..4000u32).map(|i| (i % 200) as u8).collect();
        std::fs::write(&input, &samples).unwrap();

        run(&input, &output, twos(true), 256, 64).unwrap();

        let data = std::fs::read(&output).unwrap();
        assert_eq!(u32_at(&data, 40), 4000);
        assert_eq!(&data[44..], &samples[..]);
    }

    #[test]
    fn test_unsupported_rate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.raw");
        std::fs::write(&input, [0u8; 8]).unwrap();
        let mut pcm = twos(false);
        pcm.rate = 44_100;
        let err = run(&input, &dir.path().join("out.wav"), pcm, 1024, 64).unwrap_err();
        assert!(err.to_string().contains("48000 or 96000"));
    }

    #[test]
    fn test_qt_carries_explicit_rate() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.raw");
        std::fs::write(&input, [0u8; 16]).unwrap();
        let pcm = RawPcm {
            input: PcmInput::Qt,
            bits: 16,
            channels: 2,
            rate: 44_100,
            little_endian: true,
        };
        let format = run(&input, &dir.path().join("out.wav"), pcm, 1024, 64).unwrap();
        assert_eq!(format.sample_rate, 44_100);
    }

    #[test]
    fn test_qt_byte_rate_overflow_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.raw");
        std::fs::write(&input, [0u8; 16]).unwrap();
        let pcm = RawPcm {
            input: PcmInput::Qt,
            bits: 32,
            channels: 2,
            rate: 1_000_000_000,
            little_endian: true,
        };
        let err = run(&input, &dir.path().join("out.wav"), pcm, 1024, 64).unwrap_err();
        assert_matches!(err.downcast_ref::<Error>(), Some(Error::Format(_)));
    }
}
