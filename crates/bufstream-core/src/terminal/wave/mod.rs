//! WAV files to and from framed PCM.
//!
//! [`WaveReadChannel`] turns a WAV file into DVD, HDMV or AES3 units for a
//! muxer. [`WaveChannel`] takes PCM in one of the container framings (DVD, HDMV,
//! AES3 302M/331M/382M, QuickTime) and writes a RIFF/WAVE file. The format
//! is learned from the first unit: either a demuxer chunk's flags and info
//! bytes, or an 8 byte tag an encoder puts in front of its first unit. The
//! data size in the header is patched when the channel finishes.

mod format;
mod read;
mod reframe;
mod transform;

pub use format::{pcm_flags, PcmEncoding, PcmFormat, WAVE_HEADER_SIZE};
pub use read::{PcmTarget, WaveReadChannel};
pub use reframe::{WavFormat, DEFAULT_FRAME_RATE_CODE};

use std::path::Path;

use tracing::{debug, trace, warn};

use super::check_lease;
use super::file_rw::RwFileChannel;
use crate::channel::{write_all, ByteChannel};
use crate::error::{Error, Result};
use crate::message::{AudioAuUnit, DmuxChunk, Message};
use transform::Transcoder;

/// Default input buffer size; leases are limited to half of it.
pub const PCM_BUFFER_SIZE: usize = 1024 * 1024;

/// Length of the tag in front of an encoder's first unit.
const ENCODER_TAG_SIZE: usize = reframe::TAG_SIZE;

/// Writes PCM units as a WAV file.
///
/// Bytes for one unit are committed first; the `DmuxChunk` or `AudioAu`
/// message that follows triggers conversion and output. Data committed
/// through the demuxer path before the first unit start is dropped.
pub struct WaveChannel {
    out: RwFileChannel,
    buf: Vec<u8>,
    idx: usize,
    chunk_size: usize,
    format: Option<PcmFormat>,
    transcoder: Transcoder,
    encoder_mode: bool,
    aes3_channel: usize,
    aes3_payload_length: usize,
    data_bytes: u64,
    finished: bool,
}

impl WaveChannel {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_buffer_size(path, PCM_BUFFER_SIZE)
    }

    pub fn with_buffer_size(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        let out = RwFileChannel::create(path, buffer_size)?;
        Ok(Self {
            out,
            buf: vec![0; buffer_size],
            idx: 0,
            chunk_size: buffer_size / 2,
            format: None,
            transcoder: Transcoder::default(),
            encoder_mode: false,
            aes3_channel: 0,
            aes3_payload_length: 0,
            data_bytes: 0,
            finished: false,
        })
    }

    /// The detected format, once the header has been written.
    pub fn format(&self) -> Option<&PcmFormat> {
        self.format.as_ref()
    }

    /// Sample bytes written after the header.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    fn data_len_u32(&self) -> u32 {
        u32::try_from(self.data_bytes).unwrap_or(u32::MAX)
    }

    fn write_header(&mut self, format: PcmFormat) -> Result<()> {
        debug!(
            encoding = ?format.encoding,
            channels = format.channels,
            sample_rate = format.sample_rate,
            bits = format.bits_per_sample,
            "writing wave header"
        );
        write_all(&mut self.out, &format.header(0))?;
        self.format = Some(format);
        Ok(())
    }

    /// Convert `buf[start..idx]` and write it out.
    fn write_frame(&mut self, start: usize) -> Result<()> {
        let format = self
            .format
            .ok_or_else(|| Error::protocol("wave frame before format detection"))?;
        let frame = &self.buf[start..self.idx];
        // 302M frames accumulate until a whole payload is present
        if format.encoding == PcmEncoding::Aes302M && frame.len() < self.aes3_payload_length {
            return Ok(());
        }
        let n = self
            .transcoder
            .convert(&format, self.encoder_mode, self.aes3_channel, frame);
        if n > 0 {
            write_all(&mut self.out, &self.transcoder.out[..n])?;
            self.data_bytes += n as u64;
        }
        trace!(input = frame.len(), output = n, "wave frame");
        self.idx = 0;
        Ok(())
    }

    fn on_chunk(&mut self, chunk: &DmuxChunk) -> Result<()> {
        if chunk.is_unit_start() {
            self.aes3_channel = usize::try_from(chunk.aes3_channel).unwrap_or(0);
            self.aes3_payload_length = usize::try_from(chunk.aes3_payload_length).unwrap_or(0);
        }
        if self.format.is_none() {
            if !chunk.is_unit_start() {
                self.idx = 0;
                return Ok(());
            }
            self.write_header(PcmFormat::from_chunk(chunk)?)?;
        }
        self.write_frame(0)
    }

    fn on_audio_unit(&mut self, au: &AudioAuUnit) -> Result<()> {
        self.aes3_payload_length = au.length as usize;
        let mut start = 0;
        if self.format.is_none() {
            self.encoder_mode = true;
            if self.idx < ENCODER_TAG_SIZE {
                return Err(Error::format("first audio unit is shorter than its PCM tag"));
            }
            let format = PcmFormat::from_tag(&self.buf[..ENCODER_TAG_SIZE])?;
            self.write_header(format)?;
            start = ENCODER_TAG_SIZE;
        }
        if self.idx > start {
            self.write_frame(start)
        } else {
            self.idx = 0;
            Ok(())
        }
    }

    fn finalize(&mut self) -> Result<()> {
        let Some(format) = self.format else {
            return Ok(());
        };
        if self.idx > 0 {
            self.write_frame(0)?;
        }
        self.out.seek_patch(0, &format.header(self.data_len_u32()))
    }
}

impl ByteChannel for WaveChannel {
    fn capacity(&self) -> usize {
        self.buf.len() - self.idx
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.finished {
            return Err(Error::Closed);
        }
        check_lease(n, self.chunk_size)?;
        if self.idx + n > self.buf.len() {
            return Err(Error::Unavailable {
                requested: n,
                available: self.buf.len() - self.idx,
            });
        }
        Ok(&mut self.buf[self.idx..self.idx + n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        if self.idx + n > self.buf.len() {
            return Err(Error::protocol("commit exceeds the leased region"));
        }
        self.idx += n;
        Ok(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        if self.finished {
            return Err(Error::Closed);
        }
        if self.idx + data.len() > self.buf.len() {
            return Err(Error::Unavailable {
                requested: data.len(),
                available: self.buf.len() - self.idx,
            });
        }
        self.buf[self.idx..self.idx + data.len()].copy_from_slice(data);
        self.idx += data.len();
        Ok(data.len())
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn split(&mut self) -> Result<()> {
        Err(Error::unsupported("wave output cannot be split"))
    }

    fn message(&mut self, _offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::ByteCount(n) => {
                let header = if self.format.is_some() { WAVE_HEADER_SIZE as u64 } else { 0 };
                *n = header + self.data_bytes;
                Ok(())
            }
            Message::FileName(name) => {
                *name = Some(self.out.path().to_path_buf());
                Ok(())
            }
            Message::DmuxChunk(chunk) => self.on_chunk(chunk),
            Message::AudioAu(au) => self.on_audio_unit(au),
            other => super::ignore(other),
        }
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let result = if abort { Ok(()) } else { self.finalize() };
        let closed = self.out.finish(abort);
        debug!(data_bytes = self.data_bytes, abort, "wave file closed");
        result.and(closed)
    }
}

impl Drop for WaveChannel {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("wave channel teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::dmux_flags;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    fn u32_at(data: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(data[at..at + 4].try_into().unwrap())
    }

    fn twos_chunk(flags: u32) -> Message {
        Message::DmuxChunk(DmuxChunk {
            flags: flags | dmux_flags::TWOS_LPCM,
            info: vec![16, 2, 0],
            ..Default::default()
        })
    }

    #[test]
    fn test_demuxer_path_writes_and_patches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut ch = WaveChannel::with_buffer_size(&path, 1024).unwrap();

        ch.bulk_transfer(&[0xEE; 6]).unwrap();
        ch.message(0, &mut twos_chunk(0)).unwrap();
        assert!(ch.format().is_none());

        ch.bulk_transfer(&[0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04]).unwrap();
        ch.message(0, &mut twos_chunk(dmux_flags::UNIT_START)).unwrap();
        ch.bulk_transfer(&[0x00, 0x05, 0x00, 0x06]).unwrap();
        ch.message(0, &mut twos_chunk(0)).unwrap();
        assert_eq!(ch.byte_count().unwrap(), 44 + 12);
        ch.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 56);
        assert_eq!(u32_at(&data, 4), 36 + 12);
        assert_eq!(u32_at(&data, 24), 48_000);
        assert_eq!(u32_at(&data, 28), 192_000);
        assert_eq!(u32_at(&data, 40), 12);
        assert_eq!(&data[44..], &[1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0]);
    }

    #[test]
    fn test_encoder_path_reads_tag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("enc.wav");
        let mut ch = WaveChannel::with_buffer_size(&path, 1024).unwrap();

        let mut unit = b"LPCM\x04\x00\x00\x00".to_vec();
        unit.extend([0x12, 0x34, 0x56, 0x78]);
        ch.bulk_transfer(&unit).unwrap();
        ch.message(0, &mut Message::AudioAu(AudioAuUnit { length: 4, pts: 0 }))
            .unwrap();

        let fmt = *ch.format().unwrap();
        assert_eq!((fmt.channels, fmt.sample_rate, fmt.bits_per_sample), (2, 48_000, 16));
        ch.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[44..], &[0x34, 0x12, 0x78, 0x56]);
        assert_eq!(u32_at(&data, 40), 4);
    }

    #[test]
    fn test_pending_bytes_converted_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tail.wav");
        let mut ch = WaveChannel::with_buffer_size(&path, 1024).unwrap();
        ch.bulk_transfer(&[0, 1]).unwrap();
        ch.message(0, &mut twos_chunk(dmux_flags::UNIT_START)).unwrap();
        ch.bulk_transfer(&[0, 2]).unwrap();
        ch.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[44..], &[1, 0, 2, 0]);
        assert_eq!(u32_at(&data, 40), 4);
    }

    #[test]
    fn test_abort_skips_patch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abort.wav");
        let mut ch = WaveChannel::with_buffer_size(&path, 1024).unwrap();
        ch.bulk_transfer(&[0, 1]).unwrap();
        ch.message(0, &mut twos_chunk(dmux_flags::UNIT_START)).unwrap();
        ch.close_discarding_pending().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 46);
        assert_eq!(u32_at(&data, 40), 0);
    }

    #[test]
    fn test_limits() {
        let dir = tempdir().unwrap();
        let mut ch = WaveChannel::with_buffer_size(dir.path().join("l.wav"), 16).unwrap();
        assert_eq!(ch.chunk_size(), 8);
        ch.bulk_transfer(&[0; 12]).unwrap();
        assert_matches!(ch.lease(8), Err(Error::Unavailable { available: 4, .. }));
        assert_matches!(ch.split(), Err(Error::Unsupported(_)));
    }

    #[test]
    fn test_short_tag_rejected() {
        let dir = tempdir().unwrap();
        let mut ch = WaveChannel::with_buffer_size(dir.path().join("s.wav"), 64).unwrap();
        ch.bulk_transfer(b"LPC").unwrap();
        assert_matches!(
            ch.message(0, &mut Message::AudioAu(AudioAuUnit::default())),
            Err(Error::Format(_))
        );
    }
}
