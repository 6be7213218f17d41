//! WAV reader producing framed PCM.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::format::PcmEncoding;
use super::reframe::{Reframer, WavFormat, CYCLE, TAG_SIZE};
use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::terminal::{check_lease, ignore};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Largest `fmt ` chunk accepted.
const MAX_FMT_CHUNK: u64 = 1024;

/// Output framing requested from a [`WaveReadChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmTarget {
    /// DVD, HDMV or one of the AES3 framings.
    pub encoding: PcmEncoding,
    /// Video frame rate code that sets the AES3 frame size; zero means 29.97 Hz.
    pub frame_rate_code: u8,
}

impl PcmTarget {
    pub fn new(encoding: PcmEncoding) -> Self {
        Self {
            encoding,
            frame_rate_code: 0,
        }
    }

    pub fn with_frame_rate_code(mut self, code: u8) -> Self {
        self.frame_rate_code = code;
        self
    }
}

fn header_bytes(r: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::format("truncated WAV header"),
        _ => e.into(),
    })
}

/// Walk the RIFF chunks up to `data`. Returns the format and the declared
/// data length, leaving the reader at the first sample byte.
fn read_riff_header(r: &mut impl Read) -> Result<(WavFormat, u32)> {
    let mut riff = [0u8; 12];
    header_bytes(r, &mut riff)?;
    if &riff[..4] != b"RIFF" || &riff[8..] != b"WAVE" {
        return Err(Error::format("not a RIFF/WAVE file"));
    }
    let mut format = None;
    loop {
        let mut head = [0u8; 8];
        header_bytes(r, &mut head)?;
        let size = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
        match &head[..4] {
            b"data" => {
                let format = format.ok_or_else(|| Error::format("WAV data chunk before its fmt chunk"))?;
                return Ok((format, size));
            }
            b"fmt " => {
                let size = u64::from(size);
                if !(16..=MAX_FMT_CHUNK).contains(&size) {
                    return Err(Error::format(format!("WAV fmt chunk of {size} bytes")));
                }
                let mut body = vec![0u8; (size + (size & 1)) as usize];
                header_bytes(r, &mut body)?;
                let u16_at = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);
                let tag = u16_at(0);
                if tag != WAVE_FORMAT_PCM && tag != WAVE_FORMAT_EXTENSIBLE {
                    return Err(Error::unsupported(format!("WAV format tag 0x{tag:04X}")));
                }
                format = Some(WavFormat {
                    channels: u16_at(2),
                    sample_rate: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
                    block_align: u16_at(12),
                    bits_per_sample: u16_at(14),
                });
            }
            _ => {
                let skip = u64::from(size) + u64::from(size & 1);
                let skipped = io::copy(&mut r.by_ref().take(skip), &mut io::sink())?;
                if skipped < skip {
                    return Err(Error::format("truncated WAV header"));
                }
            }
        }
    }
}

/// Reads a WAV file as a stream of container PCM units.
///
/// The stream opens with an 8 byte tag describing the format (the same tag
/// [`super::WaveChannel`] parses in front of an encoder's first unit),
/// followed by one unit per video frame. The last unit is padded with
/// silence. [`WaveReadChannel::bytes_per_frame`] gives the size of the unit
/// at the read position so callers can hand out one unit at a time.
#[derive(Debug)]
pub struct WaveReadChannel {
    file: Option<File>,
    path: PathBuf,
    wav: WavFormat,
    reframer: Reframer,
    data_left: u64,
    frame: Vec<u8>,
    unit: Vec<u8>,
    unit_idx: usize,
    produced: usize,
    buf: Vec<u8>,
    idx: usize,
    filled: usize,
    byte_count: u64,
    file_size: u64,
    tag_left: usize,
    read_unit: usize,
    read_offset: usize,
}

impl WaveReadChannel {
    /// Open `path` and check that its samples fit `target`.
    ///
    /// `buffer_size` is also the largest lease.
    pub fn open(path: impl AsRef<Path>, buffer_size: usize, target: PcmTarget) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        let (wav, declared) = read_riff_header(&mut file)?;
        let reframer = Reframer::new(target.encoding, wav, target.frame_rate_code)?;
        if usize::from(wav.block_align) != reframer.wav_block_align() {
            return Err(Error::format(format!(
                "WAV block align {} does not match {} channels of {} bit",
                wav.block_align, wav.channels, wav.bits_per_sample
            )));
        }
        let remaining = file_size.saturating_sub(file.stream_position()?);
        // streaming writers leave the size unset
        let data_left = match declared {
            0 | u32::MAX => remaining,
            n => u64::from(n).min(remaining),
        };
        let mut buf = vec![0; buffer_size.max(TAG_SIZE)];
        buf[..TAG_SIZE].copy_from_slice(&reframer.tag());
        debug!(
            path = %path.display(),
            encoding = ?target.encoding,
            channels = wav.channels,
            sample_rate = wav.sample_rate,
            bits = wav.bits_per_sample,
            data_bytes = data_left,
            "opened wave file for reading"
        );
        Ok(Self {
            file: Some(file),
            path,
            wav,
            reframer,
            data_left,
            frame: Vec::new(),
            unit: Vec::new(),
            unit_idx: 0,
            produced: 0,
            buf,
            idx: 0,
            filled: TAG_SIZE,
            byte_count: 0,
            file_size,
            tag_left: TAG_SIZE,
            read_unit: 0,
            read_offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The source file's sample format.
    pub fn wav_format(&self) -> WavFormat {
        self.wav
    }

    /// Length of the format tag in front of the first unit.
    pub fn tag_len(&self) -> usize {
        TAG_SIZE
    }

    /// Size of the unit at the read position, frame header included.
    ///
    /// While the tag is still unread this is the size of the first unit.
    /// The size varies from frame to frame for 29.97 and 59.94 Hz AES3 output.
    pub fn bytes_per_frame(&self) -> usize {
        self.reframer.unit_len(self.read_unit)
    }

    /// Read and convert the next WAV frame. Returns false at the end of the data.
    fn next_unit(&mut self) -> Result<bool> {
        if self.data_left == 0 {
            return Ok(false);
        }
        let k = self.produced;
        let want = self.reframer.wav_frame_len(k);
        let take = usize::try_from(self.data_left).unwrap_or(usize::MAX).min(want);
        self.frame.clear();
        self.frame.resize(want, 0);
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        let mut got = 0;
        while got < take {
            let n = file.read(&mut self.frame[got..take])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        if got < take {
            // the file ends before the length in its data chunk
            self.data_left = 0;
        } else {
            self.data_left -= got as u64;
        }
        if got == 0 {
            return Ok(false);
        }
        self.reframer.frame(k, &self.frame, &mut self.unit);
        self.unit_idx = 0;
        self.produced = (k + 1) % CYCLE;
        trace!(frame = k, input = got, output = self.unit.len(), "wave unit");
        Ok(true)
    }

    fn fill(&mut self, n: usize) -> Result<()> {
        if self.idx == self.filled {
            self.idx = 0;
            self.filled = 0;
        }
        if self.idx + n > self.buf.len() {
            self.buf.copy_within(self.idx..self.filled, 0);
            self.filled -= self.idx;
            self.idx = 0;
        }
        while self.filled < self.buf.len() {
            if self.unit_idx == self.unit.len() && !self.next_unit()? {
                break;
            }
            let k = (self.unit.len() - self.unit_idx).min(self.buf.len() - self.filled);
            self.buf[self.filled..self.filled + k].copy_from_slice(&self.unit[self.unit_idx..self.unit_idx + k]);
            self.unit_idx += k;
            self.filled += k;
        }
        Ok(())
    }

    /// Account for `n` consumed bytes.
    fn advance(&mut self, n: usize) {
        self.byte_count += n as u64;
        let from_tag = n.min(self.tag_left);
        self.tag_left -= from_tag;
        let mut n = n - from_tag;
        while n > 0 {
            let len = self.reframer.unit_len(self.read_unit);
            let step = n.min(len - self.read_offset);
            self.read_offset += step;
            n -= step;
            if self.read_offset == len {
                self.read_unit = (self.read_unit + 1) % CYCLE;
                self.read_offset = 0;
            }
        }
    }
}

impl ByteChannel for WaveReadChannel {
    fn capacity(&self) -> usize {
        if self.file.is_none() {
            return 0;
        }
        let pending = (self.filled - self.idx + self.unit.len() - self.unit_idx) as u64;
        let upcoming = self.reframer.output_len(self.data_left, self.produced);
        usize::try_from(pending + upcoming)
            .unwrap_or(usize::MAX)
            .min(self.buf.len())
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.file.is_none() {
            return Err(Error::Closed);
        }
        check_lease(n, self.buf.len())?;
        if self.idx + n > self.filled {
            self.fill(n)?;
        }
        if self.idx + n > self.filled {
            return Err(Error::Unavailable {
                requested: n,
                available: self.filled - self.idx,
            });
        }
        Ok(&mut self.buf[self.idx..self.idx + n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        if self.idx + n > self.filled {
            return Err(Error::protocol("commit exceeds the leased region"));
        }
        self.idx += n;
        self.advance(n);
        Ok(n)
    }

    fn bulk_transfer(&mut self, _data: &[u8]) -> Result<usize> {
        Err(Error::protocol("bulk transfer on a wave reader"))
    }

    fn bulk_read(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.file.is_none() {
            return Err(Error::Closed);
        }
        let buffered = (self.filled - self.idx).min(out.len());
        out[..buffered].copy_from_slice(&self.buf[self.idx..self.idx + buffered]);
        self.idx += buffered;
        let mut done = buffered;
        while done < out.len() {
            if self.unit_idx == self.unit.len() && !self.next_unit()? {
                break;
            }
            let k = (self.unit.len() - self.unit_idx).min(out.len() - done);
            out[done..done + k].copy_from_slice(&self.unit[self.unit_idx..self.unit_idx + k]);
            self.unit_idx += k;
            done += k;
        }
        self.advance(done);
        Ok(done)
    }

    fn chunk_size(&self) -> usize {
        self.buf.len()
    }

    fn split(&mut self) -> Result<()> {
        Err(Error::unsupported("wave input cannot be split"))
    }

    fn message(&mut self, _offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::ByteCount(n) => *n = self.byte_count,
            Message::FileSize(n) => *n = self.file_size,
            Message::FileName(name) => *name = Some(self.path.clone()),
            other => return ignore(other),
        }
        Ok(())
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), bytes = self.byte_count, abort, "closed wave reader");
        }
        Ok(())
    }
}
