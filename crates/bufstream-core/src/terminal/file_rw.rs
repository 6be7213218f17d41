//! Buffered file channel with read and write modes on one handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use super::{check_lease, ignore};
use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::message::Message;

/// Seek origins carried in the message offset.
const SEEK_SET: u32 = 0;
const SEEK_CUR: u32 = 1;
const SEEK_END: u32 = 2;

/// Direction of a [`RwFileChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

/// A file channel with one chunk-sized buffer.
///
/// In write mode committed bytes collect in the buffer and reach the file
/// when a lease no longer fits. In read mode leases expose buffered file
/// contents and commits consume them. Switching modes, seeking and seek
/// patches keep the logical position (the byte count) consistent with the
/// file offset.
#[derive(Debug)]
pub struct RwFileChannel {
    file: Option<File>,
    path: PathBuf,
    buf: Vec<u8>,
    idx: usize,
    filled: usize,
    byte_count: u64,
    file_size: u64,
    mode: FileMode,
}

impl RwFileChannel {
    /// Create or truncate `path` and open it in write mode.
    pub fn create(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!(path = %path.display(), "opened file for writing");
        Ok(Self::from_parts(file, path, chunk_size, FileMode::Write, 0))
    }

    /// Open an existing file in read mode.
    ///
    /// The handle is opened for writing too when permissions allow, so the
    /// channel can later switch to write mode.
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => File::open(&path)?,
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata()?.len();
        debug!(path = %path.display(), size, "opened file for reading");
        Ok(Self::from_parts(file, path, chunk_size, FileMode::Read, size))
    }

    /// Open `path` in the given mode.
    pub fn open_with_mode(path: impl AsRef<Path>, chunk_size: usize, mode: FileMode) -> Result<Self> {
        match mode {
            FileMode::Write => Self::create(path, chunk_size),
            FileMode::Read => Self::open(path, chunk_size),
        }
    }

    fn from_parts(file: File, path: PathBuf, chunk_size: usize, mode: FileMode, size: u64) -> Self {
        Self {
            file: Some(file),
            path,
            buf: vec![0; chunk_size],
            idx: 0,
            filled: 0,
            byte_count: 0,
            file_size: size,
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(Error::Closed)
    }

    fn grow_size(&mut self) {
        self.file_size = self.file_size.max(self.byte_count);
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.mode != FileMode::Write || self.idx == 0 {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        file.write_all(&self.buf[..self.idx])?;
        self.idx = 0;
        Ok(())
    }

    /// Reposition the file. `origin` is 0 (start), 1 (current) or 2 (end).
    ///
    /// Pending writes are flushed and read-ahead is dropped. Returns the new
    /// absolute position, which also becomes the byte count.
    pub fn seek(&mut self, origin: u32, pos: i64) -> Result<u64> {
        let from = match origin {
            SEEK_SET => SeekFrom::Start(
                u64::try_from(pos).map_err(|_| Error::protocol(format!("negative seek position {pos}")))?,
            ),
            SEEK_CUR => {
                let target = self.byte_count as i64 + pos;
                SeekFrom::Start(
                    u64::try_from(target)
                        .map_err(|_| Error::protocol(format!("seek before start of file ({target})")))?,
                )
            }
            SEEK_END => SeekFrom::End(pos),
            other => return Err(Error::protocol(format!("invalid seek origin {other}"))),
        };
        self.flush_pending()?;
        let at = self.file()?.seek(from)?;
        self.idx = 0;
        self.filled = 0;
        self.byte_count = at;
        trace!(position = at, "seek");
        Ok(at)
    }

    /// Change direction, keeping the logical position.
    pub fn switch_mode(&mut self, mode: FileMode) -> Result<()> {
        if self.mode == mode {
            return Ok(());
        }
        self.seek(SEEK_SET, self.byte_count as i64)?;
        self.mode = mode;
        debug!(?mode, position = self.byte_count, "switched file mode");
        Ok(())
    }

    /// Write `bytes` at absolute position `pos`, then return to the current
    /// logical position.
    ///
    /// The return seek is attempted even when the patch write fails.
    pub fn seek_patch(&mut self, pos: i64, bytes: &[u8]) -> Result<()> {
        let restore = self.byte_count;
        self.seek(SEEK_SET, pos)?;
        let written = self.file()?.write_all(bytes);
        let back = self.seek(SEEK_SET, restore as i64);
        written?;
        back?;
        self.file_size = self.file_size.max(pos as u64 + bytes.len() as u64);
        trace!(pos, len = bytes.len(), "patched");
        Ok(())
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
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        while self.filled < self.idx + n {
            let got = file.read(&mut self.buf[self.filled..])?;
            if got == 0 {
                break;
            }
            self.filled += got;
        }
        Ok(())
    }
}

impl ByteChannel for RwFileChannel {
    fn capacity(&self) -> usize {
        match self.mode {
            FileMode::Write => self.buf.len() - self.idx,
            // unread file bytes, whether or not they are buffered yet
            FileMode::Read => usize::try_from(self.file_size.saturating_sub(self.byte_count))
                .unwrap_or(usize::MAX)
                .min(self.buf.len()),
        }
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.file.is_none() {
            return Err(Error::Closed);
        }
        check_lease(n, self.buf.len())?;
        match self.mode {
            FileMode::Write => {
                if self.idx + n > self.buf.len() {
                    self.flush_pending()?;
                }
            }
            FileMode::Read => {
                if self.idx + n > self.filled {
                    self.fill(n)?;
                }
                if self.idx + n > self.filled {
                    return Err(Error::Unavailable {
                        requested: n,
                        available: self.filled - self.idx,
                    });
                }
            }
        }
        Ok(&mut self.buf[self.idx..self.idx + n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        let limit = match self.mode {
            FileMode::Write => self.buf.len(),
            FileMode::Read => self.filled,
        };
        if self.idx + n > limit {
            return Err(Error::protocol("commit exceeds the leased region"));
        }
        self.idx += n;
        self.byte_count += n as u64;
        self.grow_size();
        Ok(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        if self.mode != FileMode::Write {
            return Err(Error::protocol("bulk transfer on a read-mode file channel"));
        }
        self.flush_pending()?;
        self.file()?.write_all(data)?;
        self.byte_count += data.len() as u64;
        self.grow_size();
        Ok(data.len())
    }

    fn bulk_read(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.mode != FileMode::Read {
            return Err(Error::protocol("bulk read on a write-mode file channel"));
        }
        let buffered = (self.filled - self.idx).min(out.len());
        out[..buffered].copy_from_slice(&self.buf[self.idx..self.idx + buffered]);
        self.idx += buffered;
        let mut done = buffered;
        if done < out.len() {
            self.idx = 0;
            self.filled = 0;
            let file = self.file.as_mut().ok_or(Error::Closed)?;
            while done < out.len() {
                let got = file.read(&mut out[done..])?;
                if got == 0 {
                    break;
                }
                done += got;
            }
        }
        self.byte_count += done as u64;
        Ok(done)
    }

    fn chunk_size(&self) -> usize {
        self.buf.len()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::ByteCount(n) => *n = self.byte_count,
            Message::FileSize(n) => *n = self.file_size,
            Message::FileName(name) => *name = Some(self.path.clone()),
            Message::FileSeek { pos } => {
                self.seek(offset, *pos)?;
            }
            Message::FileWriteMode => self.switch_mode(FileMode::Write)?,
            Message::FileReadMode => self.switch_mode(FileMode::Read)?,
            Message::SeekPatch { pos, bytes } => self.seek_patch(*pos, bytes)?,
            Message::Flush => {
                self.flush_pending()?;
                self.file()?.flush()?;
            }
            other => return ignore(other),
        }
        Ok(())
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        let pending = std::mem::take(&mut self.idx);
        if !abort && self.mode == FileMode::Write && pending > 0 {
            file.write_all(&self.buf[..pending])?;
        }
        debug!(path = %self.path.display(), bytes = self.byte_count, abort, "closed file");
        Ok(())
    }
}

impl Drop for RwFileChannel {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!(path = %self.path.display(), "file channel teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn test_write_straddles_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut ch = RwFileChannel::create(&path, 8).unwrap();
        for chunk in [&b"abcde"[..], b"fghij", b"k", b"lmnopqr"] {
            ch.bulk_transfer(chunk).unwrap();
        }
        let region = ch.lease(3).unwrap();
        region.copy_from_slice(b"stu");
        ch.commit(3).unwrap();
        assert_eq!(ch.byte_count().unwrap(), 21);
        ch.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghijklmnopqrstu");
    }

    #[test]
    fn test_seek_patch_restores_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patch.bin");
        let mut ch = RwFileChannel::create(&path, 16).unwrap();
        ch.bulk_transfer(b"0000").unwrap();
        let region = ch.lease(4).unwrap();
        region.copy_from_slice(b"data");
        ch.commit(4).unwrap();

        let mut msg = Message::SeekPatch {
            pos: 0,
            bytes: b"HEAD".to_vec(),
        };
        ch.message(0, &mut msg).unwrap();
        assert_eq!(ch.byte_count().unwrap(), 8);

        ch.bulk_transfer(b"tail").unwrap();
        ch.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"HEADdatatail");
    }

    #[test]
    fn test_read_mode_leases_and_bulk_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.bin");
        std::fs::write(&path, b"0123456789abcdef").unwrap();

        let mut ch = RwFileChannel::open(&path, 6).unwrap();
        assert_eq!(ch.lease(4).unwrap(), b"0123");
        ch.commit(4).unwrap();
        assert_eq!(ch.lease(5).unwrap(), b"45678");
        ch.commit(2).unwrap();

        let mut out = [0u8; 8];
        assert_eq!(ch.bulk_read(&mut out).unwrap(), 8);
        assert_eq!(&out, b"6789abcd");
        assert_eq!(ch.byte_count().unwrap(), 14);

        assert_matches!(ch.lease(3), Err(Error::Unavailable { available: 2, .. }));
        assert_eq!(ch.bulk_read(&mut out).unwrap(), 2);
    }

    #[test]
    fn test_read_capacity_before_first_lease() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cap.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut ch = RwFileChannel::open(&path, 4).unwrap();
        assert_eq!(ch.capacity(), 4);
        let mut out = [0u8; 7];
        assert_eq!(ch.bulk_read(&mut out).unwrap(), 7);
        assert_eq!(ch.capacity(), 3);
        assert_eq!(ch.lease(3).unwrap(), b"789");
        ch.commit(3).unwrap();
        assert_eq!(ch.capacity(), 0);
    }

    #[test]
    fn test_mode_switch_and_seek() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rw.bin");
        let mut ch = RwFileChannel::create(&path, 16).unwrap();
        ch.bulk_transfer(b"hello").unwrap();
        let region = ch.lease(6).unwrap();
        region.copy_from_slice(b" world");
        ch.commit(6).unwrap();

        ch.message(0, &mut Message::FileSeek { pos: 6 }).unwrap();
        ch.message(0, &mut Message::FileReadMode).unwrap();
        let mut out = [0u8; 5];
        assert_eq!(ch.bulk_read(&mut out).unwrap(), 5);
        assert_eq!(&out, b"world");

        let mut size = Message::FileSize(0);
        ch.message(0, &mut size).unwrap();
        assert_eq!(size, Message::FileSize(11));

        ch.message(2, &mut Message::FileSeek { pos: -5 }).unwrap();
        assert_eq!(ch.byte_count().unwrap(), 6);
    }

    #[test]
    fn test_closed_channel_refuses_work() {
        let dir = tempdir().unwrap();
        let mut ch = RwFileChannel::create(dir.path().join("x"), 4).unwrap();
        ch.finish(false).unwrap();
        ch.finish(true).unwrap();
        assert_matches!(ch.lease(1), Err(Error::Closed));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert_matches!(RwFileChannel::open(dir.path().join("missing"), 4), Err(Error::Io(_)));
    }
}
