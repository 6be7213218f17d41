//! Temp-file channel with atomic publication.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{check_lease, ignore};
use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::message::Message;

/// Writes to `<name>.temp` and renames it over `<name>` when the output is
/// complete, so readers never see a partially written target.
///
/// In segmented mode every split publishes the current file and starts the
/// next one; targets are named `{stem}_{NNN}.{ext}` with a three digit file
/// number starting at zero.
pub struct TmpFileChannel {
    file: Option<File>,
    target: PathBuf,
    segmented: bool,
    file_number: u32,
    buf: Vec<u8>,
    idx: usize,
    byte_count: u64,
    finished: bool,
}

impl TmpFileChannel {
    /// Write to `path` through a temp file.
    pub fn create(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        Self::open(path.as_ref(), chunk_size, false)
    }

    /// Write numbered segments derived from `path`.
    pub fn segmented(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        Self::open(path.as_ref(), chunk_size, true)
    }

    fn open(path: &Path, chunk_size: usize, segmented: bool) -> Result<Self> {
        let mut ch = Self {
            file: None,
            target: path.to_path_buf(),
            segmented,
            file_number: 0,
            buf: vec![0; chunk_size],
            idx: 0,
            byte_count: 0,
            finished: false,
        };
        ch.file = Some(create_truncated(&ch.temp_path())?);
        debug!(target = %ch.target_path().display(), "opened temp file");
        Ok(ch)
    }

    /// The name the current output is published under.
    pub fn target_path(&self) -> PathBuf {
        if !self.segmented {
            return self.target.clone();
        }
        let stem = self
            .target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.target.extension() {
            Some(ext) => format!("{stem}_{:03}.{}", self.file_number, ext.to_string_lossy()),
            None => format!("{stem}_{:03}", self.file_number),
        };
        self.target.with_file_name(name)
    }

    /// Where bytes are written until publication.
    pub fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self.target_path().into_os_string();
        name.push(".temp");
        PathBuf::from(name)
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.idx == 0 {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        file.write_all(&self.buf[..self.idx])?;
        self.idx = 0;
        Ok(())
    }

    fn publish(&mut self) -> Result<()> {
        self.flush_pending()?;
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        let target = self.target_path();
        fs::rename(self.temp_path(), &target)?;
        debug!(target = %target.display(), bytes = self.byte_count, "published");
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.idx = 0;
        self.file = None;
        match fs::remove_file(self.temp_path()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn create_truncated(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

impl ByteChannel for TmpFileChannel {
    fn capacity(&self) -> usize {
        self.buf.len() - self.idx
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.finished {
            return Err(Error::Closed);
        }
        check_lease(n, self.buf.len())?;
        if self.idx + n > self.buf.len() {
            self.flush_pending()?;
        }
        Ok(&mut self.buf[self.idx..self.idx + n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        if self.idx + n > self.buf.len() {
            return Err(Error::protocol("commit exceeds the leased region"));
        }
        self.idx += n;
        self.byte_count += n as u64;
        Ok(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        if self.finished {
            return Err(Error::Closed);
        }
        self.flush_pending()?;
        self.file.as_mut().ok_or(Error::Closed)?.write_all(data)?;
        self.byte_count += data.len() as u64;
        Ok(data.len())
    }

    fn chunk_size(&self) -> usize {
        self.buf.len()
    }

    /// Publish the current output and start a fresh temp file.
    fn split(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::Closed);
        }
        self.publish()?;
        if self.segmented {
            self.file_number += 1;
        }
        self.byte_count = 0;
        self.file = Some(create_truncated(&self.temp_path())?);
        Ok(())
    }

    fn message(&mut self, _offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::ByteCount(n) => *n = self.byte_count,
            Message::FileNumber(n) => *n = self.file_number,
            Message::FileName(name) => *name = Some(self.target_path()),
            Message::Flush => {
                self.flush_pending()?;
                if let Some(file) = self.file.as_mut() {
                    file.flush()?;
                    file.sync_data()?;
                }
            }
            Message::SplitOutput => self.split()?,
            other => return ignore(other),
        }
        Ok(())
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if abort {
            debug!(target = %self.target_path().display(), "discarding temp file");
            return self.discard();
        }
        // a split right before the end leaves an empty segment behind
        if self.segmented && self.file_number > 0 && self.byte_count == 0 {
            return self.discard();
        }
        self.publish()
    }
}

impl Drop for TmpFileChannel {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!(target = %self.target.display(), "temp file teardown failed: {e}");
        }
    }
}
