//! Segment list for split output.
//!
//! Each time the output is split, [`MzlFilter`] appends the finished
//! segment's file name and size to a `.mzl` text file:
//!
//! ```text
//! DZMP
//! movie_000.ts; 1048576
//! movie_001.ts; 524288
//! ```
//!
//! The header is written when segment number zero is logged, so a restarted
//! stream starts a fresh list.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bufstream_core::{ByteChannel, Error, Message, Result};
use tracing::{debug, trace, warn};

use crate::{base_name, first_error, forward_bytes};

const MZL_HEADER: &[u8] = b"DZMP\n";

pub struct MzlFilter<C: ByteChannel> {
    main: C,
    path: PathBuf,
    finished: bool,
}

impl<C: ByteChannel> MzlFilter<C> {
    /// Place the list next to the output, named after it with an `.mzl`
    /// extension.
    pub fn new(mut main: C) -> Result<Self> {
        let name = main
            .file_name()?
            .ok_or_else(|| Error::protocol("output has no file name to derive the segment list from"))?;
        let path = name.with_extension("mzl");
        Ok(Self::with_path(main, path))
    }

    pub fn with_path(main: C, path: impl Into<PathBuf>) -> Self {
        Self {
            main,
            path: path.into(),
            finished: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn inner(&self) -> &C {
        &self.main
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.main
    }

    /// Log the segment currently being written by the inner channel.
    ///
    /// Segments the inner channel cannot describe are skipped.
    fn write_entry(&mut self) -> Result<()> {
        let (Ok(number), Ok(bytes), Ok(Some(name))) = (
            self.main.file_number(),
            self.main.byte_count(),
            self.main.file_name(),
        ) else {
            trace!("inner channel cannot describe its segment; entry skipped");
            return Ok(());
        };
        let mut file = if number == 0 {
            let mut file = File::create(&self.path)?;
            file.write_all(MZL_HEADER)?;
            file
        } else {
            OpenOptions::new().create(true).append(true).open(&self.path)?
        };
        writeln!(file, "{}; {bytes}", base_name(&name))?;
        debug!(segment = number, bytes, "segment listed");
        Ok(())
    }
}

impl<C: ByteChannel> ByteChannel for MzlFilter<C> {
    forward_bytes!(main);

    fn split(&mut self) -> Result<()> {
        self.write_entry()?;
        self.main.split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        if matches!(msg, Message::SplitOutput) {
            self.write_entry()?;
        }
        self.main.message(offset, msg)
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let own = if abort { Ok(()) } else { self.write_entry() };
        first_error(self.main.finish(abort), own)
    }
}

impl<C: ByteChannel> Drop for MzlFilter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!(path = %self.path.display(), "segment list teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufstream_core::testing::{Call, RecordingChannel};

    #[test]
    fn test_new_derives_list_path_from_output() {
        let inner = RecordingChannel::new(64).with_file_name("/out/movie_000.ts");
        let filter = MzlFilter::new(inner).unwrap();
        assert_eq!(filter.path(), Path::new("/out/movie_000.mzl"));
    }

    #[test]
    fn test_new_without_file_name_fails() {
        assert!(MzlFilter::new(RecordingChannel::new(64)).is_err());
    }

    #[test]
    fn test_split_call_logs_then_splits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.mzl");
        let inner = RecordingChannel::new(64).with_file_name("a.ts");
        let mut filter = MzlFilter::with_path(inner, &path);
        filter.bulk_transfer(&[0; 10]).unwrap();
        filter.split().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "DZMP\na.ts; 10\n");
        assert_eq!(filter.inner().calls().last(), Some(&Call::Split));
    }

    #[test]
    fn test_abort_writes_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.mzl");
        let inner = RecordingChannel::new(64).with_file_name("a.ts");
        let mut filter = MzlFilter::with_path(inner, &path);
        filter.finish(true).unwrap();
        assert!(!path.exists());
    }
}
