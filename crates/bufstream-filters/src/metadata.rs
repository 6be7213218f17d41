//! Numbered metadata slot files.
//!
//! Encoders and muxers stash side data (e.g. a second-pass log) in up to
//! [`MAX_METADATA_SLOTS`] slots. Slot `n` is backed by the file
//! `{base}.md{n}`. The message offset selects the slot.
//!
//! [`MetadataStore`] handles the slot operations on its own;
//! [`MetadataFilter`] puts a store in front of a channel and forwards
//! everything that is not a metadata operation.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bufstream_core::{ByteChannel, Error, Message, MetadataOp, Result};
use tracing::{debug, trace, warn};

use crate::{first_error, forward_bytes};

pub const MAX_METADATA_SLOTS: usize = 12;

#[derive(Debug)]
pub struct MetadataStore {
    base: PathBuf,
    files: [Option<File>; MAX_METADATA_SLOTS],
    destroy_when_closed: bool,
}

impl MetadataStore {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        if base.as_os_str().is_empty() {
            return Err(Error::protocol("metadata store needs a base file name"));
        }
        Ok(Self {
            base,
            files: Default::default(),
            destroy_when_closed: false,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// File backing `slot`.
    pub fn slot_path(&self, slot: u32) -> PathBuf {
        PathBuf::from(format!("{}.md{slot}", self.base.display()))
    }

    pub fn is_open(&self, slot: u32) -> bool {
        self.files
            .get(slot as usize)
            .is_some_and(Option::is_some)
    }

    fn index(slot: u32) -> Result<usize> {
        let index = slot as usize;
        if index >= MAX_METADATA_SLOTS {
            return Err(Error::InvalidSlot {
                slot,
                max: MAX_METADATA_SLOTS as u32 - 1,
            });
        }
        Ok(index)
    }

    fn open_file(&mut self, slot: u32) -> Result<&mut File> {
        let index = Self::index(slot)?;
        self.files[index]
            .as_mut()
            .ok_or_else(|| Error::protocol(format!("metadata slot {slot} is not open")))
    }

    fn open_with(&mut self, slot: u32, open: impl FnOnce(&Path) -> io::Result<File>) -> Result<()> {
        let index = Self::index(slot)?;
        if self.files[index].is_some() {
            return Err(Error::protocol(format!("metadata slot {slot} is already open")));
        }
        let path = self.slot_path(slot);
        self.files[index] = Some(open(&path)?);
        debug!(slot, path = %path.display(), "metadata slot opened");
        Ok(())
    }

    pub fn open_write(&mut self, slot: u32) -> Result<()> {
        self.open_with(slot, |p| File::create(p))
    }

    pub fn open_read(&mut self, slot: u32) -> Result<()> {
        self.open_with(slot, |p| File::open(p))
    }

    /// Closing a slot that is not open does nothing.
    pub fn close(&mut self, slot: u32) -> Result<()> {
        let index = Self::index(slot)?;
        if let Some(mut file) = self.files[index].take() {
            file.flush()?;
            trace!(slot, "metadata slot closed");
        }
        Ok(())
    }

    pub fn write(&mut self, slot: u32, data: &[u8]) -> Result<()> {
        self.open_file(slot)?.write_all(data)?;
        Ok(())
    }

    /// Fill `buf` completely or fail.
    pub fn read(&mut self, slot: u32, buf: &mut [u8]) -> Result<()> {
        self.open_file(slot)?.read_exact(buf)?;
        Ok(())
    }

    pub fn rewind(&mut self, slot: u32) -> Result<()> {
        self.open_file(slot)?.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Size of the slot file; the read/write position is unchanged.
    pub fn size(&mut self, slot: u32) -> Result<u32> {
        let len = self.open_file(slot)?.metadata()?.len();
        u32::try_from(len).map_err(|_| Error::format(format!("metadata slot {slot} exceeds 4 GiB")))
    }

    /// Remove the file behind a closed slot.
    pub fn destroy(&mut self, slot: u32) -> Result<()> {
        let index = Self::index(slot)?;
        if self.files[index].is_some() {
            return Err(Error::protocol(format!("metadata slot {slot} is open")));
        }
        match fs::remove_file(self.slot_path(slot)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Remove every slot file when the store finishes.
    pub fn destroy_all(&mut self) {
        self.destroy_when_closed = true;
    }

    pub fn apply(&mut self, slot: u32, op: &mut MetadataOp) -> Result<()> {
        match op {
            MetadataOp::OpenWrite => self.open_write(slot),
            MetadataOp::OpenRead => self.open_read(slot),
            MetadataOp::Close => self.close(slot),
            MetadataOp::Write(data) => self.write(slot, data),
            MetadataOp::Read(buf) => self.read(slot, buf),
            MetadataOp::Rewind => self.rewind(slot),
            MetadataOp::Destroy => self.destroy(slot),
            MetadataOp::DestroyAll => {
                self.destroy_all();
                Ok(())
            }
            MetadataOp::GetSize(size) => {
                *size = self.size(slot)?;
                Ok(())
            }
        }
    }

    /// Handle a metadata message; anything else is unhandled.
    pub fn message(&mut self, slot: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::Metadata(op) => self.apply(slot, op),
            other => Err(Error::Unhandled(other.code())),
        }
    }

    /// Close every slot, then remove the files if [`Self::destroy_all`]
    /// was requested.
    pub fn finish(&mut self) -> Result<()> {
        let mut result = Ok(());
        for slot in 0..MAX_METADATA_SLOTS as u32 {
            result = first_error(result, self.close(slot));
            if self.destroy_when_closed {
                result = first_error(result, self.destroy(slot));
            }
        }
        result
    }
}

impl Drop for MetadataStore {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(base = %self.base.display(), "metadata store teardown failed: {e}");
        }
    }
}

/// A [`MetadataStore`] in front of a channel.
pub struct MetadataFilter<C: ByteChannel> {
    store: MetadataStore,
    main: C,
    finished: bool,
}

impl<C: ByteChannel> MetadataFilter<C> {
    pub fn new(store: MetadataStore, main: C) -> Self {
        Self {
            store,
            main,
            finished: false,
        }
    }

    pub fn store(&mut self) -> &mut MetadataStore {
        &mut self.store
    }

    pub fn inner(&self) -> &C {
        &self.main
    }
}

impl<C: ByteChannel> ByteChannel for MetadataFilter<C> {
    forward_bytes!(main);

    fn split(&mut self) -> Result<()> {
        self.main.split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::Metadata(op) => self.store.apply(offset, op),
            other => self.main.message(offset, other),
        }
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let own = self.store.finish();
        first_error(self.main.finish(abort), own)
    }
}

impl<C: ByteChannel> Drop for MetadataFilter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("metadata filter teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bufstream_core::testing::RecordingChannel;
    use bufstream_core::MessageCode;

    #[test]
    fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(dir.path().join("enc")).unwrap();

        store.open_write(3).unwrap();
        store.write(3, b"pass one stats").unwrap();
        assert_eq!(store.size(3).unwrap(), 14);
        store.close(3).unwrap();
        assert!(dir.path().join("enc.md3").exists());

        store.open_read(3).unwrap();
        let mut buf = [0u8; 4];
        store.read(3, &mut buf).unwrap();
        assert_eq!(&buf, b"pass");
        store.rewind(3).unwrap();
        let mut all = [0u8; 14];
        store.read(3, &mut all).unwrap();
        assert_eq!(&all, b"pass one stats");
        assert_matches!(store.read(3, &mut [0u8; 1]), Err(Error::Io(_)));
    }

    #[test]
    fn test_state_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(dir.path().join("enc")).unwrap();

        assert_matches!(store.write(0, b"x"), Err(Error::Protocol(_)));
        assert_matches!(store.rewind(0), Err(Error::Protocol(_)));
        assert_matches!(store.size(0), Err(Error::Protocol(_)));
        store.close(0).unwrap();
        store.open_write(0).unwrap();
        assert_matches!(store.open_write(0), Err(Error::Protocol(_)));
        assert_matches!(store.open_read(0), Err(Error::Protocol(_)));
        assert_matches!(store.destroy(0), Err(Error::Protocol(_)));
        assert_matches!(
            store.open_write(12),
            Err(Error::InvalidSlot { slot: 12, max: 11 })
        );
        assert!(MetadataStore::new("").is_err());
    }

    #[test]
    fn test_destroy_all_removes_files_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(dir.path().join("enc")).unwrap();
        store.open_write(0).unwrap();
        store.open_write(11).unwrap();
        store.write(11, b"data").unwrap();
        store.destroy_all();
        store.finish().unwrap();
        assert!(!dir.path().join("enc.md0").exists());
        assert!(!dir.path().join("enc.md11").exists());
    }

    #[test]
    fn test_store_alone_rejects_other_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::new(dir.path().join("enc")).unwrap();
        assert_matches!(
            store.message(0, &mut Message::Flush),
            Err(Error::Unhandled(MessageCode::FLUSH_BUFFER))
        );
    }

    #[test]
    fn test_filter_routes_by_code() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("enc")).unwrap();
        let mut filter = MetadataFilter::new(store, RecordingChannel::new(64));

        filter.message(2, &mut Message::Metadata(MetadataOp::OpenWrite)).unwrap();
        filter
            .message(2, &mut Message::Metadata(MetadataOp::Write(b"abc".to_vec())))
            .unwrap();
        let mut size = Message::Metadata(MetadataOp::GetSize(0));
        filter.message(2, &mut size).unwrap();
        assert_eq!(size, Message::Metadata(MetadataOp::GetSize(3)));
        filter.message(7, &mut Message::StreamEnd).unwrap();

        assert_eq!(filter.inner().messages(), vec![&Message::StreamEnd]);
        filter.finish(false).unwrap();
        assert!(!filter.store().is_open(2));
        assert!(filter.inner().finished());
    }
}
