//! Multi-stream binary index writer.
//!
//! A muxer describes its index as one container header, one header per
//! stream, and a run of opaque access unit entries per stream. The
//! container header goes to the base file; each stream is collected in
//! `{base}.{n}`. On a normal finish every stream header is patched with
//! its final entry count. In single-file mode the stream files are then
//! appended to the base file and removed; otherwise the base file carries
//! an external reference per stream.
//!
//! ```text
//! container header (32 bytes) [media name]
//! ext header (24 bytes) stream file name    -- one per stream, split mode
//! stream header (56 bytes) entries...       -- one per stream, single-file mode
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use bufstream_core::{write_all, ByteChannel, Error, Message, MessageCode, Result, RwFileChannel};
use tracing::{debug, warn};

use crate::{base_name, first_error, forward_bytes};

/// Size of the container header.
pub const FILE_HEADER_SIZE: usize = 32;
/// Size of a stream header.
pub const STREAM_HEADER_SIZE: usize = 56;
/// Size of an external stream reference header.
pub const EXT_HEADER_SIZE: usize = 24;
pub const EXT_HEADER_ID: &[u8; 16] = b"MCIDX_INDX_EXTID";
pub const EXT_HEADER_VERSION: u16 = 0x0100;

const INDEX_COUNT_OFFSET: usize = 28;
const MEDIA_NAME_LENGTH_OFFSET: usize = 30;
const ITEM_COUNT_OFFSET: usize = 28;

const FILE_CHUNK_SIZE: usize = 4096;

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

struct StreamIndex {
    path: PathBuf,
    file: RwFileChannel,
    header: [u8; STREAM_HEADER_SIZE],
    item_count: u64,
}

impl StreamIndex {
    fn patched_header(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut header = self.header;
        header[ITEM_COUNT_OFFSET..ITEM_COUNT_OFFSET + 8].copy_from_slice(&self.item_count.to_le_bytes());
        header
    }
}

pub struct McidxFilter<C: ByteChannel> {
    main: C,
    base_path: PathBuf,
    base: RwFileChannel,
    media_name: Option<String>,
    single_file: bool,
    /// One slot per stream declared by the container header.
    streams: Option<Vec<Option<StreamIndex>>>,
    finished: bool,
}

impl<C: ByteChannel> McidxFilter<C> {
    /// Create the base index file. `media_name` is recorded in the
    /// container header when the muxer leaves the name empty.
    pub fn new(
        main: C,
        base_path: impl AsRef<Path>,
        media_name: Option<&str>,
        single_file: bool,
    ) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let base = RwFileChannel::create(&base_path, FILE_CHUNK_SIZE)?;
        Ok(Self {
            main,
            base_path,
            base,
            media_name: media_name.filter(|n| !n.is_empty()).map(str::to_string),
            single_file,
            streams: None,
            finished: false,
        })
    }

    pub fn inner(&self) -> &C {
        &self.main
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Entries written so far for stream `index`.
    pub fn item_count(&self, index: usize) -> Option<u64> {
        self.streams
            .as_ref()?
            .get(index)?
            .as_ref()
            .map(|s| s.item_count)
    }

    fn container(&mut self, payload: &[u8]) -> Result<()> {
        if self.streams.is_some() {
            return Err(Error::protocol("index container header already written"));
        }
        if payload.len() < FILE_HEADER_SIZE {
            return Err(Error::PayloadSize {
                code: MessageCode::INDEX_CONTAINER_INFO,
                expected: FILE_HEADER_SIZE,
                actual: payload.len(),
            });
        }
        let count = read_u16(payload, INDEX_COUNT_OFFSET);
        if count == 0 {
            return Err(Error::format("index container declares no streams"));
        }

        let mut header = payload.to_vec();
        let mut name: &[u8] = &[];
        if read_u16(&header, MEDIA_NAME_LENGTH_OFFSET) == 0 {
            if let Some(media) = &self.media_name {
                name = media.as_bytes();
                let len = u16::try_from(name.len())
                    .map_err(|_| Error::format("media name too long for the index header"))?;
                header[MEDIA_NAME_LENGTH_OFFSET..MEDIA_NAME_LENGTH_OFFSET + 2].copy_from_slice(&len.to_le_bytes());
            }
        }
        write_all(&mut self.base, &header)?;
        write_all(&mut self.base, name)?;
        self.streams = Some((0..count).map(|_| None).collect());
        debug!(streams = count, "index container declared");
        Ok(())
    }

    fn slot(&mut self, index: u32) -> Result<&mut Option<StreamIndex>> {
        let streams = self
            .streams
            .as_mut()
            .ok_or_else(|| Error::protocol("index stream data before the container header"))?;
        let count = streams.len();
        streams
            .get_mut(index as usize)
            .ok_or_else(|| Error::protocol(format!("index stream {index} out of range ({count} declared)")))
    }

    fn stream(&mut self, index: u32, payload: &[u8]) -> Result<()> {
        if payload.len() < STREAM_HEADER_SIZE {
            return Err(Error::PayloadSize {
                code: MessageCode::INDEX_STREAM_INFO,
                expected: STREAM_HEADER_SIZE,
                actual: payload.len(),
            });
        }
        let stream_path = PathBuf::from(format!("{}.{index}", self.base_path.display()));
        let single_file = self.single_file;
        let mut reference = None;

        let slot = self.slot(index)?;
        if slot.is_none() {
            let mut header = [0u8; STREAM_HEADER_SIZE];
            header.copy_from_slice(&payload[..STREAM_HEADER_SIZE]);
            let item_count = u64::from_le_bytes(
                header[ITEM_COUNT_OFFSET..ITEM_COUNT_OFFSET + 8]
                    .try_into()
                    .map_err(|_| Error::format("stream header item count"))?,
            );
            let file = RwFileChannel::create(&stream_path, FILE_CHUNK_SIZE)?;
            *slot = Some(StreamIndex {
                path: stream_path.clone(),
                file,
                header,
                item_count,
            });
            if !single_file {
                reference = Some(base_name(&stream_path));
            }
        }
        if let Some(stream) = slot.as_mut() {
            write_all(&mut stream.file, payload)?;
        }

        if let Some(name) = reference {
            let mut ext = [0u8; EXT_HEADER_SIZE];
            ext[..16].copy_from_slice(EXT_HEADER_ID);
            ext[16..18].copy_from_slice(&EXT_HEADER_VERSION.to_le_bytes());
            let len = u16::try_from(name.len()).map_err(|_| Error::format("stream file name too long"))?;
            ext[22..24].copy_from_slice(&len.to_le_bytes());
            write_all(&mut self.base, &ext)?;
            write_all(&mut self.base, name.as_bytes())?;
        }
        Ok(())
    }

    fn access_unit(&mut self, index: u32, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(Error::protocol("empty index entry"));
        }
        let stream = self
            .slot(index)?
            .as_mut()
            .ok_or_else(|| Error::protocol(format!("index entry for stream {index} before its header")))?;
        write_all(&mut stream.file, payload)?;
        stream.item_count += 1;
        Ok(())
    }

    fn close_streams(&mut self, abort: bool) -> Result<()> {
        let mut result = Ok(());
        for mut stream in self.streams.take().into_iter().flatten().flatten() {
            let mut closed = Ok(());
            if !abort {
                let header = stream.patched_header();
                closed = stream.file.seek_patch(0, &header);
            }
            closed = first_error(closed, stream.file.finish(abort));
            if self.single_file {
                if !abort && closed.is_ok() {
                    closed = fs::read(&stream.path)
                        .map_err(Error::from)
                        .and_then(|data| write_all(&mut self.base, &data));
                }
                if let Err(e) = fs::remove_file(&stream.path) {
                    warn!(path = %stream.path.display(), "could not remove stream index: {e}");
                }
            }
            debug!(path = %stream.path.display(), items = stream.item_count, "stream index closed");
            result = first_error(result, closed);
        }
        result
    }
}

impl<C: ByteChannel> ByteChannel for McidxFilter<C> {
    forward_bytes!(main);

    fn split(&mut self) -> Result<()> {
        self.main.split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::IndexContainer(payload) => self.container(payload),
            Message::IndexStream(payload) => self.stream(offset, payload),
            Message::IndexAu(payload) => self.access_unit(offset, payload),
            other => self.main.message(offset, other),
        }
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let mut result = self.close_streams(abort);
        result = first_error(result, self.base.finish(abort));
        first_error(self.main.finish(abort), result)
    }
}

impl<C: ByteChannel> Drop for McidxFilter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!(path = %self.base_path.display(), "index writer teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bufstream_core::testing::RecordingChannel;

    fn container(streams: u16) -> Message {
        let mut hdr = vec![0u8; FILE_HEADER_SIZE];
        hdr[..16].copy_from_slice(b"MCIDX_FILE_HDRID");
        hdr[INDEX_COUNT_OFFSET..INDEX_COUNT_OFFSET + 2].copy_from_slice(&streams.to_le_bytes());
        Message::IndexContainer(hdr)
    }

    fn stream_header() -> Message {
        let mut hdr = vec![0u8; STREAM_HEADER_SIZE];
        hdr[..4].copy_from_slice(b"IDXS");
        Message::IndexStream(hdr)
    }

    #[test]
    fn test_split_mode_patches_item_count() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("movie.idx");
        let mut filter = McidxFilter::new(RecordingChannel::new(64), &base, Some("movie.ts"), false).unwrap();

        filter.message(0, &mut container(1)).unwrap();
        filter.message(0, &mut stream_header()).unwrap();
        for _ in 0..3 {
            filter.message(0, &mut Message::IndexAu(vec![1, 2, 3, 4])).unwrap();
        }
        assert_eq!(filter.item_count(0), Some(3));
        filter.finish(false).unwrap();

        let base_data = std::fs::read(&base).unwrap();
        assert_eq!(read_u16(&base_data, MEDIA_NAME_LENGTH_OFFSET), 8);
        assert_eq!(&base_data[FILE_HEADER_SIZE..FILE_HEADER_SIZE + 8], b"movie.ts");
        let ext = &base_data[FILE_HEADER_SIZE + 8..];
        assert_eq!(&ext[..16], EXT_HEADER_ID);
        assert_eq!(&ext[EXT_HEADER_SIZE..], b"movie.idx.0");

        let stream = std::fs::read(dir.path().join("movie.idx.0")).unwrap();
        assert_eq!(stream.len(), STREAM_HEADER_SIZE + 12);
        assert_eq!(u64::from_le_bytes(stream[28..36].try_into().unwrap()), 3);
    }

    #[test]
    fn test_single_file_mode_appends_streams() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("movie.idx");
        let mut filter = McidxFilter::new(RecordingChannel::new(64), &base, None, true).unwrap();

        filter.message(0, &mut container(2)).unwrap();
        filter.message(1, &mut stream_header()).unwrap();
        filter.message(1, &mut Message::IndexAu(vec![9; 10])).unwrap();
        filter.finish(false).unwrap();

        let base_data = std::fs::read(&base).unwrap();
        assert_eq!(base_data.len(), FILE_HEADER_SIZE + STREAM_HEADER_SIZE + 10);
        assert_eq!(&base_data[FILE_HEADER_SIZE..FILE_HEADER_SIZE + 4], b"IDXS");
        assert!(!dir.path().join("movie.idx.1").exists());
    }

    #[test]
    fn test_rejects_malformed_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("movie.idx");
        let mut filter = McidxFilter::new(RecordingChannel::new(64), &base, None, false).unwrap();

        assert_matches!(filter.message(0, &mut stream_header()), Err(Error::Protocol(_)));
        assert_matches!(
            filter.message(0, &mut Message::IndexContainer(vec![0; 8])),
            Err(Error::PayloadSize { expected: FILE_HEADER_SIZE, .. })
        );
        assert_matches!(filter.message(0, &mut container(0)), Err(Error::Format(_)));
        filter.message(0, &mut container(1)).unwrap();
        assert_matches!(filter.message(0, &mut container(1)), Err(Error::Protocol(_)));
        assert_matches!(filter.message(1, &mut stream_header()), Err(Error::Protocol(_)));
        assert_matches!(filter.message(0, &mut Message::IndexAu(vec![1])), Err(Error::Protocol(_)));
        filter.message(0, &mut stream_header()).unwrap();
        assert_matches!(filter.message(0, &mut Message::IndexAu(Vec::new())), Err(Error::Protocol(_)));
    }

    #[test]
    fn test_other_messages_reach_main() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("movie.idx");
        let mut filter = McidxFilter::new(RecordingChannel::new(64), &base, None, false).unwrap();
        filter.message(5, &mut Message::Flush).unwrap();
        assert_eq!(filter.inner().calls().len(), 1);
        assert!(filter.inner().messages().iter().all(|m| !matches!(m, Message::IndexAu(_))));
    }
}
