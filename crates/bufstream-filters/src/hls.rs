//! HLS playlist generation.
//!
//! The muxer announces each finished segment with an `OutputSegment`
//! message. [`HlsFilter`] asks the channel below for the segment's file
//! name, records an `#EXTINF` entry, and writes the complete playlist when
//! the stream finishes. An aborted stream leaves no playlist behind.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bufstream_core::message::OutputSegment;
use bufstream_core::{ByteChannel, Message, Result};
use tracing::{debug, info, warn};

use crate::{base_name, first_error, forward_bytes};

pub struct HlsFilter<C: ByteChannel> {
    main: C,
    playlist: PathBuf,
    uri_prefix: String,
    entries: String,
    segment_count: u32,
    target_duration: u32,
    finished: bool,
}

impl<C: ByteChannel> HlsFilter<C> {
    /// Create the playlist file up front so an unwritable location fails
    /// before any media is produced.
    pub fn new(main: C, playlist: impl AsRef<Path>, uri_prefix: impl Into<String>) -> Result<Self> {
        let playlist = playlist.as_ref().to_path_buf();
        File::create(&playlist)?;
        Ok(Self {
            main,
            playlist,
            uri_prefix: uri_prefix.into(),
            entries: String::new(),
            segment_count: 0,
            target_duration: 0,
            finished: false,
        })
    }

    pub fn inner(&self) -> &C {
        &self.main
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.main
    }

    pub fn segment_count(&self) -> u32 {
        self.segment_count
    }

    fn add_segment(&mut self, segment: &OutputSegment) {
        let name = match self.main.file_name() {
            Ok(Some(path)) => base_name(&path),
            _ => format!("stream{}.ts", self.segment_count),
        };
        let seconds = segment.rounded_seconds();
        self.entries.push_str(&format!(
            "#EXTINF:{seconds},\n\n{}{name}\n\n",
            self.uri_prefix
        ));
        self.target_duration = self.target_duration.max(seconds);
        self.segment_count += 1;
        debug!(segment = %name, seconds, "playlist entry");
    }

    fn write_playlist(&self) -> Result<()> {
        let mut file = File::create(&self.playlist)?;
        file.write_all(b"#EXTM3U\n\n#EXT-X-MEDIA-SEQUENCE:1\n\n")?;
        file.write_all(self.entries.as_bytes())?;
        write!(
            file,
            "#EXT-X-TARGETDURATION:{}\n\n#EXT-X-ENDLIST\n",
            self.target_duration
        )?;
        file.flush()?;
        info!(
            path = %self.playlist.display(),
            segments = self.segment_count,
            "wrote playlist"
        );
        Ok(())
    }
}

impl<C: ByteChannel> ByteChannel for HlsFilter<C> {
    forward_bytes!(main);

    fn split(&mut self) -> Result<()> {
        self.main.split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::OutputSegment(segment) => {
                self.add_segment(segment);
                Ok(())
            }
            other => self.main.message(offset, other),
        }
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let own = if abort {
            match fs::remove_file(&self.playlist) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            }
        } else {
            self.write_playlist()
        };
        first_error(self.main.finish(abort), own)
    }
}

impl<C: ByteChannel> Drop for HlsFilter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!(path = %self.playlist.display(), "playlist teardown failed: {e}");
        }
    }
}
