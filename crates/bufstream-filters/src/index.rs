//! Per-frame index records.
//!
//! A muxer announces each video and audio access unit with the byte
//! position it will occupy in the main output. [`IndexFilter`] holds those
//! records back until the main channel has actually written past the
//! position, then appends them to the video or audio sidecar. Reordered
//! video (a B frame announced after its forward reference) is accounted
//! for by looking one record further ahead.

use std::collections::VecDeque;

use bufstream_core::message::{AudioAuRecord, Record, VideoAuRecord};
use bufstream_core::{ByteChannel, Message, Result, SharedChannel};
use tracing::{trace, warn};

use crate::{first_error, forward_bytes, sidecar_message, sidecar_write};

/// Video records held back at most.
pub const VIDEO_RING_CAPACITY: usize = 300;
/// Audio records held back at most.
pub const AUDIO_RING_CAPACITY: usize = 420;

/// A record that can be written to an index sidecar.
trait IndexRecord: Record + Copy {
    fn file_pos(&self) -> i64;
    fn message(self) -> Message;
}

impl IndexRecord for VideoAuRecord {
    fn file_pos(&self) -> i64 {
        self.file_pos
    }

    fn message(self) -> Message {
        Message::VideoAuInfo(self)
    }
}

impl IndexRecord for AudioAuRecord {
    fn file_pos(&self) -> i64 {
        self.file_pos
    }

    fn message(self) -> Message {
        Message::AudioAuInfo(self)
    }
}

/// Records waiting for the main output to catch up, bound to one sidecar.
struct Pending<R> {
    sidecar: SharedChannel,
    ring: VecDeque<R>,
    capacity: usize,
    /// Look past a reordered successor before releasing the oldest record.
    reorders: bool,
}

impl<R: IndexRecord> Pending<R> {
    fn new(sidecar: SharedChannel, capacity: usize, reorders: bool) -> Self {
        Self {
            sidecar,
            ring: VecDeque::with_capacity(capacity),
            capacity,
            reorders,
        }
    }

    fn write_front(&mut self) -> Result<()> {
        let Some(record) = self.ring.pop_front() else {
            return Ok(());
        };
        sidecar_write(&self.sidecar, &record.to_bytes())?;
        sidecar_message(&self.sidecar, &mut record.message())
    }

    /// Queue `record`, then release every record whose successor already
    /// lies below `written` in the main output.
    fn push(&mut self, record: R, written: Option<u64>) -> Result<()> {
        self.ring.push_back(record);
        if self.ring.len() >= self.capacity {
            self.write_front()?;
        }
        let Some(written) = written else {
            return Ok(());
        };
        let written = written as i64;
        loop {
            let mut next = 1;
            if self.reorders && self.ring.len() > 1 && self.ring[0].file_pos() > self.ring[1].file_pos() {
                next = 2;
            }
            match self.ring.get(next) {
                Some(r) if r.file_pos() < written => self.write_front()?,
                _ => return Ok(()),
            }
        }
    }

    fn drain(&mut self) -> Result<()> {
        while !self.ring.is_empty() {
            self.write_front()?;
        }
        Ok(())
    }

    fn split(&mut self) -> Result<()> {
        self.drain()?;
        sidecar_message(&self.sidecar, &mut Message::SplitOutput)
    }
}

pub struct IndexFilter<C: ByteChannel> {
    main: C,
    video: Option<Pending<VideoAuRecord>>,
    audio: Option<Pending<AudioAuRecord>>,
    finished: bool,
}

impl<C: ByteChannel> IndexFilter<C> {
    pub fn new(main: C, video: Option<SharedChannel>, audio: Option<SharedChannel>) -> Self {
        Self {
            main,
            video: video.map(|s| Pending::new(s, VIDEO_RING_CAPACITY, true)),
            audio: audio.map(|s| Pending::new(s, AUDIO_RING_CAPACITY, false)),
            finished: false,
        }
    }

    pub fn inner(&self) -> &C {
        &self.main
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.main
    }

    /// Records still held back as (video, audio).
    pub fn pending(&self) -> (usize, usize) {
        (
            self.video.as_ref().map_or(0, |p| p.ring.len()),
            self.audio.as_ref().map_or(0, |p| p.ring.len()),
        )
    }

    fn written(&mut self) -> Option<u64> {
        match self.main.byte_count() {
            Ok(n) => Some(n),
            Err(e) => {
                trace!("main channel has no byte count: {e}");
                None
            }
        }
    }
}

fn stream_info(sidecar: &SharedChannel, encoded: &[u8], msg: &mut Message) -> Result<()> {
    sidecar_write(sidecar, encoded)?;
    sidecar_message(sidecar, msg)
}

impl<C: ByteChannel> ByteChannel for IndexFilter<C> {
    forward_bytes!(main);

    fn split(&mut self) -> Result<()> {
        self.main.split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::Flush => {
                let mut result = self.main.message(offset, msg);
                if let Some(video) = &self.video {
                    result = first_error(result, sidecar_message(&video.sidecar, &mut Message::Flush));
                }
                if let Some(audio) = &self.audio {
                    result = first_error(result, sidecar_message(&audio.sidecar, &mut Message::Flush));
                }
                result
            }
            Message::VideoStreamInfo(info) if self.video.is_some() => {
                let encoded = info.to_bytes();
                match &self.video {
                    Some(video) => stream_info(&video.sidecar, &encoded, msg),
                    None => Ok(()),
                }
            }
            Message::AudioStreamInfo(info) if self.audio.is_some() => {
                let encoded = info.to_bytes();
                match &self.audio {
                    Some(audio) => stream_info(&audio.sidecar, &encoded, msg),
                    None => Ok(()),
                }
            }
            Message::VideoAuInfo(record) if self.video.is_some() => {
                let record = *record;
                let written = self.written();
                match self.video.as_mut() {
                    Some(video) => video.push(record, written),
                    None => Ok(()),
                }
            }
            Message::AudioAuInfo(record) if self.audio.is_some() => {
                let record = *record;
                let written = self.written();
                match self.audio.as_mut() {
                    Some(audio) => audio.push(record, written),
                    None => Ok(()),
                }
            }
            Message::SplitOutput => {
                let mut result = Ok(());
                if let Some(audio) = self.audio.as_mut() {
                    result = audio.split();
                }
                if let Some(video) = self.video.as_mut() {
                    result = first_error(result, video.split());
                }
                first_error(self.main.message(offset, msg), result)
            }
            other => self.main.message(offset, other),
        }
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let mut result = Ok(());
        if !abort {
            if let Some(video) = self.video.as_mut() {
                result = video.drain();
            }
            if let Some(audio) = self.audio.as_mut() {
                result = first_error(result, audio.drain());
            }
        }
        first_error(self.main.finish(abort), result)
    }
}

impl<C: ByteChannel> Drop for IndexFilter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("index filter teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufstream_core::message::VideoStreamInfo;
    use bufstream_core::testing::RecordingChannel;
    use bufstream_core::{shared, write_all, RwFileChannel};

    fn video(file_pos: i64) -> Message {
        Message::VideoAuInfo(VideoAuRecord {
            file_pos,
            ..VideoAuRecord::default()
        })
    }

    fn audio(file_pos: i64) -> Message {
        Message::AudioAuInfo(AudioAuRecord {
            file_pos,
            ..AudioAuRecord::default()
        })
    }

    fn positions(path: &std::path::Path, size: usize) -> Vec<i64> {
        std::fs::read(path)
            .unwrap()
            .chunks(size)
            .map(|c| i64::from_le_bytes(c[..8].try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_records_wait_for_main_output() {
        let dir = tempfile::tempdir().unwrap();
        let vpath = dir.path().join("v.idx");
        let vside = shared(RwFileChannel::create(&vpath, 4096).unwrap());
        let mut filter = IndexFilter::new(RecordingChannel::new(4096), Some(vside.clone()), None);

        filter.message(0, &mut video(0)).unwrap();
        filter.message(0, &mut video(100)).unwrap();
        assert_eq!(filter.pending(), (2, 0));

        write_all(&mut filter, &[0; 150]).unwrap();
        filter.message(0, &mut video(200)).unwrap();
        assert_eq!(filter.pending(), (2, 0));

        filter.finish(false).unwrap();
        vside.lock().finish(false).unwrap();
        assert_eq!(positions(&vpath, VideoAuRecord::SIZE), vec![0, 100, 200]);
    }

    #[test]
    fn test_reordered_successor_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let vpath = dir.path().join("v.idx");
        let vside = shared(RwFileChannel::create(&vpath, 4096).unwrap());
        let mut filter = IndexFilter::new(RecordingChannel::new(4096), Some(vside), None);

        write_all(&mut filter, &[0; 150]).unwrap();
        filter.message(0, &mut video(400)).unwrap();
        filter.message(0, &mut video(100)).unwrap();
        assert_eq!(filter.pending(), (2, 0));
        filter.message(0, &mut video(200)).unwrap();
        assert_eq!(filter.pending(), (3, 0));
    }

    #[test]
    fn test_ring_overflow_releases_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let apath = dir.path().join("a.idx");
        let aside = shared(RwFileChannel::create(&apath, 4096).unwrap());
        let mut filter = IndexFilter::new(RecordingChannel::new(64), None, Some(aside));
        for i in 0..AUDIO_RING_CAPACITY as i64 + 5 {
            filter.message(0, &mut audio(1_000_000 + i)).unwrap();
        }
        assert_eq!(filter.pending(), (0, AUDIO_RING_CAPACITY - 1));
    }

    #[test]
    fn test_split_flushes_sidecars_before_main() {
        let dir = tempfile::tempdir().unwrap();
        let vpath = dir.path().join("v.idx");
        let vside = shared(RwFileChannel::create(&vpath, 4096).unwrap());
        let mut filter = IndexFilter::new(RecordingChannel::new(64), Some(vside.clone()), None);
        filter.message(0, &mut video(10)).unwrap();
        filter.message(0, &mut Message::SplitOutput).unwrap();
        assert_eq!(filter.pending(), (0, 0));
        assert_eq!(vside.lock().byte_count().unwrap(), VideoAuRecord::SIZE as u64);
        assert_eq!(filter.inner().messages().last(), Some(&&Message::SplitOutput));
    }

    #[test]
    fn test_stream_info_goes_to_sidecar_only() {
        let dir = tempfile::tempdir().unwrap();
        let vpath = dir.path().join("v.idx");
        let vside = shared(RwFileChannel::create(&vpath, 4096).unwrap());
        let mut filter = IndexFilter::new(RecordingChannel::new(64), Some(vside.clone()), None);
        let mut info = Message::VideoStreamInfo(VideoStreamInfo::default());
        filter.message(0, &mut info).unwrap();
        assert_eq!(vside.lock().byte_count().unwrap(), VideoStreamInfo::SIZE as u64);
        assert!(filter.inner().messages().is_empty());
    }
}
