//! Program stream XML index.
//!
//! [`XmlIndexFilter`] builds the same GOP index as the elementary stream
//! variant, but from the demuxer's per-frame records instead of scanning
//! bytes. Video goes to one sidecar and the audio frames that fall inside
//! each video unit go to another; either may be omitted.

use bufstream_core::message::VideoAuInfoXml;
use bufstream_core::{ByteChannel, Error, Message, Result, SharedChannel};
use tracing::{debug, warn};

use crate::forward_bytes;
use crate::gop::{find_picture_start, find_slice_start, frame_clocks, Gop, XmlOptions, XmlSidecar};
use crate::{first_error, sidecar_message};

pub struct XmlIndexFilter<C: ByteChannel> {
    main: C,
    video: Option<XmlSidecar>,
    audio: Option<XmlSidecar>,
    options: XmlOptions,
    video_id: i32,
    audio_id: i32,
    video_bytes: i64,
    audio_bytes: i64,
    video_duration: i64,
    audio_duration: i64,
    clocks_per_frame: i64,
    clocks_per_audio_frame: i64,
    gop_header: Vec<u8>,
    gop: Gop,
    first_audio_pts: Option<i64>,
    last_audio_pts: i64,
    finished: bool,
}

impl<C: ByteChannel> XmlIndexFilter<C> {
    /// At least one of `video` and `audio` is required.
    pub fn new(
        main: C,
        video: Option<SharedChannel>,
        audio: Option<SharedChannel>,
        options: XmlOptions,
    ) -> Result<Self> {
        if video.is_none() && audio.is_none() {
            return Err(Error::protocol("XML index needs a video or an audio sidecar"));
        }
        Ok(Self {
            main,
            video: video.map(XmlSidecar::new),
            audio: audio.map(XmlSidecar::new),
            options,
            video_id: 0,
            audio_id: 0,
            video_bytes: 0,
            audio_bytes: 0,
            video_duration: 0,
            audio_duration: 0,
            clocks_per_frame: 0,
            clocks_per_audio_frame: 0,
            gop_header: Vec::new(),
            gop: Gop::default(),
            first_audio_pts: None,
            last_audio_pts: 0,
            finished: false,
        })
    }

    pub fn inner(&self) -> &C {
        &self.main
    }

    fn write_unit(&mut self) -> Result<()> {
        let mut result = Ok(());
        if let Some(video) = self.video.as_mut() {
            let duration = if self.options.sizes_only {
                0
            } else {
                self.gop.duration(self.clocks_per_frame)
            };
            self.video_duration += duration;
            let mut text = String::new();
            self.gop.render(&mut text, duration, &self.options);
            result = video.write(&text);
        }
        if let (Some(audio), Some(first)) = (self.audio.as_mut(), self.first_audio_pts) {
            let duration = self.last_audio_pts - first + self.clocks_per_audio_frame;
            self.audio_duration += duration;
            let mut text = String::new();
            self.gop.render_audio(&mut text, first, duration);
            result = first_error(result, audio.write(&text));
        }
        result
    }

    fn video_frame(&mut self, au: &VideoAuInfoXml) -> Result<()> {
        let mut result = Ok(());
        let rff = au.repeat_first_field != 0;
        let mut hdr = au.hdr.as_slice();
        let pic_pos;
        if au.starts_group() {
            if self.gop.has_pictures() {
                result = self.write_unit();
            }
            self.first_audio_pts = None;
            let mut start = 0;
            if let Some(i) = find_picture_start(hdr).filter(|i| *i > 0) {
                self.gop_header = hdr[..i].to_vec();
                hdr = &hdr[i..];
                start = i;
            }
            self.gop.start(au.flags, au.file_pos, self.gop_header.clone());
            pic_pos = start as i64;
        } else {
            pic_pos = au.file_pos;
        }

        if find_picture_start(hdr) == Some(0) {
            let end = find_slice_start(hdr).unwrap_or(hdr.len());
            if !self
                .gop
                .add_picture(&hdr[..end], pic_pos, au.pts, i64::from(au.length), rff)
            {
                debug!(pos = au.file_pos, "picture header without temporal reference");
            }
        }
        self.video_bytes += i64::from(au.length);
        result
    }

    fn interpret(&mut self, msg: &Message) -> Result<()> {
        match msg {
            Message::Flush => {
                for sidecar in [self.video.as_ref(), self.audio.as_ref()].into_iter().flatten() {
                    sidecar_message(sidecar.channel(), &mut Message::Flush)?;
                }
            }
            Message::VideoStreamInfo(info) => self.video_id = info.stream_id,
            Message::AudioStreamInfo(info) => self.audio_id = info.stream_id,
            Message::VideoSeqInfoXml(info) => {
                if self.clocks_per_frame == 0 {
                    self.clocks_per_frame =
                        frame_clocks(u32::from(info.pulldown), u32::from(info.frame_rate_code));
                }
            }
            Message::AudioSeqInfoXml(info) => {
                if self.clocks_per_audio_frame == 0 {
                    self.clocks_per_audio_frame = info.clocks_per_audio_frame;
                }
            }
            Message::VideoAuInfoXml(au) => self.video_frame(au)?,
            Message::AudioAuInfoXml(au) => {
                if self.first_audio_pts.is_none() {
                    self.first_audio_pts = Some(au.pts);
                }
                self.last_audio_pts = au.pts;
                self.audio_bytes += i64::from(au.length);
            }
            Message::SessionUserData(data) => {
                if let Some(video) = self.video.as_mut() {
                    video.user_data(data)?;
                }
            }
            Message::SessionUserDataAudio(data) => {
                if let Some(audio) = self.audio.as_mut() {
                    audio.user_data(data)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl<C: ByteChannel> ByteChannel for XmlIndexFilter<C> {
    forward_bytes!(main);

    fn split(&mut self) -> Result<()> {
        self.main.split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        let own = self.interpret(msg);
        let forwarded = self.main.message(offset, msg);
        first_error(forwarded, own)
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let mut result = Ok(());
        if !abort && self.gop.has_pictures() {
            result = self.write_unit();
        }
        if let Some(video) = self.video.as_mut() {
            let trailer = video.close(self.video_duration, self.video_bytes, Some(self.video_id));
            result = first_error(result, trailer);
        }
        if let Some(audio) = self.audio.as_mut() {
            let trailer = audio.close(self.audio_duration, self.audio_bytes, Some(self.audio_id));
            result = first_error(result, trailer);
        }
        debug!(
            video_bytes = self.video_bytes,
            audio_bytes = self.audio_bytes,
            abort,
            "program stream XML index closed"
        );
        first_error(self.main.finish(abort), result)
    }
}

impl<C: ByteChannel> Drop for XmlIndexFilter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("XML index teardown failed: {e}");
        }
    }
}
