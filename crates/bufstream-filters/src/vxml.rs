//! Elementary stream XML index.
//!
//! [`VxmlFilter`] sits in front of an MPEG video elementary stream. It
//! watches the committed bytes for picture and slice start codes, pairs
//! the headers it finds with the encoder's access unit messages, and
//! writes one `<AccessUnit>` element per sequence/GOP to an XML sidecar.
//!
//! Leases are served from a staging buffer owned by the filter so the
//! bytes can be scanned before they are passed on with a bulk transfer.
//! Start codes may straddle commits: each scan step looks back over the
//! last bytes it kept from the previous commit.

use bufstream_core::{write_all, ByteChannel, Error, Message, Result, SharedChannel};
use tracing::{debug, warn};

use crate::gop::{find_picture_start, find_slice_start, frame_clocks, Gop, XmlOptions, XmlSidecar};
use crate::{first_error, sidecar_message};

/// Start code bytes that can precede a commit boundary.
const CARRY: usize = 3;

/// What the committed bytes are currently taken to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Sequence/GOP headers ahead of the next picture.
    Header,
    /// A picture was announced; its start code has not been seen yet.
    SeekPicture,
    /// Inside the picture header, up to the first slice.
    PictureHeader,
    /// Slice data.
    Body,
}

pub struct VxmlFilter<C: ByteChannel> {
    main: C,
    sidecar: XmlSidecar,
    options: XmlOptions,
    staging: Vec<u8>,
    byte_count: i64,
    total_duration: i64,
    clocks_per_frame: i64,
    /// Bytes seen since the last picture, i.e. sequence/GOP headers.
    gop_header: Vec<u8>,
    gop_header_pos: i64,
    pic_header: Vec<u8>,
    pic_pos: i64,
    rff: bool,
    scan: Scan,
    gop: Gop,
    finished: bool,
}

impl<C: ByteChannel> VxmlFilter<C> {
    pub fn new(main: C, sidecar: SharedChannel, options: XmlOptions) -> Self {
        Self {
            main,
            sidecar: XmlSidecar::new(sidecar),
            options,
            staging: Vec::new(),
            byte_count: 0,
            total_duration: 0,
            clocks_per_frame: 0,
            gop_header: Vec::new(),
            gop_header_pos: 0,
            pic_header: Vec::new(),
            pic_pos: 0,
            rff: false,
            scan: Scan::Header,
            gop: Gop::default(),
            finished: false,
        }
    }

    pub fn inner(&self) -> &C {
        &self.main
    }

    /// Bytes passed through so far.
    pub fn byte_count(&self) -> i64 {
        self.byte_count
    }

    fn save_header(&mut self, data: &[u8]) {
        if self.gop_header.is_empty() {
            self.gop_header_pos = self.byte_count;
        }
        self.gop_header.extend_from_slice(data);
    }

    /// Trailing header bytes that end right where `data` begins.
    fn header_carry(&self) -> usize {
        let len = self.gop_header.len();
        if len > 0 && self.gop_header_pos + len as i64 == self.byte_count {
            len.min(CARRY)
        } else {
            0
        }
    }

    fn seek_picture(&mut self, data: &[u8]) {
        let carried = self.header_carry();
        let mut window = self.gop_header[self.gop_header.len() - carried..].to_vec();
        window.extend_from_slice(data);
        let Some(start) = find_picture_start(&window) else {
            self.save_header(data);
            return;
        };
        if start < carried {
            let keep = self.gop_header.len() - (carried - start);
            self.gop_header.truncate(keep);
        } else if start > carried {
            self.save_header(&data[..start - carried]);
        }
        self.pic_pos = self.byte_count - carried as i64 + start as i64;
        self.pic_header.clear();
        self.scan = Scan::PictureHeader;
        self.picture_header(&window[start..], 0);
    }

    /// Extend the picture header with `data`, whose first `carried` bytes
    /// are already at the end of it.
    fn picture_header(&mut self, data: &[u8], carried: usize) {
        match find_slice_start(data) {
            Some(end) if end < carried => {
                let keep = self.pic_header.len() - (carried - end);
                self.pic_header.truncate(keep);
                self.scan = Scan::Body;
            }
            Some(end) => {
                self.pic_header.extend_from_slice(&data[carried..end]);
                self.scan = Scan::Body;
            }
            None => self.pic_header.extend_from_slice(&data[carried..]),
        }
    }

    fn observe(&mut self, data: &[u8]) {
        match self.scan {
            Scan::Header => self.save_header(data),
            Scan::SeekPicture => self.seek_picture(data),
            Scan::PictureHeader => {
                let carried = self.pic_header.len().min(CARRY);
                let mut window = self.pic_header[self.pic_header.len() - carried..].to_vec();
                window.extend_from_slice(data);
                self.picture_header(&window, carried);
            }
            Scan::Body => {}
        }
        self.byte_count += data.len() as i64;
    }

    fn clear_picture(&mut self) {
        self.scan = Scan::Header;
    }

    fn write_gop(&mut self) -> Result<()> {
        let duration = if self.options.sizes_only {
            0
        } else {
            self.gop.duration(self.clocks_per_frame)
        };
        self.total_duration += duration;
        let mut text = String::new();
        self.gop.render(&mut text, duration, &self.options);
        self.sidecar.write(&text)
    }

    fn interpret(&mut self, msg: &Message) -> Result<()> {
        match msg {
            Message::Flush => sidecar_message(self.sidecar.channel(), &mut Message::Flush)?,
            Message::PictureStart(info) => {
                self.rff = info.repeat_first_field != 0;
                self.scan = Scan::SeekPicture;
            }
            Message::VideoAu(au) => {
                let mut result = Ok(());
                if au.starts_group() {
                    if self.gop.has_pictures() {
                        result = self.write_gop();
                    }
                    let position = if self.gop_header.is_empty() {
                        self.pic_pos
                    } else {
                        self.gop_header_pos
                    };
                    let header = std::mem::take(&mut self.gop_header);
                    self.gop.start(u32::from(au.flags), position, header);
                }
                let pic_header = std::mem::take(&mut self.pic_header);
                if !pic_header.is_empty() {
                    let offset = self.pic_pos - self.gop.position;
                    if !self.gop.add_picture(&pic_header, offset, au.pts, i64::from(au.length), self.rff) {
                        debug!(len = pic_header.len(), "picture header without temporal reference");
                    }
                }
                self.clear_picture();
                result?;
            }
            Message::SeqStart(info) => {
                if self.clocks_per_frame == 0 {
                    self.clocks_per_frame = frame_clocks(info.pulldown, info.frame_rate_code);
                }
                self.clear_picture();
            }
            Message::GopStart(_) => self.clear_picture(),
            Message::SessionUserData(data) => self.sidecar.user_data(data)?,
            _ => {}
        }
        Ok(())
    }
}

impl<C: ByteChannel> ByteChannel for VxmlFilter<C> {
    fn capacity(&self) -> usize {
        self.main.capacity()
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        let limit = self.main.chunk_size();
        if n > limit {
            return Err(Error::Unavailable {
                requested: n,
                available: limit,
            });
        }
        if self.staging.len() < n {
            self.staging.resize(n, 0);
        }
        Ok(&mut self.staging[..n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        if n > self.staging.len() {
            return Err(Error::protocol("commit exceeds the leased region"));
        }
        let staging = std::mem::take(&mut self.staging);
        let result = write_all(&mut self.main, &staging[..n]);
        if result.is_ok() {
            self.observe(&staging[..n]);
        }
        self.staging = staging;
        result.map(|()| n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        let n = self.main.bulk_transfer(data)?;
        self.observe(&data[..n.min(data.len())]);
        Ok(n)
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.main.bulk_read(buf)
    }

    fn chunk_size(&self) -> usize {
        self.main.chunk_size()
    }

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
            result = self.write_gop();
        }
        let trailer = self
            .sidecar
            .close(self.total_duration, self.byte_count, None);
        result = first_error(result, trailer);
        debug!(bytes = self.byte_count, abort, "elementary stream XML index closed");
        first_error(self.main.finish(abort), result)
    }
}

impl<C: ByteChannel> Drop for VxmlFilter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("XML index teardown failed: {e}");
        }
    }
}
