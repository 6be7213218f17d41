//! GOP accumulation and XML rendering shared by the XML index filters.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bufstream_core::message::{clocks_per_frame, FRAMERATE29, PULLDOWN_23, PULLDOWN_32, SEQHDR_FLAG};
use bufstream_core::{Result, SharedChannel};

use crate::sidecar_write;

/// Temporal references at or above this are dropped.
pub const MAX_TEMPORAL_REFS: usize = 128;

/// XML timestamps are printed in 90 kHz units.
const CLOCK_DIVISOR: i64 = 300;

/// How header bytes are embedded in the XML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderEncoding {
    #[default]
    Base64,
    /// Uppercase hex on its own line.
    Hex,
}

/// Output options for the XML index filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmlOptions {
    pub encoding: HeaderEncoding,
    /// Emit only unit type and size per access unit.
    pub sizes_only: bool,
}

/// Frame duration in 27 MHz ticks for a sequence's rate and pulldown.
pub(crate) fn frame_clocks(pulldown: u32, frame_rate_code: u32) -> i64 {
    if pulldown == PULLDOWN_23 || pulldown == PULLDOWN_32 {
        clocks_per_frame(FRAMERATE29)
    } else {
        clocks_per_frame(frame_rate_code)
    }
}

/// Offset of the first picture start code (`00 00 01 00`).
pub(crate) fn find_picture_start(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == [0, 0, 1, 0])
}

/// Offset of the first slice start code (`00 00 01 01..=AF`).
pub(crate) fn find_slice_start(data: &[u8]) -> Option<usize> {
    data.windows(4)
        .position(|w| w[..3] == [0, 0, 1] && (0x01..=0xAF).contains(&w[3]))
}

/// Temporal reference from a picture header starting at its start code.
fn temporal_reference(header: &[u8]) -> Option<usize> {
    if header.len() <= 6 {
        return None;
    }
    Some((((header[4] as usize) << 8) | header[5] as usize) >> 6)
}

#[derive(Debug)]
struct Picture {
    header: Vec<u8>,
    offset: i64,
}

/// One sequence/GOP access unit being accumulated.
#[derive(Debug, Default)]
pub(crate) struct Gop {
    pub flags: u32,
    pub position: i64,
    pub header: Vec<u8>,
    pub first_pts: Option<i64>,
    pub last_pts: i64,
    pub rff: bool,
    pub size: i64,
    pictures: BTreeMap<usize, Picture>,
}

impl Gop {
    pub fn start(&mut self, flags: u32, position: i64, header: Vec<u8>) {
        self.flags = flags;
        self.position = position;
        self.header = header;
        self.first_pts = None;
        self.last_pts = 0;
        self.rff = false;
        self.size = 0;
        self.pictures.clear();
    }

    /// True once a picture has been recorded.
    pub fn has_pictures(&self) -> bool {
        self.first_pts.is_some()
    }

    /// Record a picture. Returns false when the header carries no usable
    /// temporal reference.
    pub fn add_picture(&mut self, header: &[u8], offset: i64, pts: i64, length: i64, rff: bool) -> bool {
        let Some(temp_ref) = temporal_reference(header).filter(|t| *t < MAX_TEMPORAL_REFS) else {
            return false;
        };
        match self.first_pts {
            Some(first) if first <= pts => {}
            _ => self.first_pts = Some(pts),
        }
        if pts > self.last_pts || self.pictures.is_empty() {
            self.last_pts = pts;
            self.rff = rff;
        }
        self.pictures.insert(
            temp_ref,
            Picture {
                header: header.to_vec(),
                offset,
            },
        );
        self.size += length;
        true
    }

    /// Display duration from the first to past the last picture.
    pub fn duration(&self, clocks_per_frame: i64) -> i64 {
        let Some(first) = self.first_pts else {
            return 0;
        };
        let mut duration = self.last_pts - first + clocks_per_frame;
        if self.rff {
            duration += clocks_per_frame / 2;
        }
        duration
    }

    fn unit_type(&self) -> &'static str {
        if self.flags & u32::from(SEQHDR_FLAG) != 0 {
            "SEQ"
        } else {
            "GOP"
        }
    }

    pub fn render(&self, out: &mut String, duration: i64, options: &XmlOptions) {
        out.push_str(" <AccessUnit>\n");
        out.push_str(&format!("  <UnitType>{}</UnitType>\n", self.unit_type()));
        if !options.sizes_only {
            out.push_str(&format!("  <Position>{}</Position>\n", self.position));
            out.push_str(&format!(
                "  <PTS>{}</PTS>\n",
                self.first_pts.unwrap_or_default() / CLOCK_DIVISOR
            ));
            out.push_str(&format!("  <Duration>{}</Duration>\n", duration / CLOCK_DIVISOR));
        }
        out.push_str(&format!("  <Size>{}</Size>\n", self.size));
        if !options.sizes_only {
            header_data(out, 2, &self.header, options.encoding);
            for picture in self.pictures.values() {
                out.push_str("  <PictureData>\n");
                header_data(out, 3, &picture.header, options.encoding);
                out.push_str(&format!("   <Offset>{}</Offset>\n", picture.offset));
                out.push_str("  </PictureData>\n");
            }
        }
        out.push_str(" </AccessUnit>\n");
    }

    /// Render the audio frames that fell inside this unit.
    pub fn render_audio(&self, out: &mut String, first_pts: i64, duration: i64) {
        out.push_str(" <AudioUnit>\n");
        out.push_str(&format!("  <UnitType>{}</UnitType>\n", self.unit_type()));
        out.push_str(&format!("  <Position>{}</Position>\n", self.position));
        out.push_str(&format!("  <PTS>{}</PTS>\n", first_pts / CLOCK_DIVISOR));
        out.push_str(&format!("  <Duration>{}</Duration>\n", duration / CLOCK_DIVISOR));
        out.push_str(" </AudioUnit>\n");
    }
}

fn header_data(out: &mut String, indent: usize, data: &[u8], encoding: HeaderEncoding) {
    let pad = " ".repeat(indent);
    match encoding {
        HeaderEncoding::Base64 => {
            out.push_str(&format!("{pad}<HeaderData>{}</HeaderData>\n", STANDARD.encode(data)));
        }
        HeaderEncoding::Hex => {
            out.push_str(&format!("{pad}<HeaderData>\n"));
            out.push_str(&format!("{pad} {}\n", hex::encode_upper(data)));
            out.push_str(&format!("{pad}</HeaderData>\n"));
        }
    }
}

/// An XML document streamed to a sidecar.
///
/// The `<Stream>` element opens lazily with the first write, so a stream
/// that never produced anything still closes as well-formed XML.
pub(crate) struct XmlSidecar {
    channel: SharedChannel,
    opened: bool,
    closed: bool,
}

impl XmlSidecar {
    pub fn new(channel: SharedChannel) -> Self {
        Self {
            channel,
            opened: false,
            closed: false,
        }
    }

    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    pub fn write(&mut self, text: &str) -> Result<()> {
        if !self.opened {
            sidecar_write(&self.channel, b"<Stream>\n")?;
            self.opened = true;
        }
        sidecar_write(&self.channel, text.as_bytes())
    }

    /// User data is embedded verbatim.
    pub fn user_data(&mut self, data: &[u8]) -> Result<()> {
        let mut element = b"<UserData>".to_vec();
        element.extend_from_slice(data);
        element.extend_from_slice(b"</UserData>\n");
        if !self.opened {
            sidecar_write(&self.channel, b"<Stream>\n")?;
            self.opened = true;
        }
        sidecar_write(&self.channel, &element)
    }

    /// Write the stream totals and close the document. Later calls are no-ops.
    pub fn close(&mut self, duration: i64, size: i64, stream_id: Option<i32>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut trailer = format!(
            " <StreamDuration>{}</StreamDuration>\n <StreamSize>{size}</StreamSize>\n",
            duration / CLOCK_DIVISOR
        );
        if let Some(id) = stream_id {
            trailer.push_str(&format!(" <StreamId>{id}</StreamId>\n"));
        }
        trailer.push_str("</Stream>\n");
        self.write(&trailer)
    }
}
