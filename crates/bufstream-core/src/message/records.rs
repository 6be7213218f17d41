//! Fixed-layout records carried by messages.
//!
//! Every record has a packed little-endian wire layout matching the
//! structures exchanged with encoders and demuxers. Timestamps are in
//! 27 MHz clock ticks unless a field says otherwise.

use bytes::{Buf, BufMut, BytesMut};

use super::codes::{GOPHDR_FLAG, SEQHDR_FLAG};

/// A record with a fixed wire size.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the packed encoding to `buf`.
    fn put(&self, buf: &mut BytesMut);

    /// Decode from exactly [`Self::SIZE`] bytes. Callers check the length.
    fn get(buf: &mut &[u8]) -> Self;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.put(&mut buf);
        buf.to_vec()
    }
}

fn put_padded(buf: &mut BytesMut, data: &[u8], width: usize) {
    let n = data.len().min(width);
    buf.put_slice(&data[..n]);
    buf.put_bytes(0, width - n);
}

fn get_padded(buf: &mut &[u8], used: usize, width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    buf.copy_to_slice(&mut field);
    field.truncate(used.min(width));
    field
}

/// Video access unit announced by an encoder after its bytes (`v_au_struct`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoAuUnit {
    /// Length of the unit in bytes.
    pub length: u32,
    /// Picture coding type (I/P/B).
    pub pic_type: u16,
    /// Header flags ([`SEQHDR_FLAG`], [`GOPHDR_FLAG`]).
    pub flags: u16,
    pub svcd_offset: u16,
    pub pict_hdr_offset: u16,
    pub first_frame_offset: u32,
    pub dts: i64,
    pub pts: i64,
}

impl VideoAuUnit {
    /// True when the unit starts a sequence or a GOP.
    pub fn starts_group(&self) -> bool {
        self.flags & (SEQHDR_FLAG | GOPHDR_FLAG) != 0
    }
}

impl Record for VideoAuUnit {
    const SIZE: usize = 32;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.length);
        buf.put_u16_le(self.pic_type);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.svcd_offset);
        buf.put_u16_le(self.pict_hdr_offset);
        buf.put_u32_le(self.first_frame_offset);
        buf.put_i64_le(self.dts);
        buf.put_i64_le(self.pts);
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self {
            length: buf.get_u32_le(),
            pic_type: buf.get_u16_le(),
            flags: buf.get_u16_le(),
            svcd_offset: buf.get_u16_le(),
            pict_hdr_offset: buf.get_u16_le(),
            first_frame_offset: buf.get_u32_le(),
            dts: buf.get_i64_le(),
            pts: buf.get_i64_le(),
        }
    }
}

/// Audio access unit announced by an encoder after its bytes (`a_au_struct`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioAuUnit {
    pub length: u32,
    pub pts: i64,
}

impl Record for AudioAuUnit {
    const SIZE: usize = 12;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.length);
        buf.put_i64_le(self.pts);
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self {
            length: buf.get_u32_le(),
            pts: buf.get_i64_le(),
        }
    }
}

/// Per-frame video index record (`video_au_info`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoAuRecord {
    /// Byte position of the frame in the main output.
    pub file_pos: i64,
    pub num_in_sector: u8,
    pub frame_type: u8,
    pub temp_ref: i16,
    pub forward_ref_frame: i32,
    pub coding_order: i32,
    pub display_order: i32,
    pub pts: i64,
}

impl Record for VideoAuRecord {
    const SIZE: usize = 32;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.file_pos);
        buf.put_u8(self.num_in_sector);
        buf.put_u8(self.frame_type);
        buf.put_i16_le(self.temp_ref);
        buf.put_i32_le(self.forward_ref_frame);
        buf.put_i32_le(self.coding_order);
        buf.put_i32_le(self.display_order);
        buf.put_i64_le(self.pts);
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self {
            file_pos: buf.get_i64_le(),
            num_in_sector: buf.get_u8(),
            frame_type: buf.get_u8(),
            temp_ref: buf.get_i16_le(),
            forward_ref_frame: buf.get_i32_le(),
            coding_order: buf.get_i32_le(),
            display_order: buf.get_i32_le(),
            pts: buf.get_i64_le(),
        }
    }
}

/// Per-frame audio index record (`audio_au_info`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioAuRecord {
    pub file_pos: i64,
    pub num_in_sector: i32,
    pub pts: i64,
}

impl Record for AudioAuRecord {
    const SIZE: usize = 20;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.file_pos);
        buf.put_i32_le(self.num_in_sector);
        buf.put_i64_le(self.pts);
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self {
            file_pos: buf.get_i64_le(),
            num_in_sector: buf.get_i32_le(),
            pts: buf.get_i64_le(),
        }
    }
}

/// A finished output segment (`output_segment_info`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputSegment {
    /// Segment duration in 100 ns units.
    pub duration: u64,
    /// Segment length in bytes.
    pub length: u64,
}

impl OutputSegment {
    /// Duration rounded to whole seconds.
    pub fn rounded_seconds(&self) -> u32 {
        (self.duration as f64 / 10_000_000.0 + 0.5) as u32
    }
}

impl Record for OutputSegment {
    const SIZE: usize = 144;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.duration);
        buf.put_u64_le(self.length);
        buf.put_bytes(0, 128);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let duration = buf.get_u64_le();
        let length = buf.get_u64_le();
        buf.advance(128);
        Self { duration, length }
    }
}

/// DVD navigation pack summary (`dvd_nv_info`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavInfo {
    /// Relative logical block number of the navigation pack.
    pub nv_sa: u32,
    pub frame_num: u32,
    pub vob_num: i32,
    pub cell_num: i32,
}

impl Record for NavInfo {
    const SIZE: usize = 16;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.nv_sa);
        buf.put_u32_le(self.frame_num);
        buf.put_i32_le(self.vob_num);
        buf.put_i32_le(self.cell_num);
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self {
            nv_sa: buf.get_u32_le(),
            frame_num: buf.get_u32_le(),
            vob_num: buf.get_i32_le(),
            cell_num: buf.get_i32_le(),
        }
    }
}

/// Sequence header summary sent with a sequence start code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeqStartInfo {
    pub video_type: u32,
    pub frame_rate_code: u32,
    pub bit_rate: u32,
    pub max_bit_rate: u32,
    pub pulldown: u32,
    pub vbv_buffer_size: u32,
}

impl Record for SeqStartInfo {
    const SIZE: usize = 24;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.video_type);
        buf.put_u32_le(self.frame_rate_code);
        buf.put_u32_le(self.bit_rate);
        buf.put_u32_le(self.max_bit_rate);
        buf.put_u32_le(self.pulldown);
        buf.put_u32_le(self.vbv_buffer_size);
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self {
            video_type: buf.get_u32_le(),
            frame_rate_code: buf.get_u32_le(),
            bit_rate: buf.get_u32_le(),
            max_bit_rate: buf.get_u32_le(),
            pulldown: buf.get_u32_le(),
            vbv_buffer_size: buf.get_u32_le(),
        }
    }
}

/// Picture header summary sent with a picture start code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PicStartInfo {
    pub pict_type: u32,
    pub temp_ref: u32,
    pub repeat_first_field: u32,
    /// 90 kHz based.
    pub vbv_delay: u32,
    pub top_field_first: u32,
    pub progressive_frame: u32,
}

impl Record for PicStartInfo {
    const SIZE: usize = 24;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.pict_type);
        buf.put_u32_le(self.temp_ref);
        buf.put_u32_le(self.repeat_first_field);
        buf.put_u32_le(self.vbv_delay);
        buf.put_u32_le(self.top_field_first);
        buf.put_u32_le(self.progressive_frame);
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self {
            pict_type: buf.get_u32_le(),
            temp_ref: buf.get_u32_le(),
            repeat_first_field: buf.get_u32_le(),
            vbv_delay: buf.get_u32_le(),
            top_field_first: buf.get_u32_le(),
            progressive_frame: buf.get_u32_le(),
        }
    }
}

/// Video sequence parameters for the program stream XML index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoSeqInfoXml {
    pub pulldown: u8,
    pub frame_rate_code: u8,
}

impl Record for VideoSeqInfoXml {
    const SIZE: usize = 64;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.pulldown);
        buf.put_u8(self.frame_rate_code);
        buf.put_bytes(0, 62);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let pulldown = buf.get_u8();
        let frame_rate_code = buf.get_u8();
        buf.advance(62);
        Self {
            pulldown,
            frame_rate_code,
        }
    }
}

/// Audio sequence parameters for the program stream XML index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioSeqInfoXml {
    pub clocks_per_audio_frame: i64,
}

impl Record for AudioSeqInfoXml {
    const SIZE: usize = 64;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.clocks_per_audio_frame);
        buf.put_bytes(0, 56);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let clocks_per_audio_frame = buf.get_i64_le();
        buf.advance(56);
        Self {
            clocks_per_audio_frame,
        }
    }
}

/// Audio frame for the program stream XML index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioAuInfoXml {
    pub pts: i64,
    pub length: i32,
}

impl Record for AudioAuInfoXml {
    const SIZE: usize = 64;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.pts);
        buf.put_i32_le(self.length);
        buf.put_bytes(0, 52);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let pts = buf.get_i64_le();
        let length = buf.get_i32_le();
        buf.advance(52);
        Self { pts, length }
    }
}

/// Video frame for the program stream XML index.
///
/// The header dump travels inline after a 29 byte head, so the record is
/// variable in size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoAuInfoXml {
    /// Pack position of the sequence/GOP header when `flags` marks one,
    /// else the picture's position relative to the last such header.
    pub file_pos: i64,
    pub flags: u32,
    pub length: i32,
    pub repeat_first_field: u8,
    pub pts: i64,
    /// Leading bytes of the frame, starting at the sequence/GOP header.
    pub hdr: Vec<u8>,
}

impl VideoAuInfoXml {
    /// Size of the fixed head preceding the header bytes.
    pub const HEAD_SIZE: usize = 29;
    /// Maximum header dump carried inline.
    pub const MAX_HDR: usize = 512;

    pub fn starts_group(&self) -> bool {
        self.flags & u32::from(SEQHDR_FLAG | GOPHDR_FLAG) != 0
    }

    pub(crate) fn put(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.file_pos);
        buf.put_u32_le(self.flags);
        buf.put_i32_le(self.length);
        buf.put_u8(self.repeat_first_field);
        buf.put_i64_le(self.pts);
        buf.put_i32_le(self.hdr.len() as i32);
        buf.put_slice(&self.hdr);
    }

    /// Decode the head and return it with the declared header length.
    pub(crate) fn get_head(buf: &mut &[u8]) -> (Self, usize) {
        let head = Self {
            file_pos: buf.get_i64_le(),
            flags: buf.get_u32_le(),
            length: buf.get_i32_le(),
            repeat_first_field: buf.get_u8(),
            pts: buf.get_i64_le(),
            hdr: Vec::new(),
        };
        let hdr_len = buf.get_i32_le().max(0) as usize;
        (head, hdr_len)
    }
}

/// Video stream descriptor (`video_stream_info`, tag `VINF`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoStreamInfo {
    pub program_stream_flag: i32,
    pub stream_id: i32,
    pub pid: i32,
    pub pulldown: i32,
    /// Estimated frame duration in 27 MHz ticks.
    pub frame_duration: i64,
    /// Sequence header and extension bytes, at most 150.
    pub seq_hdr: Vec<u8>,
}

impl Record for VideoStreamInfo {
    const SIZE: usize = 254;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_slice(b"VINF");
        buf.put_i32_le(Self::SIZE as i32);
        buf.put_i32_le(self.program_stream_flag);
        buf.put_i32_le(self.stream_id);
        buf.put_i32_le(self.pid);
        buf.put_i32_le(self.pulldown);
        buf.put_i64_le(self.frame_duration);
        buf.put_bytes(0, 17 * 4);
        buf.put_i32_le(self.seq_hdr.len().min(150) as i32);
        put_padded(buf, &self.seq_hdr, 150);
    }

    fn get(buf: &mut &[u8]) -> Self {
        buf.advance(8);
        let program_stream_flag = buf.get_i32_le();
        let stream_id = buf.get_i32_le();
        let pid = buf.get_i32_le();
        let pulldown = buf.get_i32_le();
        let frame_duration = buf.get_i64_le();
        buf.advance(17 * 4);
        let used = buf.get_i32_le().max(0) as usize;
        Self {
            program_stream_flag,
            stream_id,
            pid,
            pulldown,
            frame_duration,
            seq_hdr: get_padded(buf, used, 150),
        }
    }
}

/// Audio stream descriptor (`audio_stream_info`, tag `AINF`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioStreamInfo {
    pub program_stream_flag: i32,
    pub stream_id: i32,
    pub substream_id: i32,
    pub pid: i32,
    pub audio_type: i32,
    /// First bytes of the audio stream, at most 84.
    pub audio_hdr: Vec<u8>,
    /// DVD private stream 1 header, at most 8.
    pub private_hdr: Vec<u8>,
}

impl Record for AudioStreamInfo {
    const SIZE: usize = 208;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_slice(b"AINF");
        buf.put_i32_le(Self::SIZE as i32);
        buf.put_i32_le(self.program_stream_flag);
        buf.put_i32_le(self.stream_id);
        buf.put_i32_le(self.substream_id);
        buf.put_i32_le(self.pid);
        buf.put_i32_le(self.audio_type);
        buf.put_bytes(0, 20 * 4);
        buf.put_i32_le(self.audio_hdr.len().min(84) as i32);
        put_padded(buf, &self.audio_hdr, 84);
        buf.put_i32_le(self.private_hdr.len().min(8) as i32);
        put_padded(buf, &self.private_hdr, 8);
    }

    fn get(buf: &mut &[u8]) -> Self {
        buf.advance(8);
        let program_stream_flag = buf.get_i32_le();
        let stream_id = buf.get_i32_le();
        let substream_id = buf.get_i32_le();
        let pid = buf.get_i32_le();
        let audio_type = buf.get_i32_le();
        buf.advance(20 * 4);
        let audio_used = buf.get_i32_le().max(0) as usize;
        let audio_hdr = get_padded(buf, audio_used, 84);
        let private_used = buf.get_i32_le().max(0) as usize;
        let private_hdr = get_padded(buf, private_used, 8);
        Self {
            program_stream_flag,
            stream_id,
            substream_id,
            pid,
            audio_type,
            audio_hdr,
            private_hdr,
        }
    }
}

/// Demuxer chunk flags.
pub mod dmux_flags {
    pub const UNIT_START: u32 = 0x0000_0001;
    pub const UNIT_END: u32 = 0x0000_0004;
    pub const LPCM: u32 = 0x0000_1000;
    pub const DVD_LPCM: u32 = 0x0001_0000;
    pub const HDMV_LPCM: u32 = 0x0002_0000;
    pub const AES3_302M: u32 = 0x0004_0000;
    pub const AES3_331M: u32 = 0x0008_0000;
    pub const AES3_382M: u32 = 0x0010_0000;
    pub const TWOS_LPCM: u32 = 0x0020_0000;
    pub const QT_PCM: u32 = 0x0040_0000;
    pub const AES3_382M_IS_INTERLEAVED: u32 = 0x0100_0000;
}

/// A chunk of elementary stream data delivered by a demuxer (`dmux_chunk_info`).
///
/// The data pointer of the native structure is not carried; the chunk's
/// bytes arrive through the byte operations before the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmuxChunk {
    pub length: i32,
    /// See [`dmux_flags`].
    pub flags: u32,
    pub pack_pos: i64,
    pub file_pos: i64,
    pub pts: i64,
    /// Bytes between the PES header and the payload, at most 32.
    pub info: Vec<u8>,
    pub end_of_stream: bool,
    pub aes3_payload_length: i32,
    pub aes3_channel: i32,
}

impl DmuxChunk {
    pub fn is_unit_start(&self) -> bool {
        self.flags & dmux_flags::UNIT_START != 0
    }

    pub fn is_unit_end(&self) -> bool {
        self.flags & dmux_flags::UNIT_END != 0
    }

    /// Info byte `i`, zero when absent.
    pub fn info_byte(&self, i: usize) -> u8 {
        self.info.get(i).copied().unwrap_or(0)
    }
}

impl Record for DmuxChunk {
    const SIZE: usize = 74;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.length);
        buf.put_u32_le(self.flags);
        buf.put_i64_le(self.pack_pos);
        buf.put_i64_le(self.file_pos);
        buf.put_i64_le(self.pts);
        put_padded(buf, &self.info, 32);
        buf.put_u8(self.info.len().min(32) as u8);
        buf.put_u8(u8::from(self.end_of_stream));
        buf.put_i32_le(self.aes3_payload_length);
        buf.put_i32_le(self.aes3_channel);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let length = buf.get_i32_le();
        let flags = buf.get_u32_le();
        let pack_pos = buf.get_i64_le();
        let file_pos = buf.get_i64_le();
        let pts = buf.get_i64_le();
        let mut info = vec![0u8; 32];
        buf.copy_to_slice(&mut info);
        let info_len = buf.get_u8() as usize;
        info.truncate(info_len.min(32));
        Self {
            length,
            flags,
            pack_pos,
            file_pos,
            pts,
            info,
            end_of_stream: buf.get_u8() != 0,
            aes3_payload_length: buf.get_i32_le(),
            aes3_channel: buf.get_i32_le(),
        }
    }
}

/// Timing of a sample delivered by a demuxer (`sample_info_struct`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleInfo {
    pub rt_start: i64,
    pub rt_stop: i64,
    pub size: i32,
    pub sample_start: bool,
    pub timestamp_valid: bool,
    pub absolute_offset: i64,
    pub sys_clock_valid: bool,
    pub sys_clock: i64,
    pub start_cutoff: u64,
    pub stop_cutoff: u64,
    pub sys_clock_synthesized: bool,
}

impl SampleInfo {
    /// Display duration in 27 MHz ticks, when the timestamps describe one.
    pub fn duration(&self) -> Option<i64> {
        (self.timestamp_valid && self.rt_stop > self.rt_start)
            .then(|| self.rt_stop - self.rt_start)
    }
}

impl Record for SampleInfo {
    const SIZE: usize = 62;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.rt_start);
        buf.put_i64_le(self.rt_stop);
        buf.put_i32_le(self.size);
        buf.put_u8(u8::from(self.sample_start));
        buf.put_u8(u8::from(self.timestamp_valid));
        buf.put_i64_le(self.absolute_offset);
        buf.put_u8(u8::from(self.sys_clock_valid));
        buf.put_i64_le(self.sys_clock);
        buf.put_u64_le(self.start_cutoff);
        buf.put_u64_le(self.stop_cutoff);
        buf.put_u8(u8::from(self.sys_clock_synthesized));
        buf.put_bytes(0, 6);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let info = Self {
            rt_start: buf.get_i64_le(),
            rt_stop: buf.get_i64_le(),
            size: buf.get_i32_le(),
            sample_start: buf.get_u8() != 0,
            timestamp_valid: buf.get_u8() != 0,
            absolute_offset: buf.get_i64_le(),
            sys_clock_valid: buf.get_u8() != 0,
            sys_clock: buf.get_i64_le(),
            start_cutoff: buf.get_u64_le(),
            stop_cutoff: buf.get_u64_le(),
            sys_clock_synthesized: buf.get_u8() != 0,
        };
        buf.advance(6);
        info
    }
}
