//! Packed little-endian wire codec for messages.
//!
//! The wire form is the `(code, payload bytes)` pair used by producers that
//! hand over raw records. Fixed-layout codes must arrive with exactly their
//! record size; opaque codes are limited to [`MAX_PAYLOAD_SIZE`]. Byte blobs
//! whose length is part of their meaning (user data, header dumps, index
//! records, metadata writes, file names, patches) are length checked by the
//! channel that consumes them instead.

use bytes::{Buf, BufMut, BytesMut};
use std::path::PathBuf;

use super::{
    AudioAuInfoXml, AudioAuRecord, AudioAuUnit, AudioSeqInfoXml, AudioStreamInfo, DmuxChunk,
    Message, MessageCode, MetadataOp, NavInfo, OutputSegment, PicStartInfo, Record, SampleInfo,
    SeqStartInfo, VideoAuInfoXml, VideoAuRecord, VideoAuUnit, VideoSeqInfoXml, VideoStreamInfo,
};
use crate::error::{Error, Result};

/// Largest fixed-layout or opaque record accepted on the wire.
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// Longest file name reply accepted.
const MAX_NAME_SIZE: usize = 4096;

/// Seek patch head: position plus patch length.
const SEEK_PATCH_HEAD: usize = 12;

fn expect_len(code: MessageCode, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() != expected {
        return Err(Error::PayloadSize {
            code,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn expect_at_most(code: MessageCode, payload: &[u8], max: usize) -> Result<()> {
    if payload.len() > max {
        return Err(Error::PayloadTooLarge {
            code,
            size: payload.len(),
            max,
        });
    }
    Ok(())
}

fn fixed<R: Record>(code: MessageCode, payload: &[u8]) -> Result<R> {
    expect_len(code, payload, R::SIZE)?;
    let mut buf = payload;
    Ok(R::get(&mut buf))
}

fn u32_of(code: MessageCode, payload: &[u8]) -> Result<u32> {
    expect_len(code, payload, 4)?;
    let mut buf = payload;
    Ok(buf.get_u32_le())
}

fn u64_of(code: MessageCode, payload: &[u8]) -> Result<u64> {
    expect_len(code, payload, 8)?;
    let mut buf = payload;
    Ok(buf.get_u64_le())
}

fn name_of(code: MessageCode, payload: &[u8]) -> Result<Option<PathBuf>> {
    expect_at_most(code, payload, MAX_NAME_SIZE)?;
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    if end == 0 {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(
        String::from_utf8_lossy(&payload[..end]).into_owned(),
    )))
}

impl Message {
    /// Decode a message from its wire form.
    pub fn decode(code: MessageCode, payload: &[u8]) -> Result<Self> {
        let msg = match code {
            MessageCode::FLUSH_BUFFER => {
                expect_len(code, payload, 0)?;
                Self::Flush
            }
            MessageCode::SPLIT_OUTPUT => {
                expect_len(code, payload, 0)?;
                Self::SplitOutput
            }
            MessageCode::STREAM_END_CODE => {
                expect_len(code, payload, 0)?;
                Self::StreamEnd
            }
            MessageCode::FILEWRITE_MODE => {
                expect_len(code, payload, 0)?;
                Self::FileWriteMode
            }
            MessageCode::FILEREAD_MODE => {
                expect_len(code, payload, 0)?;
                Self::FileReadMode
            }
            MessageCode::OUTPUT_SEGMENT_INFO => Self::OutputSegment(fixed(code, payload)?),
            MessageCode::BYTECOUNT_INFO => Self::ByteCount(u64_of(code, payload)?),
            MessageCode::FILESIZE_INFO => Self::FileSize(u64_of(code, payload)?),
            MessageCode::FILENUMBER_INFO => Self::FileNumber(u32_of(code, payload)?),
            MessageCode::FILENAME_INFO => Self::FileName(name_of(code, payload)?),
            MessageCode::FILESEEK_INFO => Self::FileSeek {
                pos: u64_of(code, payload)? as i64,
            },
            MessageCode::BUF_SEEK_INFO => {
                if payload.len() < SEEK_PATCH_HEAD {
                    return Err(Error::PayloadSize {
                        code,
                        expected: SEEK_PATCH_HEAD,
                        actual: payload.len(),
                    });
                }
                let mut buf = payload;
                let pos = buf.get_i64_le();
                let len = buf.get_u32_le() as usize;
                expect_len(code, payload, SEEK_PATCH_HEAD + len)?;
                Self::SeekPatch {
                    pos,
                    bytes: buf.to_vec(),
                }
            }
            MessageCode::VIDEO_AU_CODE => Self::VideoAu(fixed::<VideoAuUnit>(code, payload)?),
            MessageCode::AUDIO_AU_CODE => Self::AudioAu(fixed::<AudioAuUnit>(code, payload)?),
            MessageCode::VIDEO_AU_INFO => {
                Self::VideoAuInfo(fixed::<VideoAuRecord>(code, payload)?)
            }
            MessageCode::AUDIO_AU_INFO => {
                Self::AudioAuInfo(fixed::<AudioAuRecord>(code, payload)?)
            }
            MessageCode::DMUX_CHUNK_INFO => Self::DmuxChunk(fixed::<DmuxChunk>(code, payload)?),
            MessageCode::SAMPLE_INFO => Self::SampleInfo(fixed::<SampleInfo>(code, payload)?),
            MessageCode::VIDEO_STREAM_INFO => {
                Self::VideoStreamInfo(fixed::<VideoStreamInfo>(code, payload)?)
            }
            MessageCode::AUDIO_STREAM_INFO => {
                Self::AudioStreamInfo(fixed::<AudioStreamInfo>(code, payload)?)
            }
            MessageCode::ID_SEQ_START_CODE => Self::SeqStart(fixed::<SeqStartInfo>(code, payload)?),
            MessageCode::ID_PICTURE_START_CODE => {
                Self::PictureStart(fixed::<PicStartInfo>(code, payload)?)
            }
            MessageCode::ID_GOP_START_CODE => {
                expect_at_most(code, payload, MAX_PAYLOAD_SIZE)?;
                Self::GopStart(payload.to_vec())
            }
            MessageCode::VIDEO_SEQ_INFO_XML => {
                Self::VideoSeqInfoXml(fixed::<VideoSeqInfoXml>(code, payload)?)
            }
            MessageCode::AUDIO_SEQ_INFO_XML => {
                Self::AudioSeqInfoXml(fixed::<AudioSeqInfoXml>(code, payload)?)
            }
            MessageCode::AUDIO_AU_INFO_XML => {
                Self::AudioAuInfoXml(fixed::<AudioAuInfoXml>(code, payload)?)
            }
            MessageCode::VIDEO_AU_INFO_XML => {
                if payload.len() < VideoAuInfoXml::HEAD_SIZE {
                    return Err(Error::PayloadSize {
                        code,
                        expected: VideoAuInfoXml::HEAD_SIZE,
                        actual: payload.len(),
                    });
                }
                let mut buf = payload;
                let (mut info, hdr_len) = VideoAuInfoXml::get_head(&mut buf);
                if hdr_len > VideoAuInfoXml::MAX_HDR {
                    return Err(Error::PayloadTooLarge {
                        code,
                        size: hdr_len,
                        max: VideoAuInfoXml::MAX_HDR,
                    });
                }
                expect_len(code, payload, VideoAuInfoXml::HEAD_SIZE + hdr_len)?;
                info.hdr = buf.to_vec();
                Self::VideoAuInfoXml(info)
            }
            MessageCode::SESSION_USER_DATA => Self::SessionUserData(payload.to_vec()),
            MessageCode::SESSION_USER_DATA_AUDIO => Self::SessionUserDataAudio(payload.to_vec()),
            MessageCode::DVD_RLBN_INFO => Self::DvdRlbnInfo(fixed::<NavInfo>(code, payload)?),
            MessageCode::DVD_GET_LAST_RLBN => Self::DvdGetLastRlbn(u32_of(code, payload)?),
            MessageCode::DVD_GET_RLBN_COUNT => Self::DvdGetRlbnCount(u32_of(code, payload)?),
            MessageCode::INDEX_CONTAINER_INFO => Self::IndexContainer(payload.to_vec()),
            MessageCode::INDEX_STREAM_INFO => Self::IndexStream(payload.to_vec()),
            MessageCode::INDEX_AU_INFO => Self::IndexAu(payload.to_vec()),
            MessageCode::METADATA_OPEN_WRITE => Self::Metadata(MetadataOp::OpenWrite),
            MessageCode::METADATA_OPEN_READ => Self::Metadata(MetadataOp::OpenRead),
            MessageCode::METADATA_CLOSE => Self::Metadata(MetadataOp::Close),
            MessageCode::METADATA_WRITE => Self::Metadata(MetadataOp::Write(payload.to_vec())),
            MessageCode::METADATA_READ => Self::Metadata(MetadataOp::Read(vec![0; payload.len()])),
            MessageCode::METADATA_REWIND => Self::Metadata(MetadataOp::Rewind),
            MessageCode::METADATA_DESTROY => Self::Metadata(MetadataOp::Destroy),
            MessageCode::METADATA_DESTROY_ALL => Self::Metadata(MetadataOp::DestroyAll),
            MessageCode::METADATA_GET_SIZE => {
                Self::Metadata(MetadataOp::GetSize(u32_of(code, payload)?))
            }
            _ => {
                expect_at_most(code, payload, MAX_PAYLOAD_SIZE)?;
                Self::Raw {
                    code,
                    payload: payload.to_vec(),
                }
            }
        };
        Ok(msg)
    }

    /// Encode the message payload in its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            Self::Flush
            | Self::SplitOutput
            | Self::StreamEnd
            | Self::FileWriteMode
            | Self::FileReadMode => {}
            Self::OutputSegment(r) => r.put(&mut buf),
            Self::ByteCount(v) | Self::FileSize(v) => buf.put_u64_le(*v),
            Self::FileNumber(v) | Self::DvdGetLastRlbn(v) | Self::DvdGetRlbnCount(v) => {
                buf.put_u32_le(*v)
            }
            Self::FileName(name) => {
                if let Some(name) = name {
                    buf.put_slice(name.to_string_lossy().as_bytes());
                }
            }
            Self::FileSeek { pos } => buf.put_i64_le(*pos),
            Self::SeekPatch { pos, bytes } => {
                buf.put_i64_le(*pos);
                buf.put_u32_le(bytes.len() as u32);
                buf.put_slice(bytes);
            }
            Self::VideoAu(r) => r.put(&mut buf),
            Self::AudioAu(r) => r.put(&mut buf),
            Self::VideoAuInfo(r) => r.put(&mut buf),
            Self::AudioAuInfo(r) => r.put(&mut buf),
            Self::DmuxChunk(r) => r.put(&mut buf),
            Self::SampleInfo(r) => r.put(&mut buf),
            Self::VideoStreamInfo(r) => r.put(&mut buf),
            Self::AudioStreamInfo(r) => r.put(&mut buf),
            Self::SeqStart(r) => r.put(&mut buf),
            Self::PictureStart(r) => r.put(&mut buf),
            Self::VideoSeqInfoXml(r) => r.put(&mut buf),
            Self::VideoAuInfoXml(r) => r.put(&mut buf),
            Self::AudioSeqInfoXml(r) => r.put(&mut buf),
            Self::AudioAuInfoXml(r) => r.put(&mut buf),
            Self::DvdRlbnInfo(r) => r.put(&mut buf),
            Self::GopStart(bytes)
            | Self::SessionUserData(bytes)
            | Self::SessionUserDataAudio(bytes)
            | Self::IndexContainer(bytes)
            | Self::IndexStream(bytes)
            | Self::IndexAu(bytes) => buf.put_slice(bytes),
            Self::Metadata(op) => match op {
                MetadataOp::Write(bytes) | MetadataOp::Read(bytes) => buf.put_slice(bytes),
                MetadataOp::GetSize(v) => buf.put_u32_le(*v),
                _ => {}
            },
            Self::Raw { payload, .. } => buf.put_slice(payload),
        }
        buf.to_vec()
    }

    /// Copy a query answer back into the caller's wire payload.
    ///
    /// Non-query messages leave the payload untouched.
    pub fn write_reply(&self, payload: &mut [u8]) -> Result<()> {
        let code = self.code();
        match self {
            Self::ByteCount(v) | Self::FileSize(v) => {
                expect_len(code, payload, 8)?;
                payload.copy_from_slice(&v.to_le_bytes());
            }
            Self::FileNumber(v)
            | Self::DvdGetLastRlbn(v)
            | Self::DvdGetRlbnCount(v)
            | Self::Metadata(MetadataOp::GetSize(v)) => {
                expect_len(code, payload, 4)?;
                payload.copy_from_slice(&v.to_le_bytes());
            }
            Self::FileName(name) => {
                let text = name
                    .as_ref()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let bytes = text.as_bytes();
                if bytes.len() + 1 > payload.len() {
                    return Err(Error::PayloadSize {
                        code,
                        expected: bytes.len() + 1,
                        actual: payload.len(),
                    });
                }
                payload[..bytes.len()].copy_from_slice(bytes);
                payload[bytes.len()] = 0;
            }
            Self::Metadata(MetadataOp::Read(data)) => {
                expect_len(code, payload, data.len())?;
                payload.copy_from_slice(data);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_decode_rejects_size_mismatch() {
        let err = Message::decode(MessageCode::BYTECOUNT_INFO, &[0; 4]).unwrap_err();
        assert_matches!(
            err,
            Error::PayloadSize {
                expected: 8,
                actual: 4,
                ..
            }
        );

        let err = Message::decode(MessageCode::VIDEO_AU_CODE, &[0; 31]).unwrap_err();
        assert_matches!(err, Error::PayloadSize { expected: 32, .. });
    }

    #[test]
    fn test_decode_rejects_oversized_opaque_payload() {
        let err = Message::decode(MessageCode::DVD_SET_HLI_INFO, &[0; 257]).unwrap_err();
        assert_matches!(err, Error::PayloadTooLarge { size: 257, max: 256, .. });

        let msg = Message::decode(MessageCode::DVD_SET_HLI_INFO, &[7; 256]).unwrap();
        assert_matches!(msg, Message::Raw { payload, .. } if payload.len() == 256);
    }

    #[test]
    fn test_decode_sample_info() {
        let info = SampleInfo {
            rt_start: 900_000,
            rt_stop: 2_700_000,
            timestamp_valid: true,
            ..Default::default()
        };
        let msg = Message::decode(MessageCode::SAMPLE_INFO, &info.to_bytes()).unwrap();
        assert_eq!(msg, Message::SampleInfo(info));
        assert_matches!(
            Message::decode(MessageCode::SAMPLE_INFO, &[0; 12]),
            Err(Error::PayloadSize { expected: 62, actual: 12, .. })
        );
    }

    #[test]
    fn test_decode_video_au() {
        let unit = VideoAuUnit {
            length: 4096,
            pic_type: 1,
            flags: 3,
            pts: 27_000_000,
            ..Default::default()
        };
        let msg = Message::decode(MessageCode::VIDEO_AU_CODE, &unit.to_bytes()).unwrap();
        assert_eq!(msg, Message::VideoAu(unit));
    }

    #[test]
    fn test_video_au_info_xml_carries_header() {
        let info = VideoAuInfoXml {
            file_pos: 2048,
            flags: 1,
            length: 9000,
            repeat_first_field: 1,
            pts: 900,
            hdr: vec![0, 0, 1, 0xB3, 0x14, 0x00],
        };
        let wire = Message::VideoAuInfoXml(info.clone()).encode();
        assert_eq!(wire.len(), VideoAuInfoXml::HEAD_SIZE + 6);
        let back = Message::decode(MessageCode::VIDEO_AU_INFO_XML, &wire).unwrap();
        assert_eq!(back, Message::VideoAuInfoXml(info));

        let err = Message::decode(MessageCode::VIDEO_AU_INFO_XML, &wire[..wire.len() - 1])
            .unwrap_err();
        assert_matches!(err, Error::PayloadSize { .. });
    }

    #[test]
    fn test_seek_patch_wire() {
        let msg = Message::SeekPatch {
            pos: 4,
            bytes: vec![1, 2, 3, 4],
        };
        let wire = msg.encode();
        assert_eq!(wire.len(), 16);
        assert_eq!(Message::decode(MessageCode::BUF_SEEK_INFO, &wire).unwrap(), msg);
    }

    #[test]
    fn test_write_reply() {
        let mut payload = [0u8; 8];
        Message::ByteCount(1000).write_reply(&mut payload).unwrap();
        assert_eq!(u64::from_le_bytes(payload), 1000);

        let mut name = [0xFFu8; 16];
        Message::FileName(Some(PathBuf::from("out_001.ts")))
            .write_reply(&mut name)
            .unwrap();
        assert_eq!(&name[..11], b"out_001.ts\0");

        let mut small = [0u8; 4];
        assert!(Message::FileName(Some(PathBuf::from("out_001.ts")))
            .write_reply(&mut small)
            .is_err());
    }

    #[test]
    fn test_metadata_read_allocates_reply_buffer() {
        let msg = Message::decode(MessageCode::METADATA_READ, &[0; 10]).unwrap();
        assert_matches!(msg, Message::Metadata(MetadataOp::Read(buf)) if buf.len() == 10);
    }
}
