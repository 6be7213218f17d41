//! Side-channel messages exchanged between pipeline stages.
//!
//! A message travels with an `offset` argument whose meaning depends on the
//! code: a seek origin for [`Message::FileSeek`], a slot number for
//! [`Message::Metadata`], a stream index for the index writer records, and
//! zero everywhere else.
//!
//! Query variants carry an output field that the channel owning the state
//! fills in; everything else is input only.

mod codes;
mod records;
mod wire;

pub use codes::*;
pub use records::*;
pub use wire::MAX_PAYLOAD_SIZE;

use std::path::PathBuf;

/// A typed side-channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Flush buffered data to the backing resource.
    Flush,
    /// Close the current output file and continue in a new one.
    SplitOutput,
    /// A finished output segment.
    OutputSegment(OutputSegment),
    /// No more data will follow.
    StreamEnd,

    /// Query: bytes written (or read) so far.
    ByteCount(u64),
    /// Query: size of the backing file.
    FileSize(u64),
    /// Query: sequence number of the current output file.
    FileNumber(u32),
    /// Query: path of the current output file.
    FileName(Option<PathBuf>),

    /// Reposition the file. The origin travels in the offset argument.
    FileSeek { pos: i64 },
    /// Switch a read/write file channel to writing.
    FileWriteMode,
    /// Switch a read/write file channel to reading.
    FileReadMode,
    /// Write `bytes` at absolute position `pos` and return to the current position.
    SeekPatch { pos: i64, bytes: Vec<u8> },

    VideoAu(VideoAuUnit),
    AudioAu(AudioAuUnit),
    VideoAuInfo(VideoAuRecord),
    AudioAuInfo(AudioAuRecord),
    DmuxChunk(DmuxChunk),
    SampleInfo(SampleInfo),

    VideoStreamInfo(VideoStreamInfo),
    AudioStreamInfo(AudioStreamInfo),
    SeqStart(SeqStartInfo),
    /// GOP start code; the payload is passed along untouched.
    GopStart(Vec<u8>),
    PictureStart(PicStartInfo),

    VideoSeqInfoXml(VideoSeqInfoXml),
    VideoAuInfoXml(VideoAuInfoXml),
    AudioSeqInfoXml(AudioSeqInfoXml),
    AudioAuInfoXml(AudioAuInfoXml),
    SessionUserData(Vec<u8>),
    SessionUserDataAudio(Vec<u8>),

    DvdRlbnInfo(NavInfo),
    /// Query: `nv_sa` of the last navigation pack seen.
    DvdGetLastRlbn(u32),
    /// Query: number of navigation packs seen.
    DvdGetRlbnCount(u32),

    /// Index container header followed by nothing or the media name.
    IndexContainer(Vec<u8>),
    /// Index stream header, format blob and decoder config for one stream.
    IndexStream(Vec<u8>),
    /// One access unit entry for one stream.
    IndexAu(Vec<u8>),

    /// Metadata sidecar store command; the slot travels in the offset argument.
    Metadata(MetadataOp),

    /// Any code without a typed variant, carried opaquely.
    Raw { code: MessageCode, payload: Vec<u8> },
}

/// Commands understood by the metadata sidecar store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOp {
    OpenWrite,
    OpenRead,
    Close,
    Write(Vec<u8>),
    /// Fill the whole buffer from the slot.
    Read(Vec<u8>),
    Rewind,
    Destroy,
    DestroyAll,
    /// Query: size of the slot's file.
    GetSize(u32),
}

impl MetadataOp {
    pub fn code(&self) -> MessageCode {
        match self {
            Self::OpenWrite => MessageCode::METADATA_OPEN_WRITE,
            Self::OpenRead => MessageCode::METADATA_OPEN_READ,
            Self::Close => MessageCode::METADATA_CLOSE,
            Self::Write(_) => MessageCode::METADATA_WRITE,
            Self::Read(_) => MessageCode::METADATA_READ,
            Self::Rewind => MessageCode::METADATA_REWIND,
            Self::Destroy => MessageCode::METADATA_DESTROY,
            Self::DestroyAll => MessageCode::METADATA_DESTROY_ALL,
            Self::GetSize(_) => MessageCode::METADATA_GET_SIZE,
        }
    }
}

impl Message {
    /// Create a byte count query.
    pub fn byte_count() -> Self {
        Self::ByteCount(0)
    }

    /// Create a file name query.
    pub fn file_name() -> Self {
        Self::FileName(None)
    }

    /// Create a file number query.
    pub fn file_number() -> Self {
        Self::FileNumber(0)
    }

    /// Create an opaque message.
    pub fn raw(code: MessageCode, payload: impl Into<Vec<u8>>) -> Self {
        Self::Raw {
            code,
            payload: payload.into(),
        }
    }

    /// The wire code for this message.
    pub fn code(&self) -> MessageCode {
        match self {
            Self::Flush => MessageCode::FLUSH_BUFFER,
            Self::SplitOutput => MessageCode::SPLIT_OUTPUT,
            Self::OutputSegment(_) => MessageCode::OUTPUT_SEGMENT_INFO,
            Self::StreamEnd => MessageCode::STREAM_END_CODE,
            Self::ByteCount(_) => MessageCode::BYTECOUNT_INFO,
            Self::FileSize(_) => MessageCode::FILESIZE_INFO,
            Self::FileNumber(_) => MessageCode::FILENUMBER_INFO,
            Self::FileName(_) => MessageCode::FILENAME_INFO,
            Self::FileSeek { .. } => MessageCode::FILESEEK_INFO,
            Self::FileWriteMode => MessageCode::FILEWRITE_MODE,
            Self::FileReadMode => MessageCode::FILEREAD_MODE,
            Self::SeekPatch { .. } => MessageCode::BUF_SEEK_INFO,
            Self::VideoAu(_) => MessageCode::VIDEO_AU_CODE,
            Self::AudioAu(_) => MessageCode::AUDIO_AU_CODE,
            Self::VideoAuInfo(_) => MessageCode::VIDEO_AU_INFO,
            Self::AudioAuInfo(_) => MessageCode::AUDIO_AU_INFO,
            Self::DmuxChunk(_) => MessageCode::DMUX_CHUNK_INFO,
            Self::SampleInfo(_) => MessageCode::SAMPLE_INFO,
            Self::VideoStreamInfo(_) => MessageCode::VIDEO_STREAM_INFO,
            Self::AudioStreamInfo(_) => MessageCode::AUDIO_STREAM_INFO,
            Self::SeqStart(_) => MessageCode::ID_SEQ_START_CODE,
            Self::GopStart(_) => MessageCode::ID_GOP_START_CODE,
            Self::PictureStart(_) => MessageCode::ID_PICTURE_START_CODE,
            Self::VideoSeqInfoXml(_) => MessageCode::VIDEO_SEQ_INFO_XML,
            Self::VideoAuInfoXml(_) => MessageCode::VIDEO_AU_INFO_XML,
            Self::AudioSeqInfoXml(_) => MessageCode::AUDIO_SEQ_INFO_XML,
            Self::AudioAuInfoXml(_) => MessageCode::AUDIO_AU_INFO_XML,
            Self::SessionUserData(_) => MessageCode::SESSION_USER_DATA,
            Self::SessionUserDataAudio(_) => MessageCode::SESSION_USER_DATA_AUDIO,
            Self::DvdRlbnInfo(_) => MessageCode::DVD_RLBN_INFO,
            Self::DvdGetLastRlbn(_) => MessageCode::DVD_GET_LAST_RLBN,
            Self::DvdGetRlbnCount(_) => MessageCode::DVD_GET_RLBN_COUNT,
            Self::IndexContainer(_) => MessageCode::INDEX_CONTAINER_INFO,
            Self::IndexStream(_) => MessageCode::INDEX_STREAM_INFO,
            Self::IndexAu(_) => MessageCode::INDEX_AU_INFO,
            Self::Metadata(op) => op.code(),
            Self::Raw { code, .. } => *code,
        }
    }

    /// True for messages whose output field is filled in by the receiver.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::ByteCount(_)
                | Self::FileSize(_)
                | Self::FileNumber(_)
                | Self::FileName(_)
                | Self::DvdGetLastRlbn(_)
                | Self::DvdGetRlbnCount(_)
                | Self::Metadata(MetadataOp::Read(_) | MetadataOp::GetSize(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_for_variants() {
        assert_eq!(Message::Flush.code(), MessageCode::FLUSH_BUFFER);
        assert_eq!(
            Message::Metadata(MetadataOp::GetSize(0)).code(),
            MessageCode::METADATA_GET_SIZE
        );
        assert_eq!(
            Message::raw(MessageCode::DVD_SET_HLI_INFO, vec![1, 2]).code(),
            MessageCode::DVD_SET_HLI_INFO
        );
    }

    #[test]
    fn test_queries() {
        assert!(Message::byte_count().is_query());
        assert!(Message::file_name().is_query());
        assert!(!Message::SplitOutput.is_query());
    }
}
