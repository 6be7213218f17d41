//! The flat 32-bit message code namespace.
//!
//! Codes are grouped into families by convention only; nothing in the value
//! itself marks the family, so [`MessageCode::family`] classifies them from
//! the table below.

use std::fmt;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Broad grouping of message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum CodeFamily {
    /// Per access unit records (video, audio, subpicture, demuxed chunks).
    AccessUnit,
    /// Codec parameters sent once near the start of a stream.
    StreamDescriptor,
    /// Records consumed by the XML index filters.
    XmlIndex,
    /// Records consumed by the MCIDX index writer.
    IndexWriter,
    /// Encoder and muxer running counters.
    Statistics,
    /// File identity and position queries answered by terminal adapters.
    FileQuery,
    /// Flush, split, segment, end of stream and access gating.
    Control,
    /// DVD and VCD navigation records.
    Navigation,
    /// Transport stream flavor selection.
    Transport,
    /// MPEG-2 video start codes forwarded by encoders.
    StartCode,
    /// Opaque user data attached to a session.
    UserData,
    /// Metadata sidecar store commands.
    MetadataStore,
    /// Not in the table.
    Unknown,
}

impl fmt::Display for CodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccessUnit => "access-unit",
            Self::StreamDescriptor => "stream-descriptor",
            Self::XmlIndex => "xml-index",
            Self::IndexWriter => "index-writer",
            Self::Statistics => "statistics",
            Self::FileQuery => "file-query",
            Self::Control => "control",
            Self::Navigation => "navigation",
            Self::Transport => "transport",
            Self::StartCode => "start-code",
            Self::UserData => "user-data",
            Self::MetadataStore => "metadata-store",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A 32-bit message code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(transparent))]
pub struct MessageCode(pub u32);

/// Generate the code constants together with their name and family table.
macro_rules! message_codes {
    ($($family:ident { $($name:ident = $value:expr),+ $(,)? })+) => {
        impl MessageCode {
            $($(
                pub const $name: Self = Self($value);
            )+)+

            /// Every known code with its name and family, in table order.
            pub const ALL: &'static [(Self, &'static str, CodeFamily)] = &[
                $($(
                    (Self($value), stringify!($name), CodeFamily::$family),
                )+)+
            ];
        }
    };
}

message_codes! {
    AccessUnit {
        UNSPECIFIED_AU = 0x000F_0000,
        VIDEO_AU_CODE = 0x000F_0001,
        AUDIO_AU_CODE = 0x000F_0002,
        SP_AU_CODE = 0x000F_0004,
        VIDEO_AU_START = 0x000F_0008,
        VIDEO_AU_INFO = 0x000F_0200,
        AUDIO_AU_INFO = 0x000F_0800,
        DMUX_CHUNK_INFO = 0x000D_1000,
        DMUX_CHUNK_INFO_EX = 0x000D_1001,
    }
    StreamDescriptor {
        VIDEO_STREAM_INFO = 0x000F_0100,
        AUDIO_STREAM_INFO = 0x000F_0400,
        AUDIO_STREAM_INFO_EX = 0x000F_0401,
        WMA_STREAM_INFO = 0x1F00_0000,
        WMV_STREAM_INFO = 0x1F00_0010,
        DD_STREAM_INFO = 0x1F00_0100,
        DD_METADATA_INFO = 0x1F00_0101,
        AAC_SYNC_FRAME_INFO = 0x1F00_0110,
        AVC_NALU_STREAM_INFO = 0x1F00_1000,
        SEI_PICTURE_TIMING_INFO = 0x1F00_1001,
        SEI_BUFFERING_PERIOD_INFO = 0x1F00_1002,
        DMFA_STREAM_INFO = 0x2F00_0000,
        DMFV_STREAM_INFO = 0x2F00_0001,
        MP3_UNLOCK_INFO = 0x2F00_0002,
        STREAM_FORMAT_INFO = 0xF000_0000,
    }
    XmlIndex {
        VIDEO_SEQ_INFO_XML = 0x000F_0810,
        VIDEO_AU_INFO_XML = 0x000F_0811,
        AUDIO_SEQ_INFO_XML = 0x000F_0812,
        AUDIO_AU_INFO_XML = 0x000F_0813,
        METADATA_INFO_XML = 0x000F_0817,
    }
    IndexWriter {
        INDEX_CONTAINER_INFO = 0x000F_0814,
        INDEX_STREAM_INFO = 0x000F_0815,
        INDEX_AU_INFO = 0x000F_0816,
    }
    Statistics {
        RATECONTROL_STAT = 0x000F_0009,
        TIME_STAMP_INFO = 0x0F00_0000,
        STATISTIC_INFO = 0x0F00_0001,
        CPB_FULLNESS = 0x0F00_0002,
        DELAYS_STAT = 0x0F00_0003,
        TIMECODE_BREAK = 0x0F00_0004,
        TIMECODE_INFO = 0x0F00_0005,
        SAMPLE_INFO = 0x0F00_1000,
        MUX_STATISTIC_INFO = 0x0F00_1001,
        SUB_SAMPLE_INFO = 0x0F00_1002,
        MUX_IN_STATISTIC_INFO = 0x0F00_1003,
    }
    FileQuery {
        BYTECOUNT_INFO = 0x000F_0010,
        FILENUMBER_INFO = 0x00F0_0001,
        FILENAME_INFO = 0x00F0_0002,
        SWAP_ENDIAN = 0x00F0_0004,
        FILESIZE_INFO = 0x00F0_0008,
        FILESEEK_INFO = 0x00F0_0010,
        FILEWRITE_MODE = 0x00F0_0020,
        FILEREAD_MODE = 0x00F0_0040,
        BUF_SEEK_INFO = 0x000C_0011,
    }
    Control {
        FLUSH_BUFFER = 0x000F_0020,
        SPLIT_OUTPUT = 0x000F_0040,
        OUTPUT_SEGMENT_INFO = 0x000F_0041,
        STREAM_END_CODE = 0x000F_0080,
        STREAM_DISCONTINUITY_CODE = 0x000F_0081,
        ACCESS_INFO = 0x3000_0000,
        AUDIO_SYNC_CODE = 0xFFF0_0000,
    }
    Navigation {
        DVD_DO_NAV_INFO = 0x000F_1000,
        DVD_SECTOR_NUM = 0x000F_2000,
        DVD_PTM_TIME = 0x000F_4000,
        DVD_ABORT_NAV_INFO = 0x000F_8000,
        DVD_FIXUP_LAST_VOBU = 0x000E_0000,
        DVD_SETUP_VOBIDN = 0x000E_0001,
        DVD_RLBN_INFO = 0x000E_0002,
        DVD_SEQ_END_CODE = 0x000E_0004,
        DVD_GET_LAST_RLBN = 0x000E_0008,
        DVD_GET_RLBN_COUNT = 0x000E_0009,
        DVD_SET_HLI_INFO = 0x000E_0010,
        DVD_DO_HLI_PTM_TIME = 0x000E_0020,
        DVD_SETUP_CELLIDN = 0x000E_0040,
        DVD_CELL_CHANGE = 0x000E_0080,
        DVD_DO_ASYNCI_INFO = 0x000E_0101,
        DVD_ASYNCI_INFO = 0x000E_0102,
        DVD_DO_SPSYNCI_INFO = 0x000E_0201,
        DVD_SPSYNCI_INFO = 0x000E_0202,
        DVD_FIXUP_SYNCI = 0x000E_0203,
        VCD_UPDATE_VBV = 0x000D_0000,
    }
    Transport {
        TS_MICROMV = 0x000C_0001,
        TS_DVB = 0x000C_0002,
        TS_DVHS = 0x000C_0004,
    }
    StartCode {
        ID_PICTURE_START_CODE = 0x0000_0100,
        ID_SLICE_MIN_START = 0x0000_0101,
        ID_USER_START_CODE = 0x0000_01B2,
        ID_SEQ_START_CODE = 0x0000_01B3,
        ID_EXT_START_CODE = 0x0000_01B5,
        ID_SEQ_END_CODE = 0x0000_01B7,
        ID_GOP_START_CODE = 0x0000_01B8,
        ID_ISO_END_CODE = 0x0000_01B9,
        ID_PACK_START_CODE = 0x0000_01BA,
        ID_SYSTEM_START_CODE = 0x0000_01BB,
        ID_PREFIX_START_CODE = 0x0000_01FF,
    }
    UserData {
        AUXINFO_USER_DATA = 0x0F00_1004,
        SESSION_USER_DATA = 0x0020_0001,
        SESSION_USER_DATA_AUDIO = 0x0020_0002,
    }
    MetadataStore {
        METADATA_OPEN_WRITE = 0x0010_0001,
        METADATA_OPEN_READ = 0x0010_0002,
        METADATA_CLOSE = 0x0010_0003,
        METADATA_WRITE = 0x0010_0004,
        METADATA_READ = 0x0010_0005,
        METADATA_REWIND = 0x0010_0006,
        METADATA_DESTROY = 0x0010_0007,
        METADATA_DESTROY_ALL = 0x0010_0008,
        METADATA_GET_SIZE = 0x0010_0009,
    }
}

impl MessageCode {
    /// Raw numeric value.
    pub fn value(self) -> u32 {
        self.0
    }

    fn lookup(self) -> Option<&'static (Self, &'static str, CodeFamily)> {
        Self::ALL.iter().find(|(code, _, _)| *code == self)
    }

    /// Symbolic name, if the code is in the table.
    pub fn name(self) -> Option<&'static str> {
        self.lookup().map(|(_, name, _)| *name)
    }

    /// Family the code belongs to.
    pub fn family(self) -> CodeFamily {
        self.lookup()
            .map(|(_, _, family)| *family)
            .unwrap_or(CodeFamily::Unknown)
    }

    /// Look up a code by its symbolic name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
            .map(|(code, _, _)| *code)
    }
}

impl From<u32> for MessageCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

/// Video access unit flag: a sequence header precedes the picture.
pub const SEQHDR_FLAG: u16 = 0x01;
/// Video access unit flag: a GOP header precedes the picture.
pub const GOPHDR_FLAG: u16 = 0x02;

/// Picture coding types.
pub const I_TYPE: u16 = 1;
pub const P_TYPE: u16 = 2;
pub const B_TYPE: u16 = 3;

/// MPEG-2 frame rate codes.
pub const FRAMERATE_FORBIDDEN: u32 = 0;
pub const FRAMERATE23: u32 = 1;
pub const FRAMERATE24: u32 = 2;
pub const FRAMERATE25: u32 = 3;
pub const FRAMERATE29: u32 = 4;
pub const FRAMERATE30: u32 = 5;
pub const FRAMERATE50: u32 = 6;
pub const FRAMERATE59: u32 = 7;
pub const FRAMERATE60: u32 = 8;

/// Pulldown codes.
pub const PULLDOWN_NONE: u32 = 0;
pub const PULLDOWN_23: u32 = 1;
pub const PULLDOWN_32: u32 = 2;
pub const PULLDOWN_AUTO: u32 = 3;
pub const PULLDOWN_23_PROGSEQ: u32 = 4;
pub const PULLDOWN_32_PROGSEQ: u32 = 5;
pub const PULLDOWN_22: u32 = 6;
pub const PULLDOWN_22_PROGSEQ: u32 = 7;

/// 27 MHz clock ticks per frame, indexed by frame rate code.
pub const CLOCKS_PER_FRAME: [i64; 9] = [
    0,         // forbidden
    1_126_125, // 23.976
    1_125_000, // 24
    1_080_000, // 25
    900_900,   // 29.97
    900_000,   // 30
    540_000,   // 50
    450_450,   // 59.94
    450_000,   // 60
];

/// 27 MHz ticks per frame for a frame rate code, zero when the code is unknown.
pub fn clocks_per_frame(frame_rate_code: u32) -> i64 {
    CLOCKS_PER_FRAME
        .get(frame_rate_code as usize)
        .copied()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let mut seen = HashSet::new();
        for (code, name, _) in MessageCode::ALL {
            assert!(seen.insert(code.0), "duplicate value for {name}");
        }
    }

    #[test]
    fn test_family_lookup() {
        assert_eq!(MessageCode::VIDEO_AU_CODE.family(), CodeFamily::AccessUnit);
        assert_eq!(MessageCode::FILENAME_INFO.family(), CodeFamily::FileQuery);
        assert_eq!(MessageCode::DVD_RLBN_INFO.family(), CodeFamily::Navigation);
        assert_eq!(MessageCode::SPLIT_OUTPUT.family(), CodeFamily::Control);
        assert_eq!(MessageCode(0xDEAD_BEEF).family(), CodeFamily::Unknown);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            MessageCode::FLUSH_BUFFER.to_string(),
            "FLUSH_BUFFER (0x000F0020)"
        );
        assert_eq!(MessageCode(0x1234).to_string(), "0x00001234");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            MessageCode::from_name("split_output"),
            Some(MessageCode::SPLIT_OUTPUT)
        );
        assert_eq!(MessageCode::from_name("nope"), None);
    }

    #[test]
    fn test_clocks_per_frame() {
        assert_eq!(clocks_per_frame(FRAMERATE29), 900_900);
        assert_eq!(clocks_per_frame(42), 0);
        assert_eq!(clocks_per_frame(FRAMERATE_FORBIDDEN), 0);
    }
}
