use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bufstream")]
#[command(author, version, about = "Drive buffered byte channels and their filters from the command line")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a file into numbered segments with a segment list and playlist
    Segment {
        /// File to split
        #[arg(required = true)]
        input: PathBuf,

        /// Output name; segments are written as NAME_000.EXT, NAME_001.EXT, ...
        #[arg(required = true)]
        output: PathBuf,

        /// Bytes per segment (overrides config)
        #[arg(long)]
        segment_size: Option<u64>,

        /// Seconds announced per full segment (overrides config)
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Wrap raw QuickTime PCM samples in a WAV file
    Wav {
        /// Raw PCM input
        #[arg(required = true)]
        input: PathBuf,

        /// WAV file to write
        #[arg(required = true)]
        output: PathBuf,

        /// Sample layout of the input
        #[arg(long, value_enum)]
        format: PcmInput,

        /// Bits per sample
        #[arg(long, default_value = "16")]
        bits: u8,

        /// Channel count
        #[arg(long, default_value = "2")]
        channels: u8,

        /// Sample rate; `twos` input only knows 48000 and 96000
        #[arg(long, default_value = "48000")]
        rate: u32,

        /// Samples are little-endian
        #[arg(long)]
        little_endian: bool,
    },

    /// Unwrap a WAV file into a tagged DVD, HDMV or AES3 PCM stream
    Unwav {
        /// WAV file to read
        #[arg(required = true)]
        input: PathBuf,

        /// Framed PCM stream to write
        #[arg(required = true)]
        output: PathBuf,

        /// Output framing
        #[arg(long, value_enum)]
        framing: PcmOutput,

        /// Video frame rate code for AES3 frame sizes (0 for 29.97 Hz)
        #[arg(long, default_value = "0")]
        frame_rate_code: u8,
    },

    /// Copy an MPEG video elementary stream and write its XML index
    Vxml {
        /// Elementary stream to index
        #[arg(required = true)]
        input: PathBuf,

        /// Copy of the stream
        #[arg(required = true)]
        output: PathBuf,

        /// XML index path (defaults to OUTPUT with an .xml extension)
        #[arg(long)]
        xml: Option<PathBuf>,

        /// Store picture headers as hex instead of base64
        #[arg(long)]
        hex: bool,
    },

    /// Copy a file through the read and temp-file channels
    Copy {
        #[arg(required = true)]
        input: PathBuf,

        #[arg(required = true)]
        output: PathBuf,
    },

    /// List the message codes and their families
    Codes {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PcmInput {
    /// QuickTime `twos`: signed big-endian integers
    Twos,
    /// QuickTime `lpcm` with an explicit sample rate
    Qt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PcmOutput {
    /// DVD LPCM, big-endian 16 bit
    Dvd,
    /// Blu-ray LPCM with a 4 byte header per frame
    Hdmv,
    /// SMPTE 302M
    #[value(name = "aes3-302m")]
    Aes302m,
    /// SMPTE 331M
    #[value(name = "aes3-331m")]
    Aes331m,
    /// SMPTE 382M
    #[value(name = "aes3-382m")]
    Aes382m,
}
