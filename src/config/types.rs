use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub segment: SegmentConfig,

    #[serde(default)]
    pub wave: WaveConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Largest single lease on file-backed channels
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    65536
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SegmentConfig {
    /// Bytes written before the output is split
    #[serde(default = "default_bytes_per_segment")]
    pub bytes_per_segment: u64,

    /// Duration announced for each full segment
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: u64,

    /// Prepended to every segment name in the playlist
    #[serde(default)]
    pub uri_prefix: String,

    /// Write a `.mzl` segment list next to the first segment
    #[serde(default = "default_true")]
    pub write_mzl: bool,

    /// Write an `.m3u8` playlist next to the output
    #[serde(default = "default_true")]
    pub write_playlist: bool,
}

fn default_bytes_per_segment() -> u64 {
    4 * 1024 * 1024
}

fn default_segment_duration() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            bytes_per_segment: default_bytes_per_segment(),
            segment_duration_secs: default_segment_duration(),
            uri_prefix: String::new(),
            write_mzl: true,
            write_playlist: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WaveConfig {
    /// Input buffer of the WAV writer; one unit must fit in half of it
    #[serde(default = "default_pcm_buffer_size")]
    pub pcm_buffer_size: usize,
}

fn default_pcm_buffer_size() -> usize {
    1024 * 1024
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            pcm_buffer_size: default_pcm_buffer_size(),
        }
    }
}
