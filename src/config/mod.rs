mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./bufstream.toml", "~/.config/bufstream/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.channel.chunk_size == 0 {
        anyhow::bail!("Channel chunk size cannot be 0");
    }

    if config.segment.bytes_per_segment == 0 {
        anyhow::bail!("Segment size cannot be 0");
    }

    if config.wave.pcm_buffer_size < 2 {
        anyhow::bail!("PCM buffer size must hold at least two bytes");
    }

    if config.segment.segment_duration_secs == 0 {
        tracing::warn!("Segment duration is 0, playlist entries will carry no duration");
    }

    Ok(())
}
