use anyhow::{Context, Result};
use bufstream_core::{write_all, ByteChannel, TmpFileChannel};
use std::path::Path;

use super::{open_input, pump};
use crate::config::Config;

/// Copy `input` to `output`; the output only appears once it is complete.
pub fn run(input: &Path, output: &Path, config: &Config) -> Result<()> {
    let chunk_size = config.channel.chunk_size;
    let mut source = open_input(input, chunk_size)?;
    let mut sink = TmpFileChannel::create(output, chunk_size)
        .with_context(|| format!("Failed to create output: {:?}", output))?;

    let copied = pump(&mut source, chunk_size, |piece| Ok(write_all(&mut sink, piece)?));
    let copied = match copied {
        Ok(n) => n,
        Err(e) => {
            if let Err(abort) = sink.close_discarding_pending() {
                tracing::warn!("Failed to discard partial output: {}", abort);
            }
            return Err(e);
        }
    };

    source.close()?;
    sink.close()
        .with_context(|| format!("Failed to publish {:?}", output))?;

    tracing::info!("Copied {} bytes to {:?}", copied, output);
    println!("Copied {} bytes", copied);
    Ok(())
}
