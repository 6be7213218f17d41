use anyhow::{Context, Result};
use bufstream_core::terminal::wave::{PcmEncoding, PcmTarget, WavFormat};
use bufstream_core::{write_all, ByteChannel, TmpFileChannel, WaveReadChannel};
use std::path::Path;

use crate::cli::PcmOutput;

impl PcmOutput {
    fn encoding(self) -> PcmEncoding {
        match self {
            Self::Dvd => PcmEncoding::DvdLpcm,
            Self::Hdmv => PcmEncoding::HdmvLpcm,
            Self::Aes302m => PcmEncoding::Aes302M,
            Self::Aes331m => PcmEncoding::Aes331M,
            Self::Aes382m => PcmEncoding::Aes382M,
        }
    }
}

/// What an unwrap run produced.
#[derive(Debug)]
pub struct UnwavReport {
    pub format: WavFormat,
    pub bytes: u64,
    /// Size of the first unit, frame header included.
    pub first_unit: usize,
}

/// Convert the WAV file at `input` into a tagged, framed PCM stream at `output`.
pub fn run(
    input: &Path,
    output: &Path,
    framing: PcmOutput,
    frame_rate_code: u8,
    buffer_size: usize,
    chunk_size: usize,
) -> Result<UnwavReport> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }
    let target = PcmTarget::new(framing.encoding()).with_frame_rate_code(frame_rate_code);
    let mut source = WaveReadChannel::open(input, buffer_size, target)
        .with_context(|| format!("Failed to open WAV input: {:?}", input))?;
    let format = source.wav_format();
    let first_unit = source.bytes_per_frame();
    let mut sink = TmpFileChannel::create(output, chunk_size)
        .with_context(|| format!("Failed to create output: {:?}", output))?;

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut bytes = 0u64;
    let copied: Result<()> = loop {
        let n = match source.bulk_read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e.into()),
        };
        if let Err(e) = write_all(&mut sink, &buf[..n]) {
            break Err(e.into());
        }
        bytes += n as u64;
    };
    if let Err(e) = copied {
        if let Err(abort) = sink.close_discarding_pending() {
            tracing::warn!("Failed to discard partial output: {}", abort);
        }
        return Err(e);
    }

    source.close()?;
    sink.close()
        .with_context(|| format!("Failed to publish {:?}", output))?;

    tracing::info!(
        "Unwrapped {:?} into {} bytes of {:?} ({} ch, {} Hz, {} bit)",
        input,
        bytes,
        framing,
        format.channels,
        format.sample_rate,
        format.bits_per_sample
    );
    Ok(UnwavReport {
        format,
        bytes,
        first_unit,
    })
}
