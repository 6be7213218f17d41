use anyhow::{Context, Result};
use bufstream_core::message::OutputSegment;
use bufstream_core::{write_all, ByteChannel, Message, TmpFileChannel};
use bufstream_filters::{HlsFilter, MzlFilter};
use std::path::{Path, PathBuf};

use super::{open_input, pump};
use crate::config::SegmentConfig;

/// 100 ns units per second.
const TICKS_PER_SECOND: u64 = 10_000_000;

/// What a segmenting run produced.
#[derive(Debug)]
pub struct SegmentReport {
    pub segments: u32,
    pub bytes: u64,
    pub playlist: Option<PathBuf>,
}

/// Split `input` into `output_NNN.ext` segments.
///
/// A segmented temp-file channel receives the bytes; the `.mzl` filter
/// and the HLS filter are stacked on top when enabled.
pub fn run(input: &Path, output: &Path, chunk_size: usize, settings: &SegmentConfig) -> Result<SegmentReport> {
    if settings.bytes_per_segment == 0 {
        anyhow::bail!("Segment size cannot be 0");
    }
    let mut source = open_input(input, chunk_size)?;

    let segments = TmpFileChannel::segmented(output, chunk_size)
        .with_context(|| format!("Failed to create output: {:?}", output))?;
    let mut chain: Box<dyn ByteChannel> = Box::new(segments);
    if settings.write_mzl {
        chain = Box::new(MzlFilter::new(chain).context("Failed to derive the segment list name")?);
    }
    let playlist = settings.write_playlist.then(|| output.with_extension("m3u8"));
    if let Some(path) = &playlist {
        chain = Box::new(
            HlsFilter::new(chain, path, settings.uri_prefix.as_str())
                .with_context(|| format!("Failed to create playlist: {:?}", path))?,
        );
    }

    let mut splitter = Splitter {
        chain: &mut chain,
        size: settings.bytes_per_segment,
        duration: settings.segment_duration_secs * TICKS_PER_SECOND,
        in_segment: 0,
        segments: 0,
    };
    let pumped = pump(&mut source, chunk_size, |piece| splitter.write(piece));
    let result = pumped.and_then(|_| splitter.end());
    let segments = splitter.segments;

    if let Err(e) = result {
        if let Err(abort) = chain.finish(true) {
            tracing::warn!("Failed to discard partial output: {}", abort);
        }
        return Err(e);
    }
    let bytes = source.byte_count()?;
    chain.close()?;

    tracing::info!("Wrote {} segments ({} bytes) for {:?}", segments, bytes, output);
    Ok(SegmentReport {
        segments,
        bytes,
        playlist,
    })
}

struct Splitter<'a> {
    chain: &'a mut Box<dyn ByteChannel>,
    size: u64,
    /// Announced duration of a full segment, 100 ns units.
    duration: u64,
    in_segment: u64,
    segments: u32,
}

impl Splitter<'_> {
    fn write(&mut self, mut piece: &[u8]) -> Result<()> {
        while !piece.is_empty() {
            // split only once more data arrives so the last segment is never empty
            if self.in_segment == self.size {
                self.announce()?;
                self.chain.message(0, &mut Message::SplitOutput)?;
            }
            let room = usize::try_from(self.size - self.in_segment).unwrap_or(usize::MAX);
            let take = piece.len().min(room);
            write_all(&mut **self.chain, &piece[..take])?;
            self.in_segment += take as u64;
            piece = &piece[take..];
        }
        Ok(())
    }

    fn announce(&mut self) -> Result<()> {
        let duration = (u128::from(self.duration) * u128::from(self.in_segment) / u128::from(self.size)) as u64;
        let segment = OutputSegment {
            duration,
            length: self.in_segment,
        };
        self.chain.message(0, &mut Message::OutputSegment(segment))?;
        self.segments += 1;
        self.in_segment = 0;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if self.in_segment > 0 || self.segments == 0 {
            self.announce()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(size: u64) -> SegmentConfig {
        SegmentConfig {
            bytes_per_segment: size,
            segment_duration_secs: 4,
            uri_prefix: String::new(),
            write_mzl: true,
            write_playlist: true,
        }
    }

    #[test]
    fn test_segments_list_and_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.ts");
        std::fs::write(&input, vec![7u8; 2500]).unwrap();
        let output = dir.path().join("out.ts");

        let report = run(&input, &output, 512, &settings(1000)).unwrap();
        assert_eq!(report.segments, 3);
        assert_eq!(report.bytes, 2500);

        for (n, len) in [(0, 1000), (1, 1000), (2, 500)] {
            let seg = dir.path().join(format!("out_{n:03}.ts"));
            assert_eq!(std::fs::metadata(&seg).unwrap().len(), len);
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out_000.mzl")).unwrap(),
            "DZMP\nout_000.ts; 1000\nout_001.ts; 1000\nout_002.ts; 500\n"
        );
        let playlist = std::fs::read_to_string(report.playlist.unwrap()).unwrap();
        assert!(playlist.contains("#EXTINF:4,\n\nout_001.ts\n\n"));
        assert!(playlist.contains("#EXTINF:2,\n\nout_002.ts\n\n"));
        assert!(playlist.contains("#EXT-X-TARGETDURATION:4\n"));
    }

    #[test]
    fn test_exact_multiple_leaves_no_empty_segment() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.ts");
        std::fs::write(&input, vec![1u8; 2000]).unwrap();
        let output = dir.path().join("out.ts");

        let mut plain = settings(1000);
        plain.write_mzl = false;
        plain.write_playlist = false;
        let report = run(&input, &output, 300, &plain).unwrap();

        assert_eq!(report.segments, 2);
        assert!(report.playlist.is_none());
        assert!(dir.path().join("out_001.ts").exists());
        assert!(!dir.path().join("out_002.ts").exists());
        assert!(!dir.path().join("out_000.mzl").exists());
    }
}
