//! Sample drivers: each command wires terminal and filter channels into a
//! pipeline and pumps a file through it.

pub mod codes;
pub mod copy;
pub mod segment;
pub mod unwav;
pub mod vxml;
pub mod wav;

use anyhow::{Context, Result};
use bufstream_core::{ByteChannel, RwFileChannel};
use std::path::Path;

/// Open `path` for reading through a read-mode file channel.
pub fn open_input(path: &Path, chunk_size: usize) -> Result<RwFileChannel> {
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {:?}", path);
    }
    RwFileChannel::open(path, chunk_size).with_context(|| format!("Failed to open input: {:?}", path))
}

/// Read `input` to the end, handing `sink` pieces of at most `piece` bytes.
///
/// Every piece but the last is exactly `piece` bytes long. Returns the
/// number of bytes read.
pub fn pump(input: &mut RwFileChannel, piece: usize, mut sink: impl FnMut(&[u8]) -> Result<()>) -> Result<u64> {
    let mut buf = vec![0u8; piece.max(1)];
    let mut total = 0u64;
    loop {
        let n = input.bulk_read(&mut buf)?;
        if n == 0 {
            break;
        }
        sink(&buf[..n])?;
        total += n as u64;
        if n < buf.len() {
            break;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pump_delivers_full_pieces_then_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.bin");
        std::fs::write(&path, (0u8..25).collect::<Vec<_>>()).unwrap();

        let mut input = open_input(&path, 8).unwrap();
        let mut sizes = Vec::new();
        let mut data = Vec::new();
        let total = pump(&mut input, 10, |piece| {
            sizes.push(piece.len());
            data.extend_from_slice(piece);
            Ok(())
        })
        .unwrap();

        assert_eq!(total, 25);
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(data, (0u8..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_input(&dir.path().join("nope"), 8).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
