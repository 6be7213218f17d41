//! Bufstream-Filters: filter adapters that wrap a ByteChannel
//!
//! Every filter owns its downstream channel and presents the same
//! [`ByteChannel`] surface upward. Bytes flow through unchanged; filters
//! observe the message bus and write what they learn to sidecar channels
//! or files. Messages a filter does not consume are forwarded downstream
//! with their offset intact, and downstream results are returned as-is.
//!
//! # Modules
//!
//! - `index` - Per-frame index records written to video/audio sidecars
//! - `vxml` - Elementary stream XML GOP index built from committed bytes
//! - `xml` - Program stream XML index built from demuxer records
//! - `hls` - HLS playlist generation from segment announcements
//! - `mzl` - Segment list (`.mzl`) written next to segmented output
//! - `rlbn` - DVD navigation pack logging
//! - `mcidx` - Multi-stream binary index writer
//! - `metadata` - Numbered metadata slot files
//!
//! Sidecars are [`SharedChannel`]s: the filter writes to them but never
//! finishes them, so one sidecar can outlive the pipeline or be shared by
//! several filters.

mod gop;
pub mod hls;
pub mod index;
pub mod mcidx;
pub mod metadata;
pub mod mzl;
pub mod rlbn;
pub mod vxml;
pub mod xml;

pub use gop::{HeaderEncoding, XmlOptions};
pub use hls::HlsFilter;
pub use index::IndexFilter;
pub use mcidx::McidxFilter;
pub use metadata::{MetadataFilter, MetadataStore, MAX_METADATA_SLOTS};
pub use mzl::MzlFilter;
pub use rlbn::RlbnFilter;
pub use vxml::VxmlFilter;
pub use xml::XmlIndexFilter;

use std::path::Path;

use bufstream_core::{write_all, Message, Result, SharedChannel};

/// Write all of `data` to a sidecar.
pub(crate) fn sidecar_write(sidecar: &SharedChannel, data: &[u8]) -> Result<()> {
    write_all(&mut *sidecar.lock(), data)
}

/// Deliver `msg` to a sidecar.
pub(crate) fn sidecar_message(sidecar: &SharedChannel, msg: &mut Message) -> Result<()> {
    sidecar.lock().message(0, msg)
}

/// Final path component, splitting on both `/` and `\`.
pub(crate) fn base_name(path: &Path) -> String {
    let full = path.to_string_lossy();
    full.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Combine two results, keeping the first error.
pub(crate) fn first_error(first: Result<()>, second: Result<()>) -> Result<()> {
    first.and(second)
}

/// Forward the byte-moving half of [`ByteChannel`] to `self.$inner`.
macro_rules! forward_bytes {
    ($inner:ident) => {
        fn capacity(&self) -> usize {
            self.$inner.capacity()
        }

        fn lease(&mut self, n: usize) -> bufstream_core::Result<&mut [u8]> {
            self.$inner.lease(n)
        }

        fn commit(&mut self, n: usize) -> bufstream_core::Result<usize> {
            self.$inner.commit(n)
        }

        fn bulk_transfer(&mut self, data: &[u8]) -> bufstream_core::Result<usize> {
            self.$inner.bulk_transfer(data)
        }

        fn bulk_read(&mut self, buf: &mut [u8]) -> bufstream_core::Result<usize> {
            self.$inner.bulk_read(buf)
        }

        fn chunk_size(&self) -> usize {
            self.$inner.chunk_size()
        }
    };
}

pub(crate) use forward_bytes;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_base_name_handles_both_separators() {
        assert_eq!(base_name(&PathBuf::from("/out/seg_001.ts")), "seg_001.ts");
        assert_eq!(base_name(&PathBuf::from("C:\\media\\seg.ts")), "seg.ts");
        assert_eq!(base_name(&PathBuf::from("plain.ts")), "plain.ts");
    }
}
