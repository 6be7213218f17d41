//! Bufstream-Core: the ByteChannel contract, its message bus, and terminal adapters
//!
//! A pipeline is built bottom-up: a terminal adapter that owns a real
//! resource (memory, a file, nothing at all) and zero or more filters from
//! `bufstream-filters` wrapped around it. Producers drive the outermost
//! channel with lease/commit or bulk transfers and interleave side-channel
//! messages describing what they just wrote.
//!
//! # Modules
//!
//! - `channel` - The [`ByteChannel`] trait and sidecar sharing
//! - `message` - Message codes, typed messages and their packed wire layout
//! - `terminal` - Memory, null, file, temp-file, WAV, subtitle and callback adapters
//! - `error` - Error type and the legacy status mapping
//!
//! # Teardown
//!
//! ```text
//! StreamEnd message -> close()                    (normal)
//! close_discarding_pending()                      (error / cancel)
//! drop                                            (finish(false) if still open)
//! ```

pub mod channel;
pub mod error;
pub mod message;
pub mod terminal;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use channel::{shared, write_all, ByteChannel, SharedChannel};
pub use error::{status_of, Error, Result, BS_ERROR, BS_IO_ERROR, BS_OK};
pub use message::{Message, MessageCode, MetadataOp};
pub use terminal::{
    CallbackChannel, FileMode, MemoryChannel, NullChannel, PcmTarget, RwFileChannel,
    SubtitleChannel, SubtitleFormat, TmpFileChannel, WaveChannel, WaveReadChannel,
};
