//! Terminal adapters.
//!
//! Each adapter backs the channel with one concrete resource and serves the
//! identity queries (byte count, file name, file number) itself. Queries an
//! adapter cannot answer fail with [`Error::Unhandled`]; every other message
//! it does not interpret is accepted and ignored.

mod callback;
mod file_rw;
mod mem;
mod null;
mod subtitle;
mod tmp_file;
pub mod wave;

pub use callback::CallbackChannel;
pub use file_rw::{FileMode, RwFileChannel};
pub use mem::MemoryChannel;
pub use null::NullChannel;
pub use subtitle::{SubtitleChannel, SubtitleFormat};
pub use tmp_file::TmpFileChannel;
pub use wave::{PcmTarget, WaveChannel, WaveReadChannel};

use tracing::trace;

use crate::error::{Error, Result};
use crate::message::Message;

/// Default lease size for file-backed terminals.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Accept a message the terminal has no use for.
pub(crate) fn ignore(msg: &Message) -> Result<()> {
    if msg.is_query() {
        return Err(Error::Unhandled(msg.code()));
    }
    trace!(code = %msg.code(), "message ignored by terminal");
    Ok(())
}

pub(crate) fn check_lease(requested: usize, chunk_size: usize) -> Result<()> {
    if requested > chunk_size {
        return Err(Error::Unavailable {
            requested,
            available: chunk_size,
        });
    }
    Ok(())
}
