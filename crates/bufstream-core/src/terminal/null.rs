//! Byte sink that only counts.

use tracing::warn;

use super::{check_lease, ignore};
use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::message::Message;

/// Discards every byte while keeping a running count.
///
/// Used for first-pass encodes that need size bookkeeping without output.
pub struct NullChannel {
    scratch: Vec<u8>,
    byte_count: u64,
    finished: bool,
}

impl NullChannel {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            scratch: vec![0; chunk_size],
            byte_count: 0,
            finished: false,
        }
    }

    /// Bytes accepted so far.
    pub fn bytes_seen(&self) -> u64 {
        self.byte_count
    }
}

impl ByteChannel for NullChannel {
    fn capacity(&self) -> usize {
        self.scratch.len()
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.finished {
            return Err(Error::Closed);
        }
        check_lease(n, self.scratch.len())?;
        Ok(&mut self.scratch[..n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        self.byte_count += n as u64;
        Ok(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        if self.finished {
            return Err(Error::Closed);
        }
        self.byte_count += data.len() as u64;
        Ok(data.len())
    }

    fn chunk_size(&self) -> usize {
        self.scratch.len()
    }

    fn split(&mut self) -> Result<()> {
        Ok(())
    }

    fn message(&mut self, _offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::ByteCount(n) => {
                *n = self.byte_count;
                Ok(())
            }
            other => ignore(other),
        }
    }

    fn finish(&mut self, _abort: bool) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

impl Drop for NullChannel {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("null channel teardown failed: {e}");
        }
    }
}
