//! Two-tier memory channel.

use tracing::{debug, warn};

use super::{check_lease, ignore};
use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::message::Message;

/// Writes into a fixed primary buffer and spills full buffers into a larger
/// bounded spillover.
///
/// Committed bytes stay in the primary buffer until a lease no longer fits;
/// only then are they copied to the spillover in one piece. Without a
/// spillover the channel holds at most one primary buffer of data.
pub struct MemoryChannel {
    primary: Vec<u8>,
    idx: usize,
    spillover: Option<Vec<u8>>,
    spill_capacity: usize,
    finished: bool,
}

impl MemoryChannel {
    /// A channel with only the primary buffer.
    pub fn new(primary_size: usize) -> Self {
        Self {
            primary: vec![0; primary_size],
            idx: 0,
            spillover: None,
            spill_capacity: 0,
            finished: false,
        }
    }

    /// A channel whose full primary buffers move into a spillover of at most
    /// `spill_capacity` bytes.
    pub fn with_spillover(primary_size: usize, spill_capacity: usize) -> Self {
        Self {
            primary: vec![0; primary_size],
            idx: 0,
            spillover: Some(Vec::with_capacity(spill_capacity)),
            spill_capacity,
            finished: false,
        }
    }

    /// Committed bytes not yet moved to the spillover.
    pub fn pending(&self) -> &[u8] {
        &self.primary[..self.idx]
    }

    /// Bytes moved to the spillover so far.
    pub fn spillover(&self) -> &[u8] {
        self.spillover.as_deref().unwrap_or_default()
    }

    /// Take the spillover contents, leaving it empty.
    pub fn take_spillover(&mut self) -> Vec<u8> {
        self.spillover
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn spill(&mut self) -> Result<()> {
        if self.idx == 0 {
            return Ok(());
        }
        let Some(spillover) = self.spillover.as_mut() else {
            return Err(Error::Unavailable {
                requested: self.idx,
                available: 0,
            });
        };
        let available = self.spill_capacity - spillover.len();
        if self.idx > available {
            return Err(Error::Unavailable {
                requested: self.idx,
                available,
            });
        }
        spillover.extend_from_slice(&self.primary[..self.idx]);
        self.idx = 0;
        Ok(())
    }
}

impl ByteChannel for MemoryChannel {
    fn capacity(&self) -> usize {
        self.primary.len() - self.idx
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.finished {
            return Err(Error::Closed);
        }
        check_lease(n, self.primary.len())?;
        if self.idx + n > self.primary.len() {
            self.spill()?;
        }
        Ok(&mut self.primary[self.idx..self.idx + n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        if self.idx + n > self.primary.len() {
            return Err(Error::protocol("commit exceeds the leased region"));
        }
        self.idx += n;
        Ok(n)
    }

    fn chunk_size(&self) -> usize {
        self.primary.len()
    }

    fn split(&mut self) -> Result<()> {
        Ok(())
    }

    fn message(&mut self, _offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::ByteCount(n) => {
                if self.spillover.is_some() {
                    self.spill()?;
                }
                *n = (self.spillover().len() + self.idx) as u64;
                Ok(())
            }
            Message::Flush => {
                debug!("memory channel reset");
                self.idx = 0;
                if let Some(spillover) = self.spillover.as_mut() {
                    spillover.clear();
                }
                Ok(())
            }
            other => ignore(other),
        }
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if abort || self.spillover.is_none() {
            return Ok(());
        }
        self.spill()
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("memory channel teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_spills_in_order() {
        let mut ch = MemoryChannel::with_spillover(16, 64);
        ch.bulk_transfer(&[1; 10]).unwrap();
        ch.bulk_transfer(&[2; 10]).unwrap();
        ch.bulk_transfer(&[3; 10]).unwrap();

        let mut expected = vec![1u8; 10];
        expected.extend([2u8; 10]);
        assert_eq!(ch.spillover(), &expected[..]);
        assert_eq!(ch.pending(), &[3u8; 10][..]);

        ch.finish(false).unwrap();
        expected.extend([3u8; 10]);
        assert_eq!(ch.spillover(), &expected[..]);
        assert!(ch.pending().is_empty());
    }

    #[test]
    fn test_abort_keeps_pending_out() {
        let mut ch = MemoryChannel::with_spillover(16, 64);
        ch.bulk_transfer(&[9; 12]).unwrap();
        ch.finish(true).unwrap();
        assert!(ch.spillover().is_empty());
    }

    #[test]
    fn test_capacity_tracks_commits() {
        let mut ch = MemoryChannel::new(32);
        let before = ch.capacity();
        let region = ch.lease(12).unwrap();
        region.copy_from_slice(b"hello world!");
        ch.commit(5).unwrap();
        assert_eq!(ch.capacity(), before - 5);
        assert_eq!(ch.pending(), b"hello");
    }

    #[test]
    fn test_full_without_spillover() {
        let mut ch = MemoryChannel::new(8);
        ch.bulk_transfer(&[0; 6]).unwrap();
        assert_matches!(ch.lease(4), Err(Error::Unavailable { .. }));
        assert_matches!(ch.lease(9), Err(Error::Unavailable { requested: 9, .. }));
    }

    #[test]
    fn test_spillover_exhausted() {
        let mut ch = MemoryChannel::with_spillover(8, 10);
        ch.bulk_transfer(&[0; 8]).unwrap();
        ch.bulk_transfer(&[0; 8]).unwrap();
        assert_matches!(
            ch.bulk_transfer(&[0; 8]),
            Err(Error::Unavailable { requested: 8, available: 2 })
        );
    }

    #[test]
    fn test_byte_count_and_flush() {
        let mut ch = MemoryChannel::with_spillover(4, 64);
        ch.bulk_transfer(b"abc").unwrap();
        ch.bulk_transfer(b"de").unwrap();
        assert_eq!(ch.byte_count().unwrap(), 5);
        assert_eq!(ch.spillover(), b"abcde");

        ch.message(0, &mut Message::Flush).unwrap();
        assert_eq!(ch.byte_count().unwrap(), 0);
    }
}
