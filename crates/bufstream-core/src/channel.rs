//! The ByteChannel contract.
//!
//! A channel accepts bytes either through a two step lease/commit (the
//! caller writes straight into the channel's buffer) or through
//! [`ByteChannel::bulk_transfer`] when the bytes already exist. Structured
//! metadata and control travel separately through [`ByteChannel::message`].
//!
//! Teardown is two phase. [`ByteChannel::finish`] writes trailing state
//! (unless aborting) and releases OS resources; it is idempotent. Dropping
//! the handle releases memory and runs `finish(false)` first if nobody did.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::message::{Message, MessageCode};

/// One stage of a streaming pipeline.
///
/// At most one lease is outstanding at a time: `commit(n)` refers to the most
/// recent `lease` and `n` must not exceed the leased size. Channels are not
/// safe for concurrent use; share them behind a lock (see [`SharedChannel`]).
pub trait ByteChannel: Send {
    /// Bytes that can be leased or transferred right now without failing.
    fn capacity(&self) -> usize;

    /// Lease a contiguous region of at least `n` bytes.
    ///
    /// Fails with [`Error::Unavailable`] when `n` exceeds the chunk size or
    /// the backing resource has no room.
    fn lease(&mut self, n: usize) -> Result<&mut [u8]>;

    /// Finalize the first `n` bytes of the most recent lease.
    fn commit(&mut self, n: usize) -> Result<usize>;

    /// Lease, copy and commit `data` in one call.
    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        let region = self.lease(data.len())?;
        region[..data.len()].copy_from_slice(data);
        self.commit(data.len())
    }

    /// Copy bytes out of a read-mode channel.
    fn bulk_read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::protocol("channel does not support reading"))
    }

    /// Largest lease this channel grants.
    fn chunk_size(&self) -> usize;

    /// Close the current output and continue in a new one.
    fn split(&mut self) -> Result<()> {
        Err(Error::unsupported("split"))
    }

    /// Deliver a side-channel message.
    ///
    /// Queries are answered in place. Filters forward everything they do
    /// not handle to their inner channel.
    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()>;

    /// Flush trailing state unless `abort` is set, then release OS resources.
    fn finish(&mut self, abort: bool) -> Result<()>;

    /// Deliver a message given in wire form, writing any answer back into
    /// `payload`.
    fn auxinfo(&mut self, offset: u32, code: MessageCode, payload: &mut [u8]) -> Result<()> {
        let mut msg = Message::decode(code, payload)?;
        self.message(offset, &mut msg)?;
        msg.write_reply(payload)
    }

    /// Ask the channel for its running byte count.
    fn byte_count(&mut self) -> Result<u64> {
        let mut msg = Message::byte_count();
        self.message(0, &mut msg)?;
        match msg {
            Message::ByteCount(n) => Ok(n),
            _ => Err(Error::protocol("byte count query changed type")),
        }
    }

    /// Ask the channel for its current file name.
    fn file_name(&mut self) -> Result<Option<std::path::PathBuf>> {
        let mut msg = Message::file_name();
        self.message(0, &mut msg)?;
        match msg {
            Message::FileName(name) => Ok(name),
            _ => Err(Error::protocol("file name query changed type")),
        }
    }

    /// Ask the channel for its current file number.
    fn file_number(&mut self) -> Result<u32> {
        let mut msg = Message::file_number();
        self.message(0, &mut msg)?;
        match msg {
            Message::FileNumber(n) => Ok(n),
            _ => Err(Error::protocol("file number query changed type")),
        }
    }

    /// Finish normally and release the channel.
    fn close(mut self) -> Result<()>
    where
        Self: Sized,
    {
        self.finish(false)
    }

    /// Skip finalization writes and release the channel.
    fn close_discarding_pending(mut self) -> Result<()>
    where
        Self: Sized,
    {
        self.finish(true)
    }
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        (**self).lease(n)
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        (**self).commit(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        (**self).bulk_transfer(data)
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).bulk_read(buf)
    }

    fn chunk_size(&self) -> usize {
        (**self).chunk_size()
    }

    fn split(&mut self) -> Result<()> {
        (**self).split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        (**self).message(offset, msg)
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        (**self).finish(abort)
    }
}

impl<C: ByteChannel + ?Sized> ByteChannel for &mut C {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        (**self).lease(n)
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        (**self).commit(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        (**self).bulk_transfer(data)
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).bulk_read(buf)
    }

    fn chunk_size(&self) -> usize {
        (**self).chunk_size()
    }

    fn split(&mut self) -> Result<()> {
        (**self).split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        (**self).message(offset, msg)
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        (**self).finish(abort)
    }
}

/// A sidecar channel handed to a filter while the caller keeps ownership.
///
/// Filters write through the lock but never finish a shared channel.
pub type SharedChannel = Arc<Mutex<dyn ByteChannel>>;

/// Wrap a channel for use as a sidecar.
pub fn shared<C: ByteChannel + 'static>(channel: C) -> SharedChannel {
    Arc::new(Mutex::new(channel))
}

/// Transfer all of `data` in pieces no larger than the chunk size, treating
/// a short transfer as failure.
pub fn write_all<C: ByteChannel + ?Sized>(channel: &mut C, data: &[u8]) -> Result<()> {
    let piece = channel.chunk_size().max(1);
    let mut done = 0;
    for part in data.chunks(piece) {
        let n = channel.bulk_transfer(part)?;
        done += n;
        if n != part.len() {
            return Err(Error::ShortTransfer {
                requested: data.len(),
                actual: done,
            });
        }
    }
    Ok(())
}
