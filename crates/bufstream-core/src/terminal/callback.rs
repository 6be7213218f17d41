//! Single access unit delivery to an application callback.

use tracing::{trace, warn};

use super::{check_lease, ignore};
use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::message::Message;

/// Receives one finished unit (or one muxed block) at a time.
pub type UnitCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Collects the bytes of one access unit and hands them to a callback when
/// the encoder announces the unit with a `VideoAu` or `AudioAu` message.
///
/// An encoder may lease space for the next unit before announcing the
/// current one; the bytes committed into that lease are moved to the front
/// of the buffer once the current unit has been delivered.
///
/// In muxed mode every transfer goes straight to the callback and unit
/// messages are ignored.
pub struct CallbackChannel {
    buf: Vec<u8>,
    idx: usize,
    chunk_size: usize,
    unit_done: bool,
    last_lease: Option<usize>,
    muxed: bool,
    callback: UnitCallback,
    finished: bool,
}

impl CallbackChannel {
    /// Unit mode: deliver whole access units.
    pub fn new(buffer_size: usize, chunk_size: usize, callback: impl FnMut(&[u8]) + Send + 'static) -> Self {
        Self::build(buffer_size, chunk_size, false, Box::new(callback))
    }

    /// Muxed mode: deliver every transfer as it arrives.
    pub fn muxed(buffer_size: usize, chunk_size: usize, callback: impl FnMut(&[u8]) + Send + 'static) -> Self {
        Self::build(buffer_size, chunk_size, true, Box::new(callback))
    }

    fn build(buffer_size: usize, chunk_size: usize, muxed: bool, callback: UnitCallback) -> Self {
        Self {
            buf: vec![0; buffer_size],
            idx: 0,
            chunk_size,
            unit_done: false,
            last_lease: None,
            muxed,
            callback,
            finished: false,
        }
    }

    fn deliver_unit(&mut self, length: u32) {
        let len = (length as usize).min(self.idx);
        trace!(len, "unit delivered");
        (self.callback)(&self.buf[..len]);
        self.idx = 0;
        self.unit_done = true;
    }
}

impl ByteChannel for CallbackChannel {
    fn capacity(&self) -> usize {
        self.buf.len() - self.idx
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.finished {
            return Err(Error::Closed);
        }
        check_lease(n, self.chunk_size)?;
        self.unit_done = false;
        if self.idx + n > self.buf.len() {
            self.last_lease = None;
            return Err(Error::Unavailable {
                requested: n,
                available: self.buf.len() - self.idx,
            });
        }
        self.last_lease = Some(self.idx);
        Ok(&mut self.buf[self.idx..self.idx + n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        let start = self
            .last_lease
            .ok_or_else(|| Error::protocol("commit without a lease"))?;
        if start + n > self.buf.len() {
            return Err(Error::protocol("commit exceeds the leased region"));
        }
        if self.muxed {
            (self.callback)(&self.buf[start..start + n]);
            return Ok(n);
        }
        if self.unit_done && self.idx == 0 && start != 0 {
            self.buf.copy_within(start..start + n, 0);
        }
        self.idx += n;
        Ok(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        if self.finished {
            return Err(Error::Closed);
        }
        if self.muxed {
            (self.callback)(data);
            return Ok(data.len());
        }
        let region = self.lease(data.len())?;
        region.copy_from_slice(data);
        self.commit(data.len())
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn split(&mut self) -> Result<()> {
        Ok(())
    }

    fn message(&mut self, _offset: u32, msg: &mut Message) -> Result<()> {
        if self.muxed {
            return ignore(msg);
        }
        match msg {
            Message::VideoAu(au) => self.deliver_unit(au.length),
            Message::AudioAu(au) => self.deliver_unit(au.length),
            other => return ignore(other),
        }
        Ok(())
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if !abort && !self.muxed && self.idx > 0 {
            (self.callback)(&self.buf[..self.idx]);
            self.idx = 0;
        }
        Ok(())
    }
}

impl Drop for CallbackChannel {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("callback channel teardown failed: {e}");
        }
    }
}
