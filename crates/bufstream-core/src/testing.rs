//! Test doubles for exercising filters.

use std::path::PathBuf;

use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::message::{Message, MessageCode};

/// One call observed by a [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Lease(usize),
    Commit(usize),
    BulkTransfer(Vec<u8>),
    BulkRead(usize),
    Split,
    Message { offset: u32, msg: Message },
    Finish { abort: bool },
}

/// An in-memory channel that records every call it receives.
///
/// It answers the identity queries like a segmented file terminal would:
/// the byte count covers the current segment, and a split (call or
/// `SplitOutput` message) starts the next file number. Messages whose code
/// was registered with [`RecordingChannel::fail_on`] are recorded and then
/// rejected.
#[derive(Debug)]
pub struct RecordingChannel {
    calls: Vec<Call>,
    data: Vec<u8>,
    scratch: Vec<u8>,
    segment_bytes: u64,
    file_number: u32,
    file_name: Option<PathBuf>,
    failing: Vec<MessageCode>,
}

impl RecordingChannel {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            calls: Vec::new(),
            data: Vec::new(),
            scratch: vec![0; chunk_size],
            segment_bytes: 0,
            file_number: 0,
            file_name: None,
            failing: Vec::new(),
        }
    }

    /// Answer file name queries with `name`.
    pub fn with_file_name(mut self, name: impl Into<PathBuf>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn set_file_name(&mut self, name: impl Into<PathBuf>) {
        self.file_name = Some(name.into());
    }

    /// Reject every message carrying `code`.
    pub fn fail_on(&mut self, code: MessageCode) {
        self.failing.push(code);
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    /// Every byte committed or transferred, across all segments.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Messages received, in order.
    pub fn messages(&self) -> Vec<&Message> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Message { msg, .. } => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> bool {
        self.calls.iter().any(|c| matches!(c, Call::Finish { .. }))
    }

    fn next_segment(&mut self) {
        self.file_number += 1;
        self.segment_bytes = 0;
    }
}

impl ByteChannel for RecordingChannel {
    fn capacity(&self) -> usize {
        self.scratch.len()
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        self.calls.push(Call::Lease(n));
        if n > self.scratch.len() {
            return Err(Error::Unavailable {
                requested: n,
                available: self.scratch.len(),
            });
        }
        Ok(&mut self.scratch[..n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        self.calls.push(Call::Commit(n));
        let n = n.min(self.scratch.len());
        self.data.extend_from_slice(&self.scratch[..n]);
        self.segment_bytes += n as u64;
        Ok(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        self.calls.push(Call::BulkTransfer(data.to_vec()));
        self.data.extend_from_slice(data);
        self.segment_bytes += data.len() as u64;
        Ok(data.len())
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.calls.push(Call::BulkRead(buf.len()));
        Ok(0)
    }

    fn chunk_size(&self) -> usize {
        self.scratch.len()
    }

    fn split(&mut self) -> Result<()> {
        self.calls.push(Call::Split);
        self.next_segment();
        Ok(())
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        self.calls.push(Call::Message {
            offset,
            msg: msg.clone(),
        });
        let code = msg.code();
        if self.failing.contains(&code) {
            return Err(Error::protocol(format!("injected failure for {code}")));
        }
        match msg {
            Message::ByteCount(n) => *n = self.segment_bytes,
            Message::FileNumber(n) => *n = self.file_number,
            Message::FileName(name) => match &self.file_name {
                Some(path) => *name = Some(path.clone()),
                None => return Err(Error::Unhandled(code)),
            },
            Message::SplitOutput => self.next_segment(),
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        self.calls.push(Call::Finish { abort });
        Ok(())
    }
}
